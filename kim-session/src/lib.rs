//! KIM Session 服务
//!
//! 会话注册表：以 (user_id, device_id) 为键维护在线设备会话，
//! 登录建会话、TTL 续期、幂等删除，多步一致性由 Redis Lua 脚本保证。

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod service;

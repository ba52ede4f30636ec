//! KIM Gateway 服务
//!
//! 边缘接入层：终结客户端自定义帧协议的 TCP 长连接，
//! 登录鉴权后维护连接生命周期（心跳驱逐、Session TTL 续期），
//! 并向后端服务暴露按连接推送/关闭的 gRPC 接口。

pub mod config;
pub mod event;
pub mod infrastructure;
pub mod interface;
pub mod service;
pub mod transport;

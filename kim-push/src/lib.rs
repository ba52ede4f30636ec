//! KIM Push 服务
//!
//! 推送扇出层：把逻辑目标（用户 + 可选设备过滤）解析为各边缘节点上的
//! 具体连接，按 gateway_id 分组后调用对应 Gateway 节点完成投递。

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod service;

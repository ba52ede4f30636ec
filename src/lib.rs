//! KIM IM Core 公共库
//!
//! 提供各服务共享的基础能力：配置加载、错误码、帧协议编解码、
//! 服务注册发现以及按 gateway_id 路由的网关客户端缓存。

pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod service_names;
pub mod tracing;

pub use config::{AppConfig, GatewayConfig, LogConfig, PushConfig, RegistryConfig, SessionConfig};
pub use discovery::{
    EtcdDiscover, EtcdRegistry, ServiceClient, ServiceDiscover, ServiceInstance, ServiceRegistry,
};
pub use error::Error;
pub use gateway::GatewayRouter;
pub use protocol::{MsgType, Packet, ProtocolError, HEADER_SIZE, MAGIC_NUMBER, MAX_BODY_SIZE};
pub use service_names::{get_service_name, service_name_env_var};
pub use crate::tracing::init_tracing_from_config;

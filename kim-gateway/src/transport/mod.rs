//! TCP 传输层
//!
//! 连接对象、连接池、连接 ID 生成器、TTL 时间轮与 TCP 反应器。
//! 上层业务通过 [`EventHandler`] 回调接入，传输层不感知业务身份，
//! 以此打破 Gateway ↔ Handler ↔ Transport 的循环依赖。

pub mod conn_pool;
pub mod connection;
pub mod id_generator;
pub mod tcp;
pub mod time_wheel;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

pub use conn_pool::ConnPool;
pub use connection::{Connection, PlatformType};
pub use id_generator::IdGenerator;
pub use tcp::{TcpTransport, TransportConfig, TransportError};
pub use time_wheel::TimeWheel;

/// 传输层生命周期回调
///
/// 事件回调在事件分发工作者上执行，不允许无界阻塞；
/// 耗时工作应转交自己的任务池。
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 连接建立且已完成鉴权
    async fn on_connect(&self, conn: &Arc<Connection>) -> Result<()>;
    /// 收到上行业务消息
    async fn on_message(&self, conn: &Arc<Connection>, data: &[u8]) -> Result<()>;
    /// 连接断开
    async fn on_disconnect(&self, conn: &Arc<Connection>, reason: &str);
    /// 收到心跳
    async fn on_heartbeat(&self, conn: &Arc<Connection>);
    /// 心跳超时
    async fn on_heartbeat_timeout(&self, conn: &Arc<Connection>);
    /// 时间轮触发的 Session TTL 续期
    async fn on_refresh_session(&self, conn: &Arc<Connection>, last_active_at: i64) -> Result<()>;
}

//! 长连接事件处理
//!
//! 传输层回调的默认实现：断开时删除会话，时间轮触发时续期 TTL。
//! 上行业务消息的路由不在网关职责内，这里只做记录。

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::infrastructure::SessionApi;
use crate::transport::{Connection, EventHandler};

pub struct GatewayEvent {
    session_client: Arc<dyn SessionApi>,
}

impl GatewayEvent {
    pub fn new(session_client: Arc<dyn SessionApi>) -> Self {
        Self { session_client }
    }
}

#[async_trait]
impl EventHandler for GatewayEvent {
    async fn on_connect(&self, conn: &Arc<Connection>) -> Result<()> {
        debug!(
            conn_id = conn.id(),
            user_id = %conn.user_id(),
            "connection ready"
        );
        Ok(())
    }

    async fn on_message(&self, conn: &Arc<Connection>, data: &[u8]) -> Result<()> {
        // 业务消息处理（落库、群扇出等）由独立服务承接
        debug!(
            conn_id = conn.id(),
            user_id = %conn.user_id(),
            size = data.len(),
            "upstream message received"
        );
        Ok(())
    }

    async fn on_disconnect(&self, conn: &Arc<Connection>, reason: &str) {
        match self
            .session_client
            .del_session(conn.user_id(), vec![conn.device_id().to_string()], reason)
            .await
        {
            Ok(()) => {
                info!(
                    user_id = %conn.user_id(),
                    device_id = %conn.device_id(),
                    reason = %reason,
                    "session deleted on disconnect"
                );
            }
            Err(err) => {
                warn!(
                    error = %err,
                    user_id = %conn.user_id(),
                    device_id = %conn.device_id(),
                    "call session DelSession failed"
                );
            }
        }
    }

    async fn on_heartbeat(&self, conn: &Arc<Connection>) {
        debug!(conn_id = conn.id(), "heartbeat received");
    }

    async fn on_heartbeat_timeout(&self, conn: &Arc<Connection>) {
        warn!(
            conn_id = conn.id(),
            user_id = %conn.user_id(),
            last_active_at = conn.last_active_secs(),
            "heartbeat timeout"
        );
    }

    async fn on_refresh_session(&self, conn: &Arc<Connection>, last_active_at: i64) -> Result<()> {
        self.session_client
            .refresh_session_ttl(conn.user_id(), conn.device_id(), last_active_at)
            .await
    }
}

//! 会话仓储接口

use async_trait::async_trait;

use crate::domain::model::Session;

/// 仓储错误
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("session not found")]
    NotFound,
    /// 存储中的会话 JSON 无法解析
    #[error("session state corrupt")]
    StateCorrupt,
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// 会话仓储
///
/// 所有涉及 会话键 与 用户设备索引 两个键的变更都必须原子执行。
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// 存储会话并把 device_id 并入用户索引，重置 TTL
    async fn store_session(&self, session: &Session) -> RepositoryResult<()>;

    /// 读取单个会话；过期或不存在返回 NotFound
    async fn get_session(&self, user_id: &str, device_id: &str) -> RepositoryResult<Session>;

    /// 读取用户全部会话，顺带剔除索引中已过期的设备
    async fn get_sessions_by_user_id(&self, user_id: &str) -> RepositoryResult<Vec<Session>>;

    /// 删除单个会话；不存在返回 NotFound（索引中的残留照常清理）
    async fn delete_session(&self, user_id: &str, device_id: &str) -> RepositoryResult<()>;

    /// 删除用户全部会话，返回删除数量
    async fn delete_sessions_by_user_id(&self, user_id: &str) -> RepositoryResult<i64>;

    /// 原子改写 last_active_at 并重置 TTL；不存在返回 NotFound
    async fn refresh_session_ttl(
        &self,
        user_id: &str,
        device_id: &str,
        last_active_at: i64,
    ) -> RepositoryResult<()>;
}

//! Redis 会话仓储实现
//!
//! 存储布局：
//! - `kim:user:session:{user_id}:{device_id}` → 会话 JSON，TTL 7 天
//! - `kim:user:sessions:{user_id}` → 用户设备 ID 集合，TTL 同上
//!
//! 花括号哈希标签把同一用户的两个键固定到同一哈希槽，
//! 使 Lua 脚本在分片部署下也能原子访问。

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::warn;

use super::lua;
use crate::domain::model::Session;
use crate::domain::repository::{RepositoryError, RepositoryResult, SessionRepository};

/// 会话过期时间，7 天
const SESSION_EXPIRE_SECONDS: i64 = 7 * 24 * 3600;

fn user_session_key(user_id: &str, device_id: &str) -> String {
    format!("kim:user:session:{{{}}}:{}", user_id, device_id)
}

fn user_sessions_set_key(user_id: &str) -> String {
    format!("kim:user:sessions:{{{}}}", user_id)
}

pub struct RedisSessionRepository {
    conn: ConnectionManager,
    store_script: Script,
    get_by_user_script: Script,
    delete_script: Script,
    delete_by_user_script: Script,
    refresh_ttl_script: Script,
}

impl RedisSessionRepository {
    pub async fn connect(redis_url: &str) -> RepositoryResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            store_script: Script::new(lua::STORE_SESSION_SCRIPT),
            get_by_user_script: Script::new(lua::GET_SESSIONS_BY_USER_ID_SCRIPT),
            delete_script: Script::new(lua::DELETE_SESSION_SCRIPT),
            delete_by_user_script: Script::new(lua::DELETE_SESSIONS_BY_USER_ID_SCRIPT),
            refresh_ttl_script: Script::new(lua::REFRESH_SESSION_TTL_SCRIPT),
        }
    }
}

#[async_trait]
impl SessionRepository for RedisSessionRepository {
    async fn store_session(&self, session: &Session) -> RepositoryResult<()> {
        let raw = serde_json::to_string(session)?;
        let mut conn = self.conn.clone();

        let _: i64 = self
            .store_script
            .key(user_session_key(&session.user_id, &session.device_id))
            .key(user_sessions_set_key(&session.user_id))
            .arg(raw)
            .arg(&session.device_id)
            .arg(SESSION_EXPIRE_SECONDS)
            .invoke_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn get_session(&self, user_id: &str, device_id: &str) -> RepositoryResult<Session> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(user_session_key(user_id, device_id)).await?;
        let raw = raw.ok_or(RepositoryError::NotFound)?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn get_sessions_by_user_id(&self, user_id: &str) -> RepositoryResult<Vec<Session>> {
        let mut conn = self.conn.clone();
        let raws: Vec<String> = self
            .get_by_user_script
            .key(user_sessions_set_key(user_id))
            .arg(user_id)
            .invoke_async(&mut conn)
            .await?;

        let mut sessions = Vec::with_capacity(raws.len());
        for raw in raws {
            match serde_json::from_str::<Session>(&raw) {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "skip undecodable session record");
                }
            }
        }
        Ok(sessions)
    }

    async fn delete_session(&self, user_id: &str, device_id: &str) -> RepositoryResult<()> {
        let mut conn = self.conn.clone();
        let existed: i64 = self
            .delete_script
            .key(user_session_key(user_id, device_id))
            .key(user_sessions_set_key(user_id))
            .arg(device_id)
            .invoke_async(&mut conn)
            .await?;

        if existed == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete_sessions_by_user_id(&self, user_id: &str) -> RepositoryResult<i64> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .delete_by_user_script
            .key(user_sessions_set_key(user_id))
            .arg(user_id)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted)
    }

    async fn refresh_session_ttl(
        &self,
        user_id: &str,
        device_id: &str,
        last_active_at: i64,
    ) -> RepositoryResult<()> {
        let mut conn = self.conn.clone();
        let result: i64 = self
            .refresh_ttl_script
            .key(user_session_key(user_id, device_id))
            .arg(last_active_at)
            .arg(SESSION_EXPIRE_SECONDS)
            .invoke_async(&mut conn)
            .await?;

        match result {
            1 => Ok(()),
            0 => Err(RepositoryError::NotFound),
            _ => Err(RepositoryError::StateCorrupt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{DeviceType, SessionStatus};
    use std::collections::HashMap;

    fn sample_session(user_id: &str, device_id: &str) -> Session {
        let now = chrono::Utc::now().timestamp();
        Session {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            device_type: DeviceType::Mobile as i32,
            gateway_id: "gateway-1".to_string(),
            conn_id: 1_000_001,
            remote_addr: "127.0.0.1:40000".to_string(),
            status: SessionStatus::Online as i32,
            login_at: now,
            last_active_at: now,
            expire_at: now + 3600,
            meta: HashMap::new(),
        }
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(
            user_session_key("u1", "dev-a"),
            "kim:user:session:{u1}:dev-a"
        );
        assert_eq!(user_sessions_set_key("u1"), "kim:user:sessions:{u1}");
    }

    async fn repository() -> RedisSessionRepository {
        RedisSessionRepository::connect("redis://127.0.0.1:6379")
            .await
            .expect("redis not reachable")
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_store_get_delete_roundtrip() {
        let repo = repository().await;
        let session = sample_session("it-u1", "it-dev-a");

        repo.store_session(&session).await.unwrap();
        let loaded = repo.get_session("it-u1", "it-dev-a").await.unwrap();
        assert_eq!(loaded, session);

        let all = repo.get_sessions_by_user_id("it-u1").await.unwrap();
        assert_eq!(all.len(), 1);

        repo.delete_session("it-u1", "it-dev-a").await.unwrap();
        assert!(matches!(
            repo.get_session("it-u1", "it-dev-a").await,
            Err(RepositoryError::NotFound)
        ));
        // 幂等：再删一次报 NotFound，由上层折算为成功
        assert!(matches!(
            repo.delete_session("it-u1", "it-dev-a").await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_refresh_ttl_rewrites_last_active() {
        let repo = repository().await;
        let session = sample_session("it-u2", "it-dev-b");
        repo.store_session(&session).await.unwrap();

        let new_active = session.last_active_at + 60;
        repo.refresh_session_ttl("it-u2", "it-dev-b", new_active)
            .await
            .unwrap();

        let loaded = repo.get_session("it-u2", "it-dev-b").await.unwrap();
        assert_eq!(loaded.last_active_at, new_active);
        assert_eq!(loaded.conn_id, session.conn_id);

        repo.delete_sessions_by_user_id("it-u2").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_refresh_ttl_missing_session() {
        let repo = repository().await;
        assert!(matches!(
            repo.refresh_session_ttl("it-u404", "it-dev", 1).await,
            Err(RepositoryError::NotFound)
        ));
    }
}

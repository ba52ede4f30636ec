//! Session 业务逻辑
//!
//! 所有操作返回 `(code, message)` 语义下的业务错误，预期内的情况
//! （会话不存在、重复删除）不会上抛为传输层错误。

use std::sync::Arc;

use kim_im_core::error::{self, Error};
use kim_proto::session::{AuthInfo, LoginReq};
use prost::Message;
use tracing::{debug, info, warn};

use crate::domain::model::{Session, SessionStatus};
use crate::domain::repository::{RepositoryError, SessionRepository};
use crate::infrastructure::auth;

pub struct SessionAppService {
    repo: Arc<dyn SessionRepository>,
    jwt_secret: String,
}

impl SessionAppService {
    pub fn new(repo: Arc<dyn SessionRepository>, jwt_secret: String) -> Self {
        Self { repo, jwt_secret }
    }

    /// 登录建会话
    ///
    /// 同一 (user_id, device_id) 再次登录会整体覆盖旧会话，
    /// 全局最多保留一条。返回的会话回显调用方传入的 conn_id。
    pub async fn login(&self, req: &LoginReq) -> Result<Session, Error> {
        let auth_info = AuthInfo::decode(req.payload.as_slice()).map_err(|err| {
            warn!(error = %err, "unmarshal auth info failed");
            error::invalid_params()
        })?;

        let claims = auth::parse_jwt(&auth_info.token, &self.jwt_secret).map_err(|err| {
            warn!(error = %err, remote_addr = %req.remote_addr, "parse jwt token failed");
            error::unauthorized()
        })?;

        let now = chrono::Utc::now().timestamp();
        if now >= claims.expire_time {
            warn!(
                user_id = %claims.user_id,
                expire_time = claims.expire_time,
                "token is expired"
            );
            return Err(error::unauthorized());
        }

        let session = Session {
            user_id: claims.user_id,
            device_id: auth_info.device_id,
            device_type: auth_info.device_type,
            gateway_id: req.gateway_id.clone(),
            conn_id: req.conn_id,
            remote_addr: req.remote_addr.clone(),
            status: SessionStatus::Online as i32,
            login_at: now,
            last_active_at: now,
            expire_at: claims.expire_time,
            meta: auth_info.meta,
        };

        self.repo.store_session(&session).await.map_err(|err| {
            warn!(
                error = %err,
                user_id = %session.user_id,
                device_id = %session.device_id,
                "store session failed"
            );
            error::internal_server()
        })?;

        info!(
            user_id = %session.user_id,
            device_id = %session.device_id,
            gateway_id = %session.gateway_id,
            conn_id = session.conn_id,
            "session created"
        );
        Ok(session)
    }

    /// 查询会话列表；device_ids 为空时返回用户全部会话
    ///
    /// 用户未知或结果为空都不是错误。
    pub async fn get_sessions(
        &self,
        user_id: &str,
        device_ids: &[String],
    ) -> Result<Vec<Session>, Error> {
        if device_ids.is_empty() {
            return self
                .repo
                .get_sessions_by_user_id(user_id)
                .await
                .map_err(|err| self.storage_error(err, user_id));
        }

        let mut sessions = Vec::with_capacity(device_ids.len());
        for device_id in device_ids {
            match self.repo.get_session(user_id, device_id).await {
                Ok(session) => sessions.push(session),
                Err(RepositoryError::NotFound) => {}
                Err(err) => return Err(self.storage_error(err, user_id)),
            }
        }
        Ok(sessions)
    }

    /// 幂等删除；device_ids 为空时删除用户全部会话
    pub async fn del_session(
        &self,
        user_id: &str,
        device_ids: &[String],
        reason: &str,
    ) -> Result<(), Error> {
        if device_ids.is_empty() {
            let deleted = self
                .repo
                .delete_sessions_by_user_id(user_id)
                .await
                .map_err(|err| self.storage_error(err, user_id))?;
            info!(user_id = %user_id, deleted, reason = %reason, "all sessions deleted");
            return Ok(());
        }

        for device_id in device_ids {
            match self.repo.delete_session(user_id, device_id).await {
                Ok(()) => {
                    info!(user_id = %user_id, device_id = %device_id, reason = %reason, "session deleted");
                }
                // 不存在视为成功（幂等）
                Err(RepositoryError::NotFound) => {
                    debug!(user_id = %user_id, device_id = %device_id, "session already gone");
                }
                Err(err) => return Err(self.storage_error(err, user_id)),
            }
        }
        Ok(())
    }

    /// 踢出会话，契约与 del_session 一致；device_id 为空时踢掉全部设备
    ///
    /// 连接层面的关闭由 Push 服务的 CloseConn 完成。
    pub async fn kick(&self, user_id: &str, device_id: &str, reason: &str) -> Result<(), Error> {
        let device_ids: Vec<String> = if device_id.is_empty() {
            Vec::new()
        } else {
            vec![device_id.to_string()]
        };
        self.del_session(user_id, &device_ids, reason).await?;
        info!(user_id = %user_id, device_id = %device_id, reason = %reason, "session kicked");
        Ok(())
    }

    /// 刷新会话 TTL，并把 last_active_at 改写为调用方提供的值
    pub async fn refresh_session_ttl(
        &self,
        user_id: &str,
        device_id: &str,
        last_active_at: i64,
    ) -> Result<(), Error> {
        match self
            .repo
            .refresh_session_ttl(user_id, device_id, last_active_at)
            .await
        {
            Ok(()) => {
                debug!(
                    user_id = %user_id,
                    device_id = %device_id,
                    last_active_at,
                    "session TTL refreshed"
                );
                Ok(())
            }
            Err(RepositoryError::NotFound) => {
                warn!(user_id = %user_id, device_id = %device_id, "session not found");
                Err(error::session_not_found())
            }
            Err(err) => Err(self.storage_error(err, user_id)),
        }
    }

    fn storage_error(&self, err: RepositoryError, user_id: &str) -> Error {
        warn!(error = %err, user_id = %user_id, "session storage error");
        error::internal_server()
    }
}

//! Session gRPC 接口层
//!
//! 参数校验在此层完成；业务结果一律以 `(code, message)` 信封返回，
//! 预期内的失败（会话不存在、鉴权失败）不会转成 gRPC Status 错误。

use std::sync::Arc;

use kim_im_core::error::{self, Error};
use kim_proto::session::session_service_server::SessionService;
use kim_proto::session::{
    DelSessionReq, DelSessionResp, GetSessionsData, GetSessionsReq, GetSessionsResp, KickReq,
    KickResp, LoginData, LoginReq, LoginResp, RefreshSessionTtlReq, RefreshSessionTtlResp,
};
use tonic::{Request, Response, Status};
use tracing::warn;

use crate::application::SessionAppService;

#[derive(Clone)]
pub struct SessionGrpcHandler {
    service: Arc<SessionAppService>,
}

impl SessionGrpcHandler {
    pub fn new(service: Arc<SessionAppService>) -> Self {
        Self { service }
    }
}

fn ok_envelope() -> (i32, String) {
    let ok = error::ok();
    (ok.code(), ok.message().to_string())
}

fn err_envelope(err: &Error) -> (i32, String) {
    (err.code(), err.message().to_string())
}

#[tonic::async_trait]
impl SessionService for SessionGrpcHandler {
    async fn login(&self, request: Request<LoginReq>) -> Result<Response<LoginResp>, Status> {
        let req = request.into_inner();

        match self.service.login(&req).await {
            Ok(session) => {
                let (code, message) = ok_envelope();
                Ok(Response::new(LoginResp {
                    code,
                    message,
                    data: Some(LoginData {
                        session: Some(session.into()),
                    }),
                }))
            }
            Err(err) => {
                let (code, message) = err_envelope(&err);
                Ok(Response::new(LoginResp {
                    code,
                    message,
                    data: None,
                }))
            }
        }
    }

    async fn get_sessions(
        &self,
        request: Request<GetSessionsReq>,
    ) -> Result<Response<GetSessionsResp>, Status> {
        let req = request.into_inner();
        if req.user_id.is_empty() {
            warn!("user_id is required");
            let (code, message) = err_envelope(&error::invalid_params());
            return Ok(Response::new(GetSessionsResp {
                code,
                message,
                data: None,
            }));
        }

        match self.service.get_sessions(&req.user_id, &req.device_id).await {
            Ok(sessions) => {
                let (code, message) = ok_envelope();
                Ok(Response::new(GetSessionsResp {
                    code,
                    message,
                    data: Some(GetSessionsData {
                        sessions: sessions.into_iter().map(Into::into).collect(),
                    }),
                }))
            }
            Err(err) => {
                let (code, message) = err_envelope(&err);
                Ok(Response::new(GetSessionsResp {
                    code,
                    message,
                    data: None,
                }))
            }
        }
    }

    async fn del_session(
        &self,
        request: Request<DelSessionReq>,
    ) -> Result<Response<DelSessionResp>, Status> {
        let req = request.into_inner();
        if req.user_id.is_empty() {
            warn!("user_id is required");
            let (code, message) = err_envelope(&error::invalid_params());
            return Ok(Response::new(DelSessionResp { code, message }));
        }

        let (code, message) = match self
            .service
            .del_session(&req.user_id, &req.device_id, &req.reason)
            .await
        {
            Ok(()) => ok_envelope(),
            Err(err) => err_envelope(&err),
        };
        Ok(Response::new(DelSessionResp { code, message }))
    }

    async fn kick(&self, request: Request<KickReq>) -> Result<Response<KickResp>, Status> {
        let req = request.into_inner();
        if req.user_id.is_empty() {
            warn!("user_id is required");
            let (code, message) = err_envelope(&error::invalid_params());
            return Ok(Response::new(KickResp { code, message }));
        }

        let (code, message) = match self
            .service
            .kick(&req.user_id, &req.device_id, &req.reason)
            .await
        {
            Ok(()) => ok_envelope(),
            Err(err) => err_envelope(&err),
        };
        Ok(Response::new(KickResp { code, message }))
    }

    async fn refresh_session_ttl(
        &self,
        request: Request<RefreshSessionTtlReq>,
    ) -> Result<Response<RefreshSessionTtlResp>, Status> {
        let req = request.into_inner();
        if req.user_id.is_empty() || req.device_id.is_empty() {
            warn!("user_id and device_id are required");
            let (code, message) = err_envelope(&error::invalid_params());
            return Ok(Response::new(RefreshSessionTtlResp { code, message }));
        }

        let (code, message) = match self
            .service
            .refresh_session_ttl(&req.user_id, &req.device_id, req.last_active_at)
            .await
        {
            Ok(()) => ok_envelope(),
            Err(err) => err_envelope(&err),
        };
        Ok(Response::new(RefreshSessionTtlResp { code, message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Session;
    use crate::domain::repository::{RepositoryError, RepositoryResult, SessionRepository};
    use async_trait::async_trait;

    /// 空仓储：参数校验用例不应触达存储
    struct EmptyRepository;

    #[async_trait]
    impl SessionRepository for EmptyRepository {
        async fn store_session(&self, _session: &Session) -> RepositoryResult<()> {
            Ok(())
        }
        async fn get_session(&self, _u: &str, _d: &str) -> RepositoryResult<Session> {
            Err(RepositoryError::NotFound)
        }
        async fn get_sessions_by_user_id(&self, _u: &str) -> RepositoryResult<Vec<Session>> {
            Ok(Vec::new())
        }
        async fn delete_session(&self, _u: &str, _d: &str) -> RepositoryResult<()> {
            Err(RepositoryError::NotFound)
        }
        async fn delete_sessions_by_user_id(&self, _u: &str) -> RepositoryResult<i64> {
            Ok(0)
        }
        async fn refresh_session_ttl(&self, _u: &str, _d: &str, _t: i64) -> RepositoryResult<()> {
            Err(RepositoryError::NotFound)
        }
    }

    fn handler() -> SessionGrpcHandler {
        SessionGrpcHandler::new(Arc::new(SessionAppService::new(
            Arc::new(EmptyRepository),
            "secret".to_string(),
        )))
    }

    #[tokio::test]
    async fn test_get_sessions_requires_user_id() {
        let resp = handler()
            .get_sessions(Request::new(GetSessionsReq {
                user_id: String::new(),
                device_id: Vec::new(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.code, kim_im_core::error::ERR_INVALID_PARAMS_CODE);
    }

    #[tokio::test]
    async fn test_refresh_requires_device_id() {
        let resp = handler()
            .refresh_session_ttl(Request::new(RefreshSessionTtlReq {
                user_id: "u1".to_string(),
                device_id: String::new(),
                last_active_at: 1,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.code, kim_im_core::error::ERR_INVALID_PARAMS_CODE);
    }

    #[tokio::test]
    async fn test_del_session_missing_is_ok() {
        let resp = handler()
            .del_session(Request::new(DelSessionReq {
                user_id: "u1".to_string(),
                device_id: vec!["dev-x".to_string()],
                reason: "test".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.code, kim_im_core::error::OK_CODE);
    }

    #[tokio::test]
    async fn test_refresh_missing_session_maps_to_session_not_found() {
        let resp = handler()
            .refresh_session_ttl(Request::new(RefreshSessionTtlReq {
                user_id: "u1".to_string(),
                device_id: "dev-a".to_string(),
                last_active_at: 1,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.code, kim_im_core::error::ERR_SESSION_NOT_FOUND_CODE);
    }
}

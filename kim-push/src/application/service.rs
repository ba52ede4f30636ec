//! 推送扇出逻辑
//!
//! 单推：查会话 → 过滤在线 → 逐会话投递到所属节点，至少一个成功即 OK。
//! 批量推：外层恒为成功，逐目标结果单独返回。
//! 关连接：按节点关闭成功的连接，再删除对应会话；删除失败只记日志，
//! 套接字层面的关闭已经生效，不影响整体结果。

use std::collections::HashMap;
use std::sync::Arc;

use kim_im_core::error::{self, Error};
use kim_proto::session::Session;
use tracing::{info, warn};

use crate::domain::{GatewayDispatch, SessionQuery};

pub struct PushAppService {
    session: Arc<dyn SessionQuery>,
    gateway: Arc<dyn GatewayDispatch>,
}

/// 批量推送里单个目标的结果
#[derive(Debug, Clone, PartialEq)]
pub struct TargetResult {
    pub user_id: String,
    pub device_id: String,
    pub code: i32,
    pub message: String,
}

impl PushAppService {
    pub fn new(session: Arc<dyn SessionQuery>, gateway: Arc<dyn GatewayDispatch>) -> Self {
        Self { session, gateway }
    }

    /// 推送消息到用户；device_id 非空时只投递到该设备
    pub async fn push_msg(&self, user_id: &str, device_id: &str, msg: &[u8]) -> Result<(), Error> {
        let device_ids: Vec<String> = if device_id.is_empty() {
            Vec::new()
        } else {
            vec![device_id.to_string()]
        };

        let sessions = self
            .session
            .get_sessions(user_id, &device_ids)
            .await
            .map_err(|err| {
                warn!(error = %err, user_id = %user_id, "get sessions failed");
                error::internal_server().with_message(err.to_string())
            })?;

        if sessions.is_empty() {
            warn!(user_id = %user_id, device_id = %device_id, "no sessions found");
            return Err(error::session_not_found().with_message("no sessions found"));
        }

        let mut success_count = 0usize;
        let mut last_err: Option<anyhow::Error> = None;

        for session in sessions.iter().filter(|s| is_online(s)) {
            match self
                .gateway
                .push_msg(&session.gateway_id, session.conn_id, msg)
                .await
            {
                Ok(()) => success_count += 1,
                Err(err) => {
                    warn!(
                        error = %err,
                        gateway_id = %session.gateway_id,
                        conn_id = session.conn_id,
                        "push message to gateway failed"
                    );
                    last_err = Some(err);
                }
            }
        }

        if success_count == 0 {
            return Err(match last_err {
                Some(err) => error::internal_server().with_message(err.to_string()),
                None => error::session_not_found().with_message("no online sessions found"),
            });
        }
        Ok(())
    }

    /// 批量推送；逐目标执行单推协议并收集结果
    pub async fn batch_push_msg(
        &self,
        targets: &[(String, String)],
        msg: &[u8],
    ) -> Vec<TargetResult> {
        let mut results = Vec::with_capacity(targets.len());

        for (user_id, device_id) in targets {
            let outcome = if user_id.is_empty() {
                Err(error::invalid_params().with_message("user_id is required"))
            } else {
                self.push_msg(user_id, device_id, msg).await
            };

            let (code, message) = match outcome {
                Ok(()) => {
                    let ok = error::ok();
                    (ok.code(), ok.message().to_string())
                }
                Err(err) => (err.code(), err.message().to_string()),
            };
            results.push(TargetResult {
                user_id: user_id.clone(),
                device_id: device_id.clone(),
                code,
                message,
            });
        }

        results
    }

    /// 关闭用户连接并清理会话；device_ids 为空时针对全部设备
    pub async fn close_conn(&self, user_id: &str, device_ids: &[String]) -> Result<(), Error> {
        let sessions = self
            .session
            .get_sessions(user_id, device_ids)
            .await
            .map_err(|err| {
                warn!(error = %err, user_id = %user_id, "get sessions failed");
                error::internal_server().with_message(err.to_string())
            })?;

        if sessions.is_empty() {
            warn!(user_id = %user_id, "no sessions found");
            return Err(error::session_not_found().with_message("no sessions found"));
        }

        // 按 gateway_id 分组，逐节点关闭
        let mut by_gateway: HashMap<String, Vec<&Session>> = HashMap::new();
        for session in sessions.iter().filter(|s| is_online(s)) {
            by_gateway
                .entry(session.gateway_id.clone())
                .or_default()
                .push(session);
        }

        if by_gateway.is_empty() {
            return Err(
                error::session_not_found().with_message("no online sessions found to close")
            );
        }

        let mut closed: Vec<&Session> = Vec::new();
        let mut last_err: Option<anyhow::Error> = None;

        for (gateway_id, sessions) in &by_gateway {
            for &session in sessions {
                match self.gateway.close_conn(gateway_id, session.conn_id).await {
                    Ok(()) => closed.push(session),
                    Err(err) => {
                        warn!(
                            error = %err,
                            gateway_id = %gateway_id,
                            conn_id = session.conn_id,
                            user_id = %session.user_id,
                            device_id = %session.device_id,
                            "close connection failed"
                        );
                        last_err = Some(err);
                    }
                }
            }
        }

        if closed.is_empty() {
            return Err(match last_err {
                Some(err) => error::internal_server().with_message(err.to_string()),
                None => error::session_not_found().with_message("no connections closed"),
            });
        }

        // 删除已成功关闭连接的会话；失败不翻转整体结果
        let device_ids: Vec<String> = closed.iter().map(|s| s.device_id.clone()).collect();
        match self
            .session
            .del_session(user_id, device_ids.clone(), "closed by push service")
            .await
        {
            Ok(()) => {
                info!(user_id = %user_id, device_ids = ?device_ids, "sessions deleted");
            }
            Err(err) => {
                warn!(
                    error = %err,
                    user_id = %user_id,
                    device_ids = ?device_ids,
                    "delete session failed after close"
                );
            }
        }

        Ok(())
    }
}

fn is_online(session: &Session) -> bool {
    session.status == kim_proto::session::SessionStatus::Online as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use kim_proto::session::SessionStatus;
    use std::sync::Mutex;

    fn session(user_id: &str, device_id: &str, gateway_id: &str, conn_id: u64, online: bool) -> Session {
        Session {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            device_type: 1,
            gateway_id: gateway_id.to_string(),
            conn_id,
            remote_addr: "10.0.0.1:1".to_string(),
            status: if online {
                SessionStatus::Online as i32
            } else {
                SessionStatus::Offline as i32
            },
            login_at: 0,
            last_active_at: 0,
            expire_at: i64::MAX,
            meta: Default::default(),
        }
    }

    #[derive(Default)]
    struct StubSessionQuery {
        sessions: Vec<Session>,
        deleted: Mutex<Vec<(String, Vec<String>, String)>>,
        del_fails: bool,
    }

    #[async_trait]
    impl SessionQuery for StubSessionQuery {
        async fn get_sessions(
            &self,
            user_id: &str,
            device_ids: &[String],
        ) -> anyhow::Result<Vec<Session>> {
            Ok(self
                .sessions
                .iter()
                .filter(|s| s.user_id == user_id)
                .filter(|s| device_ids.is_empty() || device_ids.contains(&s.device_id))
                .cloned()
                .collect())
        }

        async fn del_session(
            &self,
            user_id: &str,
            device_ids: Vec<String>,
            reason: &str,
        ) -> anyhow::Result<()> {
            if self.del_fails {
                return Err(anyhow!("session service unavailable"));
            }
            self.deleted.lock().unwrap().push((
                user_id.to_string(),
                device_ids,
                reason.to_string(),
            ));
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubGateway {
        pushed: Mutex<Vec<(String, u64, Vec<u8>)>>,
        closed: Mutex<Vec<(String, u64)>>,
        failing_gateways: Vec<String>,
    }

    #[async_trait]
    impl GatewayDispatch for StubGateway {
        async fn push_msg(&self, gateway_id: &str, conn_id: u64, msg: &[u8]) -> anyhow::Result<()> {
            if self.failing_gateways.iter().any(|g| g == gateway_id) {
                return Err(anyhow!("gateway {} unreachable", gateway_id));
            }
            self.pushed
                .lock()
                .unwrap()
                .push((gateway_id.to_string(), conn_id, msg.to_vec()));
            Ok(())
        }

        async fn close_conn(&self, gateway_id: &str, conn_id: u64) -> anyhow::Result<()> {
            if self.failing_gateways.iter().any(|g| g == gateway_id) {
                return Err(anyhow!("gateway {} unreachable", gateway_id));
            }
            self.closed
                .lock()
                .unwrap()
                .push((gateway_id.to_string(), conn_id));
            Ok(())
        }
    }

    fn service(
        sessions: Vec<Session>,
        failing_gateways: Vec<String>,
    ) -> (PushAppService, Arc<StubSessionQuery>, Arc<StubGateway>) {
        let session_query = Arc::new(StubSessionQuery {
            sessions,
            ..Default::default()
        });
        let gateway = Arc::new(StubGateway {
            failing_gateways,
            ..Default::default()
        });
        (
            PushAppService::new(session_query.clone(), gateway.clone()),
            session_query,
            gateway,
        )
    }

    #[tokio::test]
    async fn test_push_skips_offline_sessions() {
        let (svc, _, gateway) = service(
            vec![
                session("u1", "dev-a", "gw-1", 1, true),
                session("u1", "dev-b", "gw-2", 2, false),
            ],
            Vec::new(),
        );

        svc.push_msg("u1", "", b"hello").await.unwrap();

        let pushed = gateway.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0], ("gw-1".to_string(), 1, b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_push_no_sessions() {
        let (svc, _, _) = service(Vec::new(), Vec::new());
        let err = svc.push_msg("ghost", "", b"x").await.unwrap_err();
        assert_eq!(err.code(), kim_im_core::error::ERR_SESSION_NOT_FOUND_CODE);
    }

    #[tokio::test]
    async fn test_push_ok_when_at_least_one_succeeds() {
        let (svc, _, gateway) = service(
            vec![
                session("u1", "dev-a", "gw-bad", 1, true),
                session("u1", "dev-b", "gw-2", 2, true),
            ],
            vec!["gw-bad".to_string()],
        );

        svc.push_msg("u1", "", b"hello").await.unwrap();
        assert_eq!(gateway.pushed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_push_all_gateways_fail() {
        let (svc, _, _) = service(
            vec![session("u1", "dev-a", "gw-bad", 1, true)],
            vec!["gw-bad".to_string()],
        );

        let err = svc.push_msg("u1", "", b"hello").await.unwrap_err();
        assert_eq!(err.code(), kim_im_core::error::ERR_INTERNAL_SERVER_CODE);
    }

    #[tokio::test]
    async fn test_push_with_device_filter() {
        let (svc, _, gateway) = service(
            vec![
                session("u1", "dev-a", "gw-1", 1, true),
                session("u1", "dev-b", "gw-1", 2, true),
            ],
            Vec::new(),
        );

        svc.push_msg("u1", "dev-b", b"direct").await.unwrap();

        let pushed = gateway.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].1, 2);
    }

    #[tokio::test]
    async fn test_batch_push_outer_always_ok() {
        let (svc, _, _) = service(
            vec![session("u1", "dev-a", "gw-1", 1, true)],
            Vec::new(),
        );

        let results = svc
            .batch_push_msg(
                &[
                    ("u1".to_string(), String::new()),
                    (String::new(), String::new()),
                    ("ghost".to_string(), String::new()),
                ],
                b"hello",
            )
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].code, kim_im_core::error::OK_CODE);
        assert_eq!(results[1].code, kim_im_core::error::ERR_INVALID_PARAMS_CODE);
        assert_eq!(
            results[2].code,
            kim_im_core::error::ERR_SESSION_NOT_FOUND_CODE
        );
    }

    #[tokio::test]
    async fn test_close_conn_closes_then_deletes_sessions() {
        let (svc, session_query, gateway) = service(
            vec![
                session("u1", "dev-a", "gw-1", 1, true),
                session("u1", "dev-b", "gw-2", 2, true),
            ],
            Vec::new(),
        );

        svc.close_conn("u1", &[]).await.unwrap();

        let mut closed = gateway.closed.lock().unwrap().clone();
        closed.sort();
        assert_eq!(closed, vec![("gw-1".to_string(), 1), ("gw-2".to_string(), 2)]);

        let deleted = session_query.deleted.lock().unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].0, "u1");
        let mut devices = deleted[0].1.clone();
        devices.sort();
        assert_eq!(devices, vec!["dev-a".to_string(), "dev-b".to_string()]);
        assert_eq!(deleted[0].2, "closed by push service");
    }

    #[tokio::test]
    async fn test_close_conn_deletes_only_closed_devices() {
        let (svc, session_query, _) = service(
            vec![
                session("u1", "dev-a", "gw-1", 1, true),
                session("u1", "dev-b", "gw-bad", 2, true),
            ],
            vec!["gw-bad".to_string()],
        );

        svc.close_conn("u1", &[]).await.unwrap();

        let deleted = session_query.deleted.lock().unwrap();
        assert_eq!(deleted[0].1, vec!["dev-a".to_string()]);
    }

    #[tokio::test]
    async fn test_close_conn_del_session_failure_does_not_flip_result() {
        let session_query = Arc::new(StubSessionQuery {
            sessions: vec![session("u1", "dev-a", "gw-1", 1, true)],
            del_fails: true,
            ..Default::default()
        });
        let gateway = Arc::new(StubGateway::default());
        let svc = PushAppService::new(session_query, gateway.clone());

        // 套接字已关闭，删除会话失败也返回成功
        svc.close_conn("u1", &[]).await.unwrap();
        assert_eq!(gateway.closed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_close_conn_only_offline_sessions() {
        let (svc, _, _) = service(
            vec![session("u1", "dev-a", "gw-1", 1, false)],
            Vec::new(),
        );

        let err = svc.close_conn("u1", &[]).await.unwrap_err();
        assert_eq!(err.code(), kim_im_core::error::ERR_SESSION_NOT_FOUND_CODE);
    }
}

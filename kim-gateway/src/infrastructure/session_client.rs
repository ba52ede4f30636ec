//! Session 服务客户端
//!
//! 传输层与事件处理只依赖 [`SessionApi`] 这个接口，
//! 便于在测试里用桩实现替换真实 RPC。

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use kim_im_core::discovery::ServiceClient;
use kim_im_core::error::OK_CODE;
use kim_proto::session::session_service_client::SessionServiceClient;
use kim_proto::session::{DelSessionReq, LoginReq, RefreshSessionTtlReq, Session};
use std::sync::Arc;
use tracing::warn;

/// Gateway 侧消费的 Session 服务能力
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// 登录建会话；payload 为客户端登录帧的 Body，原样透传
    async fn login(
        &self,
        payload: Vec<u8>,
        conn_id: u64,
        remote_addr: String,
        gateway_id: String,
    ) -> Result<Session>;

    /// 连接断开后删除会话
    async fn del_session(&self, user_id: &str, device_ids: Vec<String>, reason: &str)
        -> Result<()>;

    /// 刷新会话 TTL
    async fn refresh_session_ttl(
        &self,
        user_id: &str,
        device_id: &str,
        last_active_at: i64,
    ) -> Result<()>;
}

pub struct GrpcSessionClient {
    client: Arc<ServiceClient>,
}

impl GrpcSessionClient {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }

    async fn grpc_client(
        &self,
    ) -> Result<SessionServiceClient<tonic::transport::Channel>> {
        let channel = self.client.get_channel().await?;
        Ok(SessionServiceClient::new(channel))
    }
}

#[async_trait]
impl SessionApi for GrpcSessionClient {
    async fn login(
        &self,
        payload: Vec<u8>,
        conn_id: u64,
        remote_addr: String,
        gateway_id: String,
    ) -> Result<Session> {
        let mut client = self.grpc_client().await?;
        let resp = client
            .login(LoginReq {
                payload,
                conn_id,
                remote_addr,
                gateway_id,
            })
            .await
            .map_err(|status| {
                warn!(error = %status, "call session login failed");
                anyhow!("call session login failed: {}", status)
            })?
            .into_inner();

        if resp.code != OK_CODE {
            bail!("session login failed: code={} message={}", resp.code, resp.message);
        }

        resp.data
            .and_then(|data| data.session)
            .ok_or_else(|| anyhow!("session data is nil in login response"))
    }

    async fn del_session(
        &self,
        user_id: &str,
        device_ids: Vec<String>,
        reason: &str,
    ) -> Result<()> {
        let mut client = self.grpc_client().await?;
        let resp = client
            .del_session(DelSessionReq {
                user_id: user_id.to_string(),
                device_id: device_ids,
                reason: reason.to_string(),
            })
            .await?
            .into_inner();

        if resp.code != OK_CODE {
            bail!("session DelSession failed: code={} message={}", resp.code, resp.message);
        }
        Ok(())
    }

    async fn refresh_session_ttl(
        &self,
        user_id: &str,
        device_id: &str,
        last_active_at: i64,
    ) -> Result<()> {
        let mut client = self.grpc_client().await?;
        let resp = client
            .refresh_session_ttl(RefreshSessionTtlReq {
                user_id: user_id.to_string(),
                device_id: device_id.to_string(),
                last_active_at,
            })
            .await?
            .into_inner();

        if resp.code != OK_CODE {
            bail!(
                "session RefreshSessionTTL failed: code={} message={}",
                resp.code,
                resp.message
            );
        }
        Ok(())
    }
}

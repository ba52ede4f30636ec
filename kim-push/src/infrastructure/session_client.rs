//! Session 服务客户端

use anyhow::{Result, bail};
use async_trait::async_trait;
use kim_im_core::discovery::ServiceClient;
use kim_im_core::error::OK_CODE;
use kim_proto::session::session_service_client::SessionServiceClient;
use kim_proto::session::{DelSessionReq, GetSessionsReq, Session};
use std::sync::Arc;

use crate::domain::SessionQuery;

pub struct GrpcSessionQuery {
    client: Arc<ServiceClient>,
}

impl GrpcSessionQuery {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }

    async fn grpc_client(&self) -> Result<SessionServiceClient<tonic::transport::Channel>> {
        let channel = self.client.get_channel().await?;
        Ok(SessionServiceClient::new(channel))
    }
}

#[async_trait]
impl SessionQuery for GrpcSessionQuery {
    async fn get_sessions(&self, user_id: &str, device_ids: &[String]) -> Result<Vec<Session>> {
        let mut client = self.grpc_client().await?;
        let resp = client
            .get_sessions(GetSessionsReq {
                user_id: user_id.to_string(),
                device_id: device_ids.to_vec(),
            })
            .await?
            .into_inner();

        if resp.code != OK_CODE {
            bail!(
                "session GetSessions failed: code={} message={}",
                resp.code,
                resp.message
            );
        }
        Ok(resp.data.map(|data| data.sessions).unwrap_or_default())
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
            bail!(
                "session DelSession failed: code={} message={}",
                resp.code,
                resp.message
            );
        }
        Ok(())
    }
}

//! Gateway 分发实现
//!
//! 基于公共库的 GatewayRouter（gateway_id -> 客户端缓存）完成
//! 按节点的推送与关连接调用，并解包响应信封。

use anyhow::{Result, bail};
use async_trait::async_trait;
use kim_im_core::GatewayRouter;
use kim_im_core::error::{ERR_NOT_FOUND_CODE, OK_CODE};
use kim_proto::gateway::{CloseConnReq, PushReq};
use std::sync::Arc;

use crate::domain::GatewayDispatch;

pub struct GrpcGatewayDispatch {
    router: Arc<GatewayRouter>,
}

impl GrpcGatewayDispatch {
    pub fn new(router: Arc<GatewayRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl GatewayDispatch for GrpcGatewayDispatch {
    async fn push_msg(&self, gateway_id: &str, conn_id: u64, msg: &[u8]) -> Result<()> {
        let mut client = self.router.client(gateway_id).await.inspect_err(|_| {
            // 建连失败的节点摘除缓存，下次重新解析
            self.router.evict(gateway_id);
        })?;

        let resp = client
            .push_msg(PushReq {
                conn_id,
                msg: msg.to_vec(),
            })
            .await?
            .into_inner();

        if resp.code != OK_CODE {
            bail!(
                "gateway PushMsg failed: code={} message={}",
                resp.code,
                resp.message
            );
        }
        Ok(())
    }

    async fn close_conn(&self, gateway_id: &str, conn_id: u64) -> Result<()> {
        let mut client = self.router.client(gateway_id).await.inspect_err(|_| {
            self.router.evict(gateway_id);
        })?;

        let resp = client.close_conn(CloseConnReq { conn_id }).await?.into_inner();

        // 连接已不在目标节点上也视为关闭完成
        if resp.code != OK_CODE && resp.code != ERR_NOT_FOUND_CODE {
            bail!(
                "gateway CloseConn failed: code={} message={}",
                resp.code,
                resp.message
            );
        }
        Ok(())
    }
}

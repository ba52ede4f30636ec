//! Gateway gRPC 接口层
//!
//! 供 Push 等后端服务按 conn_id 推送/关闭本节点连接。
//! 业务结果以 `(code, message)` 信封返回，连接不存在不是传输层错误。

use std::sync::Arc;

use kim_im_core::error::{self, Error};
use kim_proto::gateway::gateway_service_server::GatewayService;
use kim_proto::gateway::{
    BatchPushReq, BatchPushResp, CloseConnReq, CloseConnResp, PushReq, PushResp,
};
use tonic::{Request, Response, Status};
use tracing::warn;

use crate::transport::{TcpTransport, TransportError};

#[derive(Clone)]
pub struct GatewayGrpcHandler {
    transport: Arc<TcpTransport>,
}

impl GatewayGrpcHandler {
    pub fn new(transport: Arc<TcpTransport>) -> Self {
        Self { transport }
    }
}

fn envelope(err: &Error) -> (i32, String) {
    (err.code(), err.message().to_string())
}

fn transport_error_envelope(err: &TransportError) -> (i32, String) {
    match err {
        TransportError::NotFound => envelope(&error::not_found()),
        other => envelope(&error::internal_server().with_message(other.to_string())),
    }
}

#[tonic::async_trait]
impl GatewayService for GatewayGrpcHandler {
    async fn push_msg(&self, request: Request<PushReq>) -> Result<Response<PushResp>, Status> {
        let req = request.into_inner();

        let (code, message) = match self.transport.send(req.conn_id, &req.msg).await {
            Ok(()) => envelope(&error::ok()),
            Err(err) => {
                warn!(error = %err, conn_id = req.conn_id, "push to connection failed");
                transport_error_envelope(&err)
            }
        };
        Ok(Response::new(PushResp { code, message }))
    }

    async fn batch_push_msg(
        &self,
        request: Request<BatchPushReq>,
    ) -> Result<Response<BatchPushResp>, Status> {
        let req = request.into_inner();

        match self.transport.batch_send(&req.conn_id, &req.msg).await {
            Ok(failed) => {
                // 部分失败不影响整体结果，失败列表随响应返回
                let (code, message) = envelope(&error::ok());
                Ok(Response::new(BatchPushResp {
                    code,
                    message,
                    failed_conn_id: failed,
                }))
            }
            Err(err) => {
                warn!(error = %err, "batch push failed");
                let (code, message) = transport_error_envelope(&err);
                Ok(Response::new(BatchPushResp {
                    code,
                    message,
                    failed_conn_id: req.conn_id,
                }))
            }
        }
    }

    async fn close_conn(
        &self,
        request: Request<CloseConnReq>,
    ) -> Result<Response<CloseConnResp>, Status> {
        let req = request.into_inner();

        let (code, message) = match self.transport.close_conn(req.conn_id).await {
            Ok(()) => envelope(&error::ok()),
            Err(err) => transport_error_envelope(&err),
        };
        Ok(Response::new(CloseConnResp { code, message }))
    }
}

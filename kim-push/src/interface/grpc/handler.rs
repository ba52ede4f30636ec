//! Push gRPC 接口层

use std::sync::Arc;

use kim_im_core::error::{self, Error};
use kim_proto::push::push_service_server::PushService;
use kim_proto::push::{
    BatchPushReq, BatchPushResp, CloseConnReq, CloseConnResp, PushReq, PushResp, PushResult,
};
use tonic::{Request, Response, Status};
use tracing::warn;

use crate::application::PushAppService;

#[derive(Clone)]
pub struct PushGrpcHandler {
    service: Arc<PushAppService>,
}

impl PushGrpcHandler {
    pub fn new(service: Arc<PushAppService>) -> Self {
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
impl PushService for PushGrpcHandler {
    async fn push_msg(&self, request: Request<PushReq>) -> Result<Response<PushResp>, Status> {
        let req = request.into_inner();
        if req.user_id.is_empty() {
            warn!("user_id is required");
            let (code, message) = err_envelope(&error::invalid_params());
            return Ok(Response::new(PushResp { code, message }));
        }

        let (code, message) = match self
            .service
            .push_msg(&req.user_id, &req.device_id, req.msg.as_bytes())
            .await
        {
            Ok(()) => ok_envelope(),
            Err(err) => err_envelope(&err),
        };
        Ok(Response::new(PushResp { code, message }))
    }

    async fn batch_push_msg(
        &self,
        request: Request<BatchPushReq>,
    ) -> Result<Response<BatchPushResp>, Status> {
        let req = request.into_inner();
        if req.targets.is_empty() {
            warn!("targets is required");
            let (code, message) = err_envelope(&error::invalid_params());
            return Ok(Response::new(BatchPushResp {
                code,
                message,
                results: Vec::new(),
            }));
        }

        let targets: Vec<(String, String)> = req
            .targets
            .into_iter()
            .map(|t| (t.user_id, t.device_id))
            .collect();

        let results = self
            .service
            .batch_push_msg(&targets, req.msg.as_bytes())
            .await;

        // 外层恒为成功，逐目标结果在 results 中
        let (code, message) = ok_envelope();
        Ok(Response::new(BatchPushResp {
            code,
            message,
            results: results
                .into_iter()
                .map(|r| PushResult {
                    user_id: r.user_id,
                    device_id: r.device_id,
                    code: r.code,
                    message: r.message,
                })
                .collect(),
        }))
    }

    async fn close_conn(
        &self,
        request: Request<CloseConnReq>,
    ) -> Result<Response<CloseConnResp>, Status> {
        let req = request.into_inner();
        if req.user_id.is_empty() {
            warn!("user_id is required");
            let (code, message) = err_envelope(&error::invalid_params());
            return Ok(Response::new(CloseConnResp { code, message }));
        }

        let (code, message) = match self.service.close_conn(&req.user_id, &req.device_id).await {
            Ok(()) => ok_envelope(),
            Err(err) => err_envelope(&err),
        };
        Ok(Response::new(CloseConnResp { code, message }))
    }
}

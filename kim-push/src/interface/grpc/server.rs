use std::net::SocketAddr;

use anyhow::Result;
use kim_proto::push::push_service_server::PushServiceServer;
use tonic::transport::Server;

use crate::interface::grpc::handler::PushGrpcHandler;

pub struct GrpcServer {
    handler: PushGrpcHandler,
    address: SocketAddr,
}

impl GrpcServer {
    pub fn new(handler: PushGrpcHandler, address: SocketAddr) -> Self {
        Self { handler, address }
    }

    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
        Server::builder()
            .add_service(PushServiceServer::new(self.handler.clone()))
            .serve_with_shutdown(self.address, shutdown)
            .await?;
        Ok(())
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

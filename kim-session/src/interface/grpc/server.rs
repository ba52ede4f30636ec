use std::net::SocketAddr;

use anyhow::Result;
use kim_proto::session::session_service_server::SessionServiceServer;
use tonic::transport::Server;

use crate::interface::grpc::handler::SessionGrpcHandler;

pub struct GrpcServer {
    handler: SessionGrpcHandler,
    address: SocketAddr,
}

impl GrpcServer {
    pub fn new(handler: SessionGrpcHandler, address: SocketAddr) -> Self {
        Self { handler, address }
    }

    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
        Server::builder()
            .add_service(SessionServiceServer::new(self.handler.clone()))
            .serve_with_shutdown(self.address, shutdown)
            .await?;
        Ok(())
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

use std::net::SocketAddr;

use anyhow::Result;
use kim_proto::gateway::gateway_service_server::GatewayServiceServer;
use tonic::transport::Server;

use crate::interface::grpc::handler::GatewayGrpcHandler;

pub struct GrpcServer {
    handler: GatewayGrpcHandler,
    address: SocketAddr,
}

impl GrpcServer {
    pub fn new(handler: GatewayGrpcHandler, address: SocketAddr) -> Self {
        Self { handler, address }
    }

    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
        Server::builder()
            .add_service(GatewayServiceServer::new(self.handler.clone()))
            .serve_with_shutdown(self.address, shutdown)
            .await?;
        Ok(())
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

pub mod handler;
pub mod server;

pub use handler::GatewayGrpcHandler;
pub use server::GrpcServer;

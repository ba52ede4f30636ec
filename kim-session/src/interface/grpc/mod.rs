pub mod handler;
pub mod server;

pub use handler::SessionGrpcHandler;
pub use server::GrpcServer;

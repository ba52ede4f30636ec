pub mod handler;
pub mod server;

pub use handler::PushGrpcHandler;
pub use server::GrpcServer;

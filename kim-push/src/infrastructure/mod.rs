pub mod gateway_dispatch;
pub mod session_client;

pub use gateway_dispatch::GrpcGatewayDispatch;
pub use session_client::GrpcSessionQuery;

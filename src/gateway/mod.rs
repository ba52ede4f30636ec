//! Gateway 路由组件

mod router;

pub use router::{GatewayRouter, GatewayRouterConfig};

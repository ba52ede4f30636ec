//! Wire 风格的依赖注入模块

use std::sync::Arc;

use anyhow::Result;
use kim_im_core::config::AppConfig;
use kim_im_core::discovery::{EtcdDiscover, EtcdRegistry, ServiceClient, ServiceDiscover};
use kim_im_core::gateway::{GatewayRouter, GatewayRouterConfig};
use kim_im_core::service_names;
use tracing::warn;

use crate::application::PushAppService;
use crate::config::PushServiceConfig;
use crate::domain::{GatewayDispatch, SessionQuery};
use crate::infrastructure::{GrpcGatewayDispatch, GrpcSessionQuery};
use crate::interface::grpc::PushGrpcHandler;

/// 应用上下文：包含所有已初始化的组件
pub struct ApplicationContext {
    pub config: PushServiceConfig,
    pub handler: PushGrpcHandler,
    pub registry: Option<Arc<EtcdRegistry>>,
}

/// 构建应用上下文
pub async fn initialize(app_config: &AppConfig) -> Result<ApplicationContext> {
    // 1. 裁剪服务配置
    let config = PushServiceConfig::from_app_config(app_config);

    // 2. 注册中心；不可用时退化为环境变量直连
    let registry = match EtcdRegistry::connect(
        &app_config.registry.endpoints,
        &app_config.registry.namespace,
        app_config.registry.lease_ttl,
    )
    .await
    {
        Ok(registry) => Some(Arc::new(registry)),
        Err(err) => {
            warn!(error = %err, "registry unavailable, running without registration");
            None
        }
    };

    // 3. Session 客户端
    let session_discover: Option<Arc<dyn ServiceDiscover>> = match registry.as_ref() {
        Some(registry) => Some(Arc::new(
            EtcdDiscover::new(
                registry.client(),
                &app_config.registry.namespace,
                &service_names::get_service_name(service_names::SESSION),
            )
            .await?,
        )),
        None => None,
    };
    let session: Arc<dyn SessionQuery> = Arc::new(GrpcSessionQuery::new(Arc::new(
        ServiceClient::new(
            service_names::get_service_name(service_names::SESSION),
            session_discover,
        ),
    )));

    // 4. Gateway 路由（gateway_id -> 节点客户端缓存）
    let gateway_discover: Option<Arc<dyn ServiceDiscover>> = match registry.as_ref() {
        Some(registry) => Some(Arc::new(
            EtcdDiscover::new(
                registry.client(),
                &app_config.registry.namespace,
                &service_names::get_service_name(service_names::GATEWAY),
            )
            .await?,
        )),
        None => None,
    };
    let router = Arc::new(GatewayRouter::new(
        GatewayRouterConfig::default(),
        gateway_discover,
    ));
    let gateway: Arc<dyn GatewayDispatch> = Arc::new(GrpcGatewayDispatch::new(router));

    // 5. 业务服务与 gRPC 处理器
    let service = Arc::new(PushAppService::new(session, gateway));
    let handler = PushGrpcHandler::new(service);

    Ok(ApplicationContext {
        config,
        handler,
        registry,
    })
}

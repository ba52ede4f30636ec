//! 服务装配与启动
//!
//! 装配顺序：配置 → 注册中心 → Session 客户端 → TCP 传输层 →
//! 事件回调 → gRPC 服务。优雅退出时先从注册中心摘除本节点，
//! 留出至少 1 秒让对端看到节点下线，再关闭存量连接。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kim_im_core::config::AppConfig;
use kim_im_core::discovery::{
    EtcdDiscover, EtcdRegistry, ServiceClient, ServiceDiscover, ServiceInstance, ServiceRegistry,
};
use kim_im_core::service_names;
use tracing::{info, warn};

use crate::config::GatewayServiceConfig;
use crate::event::GatewayEvent;
use crate::infrastructure::{GrpcSessionClient, SessionApi};
use crate::interface::grpc::{GatewayGrpcHandler, GrpcServer};
use crate::transport::{TcpTransport, TransportConfig};

pub struct GatewayApp {
    config: GatewayServiceConfig,
    transport: Arc<TcpTransport>,
    server: GrpcServer,
    registry: Option<Arc<EtcdRegistry>>,
}

impl GatewayApp {
    pub async fn new(app_config: &AppConfig) -> Result<Self> {
        let config = GatewayServiceConfig::from_app_config(app_config);

        // 注册中心；不可用时退化为环境变量直连模式
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

        // Session 服务客户端
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
        let session_client: Arc<dyn SessionApi> = Arc::new(GrpcSessionClient::new(Arc::new(
            ServiceClient::new(
                service_names::get_service_name(service_names::SESSION),
                session_discover,
            ),
        )));

        // TCP 传输层与事件回调
        let transport = TcpTransport::new(
            TransportConfig {
                tcp_port: config.tcp_port,
                gateway_id: config.gateway_id.clone(),
                heartbeat_timeout: config.heartbeat_timeout,
                refresh_ttl_interval: config.refresh_ttl_interval,
                num_workers: config.num_workers,
            },
            session_client.clone(),
        );
        transport.set_handler(Arc::new(GatewayEvent::new(session_client)));

        let address: SocketAddr = format!("0.0.0.0:{}", config.port)
            .parse()
            .context("invalid gateway listen address")?;
        let server = GrpcServer::new(GatewayGrpcHandler::new(transport.clone()), address);

        Ok(Self {
            config,
            transport,
            server,
            registry,
        })
    }

    pub async fn run(&self) -> Result<()> {
        self.transport.start().await?;

        if let Some(registry) = self.registry.as_ref() {
            // 实例 ID 即 gateway_id，推送按此路由到本节点
            let instance = ServiceInstance::new(
                self.config.gateway_id.clone(),
                advertised_address(self.server.address()),
            );
            if let Err(err) = registry
                .register(&service_names::get_service_name(service_names::GATEWAY), instance)
                .await
            {
                warn!(error = %err, "service registration failed, continuing without registry");
            }
        }

        info!(
            service_name = %self.config.service_name,
            grpc_port = self.config.port,
            tcp_port = self.config.tcp_port,
            gateway_id = %self.config.gateway_id,
            "gateway server starting"
        );

        self.server
            .run(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received");
            })
            .await?;

        // 先摘除注册，对端至少提前 1 秒看到节点下线，再关存量连接
        if let Some(registry) = self.registry.as_ref() {
            registry.deregister().await.ok();
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        self.transport.stop().await;
        Ok(())
    }
}

/// 对外通告地址：绑定通配地址时替换为本机可达 IP
fn advertised_address(listen: SocketAddr) -> String {
    let host = match std::env::var("POD_IP") {
        Ok(ip) if !ip.is_empty() => ip,
        _ => "127.0.0.1".to_string(),
    };
    format!("{}:{}", host, listen.port())
}

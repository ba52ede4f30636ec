//! 服务装配与启动

pub mod wire;

use anyhow::{Context, Result};
use kim_im_core::config::AppConfig;
use kim_im_core::discovery::{EtcdRegistry, ServiceInstance, ServiceRegistry};
use kim_im_core::service_names;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::interface::grpc::GrpcServer;

pub struct SessionServiceApp {
    server: GrpcServer,
    registry: Option<Arc<EtcdRegistry>>,
    service_name: String,
}

impl SessionServiceApp {
    pub async fn new(app_config: &AppConfig) -> Result<Self> {
        let context = wire::initialize(app_config).await?;
        let address: SocketAddr = format!("0.0.0.0:{}", context.config.port)
            .parse()
            .context("invalid session listen address")?;

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

        Ok(Self {
            server: GrpcServer::new(context.handler, address),
            registry,
            service_name: context.config.service_name.clone(),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.server.address()
    }

    pub async fn run(&self) -> Result<()> {
        if let Some(registry) = self.registry.as_ref() {
            let instance = ServiceInstance::new(
                format!("{}-{}", self.service_name, self.server.address().port()),
                advertised_address(self.server.address()),
            );
            if let Err(err) = registry
                .register(&service_names::get_service_name(service_names::SESSION), instance)
                .await
            {
                warn!(error = %err, "service registration failed, continuing without registry");
            }
        }

        info!(address = %self.server.address(), "session service started");
        self.server
            .run(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received");
            })
            .await?;

        if let Some(registry) = self.registry.as_ref() {
            registry.deregister().await.ok();
        }
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

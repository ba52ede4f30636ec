//! Gateway 服务配置视图

use std::time::Duration;

use kim_im_core::config::AppConfig;

/// 从应用配置裁剪出的 Gateway 服务配置
#[derive(Debug, Clone)]
pub struct GatewayServiceConfig {
    pub service_name: String,
    pub port: u16,
    pub tcp_port: u16,
    pub gateway_id: String,
    pub heartbeat_timeout: Duration,
    pub refresh_ttl_interval: Duration,
    pub num_workers: usize,
}

impl GatewayServiceConfig {
    pub fn from_app_config(app_config: &AppConfig) -> Self {
        let gateway = &app_config.gateway;
        Self {
            service_name: gateway.service_name.clone(),
            port: gateway.port,
            tcp_port: gateway.tcp_port,
            gateway_id: gateway.gateway_id.clone(),
            heartbeat_timeout: Duration::from_secs(gateway.heartbeat_timeout),
            refresh_ttl_interval: Duration::from_secs(gateway.refresh_ttl_interval),
            num_workers: gateway.num_workers,
        }
    }
}

//! Session 服务配置视图

use anyhow::{Result, ensure};
use kim_im_core::config::AppConfig;

/// 从应用配置裁剪出的 Session 服务配置
#[derive(Debug, Clone)]
pub struct SessionServiceConfig {
    pub service_name: String,
    pub port: u16,
    pub redis_endpoint: String,
    pub redis_pool_size: u32,
    pub redis_min_idle_conns: u32,
    pub jwt_secret: String,
}

impl SessionServiceConfig {
    pub fn from_app_config(app_config: &AppConfig) -> Result<Self> {
        let session = &app_config.session;
        ensure!(
            !session.redis.endpoint.is_empty(),
            "session.redis.endpoint is required"
        );
        ensure!(!session.jwt.secret.is_empty(), "session.jwt.secret is required");

        Ok(Self {
            service_name: session.service_name.clone(),
            port: session.port,
            redis_endpoint: session.redis.endpoint.clone(),
            redis_pool_size: session.redis.pool_size,
            redis_min_idle_conns: session.redis.min_idle_conns,
            jwt_secret: session.jwt.secret.clone(),
        })
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}", self.redis_endpoint)
    }
}

//! Push 服务配置视图

use kim_im_core::config::AppConfig;

#[derive(Debug, Clone)]
pub struct PushServiceConfig {
    pub service_name: String,
    pub port: u16,
}

impl PushServiceConfig {
    pub fn from_app_config(app_config: &AppConfig) -> Self {
        Self {
            service_name: app_config.push.service_name.clone(),
            port: app_config.push.port,
        }
    }
}

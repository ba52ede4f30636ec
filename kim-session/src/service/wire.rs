//! Wire 风格的依赖注入模块
//!
//! 按依赖顺序构建所有组件，类似 Go 的 Wire

use std::sync::Arc;

use anyhow::{Context, Result};
use kim_im_core::config::AppConfig;

use crate::application::SessionAppService;
use crate::config::SessionServiceConfig;
use crate::infrastructure::persistence::RedisSessionRepository;
use crate::interface::grpc::SessionGrpcHandler;

/// 应用上下文：包含所有已初始化的组件
pub struct ApplicationContext {
    pub config: SessionServiceConfig,
    pub handler: SessionGrpcHandler,
}

/// 构建应用上下文
pub async fn initialize(app_config: &AppConfig) -> Result<ApplicationContext> {
    // 1. 裁剪服务配置
    let config = SessionServiceConfig::from_app_config(app_config)
        .context("load session service configuration failed")?;

    // 2. 连接 Redis 仓储
    let repo = Arc::new(
        RedisSessionRepository::connect(&config.redis_url())
            .await
            .context("connect session redis failed")?,
    );

    // 3. 业务服务
    let service = Arc::new(SessionAppService::new(repo, config.jwt_secret.clone()));

    // 4. gRPC 处理器
    let handler = SessionGrpcHandler::new(service);

    Ok(ApplicationContext { config, handler })
}

//! 配置模块
//!
//! 每个服务通过 `--config/-c` 指定一个 YAML 配置文件，按服务划分配置段
//! （`gateway:` / `session:` / `push:`），外加共享的 `registry:` 与 `log:`。
//! 所有字段都有与线上默认值一致的缺省值，缺失的段按默认构造。

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// 应用配置主结构体
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// Gateway 服务配置
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Session 服务配置
    #[serde(default)]
    pub session: SessionConfig,
    /// Push 服务配置
    #[serde(default)]
    pub push: PushConfig,
    /// 注册中心配置
    #[serde(default)]
    pub registry: RegistryConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// Gateway 服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// 服务名（注册与发现使用）
    #[serde(default = "default_gateway_service_name")]
    pub service_name: String,
    /// gRPC 端口
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// 客户端 TCP 长连接端口
    #[serde(default = "default_gateway_tcp_port")]
    pub tcp_port: u16,
    /// Gateway 节点 ID，推送按此路由，集群内必须唯一
    #[serde(default = "default_gateway_id")]
    pub gateway_id: String,
    /// 心跳超时时间（秒）
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout: u64,
    /// Session TTL 刷新间隔（秒）
    #[serde(default = "default_refresh_ttl_interval")]
    pub refresh_ttl_interval: u64,
    /// 事件分发并发度，0 表示 2 * CPU 核心数
    #[serde(default)]
    pub num_workers: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_name: default_gateway_service_name(),
            port: default_gateway_port(),
            tcp_port: default_gateway_tcp_port(),
            gateway_id: default_gateway_id(),
            heartbeat_timeout: default_heartbeat_timeout(),
            refresh_ttl_interval: default_refresh_ttl_interval(),
            num_workers: 0,
        }
    }
}

/// Session 服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_service_name")]
    pub service_name: String,
    #[serde(default = "default_session_port")]
    pub port: u16,
    /// Redis 配置
    #[serde(default)]
    pub redis: RedisConfig,
    /// JWT 配置
    #[serde(default)]
    pub jwt: JwtConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_name: default_session_service_name(),
            port: default_session_port(),
            redis: RedisConfig::default(),
            jwt: JwtConfig::default(),
        }
    }
}

/// Push 服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_service_name")]
    pub service_name: String,
    #[serde(default = "default_push_port")]
    pub port: u16,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            service_name: default_push_service_name(),
            port: default_push_port(),
        }
    }
}

/// Redis 连接配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis 服务器地址，如 `127.0.0.1:6379`
    #[serde(default = "default_redis_endpoint")]
    pub endpoint: String,
    /// 连接池大小
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: u32,
    /// 最小空闲连接数
    #[serde(default = "default_redis_min_idle_conns")]
    pub min_idle_conns: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            endpoint: default_redis_endpoint(),
            pool_size: default_redis_pool_size(),
            min_idle_conns: default_redis_min_idle_conns(),
        }
    }
}

/// JWT 配置
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// HS256 共享密钥
    #[serde(default = "default_jwt_secret")]
    pub secret: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: default_jwt_secret(),
        }
    }
}

/// 注册中心配置
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// etcd 端点列表
    #[serde(default = "default_registry_endpoints")]
    pub endpoints: Vec<String>,
    /// 注册命名空间前缀
    #[serde(default = "default_registry_namespace")]
    pub namespace: String,
    /// 注册租约 TTL（秒）
    #[serde(default = "default_registry_lease_ttl")]
    pub lease_ttl: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoints: default_registry_endpoints(),
            namespace: default_registry_namespace(),
            lease_ttl: default_registry_lease_ttl(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogConfig {
    /// 是否开启 debug 级别
    #[serde(default)]
    pub debug: bool,
    /// 日志目录，为空时输出到标准输出
    #[serde(default)]
    pub dir: Option<String>,
    /// 日志文件名
    #[serde(default)]
    pub filename: Option<String>,
}

/// 从 YAML 文件加载配置
///
/// 路径不存在或内容非法时返回错误，由服务入口以非零码退出。
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    let cfg: AppConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("invalid config format in {}", path.display()))?;
    Ok(cfg)
}

fn default_gateway_service_name() -> String {
    crate::service_names::GATEWAY.to_string()
}

fn default_gateway_port() -> u16 {
    9002
}

fn default_gateway_tcp_port() -> u16 {
    8080
}

fn default_gateway_id() -> String {
    "gateway-1".to_string()
}

fn default_heartbeat_timeout() -> u64 {
    180
}

fn default_refresh_ttl_interval() -> u64 {
    60
}

fn default_session_service_name() -> String {
    crate::service_names::SESSION.to_string()
}

fn default_session_port() -> u16 {
    9001
}

fn default_push_service_name() -> String {
    crate::service_names::PUSH.to_string()
}

fn default_push_port() -> u16 {
    9003
}

fn default_redis_endpoint() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_redis_pool_size() -> u32 {
    16
}

fn default_redis_min_idle_conns() -> u32 {
    4
}

fn default_jwt_secret() -> String {
    // 仅用于本地联调，线上必须通过配置覆盖
    "kim-dev-secret".to_string()
}

fn default_registry_endpoints() -> Vec<String> {
    vec!["127.0.0.1:2379".to_string()]
}

fn default_registry_namespace() -> String {
    "kim".to_string()
}

fn default_registry_lease_ttl() -> i64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_applied_for_missing_sections() {
        let cfg: AppConfig = serde_yaml::from_str("gateway:\n  gateway_id: edge-7\n").unwrap();
        assert_eq!(cfg.gateway.gateway_id, "edge-7");
        assert_eq!(cfg.gateway.heartbeat_timeout, 180);
        assert_eq!(cfg.gateway.refresh_ttl_interval, 60);
        assert_eq!(cfg.gateway.tcp_port, 8080);
        assert_eq!(cfg.session.port, 9001);
        assert_eq!(cfg.registry.endpoints, vec!["127.0.0.1:2379".to_string()]);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "session:\n  port: 19001\n  redis:\n    endpoint: 10.0.0.8:6379\nlog:\n  debug: true"
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.session.port, 19001);
        assert_eq!(cfg.session.redis.endpoint, "10.0.0.8:6379");
        assert_eq!(cfg.session.redis.pool_size, 16);
        assert!(cfg.log.debug);
    }

    #[test]
    fn test_load_config_missing_file_fails() {
        assert!(load_config("/no/such/kim.yaml").is_err());
    }
}

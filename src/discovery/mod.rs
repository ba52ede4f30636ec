//! 服务注册发现模块
//!
//! 对外只暴露 `ServiceRegistry` / `ServiceDiscover` 两个接口，
//! 底层由 etcd 实现：注册使用租约 + 保活，发现使用前缀读取 + watch。
//! 核心链路只消费这两个接口，注册中心本身的可用性不在本模块职责内。

mod client;
mod etcd;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{grpc_addr_env_var, ServiceClient};
pub use etcd::{EtcdDiscover, EtcdRegistry};

/// 一个已注册的服务实例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// 实例 ID；Gateway 节点注册时等于 gateway_id，推送按此定位节点
    pub instance_id: String,
    /// gRPC 监听地址，`host:port`
    pub address: String,
    /// 负载均衡权重
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// 附加元数据
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    pub fn new(instance_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            address: address.into(),
            weight: default_weight(),
            metadata: HashMap::new(),
        }
    }

    /// 转换为 tonic 可用的 URI
    pub fn grpc_uri(&self) -> String {
        format!("http://{}", self.address)
    }
}

fn default_weight() -> u32 {
    1
}

/// 服务注册接口：启动时注册、退出时注销
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn register(&self, service_name: &str, instance: ServiceInstance) -> Result<()>;
    async fn deregister(&self) -> Result<()>;
}

/// 服务发现接口：返回当前已知的实例列表（带权重），内部自行订阅变更
#[async_trait]
pub trait ServiceDiscover: Send + Sync {
    async fn instances(&self) -> Vec<ServiceInstance>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_json_shape() {
        let raw = r#"{"instance_id":"gateway-1","address":"10.0.0.3:9002"}"#;
        let instance: ServiceInstance = serde_json::from_str(raw).unwrap();
        assert_eq!(instance.instance_id, "gateway-1");
        assert_eq!(instance.weight, 1);
        assert_eq!(instance.grpc_uri(), "http://10.0.0.3:9002");
    }
}

//! Gateway Router（按节点路由组件）
//!
//! 推送方向的消息必须落到持有目标连接的那个 Gateway 节点上，
//! 本组件按 gateway_id 缓存对应节点的 gRPC 客户端：
//! 每个 gateway_id 一个客户端，懒创建、长期持有，创建后视为不可变。
//!
//! 地址解析顺序：
//! 1. 服务发现中 `instance_id == gateway_id` 的实例（Gateway 注册时
//!    instance_id 即为其 gateway_id）；
//! 2. `GATEWAY_GRPC_ADDR` 环境变量直连（本地联调）。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use dashmap::DashMap;
use kim_proto::gateway::gateway_service_client::GatewayServiceClient;
use tonic::transport::{Channel, Endpoint};
use tracing::info;

use crate::discovery::{grpc_addr_env_var, ServiceDiscover};
use crate::service_names;

/// Gateway Router 配置
#[derive(Debug, Clone)]
pub struct GatewayRouterConfig {
    /// Gateway 服务名（用于服务发现与环境变量回退）
    pub gateway_service: String,
    /// 建连超时
    pub connect_timeout: Duration,
}

impl Default for GatewayRouterConfig {
    fn default() -> Self {
        Self {
            gateway_service: service_names::GATEWAY.to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

pub struct GatewayRouter {
    config: GatewayRouterConfig,
    discover: Option<Arc<dyn ServiceDiscover>>,
    /// gateway_id -> client，条目创建后不再变更
    clients: DashMap<String, GatewayServiceClient<Channel>>,
}

impl GatewayRouter {
    pub fn new(config: GatewayRouterConfig, discover: Option<Arc<dyn ServiceDiscover>>) -> Self {
        Self {
            config,
            discover,
            clients: DashMap::new(),
        }
    }

    /// 获取或创建指向指定 Gateway 节点的客户端
    pub async fn client(&self, gateway_id: &str) -> Result<GatewayServiceClient<Channel>> {
        if let Some(client) = self.clients.get(gateway_id) {
            return Ok(client.clone());
        }

        let address = self.resolve_address(gateway_id).await?;
        let endpoint = Endpoint::from_shared(format!("http://{}", address))
            .with_context(|| format!("invalid gateway address {}", address))?
            .connect_timeout(self.config.connect_timeout);
        let channel = endpoint
            .connect()
            .await
            .with_context(|| format!("connect to gateway {} at {} failed", gateway_id, address))?;

        let client = GatewayServiceClient::new(channel);
        self.clients.insert(gateway_id.to_string(), client.clone());
        info!(
            gateway_id = %gateway_id,
            address = %address,
            "gateway client created"
        );
        Ok(client)
    }

    /// 节点不可达时由调用方摘除缓存，下一次重新解析
    pub fn evict(&self, gateway_id: &str) {
        self.clients.remove(gateway_id);
    }

    async fn resolve_address(&self, gateway_id: &str) -> Result<String> {
        if let Some(discover) = self.discover.as_ref() {
            let instances = discover.instances().await;
            if let Some(instance) = instances.iter().find(|i| i.instance_id == gateway_id) {
                return Ok(instance.address.clone());
            }
            if !instances.is_empty() {
                return Err(anyhow!(
                    "gateway instance not found: gateway_id={}, known instances: {}",
                    gateway_id,
                    instances
                        .iter()
                        .map(|i| i.instance_id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }

        let env_var = grpc_addr_env_var(&self.config.gateway_service);
        std::env::var(&env_var).map_err(|_| {
            anyhow!(
                "no gateway instances discovered for {} and {} is not set",
                gateway_id,
                env_var
            )
        })
    }
}

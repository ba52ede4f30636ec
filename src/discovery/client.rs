//! 服务通道缓存
//!
//! 按服务名缓存一条 tonic Channel（tonic 通道内部自带重连与多路复用），
//! 实例选择按权重轮询。未配置注册中心时支持 `{SERVICE}_GRPC_ADDR`
//! 环境变量直连，方便本地联调与测试。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tracing::info;

use super::{ServiceDiscover, ServiceInstance};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 服务名 -> 直连地址环境变量名，如 "kim-session" -> "SESSION_GRPC_ADDR"
pub fn grpc_addr_env_var(service_name: &str) -> String {
    let upper = service_name.to_uppercase().replace("KIM-", "");
    format!("{}_GRPC_ADDR", upper.replace('-', "_"))
}

pub struct ServiceClient {
    service_name: String,
    discover: Option<Arc<dyn ServiceDiscover>>,
    channel: Mutex<Option<Channel>>,
    cursor: AtomicUsize,
}

impl ServiceClient {
    pub fn new(service_name: impl Into<String>, discover: Option<Arc<dyn ServiceDiscover>>) -> Self {
        Self {
            service_name: service_name.into(),
            discover,
            channel: Mutex::new(None),
            cursor: AtomicUsize::new(0),
        }
    }

    /// 获取（或建立并缓存）到目标服务的通道
    pub async fn get_channel(&self) -> Result<Channel> {
        let mut guard = self.channel.lock().await;
        if let Some(channel) = guard.as_ref() {
            return Ok(channel.clone());
        }

        let address = self.resolve_address().await?;
        let channel = connect(&address).await?;
        info!(
            service_name = %self.service_name,
            address = %address,
            "service channel established"
        );
        *guard = Some(channel.clone());
        Ok(channel)
    }

    /// 通道出错后由调用方失效缓存，下次重新解析地址
    pub async fn invalidate(&self) {
        *self.channel.lock().await = None;
    }

    async fn resolve_address(&self) -> Result<String> {
        if let Some(discover) = self.discover.as_ref() {
            let instances = discover.instances().await;
            if let Some(instance) = pick_weighted(&instances, &self.cursor) {
                return Ok(instance.address.clone());
            }
        }

        let env_var = grpc_addr_env_var(&self.service_name);
        std::env::var(&env_var).map_err(|_| {
            anyhow!(
                "no instances discovered for {} and {} is not set",
                self.service_name,
                env_var
            )
        })
    }
}

async fn connect(address: &str) -> Result<Channel> {
    let endpoint = Endpoint::from_shared(format!("http://{}", address))
        .with_context(|| format!("invalid service address {}", address))?
        .connect_timeout(CONNECT_TIMEOUT);
    endpoint
        .connect()
        .await
        .with_context(|| format!("connect to {} failed", address))
}

/// 按权重轮询选取实例
fn pick_weighted<'a>(
    instances: &'a [ServiceInstance],
    cursor: &AtomicUsize,
) -> Option<&'a ServiceInstance> {
    if instances.is_empty() {
        return None;
    }

    let total: u64 = instances.iter().map(|i| u64::from(i.weight.max(1))).sum();
    let mut slot = (cursor.fetch_add(1, Ordering::Relaxed) as u64) % total;
    for instance in instances {
        let weight = u64::from(instance.weight.max(1));
        if slot < weight {
            return Some(instance);
        }
        slot -= weight;
    }
    instances.first()
}

//! etcd 注册发现实现
//!
//! Key 布局：`/{namespace}/services/{service_name}/{instance_id}` → 实例 JSON。
//! 注册方持有租约并周期保活，进程异常退出后实例随租约过期自动摘除；
//! 发现方首次全量拉取前缀，之后通过 watch 在变更时重新拉取。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use etcd_client::{Client, GetOptions, PutOptions, WatchOptions};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ServiceDiscover, ServiceInstance, ServiceRegistry};

fn service_prefix(namespace: &str, service_name: &str) -> String {
    format!("/{}/services/{}/", namespace, service_name)
}

struct Registration {
    key: String,
    lease_id: i64,
    keepalive: JoinHandle<()>,
}

/// etcd 服务注册器
pub struct EtcdRegistry {
    client: Client,
    namespace: String,
    lease_ttl: i64,
    registration: Mutex<Option<Registration>>,
}

impl EtcdRegistry {
    /// 连接 etcd 并构建注册器
    pub async fn connect(endpoints: &[String], namespace: &str, lease_ttl: i64) -> Result<Self> {
        let client = Client::connect(endpoints, None)
            .await
            .context("connect to etcd registry failed")?;
        Ok(Self {
            client,
            namespace: namespace.to_string(),
            lease_ttl,
            registration: Mutex::new(None),
        })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl ServiceRegistry for EtcdRegistry {
    async fn register(&self, service_name: &str, instance: ServiceInstance) -> Result<()> {
        let mut client = self.client.clone();

        let lease = client
            .lease_grant(self.lease_ttl, None)
            .await
            .context("grant registry lease failed")?;
        let lease_id = lease.id();

        let key = format!(
            "{}{}",
            service_prefix(&self.namespace, service_name),
            instance.instance_id
        );
        let value = serde_json::to_string(&instance)?;
        client
            .put(key.clone(), value, Some(PutOptions::new().with_lease(lease_id)))
            .await
            .context("put registry key failed")?;

        // 保活任务：按租约 TTL 的三分之一周期续租
        let (mut keeper, mut responses) = client
            .lease_keep_alive(lease_id)
            .await
            .context("start lease keepalive failed")?;
        let interval = Duration::from_secs((self.lease_ttl.max(3) as u64) / 3);
        let keepalive = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = keeper.keep_alive().await {
                    warn!(error = %err, "registry lease keepalive failed");
                    break;
                }
                match responses.message().await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        warn!("registry keepalive stream closed");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "registry keepalive response error");
                        break;
                    }
                }
            }
        });

        info!(
            service_name = %service_name,
            instance_id = %instance.instance_id,
            address = %instance.address,
            "service registered"
        );

        *self.registration.lock().await = Some(Registration {
            key,
            lease_id,
            keepalive,
        });
        Ok(())
    }

    async fn deregister(&self) -> Result<()> {
        let Some(registration) = self.registration.lock().await.take() else {
            return Ok(());
        };

        registration.keepalive.abort();

        let mut client = self.client.clone();
        client
            .delete(registration.key.clone(), None)
            .await
            .context("delete registry key failed")?;
        if let Err(err) = client.lease_revoke(registration.lease_id).await {
            warn!(error = %err, "revoke registry lease failed");
        }

        info!(key = %registration.key, "service deregistered");
        Ok(())
    }
}

/// etcd 服务发现器
pub struct EtcdDiscover {
    service_name: String,
    instances: Arc<RwLock<Vec<ServiceInstance>>>,
}

impl EtcdDiscover {
    /// 创建发现器：全量拉取一次，并启动后台 watch 任务
    pub async fn new(client: Client, namespace: &str, service_name: &str) -> Result<Self> {
        let prefix = service_prefix(namespace, service_name);
        let instances = Arc::new(RwLock::new(
            fetch_instances(client.clone(), &prefix).await?,
        ));

        let watch_instances = instances.clone();
        let watch_prefix = prefix.clone();
        let watch_service = service_name.to_string();
        tokio::spawn(async move {
            watch_loop(client, watch_prefix, watch_service, watch_instances).await;
        });

        Ok(Self {
            service_name: service_name.to_string(),
            instances,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

#[async_trait]
impl ServiceDiscover for EtcdDiscover {
    async fn instances(&self) -> Vec<ServiceInstance> {
        self.instances.read().await.clone()
    }
}

async fn fetch_instances(mut client: Client, prefix: &str) -> Result<Vec<ServiceInstance>> {
    let resp = client
        .get(prefix, Some(GetOptions::new().with_prefix()))
        .await
        .context("fetch service instances failed")?;

    let mut instances = Vec::with_capacity(resp.kvs().len());
    for kv in resp.kvs() {
        match serde_json::from_slice::<ServiceInstance>(kv.value()) {
            Ok(instance) => instances.push(instance),
            Err(err) => {
                warn!(error = %err, key = %String::from_utf8_lossy(kv.key()), "skip malformed instance record");
            }
        }
    }
    Ok(instances)
}

async fn watch_loop(
    client: Client,
    prefix: String,
    service_name: String,
    instances: Arc<RwLock<Vec<ServiceInstance>>>,
) {
    loop {
        let mut watch_client = client.clone();
        let stream = watch_client
            .watch(prefix.clone(), Some(WatchOptions::new().with_prefix()))
            .await;

        let (_watcher, mut responses) = match stream {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, service_name = %service_name, "watch service prefix failed, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        loop {
            match responses.message().await {
                Ok(Some(resp)) if !resp.events().is_empty() => {
                    // 变更后重新全量拉取，避免按事件增量维护状态
                    match fetch_instances(client.clone(), &prefix).await {
                        Ok(fresh) => {
                            debug!(
                                service_name = %service_name,
                                count = fresh.len(),
                                "service instances updated"
                            );
                            *instances.write().await = fresh;
                        }
                        Err(err) => {
                            warn!(error = %err, service_name = %service_name, "refresh instances failed");
                        }
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(service_name = %service_name, "watch stream closed, restarting");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, service_name = %service_name, "watch stream error, restarting");
                    break;
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

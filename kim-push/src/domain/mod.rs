//! 推送领域接口
//!
//! 扇出逻辑只依赖这两个接口：会话查询/删除，以及按节点分发。
//! 具体的 RPC 细节（发现、通道缓存、信封解包）在 infrastructure 层。

use anyhow::Result;
use async_trait::async_trait;
use kim_proto::session::Session;

/// Session 服务能力
#[async_trait]
pub trait SessionQuery: Send + Sync {
    /// 查询用户会话；device_ids 为空时返回全部
    async fn get_sessions(&self, user_id: &str, device_ids: &[String]) -> Result<Vec<Session>>;

    /// 删除指定设备的会话
    async fn del_session(&self, user_id: &str, device_ids: Vec<String>, reason: &str)
        -> Result<()>;
}

/// 按 gateway_id 定位节点的连接操作能力
#[async_trait]
pub trait GatewayDispatch: Send + Sync {
    /// 推送消息到指定节点上的指定连接
    async fn push_msg(&self, gateway_id: &str, conn_id: u64, msg: &[u8]) -> Result<()>;

    /// 关闭指定节点上的指定连接
    async fn close_conn(&self, gateway_id: &str, conn_id: u64) -> Result<()>;
}

//! 连接对象
//!
//! 单条连接的读取由持有读半部的 reader 任务独占；写入方
//! （推送、心跳 Pong）都必须经过连接内的写互斥锁，同一套接字
//! 上的并发写因此被串行化。

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use kim_im_core::protocol::{self, Packet};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, Notify};

/// 设备平台类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformType {
    Unknown,
    Mobile,
    Web,
    Pc,
    Pad,
    Bot,
}

impl From<i32> for PlatformType {
    fn from(device_type: i32) -> Self {
        use kim_proto::session::DeviceType;
        match DeviceType::try_from(device_type) {
            Ok(DeviceType::Mobile) => PlatformType::Mobile,
            Ok(DeviceType::Web) => PlatformType::Web,
            Ok(DeviceType::Pc) => PlatformType::Pc,
            Ok(DeviceType::Pad) => PlatformType::Pad,
            Ok(DeviceType::Bot) => PlatformType::Bot,
            _ => PlatformType::Unknown,
        }
    }
}

pub struct Connection {
    id: u64,
    user_id: String,
    device_id: String,
    platform_type: PlatformType,
    remote_addr: SocketAddr,
    /// 会话过期时间（秒级时间戳），继承自登录返回的会话
    expire_at: i64,
    /// 最后活跃时间（毫秒），只增不减
    last_active_ms: AtomicI64,
    writer: Mutex<OwnedWriteHalf>,
    closed: AtomicBool,
    close_notify: Notify,
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl Connection {
    pub fn new(
        id: u64,
        user_id: String,
        device_id: String,
        platform_type: PlatformType,
        remote_addr: SocketAddr,
        expire_at: i64,
        writer: OwnedWriteHalf,
    ) -> Self {
        Self {
            id,
            user_id,
            device_id,
            platform_type,
            remote_addr,
            expire_at,
            last_active_ms: AtomicI64::new(now_millis()),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn platform_type(&self) -> PlatformType {
        self.platform_type
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn expire_at(&self) -> i64 {
        self.expire_at
    }

    /// 更新最后活跃时间；fetch_max 保证单调不回退
    pub fn touch(&self) {
        self.last_active_ms
            .fetch_max(now_millis(), Ordering::AcqRel);
    }

    pub fn last_active_millis(&self) -> i64 {
        self.last_active_ms.load(Ordering::Acquire)
    }

    pub fn last_active_secs(&self) -> i64 {
        self.last_active_millis() / 1000
    }

    /// 编码并写出一个完整帧；持有写锁期间整帧一次写出
    pub async fn write_packet(&self, packet: &Packet) -> Result<(), protocol::ProtocolError> {
        let encoded = protocol::encode_packet(packet)?;
        self.write_raw(&encoded).await.map_err(Into::into)
    }

    /// 写出已编码的帧（批量推送复用同一份编码结果）
    pub async fn write_raw(&self, encoded: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(encoded).await
    }

    /// 标记连接关闭；返回 true 表示本次调用完成了状态翻转
    pub fn mark_closed(&self) -> bool {
        let first = self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.close_notify.notify_one();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 等待连接被标记关闭（reader 任务的退出信号）
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_notify.notified().await;
    }

    /// 关闭写方向，促使对端与本端 reader 尽快感知断开
    pub async fn shutdown_writer(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

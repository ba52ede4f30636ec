//! 连接 ID 生成器
//!
//! ID 格式：相对时间戳（毫秒，自进程启动）* 1_000_000 + 自增序列号（1-999999）。
//! 同一毫秒内自增走无锁路径；跨毫秒的重置在短临界区内做双重检查。
//! 进程生命周期内严格递增；不同 Gateway 节点之间可能重复，
//! 由会话记录中的 gateway_id 消除歧义。

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::warn;

/// 序列号上限（6 位十进制）
const MAX_SEQ: u64 = 999_999;

pub struct IdGenerator {
    /// 进程本地纪元，重启后基准重算，ID 不会与上个生命周期重复语义冲突
    base: Instant,
    /// 打包状态：高 32 位为上次毫秒时间戳，低 32 位为序列号
    state: AtomicU64,
    reset_lock: Mutex<()>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            state: AtomicU64::new(0),
            reset_lock: Mutex::new(()),
        }
    }

    /// 生成下一个连接 ID，严格递增
    pub fn next_id(&self) -> u64 {
        loop {
            let relative_ms = self.base.elapsed().as_millis() as u64;
            let state = self.state.load(Ordering::Acquire);
            let last_ms = state >> 32;

            if relative_ms > last_ms {
                // 跨毫秒：短临界区内重置，双重检查防止重复重置
                let _guard = self.reset_lock.lock().unwrap();
                let current = self.state.load(Ordering::Acquire);
                if relative_ms > (current >> 32) {
                    self.state
                        .store((relative_ms << 32) | 1, Ordering::Release);
                    return relative_ms * 1_000_000 + 1;
                }
                // 其他线程已重置，回到自增路径
                continue;
            }

            // 同一毫秒内：无锁自增
            let new_state = self.state.fetch_add(1, Ordering::AcqRel) + 1;
            let seq = new_state & 0xFFFF_FFFF;
            if seq > MAX_SEQ {
                // 序列号耗尽（每毫秒百万次，现实流量不可达）。
                // 等到下一毫秒再分配，维持严格递增。
                warn!("connection id sequence exhausted within one millisecond");
                std::thread::yield_now();
                continue;
            }

            let ms = new_state >> 32;
            return ms * 1_000_000 + seq;
        }
    }
}

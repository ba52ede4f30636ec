//! TTL 刷新时间轮
//!
//! 槽位环形排列，单个指针按固定步长前进；连接插入到当前槽位的
//! 前一个槽位，恰好一整圈之后被取出处理。调度开销与连接数无关，
//! 且把续期产生的注册表写压力均匀摊到整个刷新间隔上。
//!
//! 锁规则：槽位各自持锁，任何时刻最多持有一把槽位锁。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::connection::Connection;

/// 槽数上限
const MAX_SLOTS: usize = 3600;

pub struct TimeWheel {
    interval: Duration,
    slots: usize,
    /// 当前槽位指针；与槽位锁互不嵌套
    current_slot: Mutex<usize>,
    wheel: Vec<Mutex<HashMap<u64, Arc<Connection>>>>,
}

impl TimeWheel {
    /// interval: 完整一圈的时长（即刷新间隔）
    /// slots: 槽数，0 表示取 interval 的秒数；上限 3600
    pub fn new(interval: Duration, slots: usize) -> Self {
        let mut slots = if slots == 0 {
            (interval.as_secs() as usize).max(1)
        } else {
            slots
        };
        if slots > MAX_SLOTS {
            slots = MAX_SLOTS;
        }

        Self {
            interval,
            slots,
            current_slot: Mutex::new(0),
            wheel: (0..slots).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    /// 指针每次前进的时间步长
    pub fn slot_interval(&self) -> Duration {
        self.interval / self.slots as u32
    }

    /// 插入连接：放到 (current + slots - 1) % slots，
    /// 即 slots-1 次转动之后处理，接近一个完整的刷新间隔
    pub fn add(&self, conn: Arc<Connection>) {
        let slot_index = {
            let current = self.current_slot.lock().unwrap();
            (*current + self.slots - 1) % self.slots
        };
        self.wheel[slot_index].lock().unwrap().insert(conn.id(), conn);
    }

    /// 移除连接：逐槽扫描。移除相对转动是低频操作，
    /// 代价主要是逐个拿槽位锁，可以接受。
    pub fn remove(&self, conn_id: u64) {
        for slot in &self.wheel {
            slot.lock().unwrap().remove(&conn_id);
        }
    }

    /// 指针前进一格，整体换出该槽位的连接表
    pub fn advance(&self) -> Vec<Arc<Connection>> {
        let slot_index = {
            let mut current = self.current_slot.lock().unwrap();
            let index = *current;
            *current = (*current + 1) % self.slots;
            index
        };

        let drained = {
            let mut slot = self.wheel[slot_index].lock().unwrap();
            std::mem::take(&mut *slot)
        };
        drained.into_values().collect()
    }
}

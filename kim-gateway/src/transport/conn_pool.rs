//! 连接池
//!
//! 两套索引：conn_id -> Connection（主索引）、user_id -> conn_id 集合。
//! 全部基于并发 map，无全局锁。遍历快照期间连接可能被并发移除，
//! 消费方需容忍拿到的是已关闭的引用。

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use super::connection::Connection;

#[derive(Default)]
pub struct ConnPool {
    by_id: DashMap<u64, Arc<Connection>>,
    by_user: DashMap<String, HashSet<u64>>,
}

impl ConnPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入两套索引
    pub fn add(&self, conn: Arc<Connection>) {
        self.by_id.insert(conn.id(), conn.clone());
        self.by_user
            .entry(conn.user_id().to_string())
            .or_default()
            .insert(conn.id());
    }

    /// 从两套索引移除；用户的连接集合清空后连同用户键一起移除
    pub fn remove(&self, conn: &Connection) {
        self.by_id.remove(&conn.id());

        if let Some(mut conns) = self.by_user.get_mut(conn.user_id()) {
            conns.remove(&conn.id());
        }
        self.by_user
            .remove_if(conn.user_id(), |_, conns| conns.is_empty());
    }

    pub fn get_by_id(&self, conn_id: u64) -> Option<Arc<Connection>> {
        self.by_id.get(&conn_id).map(|entry| entry.value().clone())
    }

    pub fn get_by_user_id(&self, user_id: &str) -> Vec<Arc<Connection>> {
        let Some(conn_ids) = self
            .by_user
            .get(user_id)
            .map(|entry| entry.value().clone())
        else {
            return Vec::new();
        };

        conn_ids
            .into_iter()
            .filter_map(|conn_id| self.get_by_id(conn_id))
            .collect()
    }

    /// 全量快照（广播、心跳扫描等场景）
    pub fn get_all(&self) -> Vec<Arc<Connection>> {
        self.by_id
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.by_id.len()
    }
}

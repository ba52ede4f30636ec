//! 会话领域模型
//!
//! `Session` 同时是存储模型：以 JSON 形式写入 Redis，字段名即存储布局，
//! 不可随意改动（TTL 刷新脚本按 `last_active_at` 字段名改写）。
//! `conn_id` 以字符串形式入库，避免大整数经过 cjson 往返时丢失精度。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 设备类型，线上取值与 proto 定义一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DeviceType {
    Unknown = 0,
    Mobile = 1,
    Web = 2,
    Pc = 3,
    Pad = 4,
    Bot = 5,
}

impl From<i32> for DeviceType {
    fn from(value: i32) -> Self {
        match value {
            1 => DeviceType::Mobile,
            2 => DeviceType::Web,
            3 => DeviceType::Pc,
            4 => DeviceType::Pad,
            5 => DeviceType::Bot,
            _ => DeviceType::Unknown,
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SessionStatus {
    Unknown = 0,
    Online = 1,
    Offline = 2,
}

impl From<i32> for SessionStatus {
    fn from(value: i32) -> Self {
        match value {
            1 => SessionStatus::Online,
            2 => SessionStatus::Offline,
            _ => SessionStatus::Unknown,
        }
    }
}

/// 会话记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub device_id: String,
    pub device_type: i32,
    pub gateway_id: String,
    #[serde(with = "conn_id_string")]
    pub conn_id: u64,
    pub remote_addr: String,
    pub status: i32,
    pub login_at: i64,
    pub last_active_at: i64,
    pub expire_at: i64,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        SessionStatus::from(self.status)
    }

    pub fn device_type(&self) -> DeviceType {
        DeviceType::from(self.device_type)
    }

    pub fn is_online(&self) -> bool {
        self.status() == SessionStatus::Online
    }
}

/// conn_id 的字符串序列化；cjson 对超过双精度范围的整数不保真
mod conn_id_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u64>().map_err(D::Error::custom)
    }
}

impl From<Session> for kim_proto::session::Session {
    fn from(session: Session) -> Self {
        Self {
            user_id: session.user_id,
            device_id: session.device_id,
            device_type: session.device_type,
            gateway_id: session.gateway_id,
            conn_id: session.conn_id,
            remote_addr: session.remote_addr,
            status: session.status,
            login_at: session.login_at,
            last_active_at: session.last_active_at,
            expire_at: session.expire_at,
            meta: session.meta,
        }
    }
}

impl From<kim_proto::session::Session> for Session {
    fn from(session: kim_proto::session::Session) -> Self {
        Self {
            user_id: session.user_id,
            device_id: session.device_id,
            device_type: session.device_type,
            gateway_id: session.gateway_id,
            conn_id: session.conn_id,
            remote_addr: session.remote_addr,
            status: session.status,
            login_at: session.login_at,
            last_active_at: session.last_active_at,
            expire_at: session.expire_at,
            meta: session.meta,
        }
    }
}

//! 微服务服务名定义模块
//!
//! 服务注册与发现必须使用此处定义的常量，保证注册名与发现名一致，
//! 这是整个集群的单一数据源。部署多环境时可通过环境变量覆盖：
//! 格式 `{SERVICE}_SERVICE`，例如 `SESSION_SERVICE=kim-session-dev`。

/// KIM 微服务服务名定义
pub mod service_names {
    /// Gateway 服务名
    ///
    /// 终结客户端 TCP 长连接，注册路径: `kim/services/kim-gateway`
    pub const GATEWAY: &str = "kim-gateway";

    /// Session 服务名
    ///
    /// 会话注册表，注册路径: `kim/services/kim-session`
    pub const SESSION: &str = "kim-session";

    /// Push 服务名
    ///
    /// 推送扇出服务，注册路径: `kim/services/kim-push`
    pub const PUSH: &str = "kim-push";
}

/// 校验服务名是否在常量定义中
pub fn validate_service_name(name: &str) -> bool {
    matches!(
        name,
        service_names::GATEWAY | service_names::SESSION | service_names::PUSH
    )
}

/// 获取服务名对应的环境变量名称
pub fn service_name_env_var(service_name: &str) -> String {
    // "kim-session" -> "SESSION_SERVICE"
    let upper = service_name.to_uppercase().replace("KIM-", "");
    format!("{}_SERVICE", upper.replace('-', "_"))
}

/// 从环境变量或常量获取服务名，优先环境变量
pub fn get_service_name(constant_name: &str) -> String {
    std::env::var(service_name_env_var(constant_name))
        .unwrap_or_else(|_| constant_name.to_string())
}

pub use service_names::*;

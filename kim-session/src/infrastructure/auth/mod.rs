//! JWT 鉴权
//!
//! HS256 共享密钥。业务过期时间放在自定义的 `expire_time` 字段里，
//! 登录时显式校验；标准 `exp` 字段仍由 jsonwebtoken 默认校验。

use anyhow::{Context, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Token 声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户 ID
    pub user_id: String,
    /// 业务过期时间（秒级时间戳）
    pub expire_time: i64,
    /// 标准过期时间
    pub exp: i64,
    /// 签发时间
    pub iat: i64,
}

/// 解析并校验 JWT token
pub fn parse_jwt(token: &str, secret: &str) -> Result<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .context("parse jwt token failed")?;
    Ok(data.claims)
}

/// 生成 JWT token（测试与运营工具使用）
pub fn generate_jwt(user_id: &str, expire_time: i64, secret: &str) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        user_id: user_id.to_string(),
        expire_time,
        exp: now + 30 * 24 * 3600,
        iat: now,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("sign jwt token failed")
}

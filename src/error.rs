//! 错误码与业务错误类型
//!
//! 应用层错误以 `(code, message)` 信封的形式在各服务 RPC 响应中传递，
//! 中间服务只依赖错误码做分支，不依赖具体类型。
//! 错误码分两段：通用错误 10000 - 19999，Session 模块错误 20000 - 29999。

use std::fmt;

// 通用错误码 10000 - 19999
pub const OK_CODE: i32 = 0;
pub const ERR_BAD_REQUEST_CODE: i32 = 10001;
pub const ERR_UNAUTHORIZED_CODE: i32 = 10002;
pub const ERR_FORBIDDEN_CODE: i32 = 10003;
pub const ERR_NOT_FOUND_CODE: i32 = 10004;
pub const ERR_CONFLICT_CODE: i32 = 10005;
pub const ERR_INTERNAL_SERVER_CODE: i32 = 10006;
pub const ERR_SERVICE_UNAVAILABLE_CODE: i32 = 10007;
pub const ERR_DEADLINE_EXCEEDED_CODE: i32 = 10008;
pub const ERR_TOO_MANY_REQUESTS_CODE: i32 = 10009;
pub const ERR_INVALID_PARAMS_CODE: i32 = 10010;

// Session 模块错误码 20000 - 29999
pub const ERR_SESSION_NOT_FOUND_CODE: i32 = 20001;
pub const ERR_SESSION_EXPIRED_CODE: i32 = 20002;
pub const ERR_SESSION_TOKEN_INVALID_CODE: i32 = 20006;
pub const ERR_SESSION_STATE_CORRUPT_CODE: i32 = 20009;

/// 业务错误，携带错误码与描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    code: i32,
    message: String,
}

impl Error {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 保留错误码，替换描述信息
    pub fn with_message(&self, message: impl Into<String>) -> Self {
        Self {
            code: self.code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

pub fn ok() -> Error {
    Error::new(OK_CODE, "ok")
}

pub fn bad_request() -> Error {
    Error::new(ERR_BAD_REQUEST_CODE, "bad request")
}

pub fn unauthorized() -> Error {
    Error::new(ERR_UNAUTHORIZED_CODE, "unauthorized")
}

pub fn not_found() -> Error {
    Error::new(ERR_NOT_FOUND_CODE, "not found")
}

pub fn internal_server() -> Error {
    Error::new(ERR_INTERNAL_SERVER_CODE, "internal server error")
}

pub fn service_unavailable() -> Error {
    Error::new(ERR_SERVICE_UNAVAILABLE_CODE, "service unavailable")
}

pub fn invalid_params() -> Error {
    Error::new(ERR_INVALID_PARAMS_CODE, "invalid parameters")
}

pub fn session_not_found() -> Error {
    Error::new(ERR_SESSION_NOT_FOUND_CODE, "session not found")
}

pub fn session_expired() -> Error {
    Error::new(ERR_SESSION_EXPIRED_CODE, "session expired")
}

pub fn session_token_invalid() -> Error {
    Error::new(ERR_SESSION_TOKEN_INVALID_CODE, "invalid token")
}

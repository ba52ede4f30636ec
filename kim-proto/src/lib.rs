//! KIM 服务间 gRPC 协议
//!
//! 由 `proto/` 下的定义在构建期生成。应用层状态统一以
//! `(code, message)` 信封承载在响应消息内，传输层错误另行传播。

pub mod session {
    tonic::include_proto!("kim.session");
}

pub mod gateway {
    tonic::include_proto!("kim.gateway");
}

pub mod push {
    tonic::include_proto!("kim.push");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 环境里没有 protoc 时使用内置的二进制，保证构建可重复
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure().compile_protos(
        &[
            "proto/session.proto",
            "proto/gateway.proto",
            "proto/push.proto",
        ],
        &["proto"],
    )?;
    Ok(())
}

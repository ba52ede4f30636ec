use anyhow::Result;
use clap::Parser;
use kim_push::service::PushServiceApp;
use tracing::info;

/// KIM Push Service
#[derive(Parser, Debug)]
#[command(name = "kim-push")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let app_config = kim_im_core::config::load_config(&args.config)?;
    let _log_guard = kim_im_core::init_tracing_from_config(&app_config.log);

    let app = PushServiceApp::new(&app_config).await?;

    info!(address = %app.address(), "starting kim-push service");
    app.run().await
}

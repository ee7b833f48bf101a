use anyhow::Context;
use clap::Parser;
use moreip_server::{ServerArgs, server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    telemetry::init_logging(&args.log_level);

    let settings = args.resolve().context("refusing to start")?;
    server::run(settings).await.context("moreip failed")?;
    Ok(())
}

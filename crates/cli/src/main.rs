use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

const DEFAULT_FILTER: &str =
    "monoserve=info,remote_core=info,bundler=info,http=info,runtime=info,tower_http=info";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Cli::parse();
    match cli::execute(args).await {
        Ok(code) => code,
        Err(err) => {
            stdio::fail(&format!("{:#}", err));
            ExitCode::FAILURE
        }
    }
}

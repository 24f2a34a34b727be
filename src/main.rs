//! docrag CLI 진입점

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use docrag::config::Settings;

fn main() -> Result<()> {
    // CLI 파싱 (--help는 설정과 무관하게 동작)
    let cli = docrag::cli::Cli::parse();

    // 설정 로드 (.env 포함)
    let env_file = dotenv::dotenv().ok();
    let settings = Settings::from_env()?;

    // 로깅 초기화 - RUST_LOG 우선, 없으면 LOG_LEVEL
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = env_file {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(docrag::cli::run(cli, settings))
}

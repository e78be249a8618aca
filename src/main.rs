//! yacd: the daemon binary. One process per machine, one LSP client per
//! `(language, workspace root)` pair, one Unix socket shared by every
//! connected editor.

use std::path::PathBuf;

use anyhow::Context;
use yac_daemon::config::{default_config_path, default_socket_path, LanguageTable};
use yac_daemon::daemon::Daemon;

fn parse_socket_flag(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == "--socket")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("YAC_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let socket_path = parse_socket_flag(&args).unwrap_or_else(default_socket_path);

    let config_path = default_config_path();
    let language_table =
        LanguageTable::load(config_path.as_deref()).context("failed to load language config")?;

    tracing::info!(socket = %socket_path.display(), "starting yac daemon");
    Daemon::new(socket_path, language_table).run().await
}

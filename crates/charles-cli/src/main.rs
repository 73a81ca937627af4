mod bootstrap_helpers;

use anyhow::Result;
use charles_cli::{build_runtime_config, Cli};
use clap::Parser;

use bootstrap_helpers::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = build_runtime_config(&cli)?;
    charles_github_issues_runtime::run_charles_bot(config).await
}

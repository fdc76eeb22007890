use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = kbmirror::cli::Cli::parse();
    kbmirror::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        kbmirror::cli::Command::Crawl(args) => {
            kbmirror::run::run(args).await.context("crawl")?;
        }
        kbmirror::cli::Command::Discover(args) => {
            kbmirror::discover::run(args).await.context("discover")?;
        }
        kbmirror::cli::Command::Assemble(args) => {
            kbmirror::assemble::run(args).context("assemble")?;
        }
    }

    Ok(())
}

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
    mangasync::logging::init().context("init logging")?;

    let cli = mangasync::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        mangasync::cli::Command::Download(args) => {
            mangasync::sync::run_download(args)
                .await
                .context("download")?;
        }
        mangasync::cli::Command::Update(args) => {
            mangasync::sync::run_update(args).await.context("update")?;
        }
        mangasync::cli::Command::Tag(args) => {
            mangasync::retag::run(args).await.context("tag")?;
        }
    }

    Ok(())
}

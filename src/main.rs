// src/main.rs
use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use log::{error, info};
use newsroom::{
    config::load_config,
    utils::{parse_level, setup_logging},
    NewsroomContext,
};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "newsroom", version, about = "Daily news aggregation and content generation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Arm the daily scheduler and run until SIGINT/SIGTERM
    Start,
    /// Run the content job once and exit
    RunNow,
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                error!("Could not install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received SIGINT");
    }
}

async fn start(context: &NewsroomContext) {
    context.connect_repository().await;
    context.scheduler.start().await;
    info!("🚀 Newsroom scheduler armed, waiting for shutdown signal");
    wait_for_shutdown_signal().await;
    context.shutdown().await;
}

async fn run_now(context: &NewsroomContext) -> bool {
    context.connect_repository().await;
    let outcome = match context.job.run().await {
        Ok(report) => {
            info!(
                "✅ Run complete: topic='{}' articles={} content={} purged={:?}",
                report.topic, report.article_count, report.content_id, report.purged
            );
            true
        }
        Err(e) => {
            error!("❌ Run failed [{}]: {}", e.categorize().as_str(), e);
            false
        }
    };
    context.repository.close().await;
    outcome
}

async fn run(command: Command) -> anyhow::Result<bool> {
    dotenv::dotenv().ok();
    let level = parse_level(&std::env::var("LOG_LEVEL").unwrap_or_default());
    setup_logging(level).context("initializing logging")?;
    let config = load_config().context("loading configuration")?;

    let context = NewsroomContext::build(config)
        .await
        .context("building runtime context")?;

    Ok(match command {
        Command::Start => {
            start(&context).await;
            true
        }
        Command::RunNow => run_now(&context).await,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let command = match Cli::try_parse() {
        Ok(Cli {
            command: Some(command),
        }) => command,
        Ok(Cli { command: None }) => {
            let _ = Cli::command().print_help();
            println!();
            return ExitCode::SUCCESS;
        }
        // Help, version and unrecognized input all print usage and exit cleanly.
        Err(e) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    match run(command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("newsroom: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

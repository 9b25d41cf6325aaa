use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use maz::cli::Cli;
use maz::context::EnvDefaults;

fn init_logging(log_file: Option<&std::path::Path>) -> std::io::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} failed to start runtime: {}", "error:".red().bold(), e);
            return ExitCode::from(1);
        }
    };
    let code = runtime.block_on(run());
    // An interrupted confirmation prompt leaves its reader thread blocked on stdin
    runtime.shutdown_background();
    code
}

async fn run() -> ExitCode {
    // A missing .env file is fine
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_file.as_deref()) {
        eprintln!("{} failed to open log file: {}", "error:".red().bold(), e);
        return ExitCode::from(1);
    }
    match dotenv {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) => debug!("No .env file loaded: {}", e),
    }
    info!("Starting maz");

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling");
            watcher.cancel();
        }
    });

    match cli.run(EnvDefaults::from_env(), cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            let code = e.exit_code();
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

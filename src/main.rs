use bookshelf::api::build_api;
use bookshelf::cli::{self, Args, CliError};
use bookshelf::core::config::{self, BookshelfConfig, ResolvedConfig};
use clap::Parser;
use simplelog::{ConfigBuilder, WriteLogger};
use std::fs::File;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let file_config = match config::load_config() {
        Ok(file_config) => file_config,
        Err(e) => {
            eprintln!("{e}, using defaults");
            BookshelfConfig::default()
        }
    };
    let resolved = config::resolve(&file_config, &args.overrides());
    init_logging(&resolved);

    log::info!(
        "Bookshelf starting up with provider: {} ({})",
        resolved.provider,
        resolved.base_url
    );

    match run(args, &resolved).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, resolved: &ResolvedConfig) -> Result<(), CliError> {
    let api = build_api(resolved)?;
    let mut stdout = std::io::stdout().lock();
    cli::run(args.command, resolved, api, &mut stdout).await
}

/// File logger; stdout belongs to command output.
fn init_logging(resolved: &ResolvedConfig) {
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    if let Ok(log_file) = File::create(&resolved.log_file) {
        let _ = WriteLogger::init(resolved.log_level, log_config, log_file);
    }
}

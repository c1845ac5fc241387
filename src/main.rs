//! Postmortem Analyzer MCP Server - Main Entry Point

use clap::Parser;
use tracing::{info, error, debug};
use tracing_subscriber::{EnvFilter, fmt};
use rmcp::{ServiceExt, transport::stdio};

use postmortem_analyzer::{
    Config,
    config::{Args, LoggingConfig},
    pipeline,
    report::format_crash_report,
    symbols::Symbolizer,
    tools::PostmortemToolHandler,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Handle special flags first
    if args.generate_config {
        let config = Config::default();
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    // Load configuration and merge command line arguments into it
    let mut config = Config::load(args.config.as_ref())
        .map_err(|e| {
            eprintln!("Failed to load configuration: {}", e);
            e
        })?;
    config.merge_args(&args);

    // Initialize logging
    init_logging(&config.logging)?;

    info!("Starting Postmortem Analyzer v{}", env!("CARGO_PKG_VERSION"));
    debug!("Command line args: {:?}", args);

    if args.validate_config {
        config.validate()?;
        println!("Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    // Validate final configuration
    config.validate()
        .map_err(|e| {
            error!("Configuration validation failed: {}", e);
            e
        })?;

    info!("Configuration loaded and validated successfully");

    // One-shot mode: analyze a crash log file and print the report
    if let Some(path) = &args.crash_log {
        let text = std::fs::read_to_string(path)?;
        let analyzed = pipeline::analyze(&text)?;
        let symbolizer = Symbolizer::from_config(&config.symbolizer).await?;
        let symbolicated = pipeline::symbolicate(analyzed, &symbolizer).await;
        print!("{}", format_crash_report(&symbolicated));
        return Ok(());
    }

    // Create and serve the handler using rust-sdk standard pattern
    let service = PostmortemToolHandler::new(config.symbolizer.clone())
        .serve(stdio()).await.inspect_err(|e| {
            error!("Serving error: {:?}", e);
        })?;

    info!("Postmortem Analyzer MCP Server started successfully");

    // Wait for the service to complete
    service.waiting().await?;

    info!("Postmortem Analyzer MCP Server stopped");
    Ok(())
}

/// Initialize logging system
fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false);

    // Configure output destination; stdout carries the MCP protocol
    if let Some(log_file) = &logging.file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;

        subscriber
            .with_writer(file)
            .init();

        eprintln!("Logging to file: {}", log_file.display());
    } else {
        subscriber
            .with_writer(std::io::stderr)
            .init();
    }

    debug!("Logging initialized with level: {}", logging.level);
    Ok(())
}

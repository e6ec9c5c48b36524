mod cli;
mod commands;
mod config;
mod output;

use std::process;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use notify_client::Session;
use notify_client::logging::{LoggingHandle, LoggingOptions, init_logging};
use tracing::error;

use crate::cli::{Args, Commands};
use crate::commands::CommandExecutor;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {e:#}");
        #[cfg(feature = "colored-output")]
        {
            eprintln!("{} {e:#}", "Error:".red().bold());
        }
        #[cfg(not(feature = "colored-output"))]
        {
            eprintln!("Error: {e:#}");
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = config::load(args.config.as_deref())?;
    if let Some(base_url) = args.base_url.clone() {
        config.base_url = base_url;
    }
    if let Some(database_url) = args.database_url.clone() {
        config.database_url = database_url;
    }
    config.validate()?;

    let colored = !args.no_color;
    let _logging = init_cli_logging(&args, &config.logging_options(colored))?;

    let session = Session {
        user_id: args.user_id.clone(),
        token: args.token.clone(),
    };
    let executor = CommandExecutor::new(config.clone(), session, colored);

    match args.command {
        Commands::Listen { duration, output } => {
            executor
                .listen(duration.map(Duration::from_secs), output)
                .await?;
        }

        Commands::Inbox { tab, page, output } => {
            executor.inbox(tab, page, output).await?;
        }

        Commands::Respond { request_id, reject } => {
            executor.respond(request_id, !reject).await?;
        }

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Args::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }

        Commands::Config { show, reset } => {
            if reset {
                let path = config::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults at {}", path.display());
            } else if show {
                println!("{}", config::show(&config)?);
            } else {
                let path = args.config.clone().unwrap_or_else(config::default_path);
                println!("Config file: {}", path.display());
                println!(
                    "Use --show to display the effective configuration or --reset to reset to defaults"
                );
            }
        }
    }

    Ok(())
}

/// `--verbose` and `--quiet` override the configured filter.
fn init_cli_logging(args: &Args, options: &LoggingOptions) -> Result<LoggingHandle> {
    let mut options = options.clone();
    if args.quiet {
        options.filter = Some("error".to_string());
    } else if args.verbose {
        options.filter = Some("notify_client=debug,notify=debug,sqlx=warn".to_string());
    }
    Ok(init_logging(&options)?)
}

use std::io::IsTerminal;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::error::InquireResult;
use tracing_subscriber::EnvFilter;

mod app;
mod bookmarks;
mod cli;
mod config;
mod profile;
mod semantic;
mod session;
mod storage;
#[cfg(test)]
mod tests;
mod visualize;
mod web;

use app::{AppError, AppFactory};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let context = AppFactory::create_context()?;

    match args.command {
        cli::Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| context.config().listen.clone());
            web::start_daemon(context, addr)
        }

        cli::Command::Search { query, limit, json } => {
            with_spinner("Loading search index", || context.initialize())
                .or_else(exit_on_init)?;

            let limit = limit.unwrap_or(context.config().search.initial_results);
            let hits = context.service().search(&query, limit)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
                return Ok(());
            }

            if hits.is_empty() {
                println!("No bookmarks found");
            }
            for hit in hits {
                println!("{:>8.4}  {}", hit.distance, hit.title);
                println!("          {}", hit.url);
            }
            Ok(())
        }

        cli::Command::Rebuild { yes } => {
            if !yes {
                match inquire::prompt_confirmation(format!(
                    "This deletes the index in {} and embeds every bookmark again. Continue?",
                    context.service().store().dir().display()
                )) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }

            let status = with_spinner("Rebuilding search index", || context.rebuild())
                .or_else(exit_on_init)?;
            println!(
                "{} bookmarks indexed with {}",
                status.service.bookmarks, status.service.model
            );
            Ok(())
        }

        cli::Command::Locate {} => {
            let located = context.locate().or_else(exit_on_init)?;
            println!("profile:  {}", located.profile.display());
            println!("database: {} ({} bytes)", located.database.display(), located.size);
            Ok(())
        }
    }
}

/// Initialization failures are shown once as a plain message.
fn exit_on_init<T>(err: AppError) -> Result<T, AppError> {
    if err.is_initialization() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    Err(err)
}

fn with_spinner<T>(message: &'static str, f: impl FnOnce() -> T) -> T {
    let bar = if std::io::stderr().is_terminal() {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
            bar.set_style(style);
        }
        bar
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    let result = f();
    bar.finish_and_clear();
    result
}


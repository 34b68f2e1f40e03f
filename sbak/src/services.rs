use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::api::{RateLimiter, Requester, RetryPolicy, SlackClient};
use crate::backup::{BackupOptions, BackupOrchestrator, HistoryWindow, IncrementalStore};
use crate::cli::{Args, BackupArgs, Command, StatusArgs};
use crate::error::BackupError;
use crate::settings::merge_settings_with_args;
use crate::status::{OverallStatus, StatusChecker, render_table};

/// Exit status of an interrupted backup, as for SIGINT.
pub const EXIT_INTERRUPTED: i32 = 130;

const BACKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Cancels the returned token on SIGINT or SIGTERM.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    let name = tokio::select! {
                        _ = tokio::signal::ctrl_c() => "SIGINT",
                        _ = sigterm.recv() => "SIGTERM",
                    };
                    info!("received {}, stopping after in-flight work", name);
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("received SIGINT, stopping after in-flight work");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received Ctrl+C, stopping after in-flight work");
        }

        trigger.cancel();
    });

    token
}

/// Runs the selected command and returns the process exit status.
pub async fn run(args: Args, cancel: CancellationToken) -> Result<i32> {
    let args = merge_settings_with_args(&args)?;

    let token = args
        .token
        .clone()
        .filter(|token| !token.trim().is_empty())
        .ok_or(BackupError::MissingToken)?;
    let api_url = args
        .api_url
        .clone()
        .unwrap_or_else(|| SlackClient::DEFAULT_BASE_URL.to_string());

    match args.command {
        Command::Backup(backup) => run_backup(&api_url, &token, backup, cancel).await,
        Command::Status(status) => run_status(&api_url, &token, status).await,
    }
}

async fn run_backup(
    api_url: &str,
    token: &str,
    args: BackupArgs,
    cancel: CancellationToken,
) -> Result<i32> {
    let out = args.out.ok_or(BackupError::MissingOutputDir)?;
    let store = IncrementalStore::open(&out)?;

    let mut policy = RetryPolicy {
        max_attempts: args.max_retry_attempts,
        ..RetryPolicy::default()
    };
    if let Some(max_wait) = args.max_retry_wait {
        policy.max_wait = Duration::from_secs(max_wait);
    }

    let client = SlackClient::new(api_url, token, BACKUP_TIMEOUT)?;
    let requester = Requester::new(
        Arc::new(client),
        Arc::new(RateLimiter::new(policy)),
        cancel,
    );

    let options = BackupOptions {
        types: args.types,
        window: HistoryWindow {
            oldest: args.oldest,
            latest: args.latest,
        },
        conversation_id: args.conversation_id,
        force: args.force,
        jobs: args.jobs.unwrap_or(1),
        layout: args.layout,
    };

    info!(
        "backing up {} into {}",
        crate::models::ConversationType::join(&options.types),
        out.display()
    );

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner} Conversations [{bar:30}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?,
    );
    progress.enable_steady_tick(Duration::from_millis(100));

    let summary = BackupOrchestrator::new(requester, store, options)
        .with_progress(progress)
        .run()
        .await?;

    if summary.interrupted {
        println!("{} Backup interrupted: {}", "⚠".yellow(), summary);
        Ok(EXIT_INTERRUPTED)
    } else {
        println!("{} Backup finished: {}", "✓".green(), summary);
        Ok(0)
    }
}

async fn run_status(api_url: &str, token: &str, args: StatusArgs) -> Result<i32> {
    let client = SlackClient::new(api_url, token, Duration::from_secs(args.timeout))?;
    let report = StatusChecker::new(&client, args.timeout)
        .run_checks(args.quick)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_table(&report));

        let summary = &report.summary;
        let overall = summary.overall_status.to_string();
        let overall = match summary.overall_status {
            OverallStatus::Ok => overall.green().to_string(),
            OverallStatus::RateLimited => overall.yellow().to_string(),
            OverallStatus::Timeout | OverallStatus::Error => overall.red().to_string(),
        };
        println!("Overall status: {}", overall);
        println!(
            "Successful: {}/{}, average response time {:.2}ms",
            summary.successful, summary.total_checks, summary.avg_response_time_ms
        );

        if summary.avg_response_time_ms > 5000.0 {
            println!(
                "{}",
                "Average response time above 5s, check the network".red()
            );
        } else if summary.avg_response_time_ms > 2000.0 {
            println!("{}", "Responses are slow (above 2s)".yellow());
        }
    }

    Ok(if report.summary.overall_status == OverallStatus::Ok {
        0
    } else {
        1
    })
}

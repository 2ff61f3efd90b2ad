//! Command-line client for the personal daily task ledger.
//!
//! Talks to a `taskday-server` over WebSocket. Configuration via CLI flags,
//! environment variables, or config file (`~/.config/taskday/config.toml`).
//!
//! ```bash
//! taskday --server-url ws://127.0.0.1:9100/ws --token alice-token add "Buy milk"
//! TASKDAY_SERVER_URL=ws://127.0.0.1:9100/ws TASKDAY_TOKEN=alice-token taskday today
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;

use taskday::clock::SystemClock;
use taskday::config::{CliArgs, ClientConfig};
use taskday::ledger::{LedgerError, TaskLedger};
use taskday::notify::NotificationFeed;
use taskday::output;
use taskday::report::{DEFAULT_BREAKDOWN_WEEKS, MAX_BREAKDOWN_WEEKS, Period};
use taskday::session::Session;
use taskday::store::remote::RemoteStore;
use taskday_proto::notification::NotificationId;
use taskday_proto::task::{Partition, TaskId};

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(version, about = "Personal daily task ledger")]
struct Cli {
    #[command(flatten)]
    args: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a task.
    Add {
        /// Task title.
        title: String,
        /// Make it a daily habit that resets every day.
        #[arg(long)]
        recurring: bool,
    },
    /// Complete or reopen a task.
    Toggle { id: TaskId },
    /// Delete a task.
    Rm { id: TaskId },
    /// Set the order of the active or recurring tasks.
    Reorder {
        /// `active` or `recurring`.
        partition: Partition,
        /// Every task id of the partition, in the new order.
        #[arg(required = true)]
        ids: Vec<TaskId>,
    },
    /// Open tasks and all daily habits.
    Today,
    /// Daily habits.
    Recurring,
    /// Completed tasks, most recent first.
    History,
    /// Tasks created and completed on a day (YYYY-MM-DD).
    On { date: NaiveDate },
    /// Share of today's tasks that are done.
    Progress,
    /// Score for the current week or month.
    Report {
        /// `week` or `month`.
        period: Period,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Week-by-week scores from the start of a month.
    Breakdown {
        /// First day to count from (default: first of the current month).
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Number of weeks.
        #[arg(
            long,
            default_value_t = DEFAULT_BREAKDOWN_WEEKS,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_BREAKDOWN_WEEKS))
        )]
        weeks: u32,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// List or manage notifications.
    Notifications {
        #[command(subcommand)]
        action: Option<NotificationAction>,
    },
}

#[derive(Subcommand, Debug)]
enum NotificationAction {
    /// List notifications, newest first.
    List,
    /// Mark one as read.
    Read { id: NotificationId },
    /// Delete one.
    Rm { id: NotificationId },
    /// Delete all.
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ClientConfig::load(&cli.args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());
    tracing::debug!(command = ?cli.command, "taskday starting");

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::warn!(err = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging so stdout stays clean for command output.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskday.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Connects to the server and authenticates, yielding the session.
async fn connect(config: &ClientConfig) -> Result<(RemoteStore, Session), Box<dyn std::error::Error + Send + Sync>> {
    let url = config
        .server_url
        .as_deref()
        .ok_or("no server configured (set --server-url or [server] url)")?;
    let Some(token) = config.token.as_deref() else {
        return Err(LedgerError::Unauthenticated.into());
    };
    let store = RemoteStore::connect(url, token, config.request_timeout).await?;
    let session = Session::Authenticated(store.owner().clone());
    Ok((store, session))
}

async fn run(command: Command, config: &ClientConfig) -> CliResult {
    let (store, session) = connect(config).await?;

    if let Command::Notifications { action } = command {
        return run_notifications(action.unwrap_or(NotificationAction::List), &store, &session, config).await;
    }

    let mut ledger = TaskLedger::open(store, &session, Arc::new(SystemClock), config.utc_offset)
        .await?
        .with_max_title_len(config.max_title_len)
        .with_report_caps(config.report_caps);
    let offset = ledger.offset();

    match command {
        Command::Add { title, recurring } => {
            let task = ledger.add_task(&title, recurring).await?;
            eprintln!("Task added");
            println!("{}", task.id);
        }
        Command::Toggle { id } => {
            let task = ledger.toggle_task(&id).await?;
            eprintln!(
                "{} \"{}\"",
                if task.completed { "Completed" } else { "Reopened" },
                task.title
            );
        }
        Command::Rm { id } => {
            ledger.delete_task(&id).await?;
            eprintln!("Task deleted");
        }
        Command::Reorder { partition, ids } => {
            ledger.reorder(partition, &ids).await?;
            print!("{}", output::format_task_list(&ledger.view_today()));
        }
        Command::Today => print!("{}", output::format_task_list(&ledger.view_today())),
        Command::Recurring => print!("{}", output::format_task_list(&ledger.view_recurring())),
        Command::History => print!("{}", output::format_history(&ledger.view_history(), offset)),
        Command::On { date } => print!("{}", output::format_day(&ledger.tasks_on_date(date), offset)),
        Command::Progress => println!("{}%", ledger.progress()),
        Command::Report { period, json } => {
            let report = ledger.report(period, ledger.today()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", output::format_report(&report, offset));
            }
        }
        Command::Breakdown { from, weeks, json } => {
            let today = ledger.today();
            let start = from.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
            let rows = ledger.weekly_breakdown(start, weeks).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print!("{}", output::format_breakdown(&rows, offset));
            }
        }
        Command::Notifications { .. } => {}
    }
    Ok(())
}

async fn run_notifications(
    action: NotificationAction,
    store: &RemoteStore,
    session: &Session,
    config: &ClientConfig,
) -> CliResult {
    let feed = NotificationFeed::new(store, session)?;
    match action {
        NotificationAction::List => {
            let all = feed.fetch().await;
            print!("{}", output::format_notifications(&all, config.utc_offset));
            eprintln!("{} unread", NotificationFeed::<RemoteStore>::unread_count(&all));
        }
        NotificationAction::Read { id } => feed.mark_read(&id).await?,
        NotificationAction::Rm { id } => feed.delete(&id).await?,
        NotificationAction::Clear => {
            let n = feed.clear_all().await?;
            eprintln!("{n} notifications cleared");
        }
    }
    Ok(())
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use slotwise_core::time::parse_local_to_utc;
use slotwise_core::{Priority, Request, ScheduleRequest, SyncRequest, Task, TaskKind};
use slotwise_sync::{SyncMode, SyncReport};
use std::io::Read;
use std::path::PathBuf;

mod app;
mod config;
#[cfg(feature = "gcal")]
mod google_calendar;
mod ics;
mod logging;
mod state;

use app::App;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SLOTWISE_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "slotwise", version = VERSION, about = "Priority-driven task slotting with calendar sync")]
struct Cli {
    /// Debug logging (overrides SLOTWISE_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage ~/.slotwise/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Add, list and close tasks
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Assign time slots to pending tasks
    Schedule {
        /// Re-slot tasks that already have a slot
        #[arg(long)]
        force: bool,

        /// Push event tasks to the calendar afterwards
        #[arg(long)]
        sync: bool,
    },

    /// Push event tasks to the configured calendar
    Sync {
        /// Respect the auto-sync cooldown
        #[arg(long)]
        auto: bool,

        /// Unlink tasks whose calendar events were deleted remotely first
        #[arg(long)]
        reconcile: bool,
    },

    /// Show this month's usage
    Quota,

    /// Handle a JSON request (`{"action": "schedule" | "sync", ...}`) from a file or `-` for stdin
    Request { input: String },

    /// Calendar provider commands
    Calendar {
        #[command(subcommand)]
        command: CalendarCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config if none exists
    Init,
    /// Print the effective config
    Show,
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    Add {
        title: String,

        #[arg(long, value_enum, default_value_t = PriorityArg::Other)]
        priority: PriorityArg,

        #[arg(long = "type", value_enum, default_value_t = KindArg::Deadline)]
        kind: KindArg,

        /// Due date, local time: "YYYY-MM-DD HH:MM"
        #[arg(long)]
        date: Option<String>,
    },
    List,
    Done { id: String },
    /// Remove a task; its calendar event goes on the next sync
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
enum CalendarCommand {
    /// List events held by the local calendar provider
    List,
    /// Export scheduled tasks as .ics
    ExportIcs {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PriorityArg {
    Do,
    Plan,
    Delegate,
    Other,
}

impl From<PriorityArg> for Priority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::Do => Priority::Do,
            PriorityArg::Plan => Priority::Plan,
            PriorityArg::Delegate => Priority::Delegate,
            PriorityArg::Other => Priority::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Deadline,
    Event,
}

impl From<KindArg> for TaskKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Deadline => TaskKind::Deadline,
            KindArg::Event => TaskKind::Event,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let home = state::ensure_slotwise_home()?;

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config(&home)?,
            ConfigCommand::Show => {
                let cfg = config::load_config(&home)?;
                println!("# {}", config::config_path(&home).display());
                print!("{}", toml::to_string_pretty(&cfg)?);
            }
        },

        Command::Task { command } => {
            let mut app = App::open(home.clone(), config::load_config(&home)?)?;
            task_command(&mut app, command)?;
            app.persist()?;
        }

        Command::Schedule { force, sync } => {
            let mut app = App::open(home.clone(), config::load_config(&home)?)?;
            let mut req = ScheduleRequest::new(app.user_id());
            req.force_reschedule = force;
            let result = app.service.schedule(&req).await;
            app.persist()?;

            let summary = result?;
            println!("Scheduled {} task(s)", summary.scheduled_count);
            for slot in &summary.tasks {
                println!("- {} | {}", slot.id, slot.reasoning);
            }
            if let Some(msg) = &summary.limit_message {
                println!("\n{}", msg);
            }

            if sync {
                let req = SyncRequest::new(app.user_id());
                run_sync(&mut app, &req, SyncMode::Manual, false).await?;
            }
        }

        Command::Sync { auto, reconcile } => {
            let mut app = App::open(home.clone(), config::load_config(&home)?)?;
            let req = SyncRequest::new(app.user_id());
            let mode = if auto { SyncMode::Auto } else { SyncMode::Manual };
            run_sync(&mut app, &req, mode, reconcile).await?;
        }

        Command::Quota => {
            let app = App::open(home.clone(), config::load_config(&home)?)?;
            let status = app.service.quota().status(app.user_id()).await?;
            println!("Tier: {:?}", status.tier);
            for u in &status.usage {
                match u.remaining {
                    Some(left) => println!("{:?}: {} used, {} left", u.operation, u.used, left),
                    None => println!("{:?}: {} used, unlimited", u.operation, u.used),
                }
            }
        }

        Command::Request { input } => {
            let mut app = App::open(home.clone(), config::load_config(&home)?)?;
            handle_request(&mut app, &input).await?;
        }

        Command::Calendar { command } => match command {
            CalendarCommand::List => {
                let app = App::open(home.clone(), config::load_config(&home)?)?;
                for ev in app.local_calendar().events() {
                    println!(
                        "{} | {} | {} -> {}",
                        ev.id,
                        ev.title,
                        ev.start_utc.with_timezone(&app.tz).format("%a %Y-%m-%d %H:%M"),
                        ev.end_utc.with_timezone(&app.tz).format("%H:%M"),
                    );
                }
            }
            CalendarCommand::ExportIcs { out } => {
                let app = App::open(home.clone(), config::load_config(&home)?)?;
                let body = ics::tasks_to_ics(&app.tasks(), chrono::Utc::now());
                match out {
                    Some(p) => {
                        std::fs::write(&p, body).with_context(|| format!("write {}", p.display()))?;
                        println!("Wrote {}", p.display());
                    }
                    None => print!("{}", body),
                }
            }
        },
    }

    Ok(())
}

fn task_command(app: &mut App, command: TaskCommand) -> Result<()> {
    let user = app.user_id().to_string();
    match command {
        TaskCommand::Add {
            title,
            priority,
            kind,
            date,
        } => {
            let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
            let mut task = Task::new(id.clone(), title)
                .with_kind(kind.into())
                .with_priority(priority.into());
            if let Some(d) = date {
                task = task.with_task_date(parse_local_to_utc(&d, app.tz)?);
            }
            task.validate()?;
            app.store.upsert_task(&user, task);
            println!("Added {}", id);
        }

        TaskCommand::List => {
            for t in app.tasks() {
                let slot = match (t.start_date, t.end_date) {
                    (Some(s), Some(e)) => format!(
                        "{} -> {}",
                        s.with_timezone(&app.tz).format("%a %m-%d %H:%M"),
                        e.with_timezone(&app.tz).format("%H:%M")
                    ),
                    _ => "unscheduled".to_string(),
                };
                println!(
                    "{} {} [{}] {:?} {} | {}{}",
                    if t.is_done { "x" } else { " " },
                    t.id,
                    t.priority.label(),
                    t.kind,
                    t.title,
                    slot,
                    if t.external_event_id.is_some() { " (synced)" } else { "" },
                );
            }
        }

        TaskCommand::Done { id } => {
            let task = app.find_task(&id)?;
            app.store.upsert_task(&user, task.done());
            println!("Done {}", id);
        }

        TaskCommand::Remove { id } => {
            let mut task = app.find_task(&id)?;
            if task.external_event_id.is_some() {
                task.priority = Priority::Delete;
                app.store.upsert_task(&user, task);
                println!("Marked {} for removal; its event is deleted on the next sync", id);
            } else {
                app.store.remove_task(&user, &id);
                println!("Removed {}", id);
            }
        }
    }
    Ok(())
}

async fn run_sync(app: &mut App, req: &SyncRequest, mode: SyncMode, reconcile: bool) -> Result<()> {
    let tz = req.resolve_timezone(app.tz)?;
    let engine = app.engine(tz).await?;

    if reconcile {
        let unlinked = app.service.reconcile(req, &engine).await?;
        if !unlinked.is_empty() {
            println!("Unlinked {} task(s) whose events were deleted", unlinked.len());
        }
    }

    let outcome = app.service.sync(req, &engine, mode).await;
    let purged = app.purge_removed();
    app.persist()?;

    match outcome? {
        Some(report) => print_report(&report, purged),
        None => println!("Auto sync skipped: last run was less than 5 minutes ago"),
    }
    Ok(())
}

fn print_report(report: &SyncReport, purged: usize) {
    println!(
        "created {} | updated {} | deleted {} | skipped {} | failed {}",
        report.created.len(),
        report.updated.len(),
        report.deleted.len(),
        report.skipped,
        report.failed.len()
    );
    for f in &report.failed {
        println!("- {} [{}] {}", f.task_id, f.code, f.error);
    }
    if purged > 0 {
        println!("Removed {} task(s) after deleting their events", purged);
    }
}

async fn handle_request(app: &mut App, input: &str) -> Result<()> {
    let raw = if input == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        s
    } else {
        std::fs::read_to_string(input).with_context(|| format!("read {}", input))?
    };

    let req = match Request::from_json(&raw) {
        Ok(r) => r,
        Err(e) => {
            println!("{}", app::error_json(&e));
            return Err(e.into());
        }
    };
    let result = match &req {
        Request::Schedule(r) => app.service.schedule(r).await.map(serde_json::to_value),
        Request::Sync(r) => {
            let tz = r.resolve_timezone(app.tz)?;
            let engine = app.engine(tz).await?;
            app.service
                .sync(r, &engine, SyncMode::Manual)
                .await
                .map(serde_json::to_value)
        }
    };
    app.persist()?;

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value?)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", app::error_json(&e));
            Err(e.into())
        }
    }
}

use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    admin::AdminAction,
    blob::UploadProgress,
    forms::{ImageUpload, ProfileDraft, ScheduleDraft, ShowDraft, ShowEditDraft},
    views::{local_hhmm, ShowCard, WeeklySchedule},
    AdminConsole, AdminError, AppShell, DeletionRequest, HttpConnector, Notice, SessionContext,
};
use shared::{
    domain::{DayOfWeek, Principal, ScheduleId, ShowId, UserRole},
    schedule_time::{format_range, TimeOfDay},
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "catalog", about = "Browse and manage the broadcast show catalog")]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "CATALOG_SERVER_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    server_url: String,
    /// Identity to sign in as. Without it every command runs anonymously.
    #[arg(long, global = true)]
    principal: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Shows,
    /// Weekly schedule, Monday first.
    Schedule {
        #[arg(long)]
        day: Option<DayOfWeek>,
    },
    /// Entries starting at or after a time of day (default: now).
    Upcoming {
        #[arg(long, value_parser = parse_clock)]
        at: Option<TimeOfDay>,
    },
    Whoami,
    Profile {
        #[command(subcommand)]
        action: ProfileCommand,
    },
    AddShow {
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        image: PathBuf,
    },
    EditShow {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    DeleteShow {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    AddSchedule {
        show_id: String,
        #[arg(long)]
        day: DayOfWeek,
        #[arg(long, value_parser = parse_clock)]
        start: TimeOfDay,
        #[arg(long, value_parser = parse_clock)]
        end: TimeOfDay,
    },
    EditSchedule {
        id: i64,
        #[arg(long)]
        show_id: Option<String>,
        #[arg(long)]
        day: Option<DayOfWeek>,
        #[arg(long, value_parser = parse_clock)]
        start: Option<TimeOfDay>,
        #[arg(long, value_parser = parse_clock)]
        end: Option<TimeOfDay>,
    },
    DeleteSchedule {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
    AssignRole {
        principal: String,
        role: UserRole,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    Set { name: String },
}

/// Parses `HH:MM` on a 24-hour clock.
fn parse_clock(raw: &str) -> Result<TimeOfDay, String> {
    let (hour, minute) = raw
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("expected HH:MM, got '{raw}'"))?;
    let hour: u8 = hour
        .parse()
        .map_err(|_| format!("invalid hour in '{raw}'"))?;
    let minute: u8 = minute
        .parse()
        .map_err(|_| format!("invalid minute in '{raw}'"))?;
    TimeOfDay::new(hour, minute).map_err(|err| err.to_string())
}

fn load_image(path: &Path) -> Result<ImageUpload> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    debug!(path = %path.display(), mime = %mime, size = bytes.len(), "loaded image");
    Ok(ImageUpload::new(bytes, mime.essence_str())?)
}

fn progress_bar() -> UploadProgress {
    Arc::new(|pct: u8| {
        eprint!("\rUploading image... {pct:>3}%");
        if pct == 100 {
            eprintln!();
        }
    })
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Prints the admin notice for `outcome` and turns failures into errors.
fn report<T>(action: AdminAction, outcome: Result<T, AdminError>) -> Result<T> {
    match Notice::for_outcome(action, &outcome) {
        Notice::Success(message) => println!("{message}"),
        Notice::Error(message) => eprintln!("{message}"),
    }
    outcome.map_err(|err| anyhow!(err))
}

fn print_shows(cards: &[ShowCard]) {
    if cards.is_empty() {
        println!("No shows yet.");
        return;
    }
    for card in cards {
        println!("{}  {}", card.id, card.title);
        println!("    {}", card.description);
        println!("    image: {}", card.image_url);
    }
}

fn print_week(week: &WeeklySchedule, only: Option<DayOfWeek>) {
    if week.is_empty() {
        println!("No schedules yet.");
        return;
    }
    for group in week.days() {
        if only.is_some_and(|day| day != group.day) {
            continue;
        }
        println!("{}", group.day);
        if group.entries.is_empty() {
            println!("    (nothing scheduled)");
        }
        for entry in &group.entries {
            println!("    [{}] {}  {}", entry.id, entry.time_range, entry.show_title);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let connector = Arc::new(HttpConnector::new(cli.server_url.clone()));
    let session = Arc::new(SessionContext::init(connector).await?);
    if let Some(principal) = &cli.principal {
        session
            .login(Principal::new(principal.trim()))
            .await
            .context("login failed")?;
    }
    let app = AppShell::new(Arc::clone(&session));

    match cli.command {
        Command::Shows => {
            let home = app.home().await?;
            print_shows(&home.shows);
        }
        Command::Schedule { day } => {
            let home = app.home().await?;
            print_week(&home.schedule, day);
        }
        Command::Upcoming { at } => {
            let now = at.map(TimeOfDay::encode).unwrap_or_else(local_hhmm);
            let sync = session.sync().await;
            let shows = sync.shows().await?;
            let upcoming = sync.upcoming_schedules(now).await?;
            if upcoming.is_empty() {
                println!("Nothing else on air today.");
            }
            for schedule in upcoming {
                let title = shows
                    .iter()
                    .find(|show| show.id == schedule.show_id)
                    .map_or(client_core::views::UNKNOWN_SHOW, |show| show.title.as_str());
                println!(
                    "{}  {}  {}",
                    schedule.day_of_week,
                    format_range(schedule.start_time, schedule.end_time),
                    title
                );
            }
        }
        Command::Whoami => {
            let view = app.view().await;
            match session.identity().await {
                Some(principal) => println!("principal: {principal}"),
                None => println!("principal: (anonymous)"),
            }
            let sync = session.sync().await;
            match sync.caller_role().await {
                Ok(role) => println!("role: {role}"),
                Err(err) => warn!(error = %err, "role lookup failed"),
            }
            println!("admin: {}", view.is_admin);
            if view.is_authenticated {
                match sync.caller_profile().await? {
                    Some(profile) => println!("name: {}", profile.name),
                    None => println!("name: (not set, run `profile set <name>`)"),
                }
            }
        }
        Command::Profile {
            action: ProfileCommand::Set { name },
        } => {
            if !session.is_authenticated().await {
                bail!("--principal is required to save a profile");
            }
            app.complete_profile(&ProfileDraft { name }).await?;
            println!("Profile saved.");
        }
        Command::AddShow {
            id,
            title,
            description,
            image,
        } => {
            let console = app.admin_console().await?;
            let draft = ShowDraft {
                id,
                title,
                description,
                image: Some(load_image(&image)?),
            };
            let show = report(
                AdminAction::AddShow,
                console.add_show(draft, Some(progress_bar())).await,
            )?;
            debug!(show_id = %show.id, image = %show.image, "show stored");
        }
        Command::EditShow {
            id,
            title,
            description,
            image,
        } => {
            let console = app.admin_console().await?;
            let current = session.sync().await.show(&ShowId::new(id)).await?;
            let mut draft = ShowEditDraft::from_show(&current);
            if let Some(title) = title {
                draft.title = title;
            }
            if let Some(description) = description {
                draft.description = description;
            }
            if let Some(path) = image {
                draft.image = Some(load_image(&path)?);
            }
            report(
                AdminAction::EditShow,
                console.edit_show(draft, Some(progress_bar())).await,
            )?;
        }
        Command::DeleteShow { id, yes } => {
            let console = app.admin_console().await?;
            let show = session.sync().await.show(&ShowId::new(id)).await?;
            let request = DeletionRequest::show(&show);
            delete(&console, request, yes).await?;
        }
        Command::AddSchedule {
            show_id,
            day,
            start,
            end,
        } => {
            let console = app.admin_console().await?;
            let draft = ScheduleDraft {
                show_id: Some(ShowId::new(show_id)),
                day_of_week: Some(day),
                start_hour: Some(start.hour()),
                start_minute: start.minute(),
                end_hour: Some(end.hour()),
                end_minute: end.minute(),
                stored_minutes: (None, None),
            };
            report(AdminAction::AddSchedule, console.add_schedule(&draft).await)?;
        }
        Command::EditSchedule {
            id,
            show_id,
            day,
            start,
            end,
        } => {
            let console = app.admin_console().await?;
            let id = ScheduleId(id);
            let current = find_schedule(&session, id).await?;
            let mut draft = ScheduleDraft::from_schedule(&current);
            if let Some(show_id) = show_id {
                draft.show_id = Some(ShowId::new(show_id));
            }
            if let Some(day) = day {
                draft.day_of_week = Some(day);
            }
            if let Some(start) = start {
                draft.start_hour = Some(start.hour());
                draft.start_minute = start.minute();
            }
            if let Some(end) = end {
                draft.end_hour = Some(end.hour());
                draft.end_minute = end.minute();
            }
            report(
                AdminAction::EditSchedule,
                console.edit_schedule(id, &draft).await,
            )?;
        }
        Command::DeleteSchedule { id, yes } => {
            let console = app.admin_console().await?;
            let current = find_schedule(&session, ScheduleId(id)).await?;
            delete(&console, DeletionRequest::schedule(&current), yes).await?;
        }
        Command::AssignRole { principal, role } => {
            if !session.is_authenticated().await {
                bail!("--principal is required to assign roles");
            }
            let target = Principal::new(principal.trim());
            session.sync().await.assign_role(&target, role).await?;
            println!("Assigned {role} to {target}.");
        }
    }
    Ok(())
}

async fn find_schedule(
    session: &SessionContext,
    id: ScheduleId,
) -> Result<shared::domain::Schedule> {
    session
        .sync()
        .await
        .schedules()
        .await?
        .into_iter()
        .find(|schedule| schedule.id == id)
        .ok_or_else(|| anyhow!("schedule {id} not found"))
}

async fn delete(console: &AdminConsole, request: DeletionRequest, yes: bool) -> Result<()> {
    if !yes && !confirm(&request.prompt)? {
        println!("Cancelled.");
        return Ok(());
    }
    let action = request.action();
    report(action, console.confirm_deletion(request).await)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();
    run(Cli::parse()).await
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::{
    domain::{DayOfWeek, Principal, UserRole},
    schedule_time::format_range,
};
use storage::Storage;

/// Operator commands run directly against the catalog database.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/catalog.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Grants a role without going through the API, e.g. to recover admin access.
    AssignRole { principal: String, role: UserRole },
    ListRoles,
    ListShows,
    ListSchedules {
        #[arg(long)]
        day: Option<DayOfWeek>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;

    match cli.command {
        Command::AssignRole { principal, role } => {
            let principal = Principal::new(principal.trim());
            storage.assign_role(&principal, role).await?;
            println!("assigned role={role} to principal={principal}");
        }
        Command::ListRoles => {
            for assignment in storage.list_role_assignments().await? {
                println!(
                    "{}\t{}\t{}",
                    assignment.principal, assignment.role, assignment.assigned_at
                );
            }
        }
        Command::ListShows => {
            for show in storage.list_shows().await? {
                println!("{}\t{}\t{}", show.id, show.title, show.image);
            }
        }
        Command::ListSchedules { day } => {
            let schedules = match day {
                Some(day) => storage.list_schedules_for_day(day).await?,
                None => storage.list_schedules().await?,
            };
            for schedule in schedules {
                println!(
                    "{}\t{}\t{}\t{}",
                    schedule.id,
                    schedule.day_of_week,
                    format_range(schedule.start_time, schedule.end_time),
                    schedule.show_id
                );
            }
        }
    }

    Ok(())
}

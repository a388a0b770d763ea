use std::{fs, path::Path, str::FromStr};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};

use shared::domain::{
    DayOfWeek, ImageRef, Principal, Schedule, ScheduleId, Show, ShowId, UserProfile, UserRole,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub show_id: ShowId,
    pub start_time: u32,
    pub end_time: u32,
    pub day_of_week: DayOfWeek,
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub id: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RoleAssignment {
    pub principal: Principal,
    pub role: UserRole,
    pub assigned_at: NaiveDateTime,
}

const SCHEDULE_COLUMNS: &str = "id, show_id, start_time, end_time, day_of_week";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Returns `false` when a show with the same id already exists.
    pub async fn insert_show(&self, show: &Show) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO shows (id, title, description, image_url) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(show.id.as_str())
        .bind(&show.title)
        .bind(&show.description)
        .bind(show.image.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn update_show(&self, show: &Show) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE shows
             SET title = ?, description = ?, image_url = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?",
        )
        .bind(&show.title)
        .bind(&show.description)
        .bind(show.image.as_str())
        .bind(show.id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Deletes the show together with every schedule that references it.
    pub async fn delete_show(&self, id: &ShowId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM schedules WHERE show_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .context("failed to delete schedules for show")?;
        let result = sqlx::query("DELETE FROM shows WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn load_show(&self, id: &ShowId) -> Result<Option<Show>> {
        let row = sqlx::query("SELECT id, title, description, image_url FROM shows WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| show_from_row(&r)))
    }

    pub async fn list_shows(&self) -> Result<Vec<Show>> {
        let rows = sqlx::query(
            "SELECT id, title, description, image_url FROM shows ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(show_from_row).collect())
    }

    pub async fn insert_schedule(&self, schedule: &NewSchedule) -> Result<ScheduleId> {
        let rec = sqlx::query(
            "INSERT INTO schedules (show_id, start_time, end_time, day_of_week)
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(schedule.show_id.as_str())
        .bind(i64::from(schedule.start_time))
        .bind(i64::from(schedule.end_time))
        .bind(schedule.day_of_week.label())
        .fetch_one(&self.pool)
        .await?;
        Ok(ScheduleId(rec.get::<i64, _>(0)))
    }

    pub async fn update_schedule(&self, id: ScheduleId, schedule: &NewSchedule) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE schedules SET show_id = ?, start_time = ?, end_time = ?, day_of_week = ?
             WHERE id = ?",
        )
        .bind(schedule.show_id.as_str())
        .bind(i64::from(schedule.start_time))
        .bind(i64::from(schedule.end_time))
        .bind(schedule.day_of_week.label())
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_schedule(&self, id: ScheduleId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    pub async fn list_schedules_for_day(&self, day: DayOfWeek) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE day_of_week = ?
             ORDER BY start_time ASC, id ASC"
        ))
        .bind(day.label())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    pub async fn list_schedules_for_show(&self, show_id: &ShowId) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE show_id = ? ORDER BY id ASC"
        ))
        .bind(show_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    /// Schedules starting at or after `current_time` (HHMM), earliest first.
    pub async fn list_schedules_starting_from(&self, current_time: u32) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE start_time >= ?
             ORDER BY start_time ASC, id ASC"
        ))
        .bind(i64::from(current_time))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    pub async fn load_profile(&self, principal: &Principal) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT name FROM user_profiles WHERE principal = ?")
            .bind(principal.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| UserProfile {
            name: r.get::<String, _>(0),
        }))
    }

    pub async fn save_profile(&self, principal: &Principal, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_profiles (principal, name) VALUES (?, ?)
             ON CONFLICT(principal) DO UPDATE SET name = excluded.name, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(principal.as_str())
        .bind(&profile.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn role_for(&self, principal: &Principal) -> Result<Option<UserRole>> {
        let row = sqlx::query("SELECT role FROM user_roles WHERE principal = ?")
            .bind(principal.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| parse_role(&r.get::<String, _>(0))).transpose()
    }

    pub async fn assign_role(&self, principal: &Principal, role: UserRole) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_roles (principal, role) VALUES (?, ?)
             ON CONFLICT(principal) DO UPDATE SET role = excluded.role, assigned_at = CURRENT_TIMESTAMP",
        )
        .bind(principal.as_str())
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records a principal on first sight. The first principal ever
    /// registered becomes admin; later ones are users, even after every
    /// admin has been demoted. Existing roles are returned unchanged.
    pub async fn register_principal(&self, principal: &Principal) -> Result<UserRole> {
        // Single statement so concurrent first logins never race on the bootstrap.
        sqlx::query(
            "INSERT INTO user_roles (principal, role)
             SELECT ?, CASE WHEN EXISTS (SELECT 1 FROM user_roles) THEN 'user' ELSE 'admin' END
             WHERE true
             ON CONFLICT(principal) DO NOTHING",
        )
        .bind(principal.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to register principal '{principal}'"))?;

        self.role_for(principal)
            .await?
            .with_context(|| format!("principal '{principal}' missing after registration"))
    }

    pub async fn list_role_assignments(&self) -> Result<Vec<RoleAssignment>> {
        let rows = sqlx::query(
            "SELECT principal, role, assigned_at FROM user_roles ORDER BY assigned_at ASC, principal ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                Ok(RoleAssignment {
                    principal: Principal::new(r.get::<String, _>(0)),
                    role: parse_role(&r.get::<String, _>(1))?,
                    assigned_at: r.get::<NaiveDateTime, _>(2),
                })
            })
            .collect()
    }

    /// Blobs are content addressed, so storing the same id twice is a no-op.
    pub async fn store_blob(&self, id: &str, content_type: &str, bytes: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT INTO blobs (id, content_type, size_bytes, bytes) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(content_type)
        .bind(bytes.len() as i64)
        .bind(bytes)
        .execute(&self.pool)
        .await
        .context("failed to store blob")?;
        Ok(())
    }

    pub async fn load_blob(&self, id: &str) -> Result<Option<StoredBlob>> {
        let row = sqlx::query("SELECT id, content_type, bytes FROM blobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| StoredBlob {
            id: r.get::<String, _>(0),
            content_type: r.get::<String, _>(1),
            bytes: r.get::<Vec<u8>, _>(2),
        }))
    }
}

fn show_from_row(row: &SqliteRow) -> Show {
    Show {
        id: ShowId::new(row.get::<String, _>(0)),
        title: row.get::<String, _>(1),
        description: row.get::<String, _>(2),
        image: ImageRef::new(row.get::<String, _>(3)),
    }
}

fn schedule_from_row(row: &SqliteRow) -> Result<Schedule> {
    let day_label = row.get::<String, _>(4);
    Ok(Schedule {
        id: ScheduleId(row.get::<i64, _>(0)),
        show_id: ShowId::new(row.get::<String, _>(1)),
        start_time: time_column(row.get::<i64, _>(2))?,
        end_time: time_column(row.get::<i64, _>(3))?,
        day_of_week: day_label
            .parse()
            .with_context(|| format!("stored schedule has bad day '{day_label}'"))?,
    })
}

fn time_column(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("stored schedule time {value} is out of range"))
}

fn parse_role(raw: &str) -> Result<UserRole> {
    raw.parse()
        .with_context(|| format!("stored role '{raw}' is not recognised"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return Ok(());
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create parent directory '{}' for database url '{database_url}'",
                    parent.display()
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

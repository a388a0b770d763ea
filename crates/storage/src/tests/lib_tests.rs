use super::*;

fn show(id: &str, title: &str) -> Show {
    Show {
        id: ShowId::new(id),
        title: title.to_string(),
        description: format!("{title} description"),
        image: ImageRef::new(format!("https://cdn.example/{id}.png")),
    }
}

fn slot(show_id: &str, day: DayOfWeek, start_time: u32, end_time: u32) -> NewSchedule {
    NewSchedule {
        show_id: ShowId::new(show_id),
        start_time,
        end_time,
        day_of_week: day,
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("catalog.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn stores_and_lists_shows_in_insertion_order() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(storage.insert_show(&show("morning", "Morning Drive")).await.expect("insert"));
    assert!(storage.insert_show(&show("evening", "Evening Twang")).await.expect("insert"));

    let shows = storage.list_shows().await.expect("list");
    let ids: Vec<_> = shows.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["morning", "evening"]);

    let loaded = storage
        .load_show(&ShowId::new("evening"))
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded.title, "Evening Twang");
}

#[tokio::test]
async fn duplicate_show_id_is_not_inserted() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(storage.insert_show(&show("morning", "First")).await.expect("insert"));
    assert!(!storage.insert_show(&show("morning", "Second")).await.expect("insert"));

    let loaded = storage
        .load_show(&ShowId::new("morning"))
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded.title, "First");
}

#[tokio::test]
async fn updates_existing_show_only() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.insert_show(&show("morning", "Morning")).await.expect("insert");

    let mut edited = show("morning", "Morning Drive Time");
    edited.image = ImageRef::new("https://cdn.example/new.png");
    assert!(storage.update_show(&edited).await.expect("update"));
    assert!(!storage.update_show(&show("ghost", "Ghost")).await.expect("update"));

    let loaded = storage
        .load_show(&ShowId::new("morning"))
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded, edited);
}

#[tokio::test]
async fn deleting_show_removes_its_schedules() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.insert_show(&show("morning", "Morning")).await.expect("insert");
    storage.insert_show(&show("evening", "Evening")).await.expect("insert");
    storage
        .insert_schedule(&slot("morning", DayOfWeek::Monday, 600, 900))
        .await
        .expect("schedule");
    storage
        .insert_schedule(&slot("evening", DayOfWeek::Monday, 1800, 2000))
        .await
        .expect("schedule");

    assert!(storage.delete_show(&ShowId::new("morning")).await.expect("delete"));
    assert!(!storage.delete_show(&ShowId::new("morning")).await.expect("delete"));

    let remaining = storage.list_schedules().await.expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].show_id, ShowId::new("evening"));
}

#[tokio::test]
async fn filters_schedules_by_day_show_and_start_time() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.insert_show(&show("morning", "Morning")).await.expect("insert");
    storage.insert_show(&show("noon", "Noon")).await.expect("insert");

    storage
        .insert_schedule(&slot("noon", DayOfWeek::Tuesday, 1200, 1300))
        .await
        .expect("schedule");
    storage
        .insert_schedule(&slot("morning", DayOfWeek::Tuesday, 600, 900))
        .await
        .expect("schedule");
    storage
        .insert_schedule(&slot("morning", DayOfWeek::Friday, 630, 930))
        .await
        .expect("schedule");

    let tuesday = storage
        .list_schedules_for_day(DayOfWeek::Tuesday)
        .await
        .expect("tuesday");
    let starts: Vec<_> = tuesday.iter().map(|s| s.start_time).collect();
    assert_eq!(starts, vec![600, 1200]);

    let morning = storage
        .list_schedules_for_show(&ShowId::new("morning"))
        .await
        .expect("by show");
    assert_eq!(morning.len(), 2);

    let upcoming = storage
        .list_schedules_starting_from(630)
        .await
        .expect("upcoming");
    let starts: Vec<_> = upcoming.iter().map(|s| s.start_time).collect();
    assert_eq!(starts, vec![630, 1200]);
}

#[tokio::test]
async fn updates_and_deletes_schedule() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.insert_show(&show("morning", "Morning")).await.expect("insert");
    let id = storage
        .insert_schedule(&slot("morning", DayOfWeek::Monday, 600, 900))
        .await
        .expect("schedule");

    assert!(storage
        .update_schedule(id, &slot("morning", DayOfWeek::Sunday, 700, 1000))
        .await
        .expect("update"));
    let schedules = storage.list_schedules().await.expect("list");
    assert_eq!(schedules[0].day_of_week, DayOfWeek::Sunday);
    assert_eq!((schedules[0].start_time, schedules[0].end_time), (700, 1000));

    assert!(storage.delete_schedule(id).await.expect("delete"));
    assert!(!storage.delete_schedule(id).await.expect("delete"));
}

#[tokio::test]
async fn schedule_for_unknown_show_violates_foreign_key() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let result = storage
        .insert_schedule(&slot("missing", DayOfWeek::Monday, 600, 900))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn first_registered_principal_becomes_admin() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage
        .register_principal(&Principal::new("station-owner"))
        .await
        .expect("register");
    let second = storage
        .register_principal(&Principal::new("listener"))
        .await
        .expect("register");
    let again = storage
        .register_principal(&Principal::new("station-owner"))
        .await
        .expect("register");

    assert_eq!(first, UserRole::Admin);
    assert_eq!(second, UserRole::User);
    assert_eq!(again, UserRole::Admin);

    storage
        .assign_role(&Principal::new("listener"), UserRole::Admin)
        .await
        .expect("assign");
    let assignments = storage.list_role_assignments().await.expect("list");
    assert!(assignments
        .iter()
        .all(|assignment| assignment.role == UserRole::Admin));
}

#[tokio::test]
async fn demoting_the_only_admin_does_not_promote_newcomers() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let owner = Principal::new("station-owner");
    assert_eq!(
        storage.register_principal(&owner).await.expect("register"),
        UserRole::Admin
    );
    storage
        .assign_role(&owner, UserRole::User)
        .await
        .expect("demote");

    let newcomer = storage
        .register_principal(&Principal::new("drive-by"))
        .await
        .expect("register");
    assert_eq!(newcomer, UserRole::User);
    assert_eq!(
        storage.role_for(&owner).await.expect("role"),
        Some(UserRole::User)
    );
}

#[tokio::test]
async fn saves_and_overwrites_profiles() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let principal = Principal::new("listener");
    assert!(storage.load_profile(&principal).await.expect("load").is_none());

    storage
        .save_profile(&principal, &UserProfile { name: "Dolly".into() })
        .await
        .expect("save");
    storage
        .save_profile(&principal, &UserProfile { name: "Dolly P".into() })
        .await
        .expect("save");

    let profile = storage
        .load_profile(&principal)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(profile.name, "Dolly P");
}

#[tokio::test]
async fn blobs_are_stored_once_per_id() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .store_blob("abc", "image/png", b"first")
        .await
        .expect("store");
    storage
        .store_blob("abc", "image/png", b"second")
        .await
        .expect("store");

    let blob = storage.load_blob("abc").await.expect("load").expect("present");
    assert_eq!(blob.bytes, b"first");
    assert_eq!(blob.content_type, "image/png");
    assert!(storage.load_blob("missing").await.expect("load").is_none());
}

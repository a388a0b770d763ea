use super::*;

async fn setup() -> (ApiContext, Caller, Caller) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let ctx = ApiContext {
        storage,
        session: SessionConfig {
            issuer: "catalog-test".into(),
            secret: "s".into(),
            ttl_seconds: 60,
        },
        public_url: None,
        max_blob_bytes: 1024,
    };
    let admin = login(&ctx, &Principal::new("station-owner"))
        .await
        .expect("admin login");
    assert_eq!(admin.role, UserRole::Admin);
    let listener = login(&ctx, &Principal::new("listener"))
        .await
        .expect("listener login");
    assert_eq!(listener.role, UserRole::User);

    let admin = resolve_caller(&ctx, Some(&admin.token)).expect("admin caller");
    let listener = resolve_caller(&ctx, Some(&listener.token)).expect("listener caller");
    (ctx, admin, listener)
}

fn add_request(id: &str) -> AddShowRequest {
    AddShowRequest {
        id: ShowId::new(id),
        title: "  Morning Drive ".into(),
        description: "Coffee and fiddles".into(),
        image: ImageRef::new("https://cdn.example/morning.png"),
    }
}

fn slot(show_id: &str, start_time: u32, end_time: u32) -> ScheduleRequest {
    ScheduleRequest {
        show_id: ShowId::new(show_id),
        start_time,
        end_time,
        day_of_week: DayOfWeek::Monday,
    }
}

#[tokio::test]
async fn anonymous_caller_is_guest() {
    let (ctx, _, _) = setup().await;
    let caller = resolve_caller(&ctx, None).expect("anonymous");
    assert_eq!(caller, Caller::Anonymous);
    assert_eq!(
        caller_role(&ctx, &caller).await.expect("role"),
        UserRole::Guest
    );
}

#[tokio::test]
async fn bad_token_is_unauthorized() {
    let (ctx, _, _) = setup().await;
    let err = resolve_caller(&ctx, Some("not-a-token")).expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn only_admin_can_add_shows() {
    let (ctx, admin, listener) = setup().await;

    let err = add_show(&ctx, &listener, add_request("morning"))
        .await
        .expect_err("listener should be rejected");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = add_show(&ctx, &Caller::Anonymous, add_request("morning"))
        .await
        .expect_err("guest should be rejected");
    assert_eq!(err.code, ErrorCode::Unauthorized);

    let show = add_show(&ctx, &admin, add_request("morning"))
        .await
        .expect("admin adds");
    assert_eq!(show.title, "Morning Drive");
    assert_eq!(list_shows(&ctx).await.expect("list").len(), 1);
}

#[tokio::test]
async fn duplicate_show_id_is_a_validation_error() {
    let (ctx, admin, _) = setup().await;
    add_show(&ctx, &admin, add_request("morning"))
        .await
        .expect("first");
    let err = add_show(&ctx, &admin, add_request("morning"))
        .await
        .expect_err("duplicate");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn editing_missing_show_is_not_found() {
    let (ctx, admin, _) = setup().await;
    let err = edit_show(
        &ctx,
        &admin,
        &ShowId::new("ghost"),
        EditShowRequest {
            title: "Ghost".into(),
            description: "Nobody home".into(),
            image: ImageRef::new("https://cdn.example/ghost.png"),
        },
    )
    .await
    .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn schedule_writes_check_show_and_time_range() {
    let (ctx, admin, _) = setup().await;
    add_show(&ctx, &admin, add_request("morning"))
        .await
        .expect("show");

    let err = add_schedule(&ctx, &admin, slot("morning", 900, 900))
        .await
        .expect_err("empty range");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = add_schedule(&ctx, &admin, slot("morning", 900, 2460))
        .await
        .expect_err("bad end");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = add_schedule(&ctx, &admin, slot("ghost", 900, 1000))
        .await
        .expect_err("missing show");
    assert_eq!(err.code, ErrorCode::NotFound);

    let schedule = add_schedule(&ctx, &admin, slot("morning", 600, 900))
        .await
        .expect("valid slot");
    let edited = edit_schedule(&ctx, &admin, schedule.id, slot("morning", 615, 930))
        .await
        .expect("edit");
    assert_eq!(edited.start_time, 615);
}

#[tokio::test]
async fn deleting_show_cascades_to_schedules() {
    let (ctx, admin, _) = setup().await;
    add_show(&ctx, &admin, add_request("morning"))
        .await
        .expect("show");
    add_schedule(&ctx, &admin, slot("morning", 600, 900))
        .await
        .expect("schedule");

    delete_show(&ctx, &admin, &ShowId::new("morning"))
        .await
        .expect("delete");
    assert!(list_schedules(&ctx).await.expect("list").is_empty());

    let err = delete_show(&ctx, &admin, &ShowId::new("morning"))
        .await
        .expect_err("already gone");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn upcoming_rejects_invalid_current_time() {
    let (ctx, _, _) = setup().await;
    let err = upcoming_schedules(&ctx, 2500)
        .await
        .expect_err("invalid time");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn profiles_require_sign_in_and_ownership() {
    let (ctx, admin, listener) = setup().await;

    let err = caller_profile(&ctx, &Caller::Anonymous)
        .await
        .expect_err("guest");
    assert_eq!(err.code, ErrorCode::Unauthorized);

    assert!(caller_profile(&ctx, &listener)
        .await
        .expect("profile")
        .is_none());
    save_caller_profile(&ctx, &listener, UserProfile { name: " Hank ".into() })
        .await
        .expect("save");
    assert_eq!(
        caller_profile(&ctx, &listener).await.expect("profile"),
        Some(UserProfile {
            name: "Hank".into()
        })
    );

    let err = save_caller_profile(&ctx, &listener, UserProfile { name: "  ".into() })
        .await
        .expect_err("blank name");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = user_profile(&ctx, &listener, &Principal::new("station-owner"))
        .await
        .expect_err("not own profile");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let seen_by_admin = user_profile(&ctx, &admin, &Principal::new("listener"))
        .await
        .expect("admin view");
    assert!(seen_by_admin.is_some());
}

#[tokio::test]
async fn admin_assigns_roles() {
    let (ctx, admin, listener) = setup().await;

    let err = assign_role(&ctx, &listener, &Principal::new("listener"), UserRole::Admin)
        .await
        .expect_err("self promotion");
    assert_eq!(err.code, ErrorCode::Forbidden);

    assign_role(&ctx, &admin, &Principal::new("listener"), UserRole::Admin)
        .await
        .expect("promote");
    assert!(is_caller_admin(&ctx, &listener).await.expect("role"));
}

#[tokio::test]
async fn blobs_are_content_addressed_and_size_capped() {
    let (ctx, admin, listener) = setup().await;

    let err = store_blob(&ctx, &listener, Some("image/png"), b"png-bytes")
        .await
        .expect_err("non-admin upload");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let stored = store_blob(&ctx, &admin, Some("image/png"), b"png-bytes")
        .await
        .expect("upload");
    assert_eq!(stored.blob_id, content_address(b"png-bytes"));
    assert_eq!(stored.url, format!("/blobs/{}", stored.blob_id));

    let blob = load_blob(&ctx, &stored.blob_id).await.expect("load");
    assert_eq!(blob.bytes, b"png-bytes");

    let oversized = vec![0u8; 2048];
    let err = store_blob(&ctx, &admin, None, &oversized)
        .await
        .expect_err("too large");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[test]
fn content_address_is_sha256_hex() {
    assert_eq!(
        content_address(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

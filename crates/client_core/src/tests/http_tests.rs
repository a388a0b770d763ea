use std::sync::Mutex;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use shared::{error::ErrorCode, protocol::UpcomingQuery};
use tokio::net::TcpListener;

use super::*;

#[derive(Clone, Default)]
struct Seen {
    uploads: Arc<Mutex<Vec<(String, usize)>>>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn spawn_catalog_server() -> anyhow::Result<(String, Seen)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let seen = Seen::default();
    let app = Router::new()
        .route(
            "/session",
            post(|Json(req): Json<LoginRequest>| async move {
                Json(LoginResponse {
                    token: format!("tok-{}", req.principal),
                    role: UserRole::Admin,
                })
            }),
        )
        .route(
            "/shows/:show_id",
            get(|Path(show_id): Path<String>| async move {
                Json(Show {
                    id: ShowId::new(show_id.clone()),
                    title: format!("Show {show_id}"),
                    description: String::new(),
                    image: ImageRef::new(""),
                })
            })
            .delete(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(ApiError::forbidden("only admins can delete shows")),
                )
            }),
        )
        .route(
            "/me/is_admin",
            get(|headers: HeaderMap| async move {
                match bearer(&headers).as_deref() {
                    Some("Bearer tok-station-owner") => Ok(Json(true)),
                    _ => Err((
                        StatusCode::UNAUTHORIZED,
                        Json(ApiError::new(ErrorCode::Unauthorized, "missing session")),
                    )),
                }
            }),
        )
        .route(
            "/me/role",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        )
        .route(
            "/schedules/upcoming",
            get(|Query(query): Query<UpcomingQuery>| async move {
                Json(vec![Schedule {
                    id: ScheduleId(1),
                    show_id: ShowId::new("echo"),
                    start_time: query.current_time,
                    end_time: query.current_time + 100,
                    day_of_week: DayOfWeek::Monday,
                }])
            }),
        )
        .route(
            "/blobs",
            post(
                |State(seen): State<Seen>, headers: HeaderMap, body: Bytes| async move {
                    let content_type = headers
                        .get(header::CONTENT_TYPE)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    seen.uploads
                        .lock()
                        .expect("uploads")
                        .push((content_type, body.len()));
                    Json(BlobUploadResponse {
                        blob_id: "abc123".to_string(),
                        url: "/blobs/abc123".to_string(),
                        size_bytes: body.len() as u64,
                    })
                },
            ),
        )
        .with_state(seen.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), seen))
}

#[test]
fn rejects_unusable_server_urls() {
    assert!(HttpBackend::new("not a url").is_err());
    assert!(HttpBackend::new("mailto:ops@radio.example").is_err());
    assert!(HttpBackend::new(" http://127.0.0.1:8443 ").is_ok());
}

#[test]
fn upload_percent_is_bounded() {
    assert_eq!(upload_percent(0, 0), 100);
    assert_eq!(upload_percent(0, 200), 0);
    assert_eq!(upload_percent(50, 200), 25);
    assert_eq!(upload_percent(500, 200), 100);
}

#[tokio::test]
async fn path_segments_are_escaped() {
    let (server_url, _) = spawn_catalog_server().await.expect("spawn server");
    let backend = HttpBackend::new(&server_url).expect("backend");

    let id = ShowId::new("news & views/late?");
    let show = backend.get_show(&id).await.expect("show");
    assert_eq!(show.id, id);
}

#[tokio::test]
async fn server_error_message_is_surfaced() {
    let (server_url, _) = spawn_catalog_server().await.expect("spawn server");
    let backend = HttpBackend::new(&server_url).expect("backend");

    let err = backend
        .delete_show(&ShowId::new("morning-drive"))
        .await
        .expect_err("forbidden");
    let api = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(api.code, ErrorCode::Forbidden);
    assert_eq!(api.message, "only admins can delete shows");

    let err = backend.get_caller_user_role().await.expect_err("bad gateway");
    assert!(err.to_string().contains("502"));
    assert!(err.to_string().contains("upstream down"));
}

#[tokio::test]
async fn login_token_is_sent_as_bearer() {
    let (server_url, _) = spawn_catalog_server().await.expect("spawn server");
    let anonymous = HttpBackend::new(&server_url).expect("backend");
    assert!(anonymous.is_caller_admin().await.is_err());

    let login = anonymous
        .login(&Principal::new("station-owner"))
        .await
        .expect("login");
    assert_eq!(login.role, UserRole::Admin);
    let backend = anonymous.with_token(login.token);
    assert!(backend.is_authenticated());
    assert!(backend.is_caller_admin().await.expect("admin"));
}

#[tokio::test]
async fn upcoming_sends_current_time_as_query() {
    let (server_url, _) = spawn_catalog_server().await.expect("spawn server");
    let backend = HttpBackend::new(&server_url).expect("backend");

    let upcoming = backend.get_upcoming_schedules(1415).await.expect("upcoming");
    assert_eq!(upcoming[0].start_time, 1415);
}

#[tokio::test]
async fn blob_upload_streams_and_reports_progress() {
    let (server_url, seen) = spawn_catalog_server().await.expect("spawn server");
    let backend = HttpBackend::new(&server_url).expect("backend");
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&progress);

    let payload = vec![7u8; UPLOAD_CHUNK_BYTES * 2 + 10];
    let blob = ExternalBlob::from_bytes(payload.clone())
        .with_content_type("image/jpeg")
        .with_upload_progress(move |pct| sink.lock().expect("progress").push(pct));

    let image = backend.upload_blob(&blob).await.expect("upload");
    assert_eq!(image.as_str(), format!("{server_url}/blobs/abc123"));

    let reported = progress.lock().expect("progress").clone();
    assert_eq!(reported.first(), Some(&0));
    assert_eq!(reported.last(), Some(&100));
    assert!(reported.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(reported[..reported.len() - 1].iter().all(|pct| *pct < 100));

    let uploads = seen.uploads.lock().expect("uploads").clone();
    assert_eq!(uploads, vec![("image/jpeg".to_string(), payload.len())]);
}

#[tokio::test]
async fn stored_image_is_not_uploaded_again() {
    let (server_url, seen) = spawn_catalog_server().await.expect("spawn server");
    let backend = HttpBackend::new(&server_url).expect("backend");

    let image = backend
        .upload_blob(&ExternalBlob::from_url("https://cdn.radio.example/a.png"))
        .await
        .expect("existing");
    assert_eq!(image.as_str(), "https://cdn.radio.example/a.png");
    assert!(seen.uploads.lock().expect("uploads").is_empty());
}

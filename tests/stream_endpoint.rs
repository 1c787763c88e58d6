use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use audio_range::{router, AppState, Catalog, Resolver, Song};

const LENGTH: usize = 1000;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn song(id: &str, file_path: &str) -> Song {
    Song {
        id: id.to_string(),
        title: format!("Song {id}"),
        artist: "Unknown".to_string(),
        duration: 200,
        file_path: file_path.into(),
        content_type: None,
    }
}

/// A media root with a 1000 byte song `1`, an empty song `empty`, and a
/// catalog entry `gone` whose file does not exist.
fn fixture() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("track.mp3"), pattern(LENGTH)).unwrap();
    std::fs::write(dir.path().join("empty.mp3"), b"").unwrap();

    let catalog = Catalog::new([
        song("1", "track.mp3"),
        song("empty", "empty.mp3"),
        song("gone", "gone.mp3"),
    ])
    .unwrap();
    let resolver = Resolver::new(dir.path(), Arc::new(catalog));
    (dir, router(AppState::new(resolver)))
}

async fn send(app: Router, method: Method, uri: &str, range: Option<&str>) -> (StatusCode, HeaderMap, Bytes) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(range) = range {
        request = request.header(header::RANGE, range);
    }

    let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body)
}

async fn get(app: Router, uri: &str, range: Option<&str>) -> (StatusCode, HeaderMap, Bytes) {
    send(app, Method::GET, uri, range).await
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).map(|v| v.to_str().unwrap())
}

#[tokio::test]
async fn test_first_hundred_bytes() {
    let (_dir, app) = fixture();
    let (status, headers, body) = get(app, "/stream/1", Some("bytes=0-99")).await;

    assert_eq!(StatusCode::PARTIAL_CONTENT, status);
    assert_eq!(Some("bytes 0-99/1000"), header_str(&headers, "content-range"));
    assert_eq!(Some("100"), header_str(&headers, "content-length"));
    assert_eq!(Some("bytes"), header_str(&headers, "accept-ranges"));
    assert_eq!(Some("audio/mpeg"), header_str(&headers, "content-type"));
    assert_eq!(&pattern(LENGTH)[..100], &body[..]);
}

#[tokio::test]
async fn test_open_ended_range() {
    let (_dir, app) = fixture();
    let (status, headers, body) = get(app, "/stream/1", Some("bytes=900-")).await;

    assert_eq!(StatusCode::PARTIAL_CONTENT, status);
    assert_eq!(Some("bytes 900-999/1000"), header_str(&headers, "content-range"));
    assert_eq!(Some("100"), header_str(&headers, "content-length"));
    assert_eq!(&pattern(LENGTH)[900..], &body[..]);
}

#[tokio::test]
async fn test_end_is_clamped() {
    let (_dir, app) = fixture();
    let (status, headers, body) = get(app, "/stream/1", Some("bytes=500-2000")).await;

    assert_eq!(StatusCode::PARTIAL_CONTENT, status);
    assert_eq!(Some("bytes 500-999/1000"), header_str(&headers, "content-range"));
    assert_eq!(Some("500"), header_str(&headers, "content-length"));
    assert_eq!(500, body.len());
    assert_eq!(&pattern(LENGTH)[500..], &body[..]);
}

#[tokio::test]
async fn test_start_past_end_is_unsatisfiable() {
    let (_dir, app) = fixture();
    let (status, headers, body) = get(app, "/stream/1", Some("bytes=1000-1100")).await;

    assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, status);
    assert_eq!(Some("bytes */1000"), header_str(&headers, "content-range"));
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_malformed_range_is_unsatisfiable() {
    for range in ["bytes=abc-", "octets=0-1", "bytes=0-1,5-9", "bytes=9-3"] {
        let (_dir, app) = fixture();
        let (status, headers, body) = get(app, "/stream/1", Some(range)).await;

        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, status, "{range}");
        assert_eq!(Some("bytes */1000"), header_str(&headers, "content-range"));
        assert!(body.is_empty());
    }
}

#[tokio::test]
async fn test_no_range_is_full_body() {
    let (_dir, app) = fixture();
    let (status, headers, body) = get(app, "/stream/1", None).await;

    assert_eq!(StatusCode::OK, status);
    assert_eq!(Some("1000"), header_str(&headers, "content-length"));
    assert_eq!(Some("audio/mpeg"), header_str(&headers, "content-type"));
    assert!(headers.get("content-range").is_none());
    assert_eq!(pattern(LENGTH), body);
}

#[tokio::test]
async fn test_unknown_song_is_not_found() {
    let (_dir, app) = fixture();
    let (status, headers, body) = get(app, "/stream/404", Some("bytes=garbage")).await;

    assert_eq!(StatusCode::NOT_FOUND, status);
    assert!(headers.get("content-range").is_none());
    assert_eq!(&b"Song not found"[..], &body[..]);
}

#[tokio::test]
async fn test_missing_file_is_server_error() {
    let (_dir, app) = fixture();
    let (status, _, body) = get(app, "/stream/gone", Some("bytes=0-1")).await;

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
    assert_eq!(&b"Song unavailable"[..], &body[..]);
}

#[tokio::test]
async fn test_empty_song() {
    let (_dir, app) = fixture();
    let (status, headers, body) = get(app.clone(), "/stream/empty", None).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(Some("0"), header_str(&headers, "content-length"));
    assert!(body.is_empty());

    let (status, headers, _) = get(app, "/stream/empty", Some("bytes=0-")).await;
    assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, status);
    assert_eq!(Some("bytes */0"), header_str(&headers, "content-range"));
}

#[tokio::test]
async fn test_repeated_request_is_identical() {
    let (_dir, app) = fixture();
    let first = get(app.clone(), "/stream/1", Some("bytes=123-456")).await;
    let second = get(app, "/stream/1", Some("bytes=123-456")).await;

    assert_eq!(first.0, second.0);
    assert_eq!(first.1, second.1);
    assert_eq!(first.2, second.2);
}

#[tokio::test]
async fn test_body_length_matches_content_length() {
    let (_dir, app) = fixture();
    for (start, end) in [(0, 0), (1, 998), (250, 750), (999, 999)] {
        let range = format!("bytes={start}-{end}");
        let (status, headers, body) = get(app.clone(), "/stream/1", Some(&range)).await;

        assert_eq!(StatusCode::PARTIAL_CONTENT, status);
        let content_length: usize = header_str(&headers, "content-length").unwrap().parse().unwrap();
        assert_eq!(end - start + 1, content_length);
        assert_eq!(content_length, body.len());
        assert_eq!(&pattern(LENGTH)[start..=end], &body[..]);
    }
}

#[tokio::test]
async fn test_legacy_route() {
    let (_dir, app) = fixture();
    let (status, headers, _) = get(app, "/api/songs/stream/1", Some("bytes=-10")).await;

    assert_eq!(StatusCode::PARTIAL_CONTENT, status);
    assert_eq!(Some("bytes 990-999/1000"), header_str(&headers, "content-range"));
}

#[tokio::test]
async fn test_head_has_headers_without_body() {
    let (_dir, app) = fixture();
    let (status, headers, body) = send(app, Method::HEAD, "/stream/1", Some("bytes=0-99")).await;

    assert_eq!(StatusCode::PARTIAL_CONTENT, status);
    assert_eq!(Some("bytes 0-99/1000"), header_str(&headers, "content-range"));
    assert_eq!(Some("100"), header_str(&headers, "content-length"));
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_cross_origin_player_can_read_range_headers() {
    let (_dir, app) = fixture();
    let request = Request::get("/stream/1")
        .header(header::ORIGIN, "http://player.example")
        .header(header::RANGE, "bytes=0-9")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());
    let headers = response.headers();
    assert_eq!(Some("*"), header_str(headers, "access-control-allow-origin"));

    let exposed = header_str(headers, "access-control-expose-headers").unwrap().to_ascii_lowercase();
    for name in ["content-range", "accept-ranges", "content-length"] {
        assert!(exposed.contains(name), "{name} not in {exposed}");
    }
}

#[tokio::test]
async fn test_cors_preflight_allows_range() {
    let (_dir, app) = fixture();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/songs/stream/1")
        .header(header::ORIGIN, "http://player.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "range")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(Some("*"), header_str(headers, "access-control-allow-origin"));
    let allowed = header_str(headers, "access-control-allow-headers").unwrap().to_ascii_lowercase();
    assert!(allowed.contains("range"), "{allowed}");
}

#[tokio::test]
async fn test_over_tcp() {
    let (_dir, app) = fixture();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/stream/1"))
        .header("Range", "bytes=10-19")
        .send()
        .await
        .unwrap();

    assert_eq!(reqwest::StatusCode::PARTIAL_CONTENT, response.status());
    assert_eq!(Some(10), response.content_length());
    let body = response.bytes().await.unwrap();
    assert_eq!(&pattern(LENGTH)[10..20], &body[..]);
}

//! Test utilities and common setup.
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode, header},
};
use lanshare::config::CollisionPolicy;
use lanshare::routes::create_router;
use lanshare::{AppState, Config, StorageRoots};
use tempfile::TempDir;
use tower::ServiceExt;

pub const USERNAME: &str = "tester";
pub const PASSWORD: &str = "correct horse";

/// A router over two temp-dir roots with known credentials.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    /// The "Internal" root, also the default browse location
    pub internal: TempDir,
    /// A second "SD_card" root
    pub card: TempDir,
}

impl TestApp {
    pub fn internal_path(&self) -> PathBuf {
        self.internal.path().canonicalize().unwrap()
    }

    pub fn card_path(&self) -> PathBuf {
        self.card.path().canonicalize().unwrap()
    }
}

pub fn test_config() -> Config {
    Config {
        username: USERNAME.to_string(),
        password: PASSWORD.to_string(),
        bind: "127.0.0.1".to_string(),
        ..Config::default()
    }
}

/// Build the test app. The internal root holds `DCIM/`, `hello.txt` and
/// `.hidden`; the card root holds `song.mp3`.
pub fn test_app() -> TestApp {
    test_app_with(test_config())
}

pub fn test_app_with(config: Config) -> TestApp {
    let internal = TempDir::new().unwrap();
    let card = TempDir::new().unwrap();

    fs::create_dir_all(internal.path().join("DCIM")).unwrap();
    fs::write(internal.path().join("hello.txt"), "hello world").unwrap();
    fs::write(internal.path().join(".hidden"), "secret").unwrap();
    fs::write(card.path().join("song.mp3"), vec![7u8; 4096]).unwrap();

    let mut roots = StorageRoots::new();
    assert!(roots.insert_probed("Internal", &internal.path().canonicalize().unwrap()));
    assert!(roots.insert_probed("SD_card", &card.path().canonicalize().unwrap()));

    let state = AppState::new(config, roots);
    TestApp {
        router: create_router(state.clone()),
        state,
        internal,
        card,
    }
}

pub fn rename_config() -> Config {
    Config {
        on_collision: CollisionPolicy::Rename,
        ..test_config()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub fn login_request(username: &str, password: &str) -> Request<Body> {
    let form = format!(
        "username={}&password={}",
        urlencoding::encode(username),
        urlencoding::encode(password)
    );
    Request::builder()
        .uri("/login")
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap()
}

/// Log in and return the `Cookie` header value for the session.
pub async fn login(router: &Router) -> String {
    let response = send(router, login_request(USERNAME, PASSWORD)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("login sets a cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).method(Method::GET);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn path_uri(route: &str, path: &std::path::Path) -> String {
    format!(
        "{}?path={}",
        route,
        urlencoding::encode(&path.to_string_lossy())
    )
}

pub const BOUNDARY: &str = "lanshare-test-boundary";

/// A part of a multipart body: either a text field or a file.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(file_name, content) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
Content-Type: application/octet-stream\r\n\r\n",
                        file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(content);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(uri: &str, cookie: Option<&str>, parts: &[Part<'_>]) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(uri)
        .method(Method::POST)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

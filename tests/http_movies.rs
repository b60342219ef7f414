use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::{DateTime, Utc};
use pilem::{build_router, state::AppState, store::InMemoryMovieStore};
use serde_json::{Value, json};
use tower::ServiceExt;

const NOT_FOUND: &str = "the requested resource could not be found";
const SERVER_ERROR: &str = "the server encountered a problem and could not process your request";

fn app() -> axum::Router {
    let movies = Arc::new(InMemoryMovieStore::new());
    build_router(AppState::new(movies))
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("response expected");
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");

    if body.is_empty() {
        return (status, location, Value::Null);
    }

    let json = serde_json::from_slice::<Value>(&body).expect("body should be valid JSON");
    (status, location, json)
}

async fn send_raw(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: impl Into<Body>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .expect("request should build");

    let (status, _, json) = send(app, request).await;
    (status, json)
}

async fn send_json(
    app: &axum::Router,
    method: Method,
    uri: &str,
    payload: Value,
) -> (StatusCode, Value) {
    send_raw(app, method, uri, payload.to_string()).await
}

async fn send_empty(app: &axum::Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");

    let (status, _, json) = send(app, request).await;
    (status, json)
}

fn heat() -> Value {
    json!({
        "title": "Heat",
        "year": 1995,
        "runtime": "170 mins",
        "genres": ["crime", "drama"]
    })
}

async fn create(app: &axum::Router, payload: Value) -> Value {
    let (status, body) = send_json(app, Method::POST, "/v1/movies", payload).await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
    body["movie"].clone()
}

#[tokio::test]
async fn create_returns_location_and_envelope() {
    let app = app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/movies")
        .header("content-type", "application/json")
        .body(Body::from(heat().to_string()))
        .expect("request should build");
    let (status, location, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    let movie = &body["movie"];
    let id = movie["id"].as_i64().expect("id should be an integer");
    assert!(id > 0);
    assert_eq!(location.as_deref(), Some(format!("/v1/movies/{id}").as_str()));
    assert_eq!(movie["title"], "Heat");
    assert_eq!(movie["year"], 1995);
    assert_eq!(movie["runtime"], "170 mins");
    assert_eq!(movie["genres"], json!(["crime", "drama"]));
    assert_eq!(movie["version"], 1);
    let created_at: DateTime<Utc> = movie["created_at"]
        .as_str()
        .expect("created_at should be a string")
        .parse()
        .expect("created_at should be RFC 3339");
    assert!(created_at > DateTime::<Utc>::default());
}

#[tokio::test]
async fn show_update_and_delete_movie() {
    let app = app();
    let id = create(&app, heat()).await["id"]
        .as_i64()
        .expect("id should be an integer");
    let uri = format!("/v1/movies/{id}");

    let (status, body) = send_empty(&app, Method::GET, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movie"]["title"], "Heat");
    assert_eq!(body["movie"]["version"], 1);

    let (status, body) = send_json(
        &app,
        Method::PATCH,
        &uri,
        json!({ "runtime": "171 mins", "genres": ["crime"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movie"]["title"], "Heat");
    assert_eq!(body["movie"]["runtime"], "171 mins");
    assert_eq!(body["movie"]["genres"], json!(["crime"]));
    assert_eq!(body["movie"]["version"], 2);

    let (status, body) = send_empty(&app, Method::DELETE, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "movie successfully deleted" }));

    let (status, body) = send_empty(&app, Method::GET, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": NOT_FOUND }));

    let (status, body) = send_empty(&app, Method::DELETE, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": NOT_FOUND }));
}

#[tokio::test]
async fn stale_expected_version_is_a_conflict() {
    let app = app();
    let id = create(&app, heat()).await["id"]
        .as_i64()
        .expect("id should be an integer");
    let uri = format!("/v1/movies/{id}");

    let (status, _) = send_json(&app, Method::PATCH, &uri, json!({ "year": 1996 })).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .method(Method::PATCH)
        .uri(&uri)
        .header("content-type", "application/json")
        .header("x-expected-version", "1")
        .body(Body::from(json!({ "year": 1997 }).to_string()))
        .expect("request should build");
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": SERVER_ERROR }));

    let (_, body) = send_empty(&app, Method::GET, &uri).await;
    assert_eq!(body["movie"]["year"], 1996);
    assert_eq!(body["movie"]["version"], 2);

    let request = Request::builder()
        .method(Method::PATCH)
        .uri(&uri)
        .header("content-type", "application/json")
        .header("x-expected-version", "2")
        .body(Body::from(json!({ "year": 1995 }).to_string()))
        .expect("request should build");
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["movie"]["version"], 3);
}

#[tokio::test]
async fn unusable_ids_are_not_found() {
    let app = app();

    for uri in ["/v1/movies/abc", "/v1/movies/0", "/v1/movies/-3", "/v1/movies/42"] {
        let (status, body) = send_empty(&app, Method::GET, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body, json!({ "error": NOT_FOUND }), "{uri}");
    }
}

#[tokio::test]
async fn malformed_bodies_are_rejected_with_reason() {
    let app = app();

    let cases: [(&str, &str); 9] = [
        ("", "body must not be empty"),
        ("{\"title\": \"Heat\",", "body contains badly-formed JSON"),
        (
            r#"{"title": "Heat"} {"title": "Ronin"}"#,
            "body must only contain a single JSON value",
        ),
        (
            r#"{"title": "Heat", "rating": 5}"#,
            "body contains unknown key \"rating\"",
        ),
        (
            r#"{"title": 1995}"#,
            "body contains incorrect JSON type for field \"title\"",
        ),
        (
            r#"{"runtime": 170}"#,
            "body contains incorrect JSON type for field \"runtime\"",
        ),
        (r#"{"runtime": "170 minutes"}"#, "invalid runtime format"),
        (
            r#"{"genres": ["crime", 7]}"#,
            "body contains incorrect JSON type for field \"genres\"",
        ),
        (
            r#"{"year": 1995, "year": 1996}"#,
            "body contains duplicate key \"year\"",
        ),
    ];

    for (payload, message) in cases {
        let (status, body) = send_raw(&app, Method::POST, "/v1/movies", payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert_eq!(body, json!({ "error": message }), "{payload}");
    }
}

#[tokio::test]
async fn array_bodies_never_create_a_movie() {
    let movies = Arc::new(InMemoryMovieStore::new());
    let app = build_router(AppState::new(movies.clone()));

    for payload in [r#"["Heat", 1995, "170 mins", ["crime"]]"#, "[]"] {
        let (status, body) = send_raw(&app, Method::POST, "/v1/movies", payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert_eq!(
            body,
            json!({ "error": "body contains incorrect JSON type (at character 1)" }),
            "{payload}"
        );
    }

    assert!(movies.is_empty().await);
    assert_eq!(movies.statements_executed(), 0);
}

#[tokio::test]
async fn null_fields_create_zero_values() {
    let app = app();

    let movie = create(
        &app,
        json!({ "title": "Heat", "year": null, "runtime": "170 mins", "genres": null }),
    )
    .await;

    assert_eq!(movie["year"], 0);
    assert_eq!(movie["genres"], json!([]));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let movies = Arc::new(InMemoryMovieStore::new());
    let app = build_router(AppState::new(movies.clone()).with_body_limit(64));

    let payload = json!({
        "title": "x".repeat(128),
        "year": 2001,
        "runtime": "90 mins",
        "genres": []
    });
    let (status, body) = send_json(&app, Method::POST, "/v1/movies", payload).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "error": "body must not be larger than 64 bytes" })
    );
    assert!(movies.is_empty().await);
}

#[tokio::test]
async fn rejected_update_leaves_record_untouched() {
    let app = app();
    let id = create(&app, heat()).await["id"]
        .as_i64()
        .expect("id should be an integer");
    let uri = format!("/v1/movies/{id}");

    let (status, _) = send_raw(&app, Method::PATCH, &uri, r#"{"year": "soon"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send_empty(&app, Method::GET, &uri).await;
    assert_eq!(body["movie"]["year"], 1995);
    assert_eq!(body["movie"]["version"], 1);
}

#[tokio::test]
async fn unsupported_method_and_unknown_route() {
    let app = app();

    let (status, body) = send_empty(&app, Method::PUT, "/v1/movies/1").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        body,
        json!({ "error": "the PUT method is not supported for this resource" })
    );

    let (status, body) = send_empty(&app, Method::GET, "/v1/films").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": NOT_FOUND }));
}

#[tokio::test]
async fn healthcheck_reports_store() {
    let app = app();

    let (status, body) = send_empty(&app, Method::GET, "/v1/healthcheck").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["health"]["status"], "available");
    assert_eq!(body["health"]["store"], "up");
    assert_eq!(body["health"]["version"], env!("CARGO_PKG_VERSION"));
}

//! Router-level tests against the in-memory user store.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use crate::{app::build_app, state::AppState};

struct TestApp {
    state: AppState,
    router: Router,
}

impl TestApp {
    fn new(protect_admin_routes: bool) -> Self {
        let state = AppState::fake(protect_admin_routes);
        let router = build_app(state.clone());
        Self { state, router }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    async fn register(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/api/users/register",
            Some(json!({ "email": email, "password": password })),
            None,
        )
        .await
    }

    async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/api/users/login",
            Some(json!({ "email": email, "password": password })),
            None,
        )
        .await
    }

    /// Registers a throwaway account and returns its (role-less) token.
    async fn user_token(&self) -> String {
        let (status, body) = self.register("operator@x.com", "operator-pw").await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    /// Same account, with a token carrying the admin role.
    async fn admin_token(&self) -> String {
        let id = self.subject(&self.user_token().await);
        self.state.jwt.sign(id, Some("admin")).unwrap()
    }

    fn subject(&self, token: &str) -> Uuid {
        self.state.jwt.verify(token).expect("token verifies").sub
    }
}

#[tokio::test]
async fn register_then_login_yield_tokens_for_same_user() {
    let app = TestApp::new(true);

    let (status, body) = app.register("a@x.com", "pw1").await;
    assert_eq!(status, StatusCode::CREATED);
    let t1 = body["token"].as_str().unwrap().to_string();
    let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    assert_eq!(body["email"], "a@x.com");
    assert!(body.get("password_hash").is_none());

    let (status, body) = app.login("a@x.com", "pw1").await;
    assert_eq!(status, StatusCode::OK);
    let t2 = body["token"].as_str().unwrap();

    assert_eq!(app.subject(&t1), id);
    assert_eq!(app.subject(t2), id);
}

#[tokio::test]
async fn duplicate_registration_conflicts_and_keeps_first_user() {
    let app = TestApp::new(true);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/users/register",
            Some(json!({ "email": "dup@x.com", "password": "first", "name": "First" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/users/register",
            Some(json!({ "email": " DUP@x.com ", "password": "second", "name": "Second" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "User already exists");

    let (status, body) = app.login("dup@x.com", "first").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "First");
    let (status, _) = app.login("dup@x.com", "second").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bad_credentials_get_identical_responses_and_no_token() {
    let app = TestApp::new(true);
    app.register("known@x.com", "right").await;

    let (wrong_pw_status, wrong_pw) = app.login("known@x.com", "wrong").await;
    let (unknown_status, unknown) = app.login("nobody@x.com", "wrong").await;

    assert_eq!(wrong_pw_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_pw, unknown);
    assert_eq!(wrong_pw["error"], "Invalid credentials");
    assert!(wrong_pw.get("token").is_none());
}

#[tokio::test]
async fn registration_validates_input() {
    let app = TestApp::new(true);

    let (status, body) = app.register("not-an-email", "pw").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid email");

    let (status, _) = app.register("ok@x.com", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registration_ignores_requested_role() {
    let app = TestApp::new(true);
    let (status, body) = app
        .send(
            Method::POST,
            "/api/users/register",
            Some(json!({ "email": "sneaky@x.com", "password": "pw", "role": "admin" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["role"].is_null());
}

#[tokio::test]
async fn admin_routes_are_gated_when_protected() {
    let app = TestApp::new(true);

    let (status, _) = app.send(Method::GET, "/api/users/all", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(Method::GET, "/api/users/all", None, Some("garbage.token.value"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/users",
            Some(json!({ "email": "x@x.com", "password": "pw" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.admin_token().await;
    let (status, body) = app
        .send(Method::GET, "/api/users/all", None, Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admin_routes_are_open_when_gate_disabled() {
    let app = TestApp::new(false);
    let (status, body) = app.send(Method::GET, "/api/users/all", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    // /me stays gated regardless
    let (status, _) = app.send(Method::GET, "/api/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_returns_the_token_owner() {
    let app = TestApp::new(true);
    let (_, registered) = app.register("me@x.com", "pw").await;
    let token = registered["token"].as_str().unwrap();

    let (status, body) = app.send(Method::GET, "/api/users/me", None, Some(token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], registered["id"]);
    assert_eq!(body["email"], "me@x.com");
}

#[tokio::test]
async fn delete_removes_user_and_missing_ids_are_not_found() {
    let app = TestApp::new(true);
    let token = app.admin_token().await;

    let missing = format!("/api/users/{}", Uuid::new_v4());
    let (status, body) = app.send(Method::DELETE, &missing, None, Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");

    let (status, created) = app
        .send(
            Method::POST,
            "/api/users",
            Some(json!({ "email": "gone@x.com", "password": "pw" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/users/{}", created["id"].as_str().unwrap());

    let (status, body) = app.send(Method::DELETE, &uri, None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], created["id"]);

    let (status, _) = app.send(Method::GET, &uri, None, Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(Method::DELETE, &uri, None, Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_changes_fields_and_rehashes_password() {
    let app = TestApp::new(true);
    let token = app.admin_token().await;
    let (_, user) = app.register("edit@x.com", "old-pw").await;
    let uri = format!("/api/users/{}", user["id"].as_str().unwrap());

    let (status, body) = app
        .send(
            Method::PUT,
            &uri,
            Some(json!({ "phone": "+331234", "timezone": "Europe/Paris", "password": "new-pw" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phone"], "+331234");
    assert_eq!(body["timezone"], "Europe/Paris");
    assert_eq!(body["email"], "edit@x.com");

    let (status, _) = app.login("edit@x.com", "old-pw").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.login("edit@x.com", "new-pw").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::PUT,
            &uri,
            Some(json!({ "email": "operator@x.com" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/users/{}", Uuid::new_v4()),
            Some(json!({ "name": "Nobody" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn role_lookup_joins_permissions() {
    let app = TestApp::new(true);
    let token = app.admin_token().await;

    let (status, admin) = app
        .send(
            Method::POST,
            "/api/users",
            Some(json!({ "email": "boss@x.com", "password": "pw", "role": "admin" })),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(admin["role"], "admin");

    let uri = format!("/api/users/role/{}", admin["id"].as_str().unwrap());
    let (status, body) = app.send(Method::GET, &uri, None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");
    assert_eq!(
        body["permissions"],
        json!(["roles:read", "users:read", "users:write"])
    );

    // the operator account itself has no role
    let operator = app.subject(&token);
    let (status, body) = app
        .send(Method::GET, &format!("/api/users/role/{operator}"), None, Some(&token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Role not found");

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/users/role/{}", Uuid::new_v4()),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn unknown_role_is_invalid_input() {
    let app = TestApp::new(false);
    let (status, _) = app
        .send(
            Method::POST,
            "/api/users",
            Some(json!({ "email": "r@x.com", "password": "pw", "role": "wizard" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn welcome_and_health() {
    let app = TestApp::new(true);
    let (status, body) = app.send(Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("Welcome"));

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn malformed_email_login_looks_like_any_failed_login() {
    let app = TestApp::new(true);
    let (malformed_status, malformed) = app.login("not-an-email", "pw").await;
    let (unknown_status, unknown) = app.login("nobody@x.com", "pw").await;
    assert_eq!(malformed_status, StatusCode::UNAUTHORIZED);
    assert_eq!(malformed_status, unknown_status);
    assert_eq!(malformed, unknown);
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let app = TestApp::new(false);

    let (status, body) = app
        .send(Method::DELETE, "/api/users/not-a-uuid", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("UUID"));

    let (status, body) = app
        .send(
            Method::POST,
            "/api/users/register",
            Some(json!({ "email": 1 })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/users/login")
        .body(Body::from("{}"))
        .unwrap();
    let res = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn only_admin_tokens_assign_roles() {
    let app = TestApp::new(true);
    let (_, me) = app.register("climber@x.com", "pw").await;
    let own_token = me["token"].as_str().unwrap();
    let own_uri = format!("/api/users/{}", me["id"].as_str().unwrap());

    let (status, body) = app
        .send(Method::PUT, &own_uri, Some(json!({ "role": "admin" })), Some(own_token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Only admins can assign roles");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/users",
            Some(json!({ "email": "new@x.com", "password": "pw", "role": "admin" })),
            Some(own_token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // profile edits without a role stay allowed
    let (status, _) = app
        .send(Method::PUT, &own_uri, Some(json!({ "phone": "+1" })), Some(own_token))
        .await;
    assert_eq!(status, StatusCode::OK);

    let admin = app.admin_token().await;
    let (status, body) = app
        .send(Method::PUT, &own_uri, Some(json!({ "role": "user" })), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "user");
}

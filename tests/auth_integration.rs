use async_trait::async_trait;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::sync::Arc;
use token_gate::audit::AuditEntry;
use token_gate::auth::{hash_password, issue_refresh_token};
use token_gate::configuration::JwtSettings;
use token_gate::error::DatabaseError;
use token_gate::repository::{
    AuditLog, CredentialStore, InMemoryAuditLog, InMemoryCredentialStore, InMemoryTokenStore,
    TokenField, TokenStore, User,
};
use token_gate::startup::{run, AppState};

const USERNAME: &str = "alice";
const PASSWORD: &str = "SecurePass123";

pub struct TestApp {
    pub address: String,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub tokens: Arc<InMemoryTokenStore>,
    pub audit: Arc<InMemoryAuditLog>,
    pub jwt: JwtSettings,
}

impl TestApp {
    async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(&format!("{}{}", &self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn login(&self) -> Value {
        let response = self
            .post("/auth/login", &json!({"username": USERNAME, "password": PASSWORD}))
            .await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }
}

fn jwt_settings() -> JwtSettings {
    JwtSettings {
        secret: "integration-access-secret-at-least-32-chars".to_string(),
        refresh_secret: "integration-refresh-secret-at-least-32-chars".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 3600,
        issuer: "token_gate_test".to_string(),
    }
}

fn provisioned_credentials() -> InMemoryCredentialStore {
    let credentials = InMemoryCredentialStore::new();
    let hash = hash_password(PASSWORD, 4).expect("Failed to hash password");
    credentials
        .insert_user(USERNAME, &hash)
        .expect("Failed to provision user");
    credentials
}

fn spawn_server(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let server = run(listener, state).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

async fn spawn_app() -> TestApp {
    let credentials = Arc::new(provisioned_credentials());
    let tokens = Arc::new(InMemoryTokenStore::new());
    let audit = Arc::new(InMemoryAuditLog::new());
    let jwt = jwt_settings();

    let address = spawn_server(AppState::new(
        credentials.clone(),
        tokens.clone(),
        audit.clone(),
        jwt.clone(),
    ));

    TestApp {
        address,
        credentials,
        tokens,
        audit,
        jwt,
    }
}

/// Audit store that rejects every write
struct FailingAuditLog;

#[async_trait]
impl AuditLog for FailingAuditLog {
    async fn add_log(&self, _entry: &AuditEntry) -> Result<(), DatabaseError> {
        Err(DatabaseError::ConnectionPool("audit pool closed".to_string()))
    }
}

/// Loads users but fails every last_login/last_logout write
struct ReadOnlyCredentials(InMemoryCredentialStore);

#[async_trait]
impl CredentialStore for ReadOnlyCredentials {
    async fn find_user(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        self.0.find_user(username).await
    }

    async fn update_last_login(&self, _id: i64) -> Result<(), DatabaseError> {
        Err(DatabaseError::QueryExecution("users is read-only".to_string()))
    }

    async fn update_last_logout(&self, _id: i64) -> Result<(), DatabaseError> {
        Err(DatabaseError::QueryExecution("users is read-only".to_string()))
    }
}

/// Answers lookups from `inner` but writes and deletes nothing
struct RejectingTokenStore {
    inner: InMemoryTokenStore,
}

#[async_trait]
impl TokenStore for RejectingTokenStore {
    async fn exists(&self, field: TokenField, value: &str) -> Result<bool, DatabaseError> {
        self.inner.exists(field, value).await
    }

    async fn create(&self, _username: &str, _token: &str) -> Result<bool, DatabaseError> {
        Ok(false)
    }

    async fn update(&self, _username: &str, _token: &str) -> Result<bool, DatabaseError> {
        Ok(false)
    }

    async fn delete(&self, _username: &str) -> Result<bool, DatabaseError> {
        Ok(false)
    }
}

// --- Login ---

#[tokio::test]
async fn login_returns_200_and_persists_one_refresh_token() {
    let app = spawn_app().await;

    let body = app.login().await;

    assert_eq!(body["status"], 200);
    let access = body["data"]["access_token"].as_str().expect("missing access_token");
    let refresh = body["data"]["refresh_token"].as_str().expect("missing refresh_token");
    assert!(!access.is_empty());

    assert_eq!(app.tokens.len(), 1);
    assert_eq!(app.tokens.token_for(USERNAME).as_deref(), Some(refresh));
}

#[tokio::test]
async fn login_accepts_form_encoded_body() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/login", &app.address))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(format!("username={}&password={}", USERNAME, PASSWORD))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    assert_eq!(app.tokens.len(), 1);
}

#[tokio::test]
async fn login_returns_401_for_wrong_password() {
    let app = spawn_app().await;

    let response = app
        .post("/auth/login", &json!({"username": USERNAME, "password": "WrongPass123"}))
        .await;

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], 401);
    assert_eq!(body["message"], "Login failed, wrong username or password!");
    assert!(app.tokens.is_empty());
}

#[tokio::test]
async fn login_returns_401_for_unknown_user() {
    let app = spawn_app().await;

    let response = app
        .post("/auth/login", &json!({"username": "mallory", "password": PASSWORD}))
        .await;

    assert_eq!(401, response.status().as_u16());
    assert!(app.tokens.is_empty());
}

#[tokio::test]
async fn login_returns_400_for_missing_fields() {
    let app = spawn_app().await;

    let test_cases = vec![
        (json!({"password": PASSWORD}), vec!["username"], "missing username"),
        (json!({"username": USERNAME}), vec!["password"], "missing password"),
        (json!({}), vec!["username", "password"], "missing both"),
        (json!({"username": "", "password": ""}), vec!["username", "password"], "empty both"),
    ];

    for (body, fields, reason) in test_cases {
        let response = app.post("/auth/login", &body).await;

        assert_eq!(400, response.status().as_u16(), "Should reject: {}", reason);
        let envelope: Value = response.json().await.unwrap();
        assert_eq!(envelope["message"], "Validation error!");
        for field in fields {
            assert_eq!(
                envelope["errors"][field],
                format!("{} is required", field),
                "Missing field error for {} ({})",
                field,
                reason
            );
        }
    }
}

#[tokio::test]
async fn login_returns_400_for_malformed_body() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/login", &app.address))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn login_returns_400_for_wrongly_typed_field() {
    let app = spawn_app().await;

    let response = app
        .post("/auth/login", &json!({"username": 5, "password": PASSWORD}))
        .await;

    assert_eq!(400, response.status().as_u16());
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["message"], "Validation error!");
    assert_eq!(envelope["errors"]["body"], "body could not be decoded");
    assert!(envelope["errors"].get("username").is_none());
}

#[tokio::test]
async fn login_matches_username_exactly() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/auth/login",
            &json!({"username": format!(" {} ", USERNAME), "password": PASSWORD}),
        )
        .await;

    assert_eq!(401, response.status().as_u16());
    assert!(app.tokens.is_empty());
}

#[tokio::test]
async fn login_returns_500_when_refresh_token_is_not_stored() {
    let jwt = jwt_settings();
    let audit = Arc::new(InMemoryAuditLog::new());
    let address = spawn_server(AppState::new(
        Arc::new(provisioned_credentials()),
        Arc::new(RejectingTokenStore {
            inner: InMemoryTokenStore::new(),
        }),
        audit.clone(),
        jwt,
    ));

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/login", address))
        .json(&json!({"username": USERNAME, "password": PASSWORD}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(500, response.status().as_u16());
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["status"], 500);
    assert_eq!(envelope["message"], "Something went wrong!");
    assert_eq!(envelope["errors"], json!({}));

    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].code, 500);
    assert!(entries[0].trace.contains("was not persisted"));
}

#[tokio::test]
async fn login_and_logout_succeed_when_timestamps_cannot_be_written() {
    let jwt = jwt_settings();
    let tokens = Arc::new(InMemoryTokenStore::new());
    let address = spawn_server(AppState::new(
        Arc::new(ReadOnlyCredentials(provisioned_credentials())),
        tokens.clone(),
        Arc::new(InMemoryAuditLog::new()),
        jwt,
    ));
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/auth/login", address))
        .json(&json!({"username": USERNAME, "password": PASSWORD}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    let refresh = body["data"]["refresh_token"].as_str().unwrap().to_string();
    assert_eq!(tokens.len(), 1);

    let response = client
        .post(&format!("{}/auth/logout", address))
        .json(&json!({"token": refresh}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());
    assert!(tokens.is_empty());
}

#[tokio::test]
async fn second_login_invalidates_previous_refresh_token() {
    let app = spawn_app().await;

    let first = app.login().await;
    let second = app.login().await;
    let first_refresh = first["data"]["refresh_token"].as_str().unwrap();

    assert_ne!(first_refresh, second["data"]["refresh_token"].as_str().unwrap());
    assert_eq!(app.tokens.len(), 1);

    let response = app.post("/auth/renew", &json!({"token": first_refresh})).await;
    assert_eq!(404, response.status().as_u16());
}

#[tokio::test]
async fn concurrent_logins_leave_exactly_one_record() {
    let app = spawn_app().await;

    let body = json!({"username": USERNAME, "password": PASSWORD});
    let requests = (0..5).map(|_| app.post("/auth/login", &body));
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        assert_eq!(200, response.status().as_u16());
    }
    assert_eq!(app.tokens.len(), 1);
}

// --- Renew ---

#[tokio::test]
async fn renew_returns_new_access_token() {
    let app = spawn_app().await;
    let login = app.login().await;
    let refresh = login["data"]["refresh_token"].as_str().unwrap();

    let response = app.post("/auth/renew", &json!({"token": refresh})).await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert!(body["data"]["access_token"].as_str().is_some());
    assert!(body["data"].get("refresh_token").is_none());
    assert_eq!(app.tokens.token_for(USERNAME).as_deref(), Some(refresh));
}

#[tokio::test]
async fn renew_returns_404_for_token_not_on_file() {
    let app = spawn_app().await;
    let token = issue_refresh_token(USERNAME, &app.jwt).unwrap();

    let response = app.post("/auth/renew", &json!({"token": token})).await;

    assert_eq!(404, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Token doesn't exist!");
}

#[tokio::test]
async fn renew_returns_404_when_user_is_gone() {
    let app = spawn_app().await;
    let login = app.login().await;
    app.credentials.remove_user(USERNAME).unwrap();

    let response = app
        .post("/auth/renew", &json!({"token": login["data"]["refresh_token"]}))
        .await;

    assert_eq!(404, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "User not found!");
}

#[tokio::test]
async fn renew_returns_401_for_invalid_or_expired_token() {
    let app = spawn_app().await;

    let mut forged_config = app.jwt.clone();
    forged_config.refresh_secret = "attacker-controlled-secret-of-32-chars".to_string();
    let forged = issue_refresh_token(USERNAME, &forged_config).unwrap();

    let mut expired_config = app.jwt.clone();
    expired_config.refresh_token_expiry = -3600;
    let expired = issue_refresh_token(USERNAME, &expired_config).unwrap();

    for (token, reason) in [
        (forged, "invalid signature"),
        (expired, "expired"),
        ("not.a.jwt".to_string(), "garbage"),
    ] {
        let response = app.post("/auth/renew", &json!({"token": token})).await;
        assert_eq!(401, response.status().as_u16(), "Should reject {} token", reason);
    }
}

#[tokio::test]
async fn renew_rejects_token_that_just_expired() {
    let app = spawn_app().await;

    let mut expired_config = app.jwt.clone();
    expired_config.refresh_token_expiry = -5;
    let expired = issue_refresh_token(USERNAME, &expired_config).unwrap();
    app.tokens.create(USERNAME, &expired).await.unwrap();

    let response = app.post("/auth/renew", &json!({"token": expired})).await;

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Token has expired!");
}

#[tokio::test]
async fn renew_returns_400_without_token() {
    let app = spawn_app().await;

    let response = app.post("/auth/renew", &json!({})).await;

    assert_eq!(400, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errors"]["token"], "token is required");
}

// --- Logout ---

#[tokio::test]
async fn logout_returns_204_and_deletes_record() {
    let app = spawn_app().await;
    let login = app.login().await;
    let refresh = login["data"]["refresh_token"].as_str().unwrap();

    let response = app.post("/auth/logout", &json!({"token": refresh})).await;

    assert_eq!(204, response.status().as_u16());
    assert!(app.tokens.is_empty());

    let user = app
        .credentials
        .find_user(USERNAME)
        .await
        .unwrap()
        .expect("user should still exist");
    assert!(user.last_logout.is_some());

    let response = app.post("/auth/renew", &json!({"token": refresh})).await;
    assert_eq!(404, response.status().as_u16());
}

#[tokio::test]
async fn logout_returns_404_for_token_not_on_file() {
    let app = spawn_app().await;
    let token = issue_refresh_token(USERNAME, &app.jwt).unwrap();

    let response = app.post("/auth/logout", &json!({"token": token})).await;

    assert_eq!(404, response.status().as_u16());
}

#[tokio::test]
async fn logout_returns_500_when_refresh_token_is_not_deleted() {
    let jwt = jwt_settings();
    let tokens = Arc::new(RejectingTokenStore {
        inner: InMemoryTokenStore::new(),
    });
    let refresh = issue_refresh_token(USERNAME, &jwt).unwrap();
    tokens.inner.create(USERNAME, &refresh).await.unwrap();

    let address = spawn_server(AppState::new(
        Arc::new(provisioned_credentials()),
        tokens.clone(),
        Arc::new(InMemoryAuditLog::new()),
        jwt,
    ));

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/logout", address))
        .json(&json!({"token": refresh}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(500, response.status().as_u16());
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["message"], "Something went wrong!");
    assert_eq!(tokens.inner.len(), 1);
}

#[tokio::test]
async fn logout_returns_400_without_token() {
    let app = spawn_app().await;

    let response = app.post("/auth/logout", &json!({"token": ""})).await;

    assert_eq!(400, response.status().as_u16());
}

// --- Audit log ---

#[tokio::test]
async fn every_error_response_is_audited() {
    let app = spawn_app().await;

    app.post("/auth/login", &json!({})).await;
    app.post("/auth/login", &json!({"username": USERNAME, "password": "nope"}))
        .await;
    app.post("/auth/renew", &json!({"token": "not.a.jwt"})).await;

    let entries = app.audit.entries();
    assert_eq!(entries.len(), 3);

    assert_eq!(entries[0].accessed_url_path, "/auth/login");
    assert_eq!(entries[0].code, 400);
    assert_eq!(entries[1].code, 401);
    assert_eq!(entries[2].accessed_url_path, "/auth/renew");
    assert_eq!(entries[2].code, 401);
    assert!(entries.iter().all(|e| !e.file.is_empty() && e.line > 0));
}

#[tokio::test]
async fn audit_entry_points_at_the_failing_step() {
    let app = spawn_app().await;
    let token = issue_refresh_token(USERNAME, &app.jwt).unwrap();

    app.post("/auth/renew", &json!({"token": token})).await;

    let entries = app.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].code, 404);
    assert!(entries[0].file.ends_with("lifecycle.rs"));
}

#[tokio::test]
async fn failing_audit_log_does_not_change_the_response() {
    let address = spawn_server(AppState::new(
        Arc::new(provisioned_credentials()),
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(FailingAuditLog),
        jwt_settings(),
    ));

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/login", address))
        .json(&json!({"username": USERNAME, "password": "wrong"}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["message"], "Login failed, wrong username or password!");
}

#[tokio::test]
async fn successful_requests_are_not_audited() {
    let app = spawn_app().await;

    app.login().await;

    assert!(app.audit.entries().is_empty());
}

// --- Current user ---

#[tokio::test]
async fn me_returns_user_for_valid_access_token() {
    let app = spawn_app().await;
    let login = app.login().await;
    let access = login["data"]["access_token"].as_str().unwrap();

    let response = reqwest::Client::new()
        .get(&format!("{}/api/me", &app.address))
        .bearer_auth(access)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["username"], USERNAME);
    assert!(body["data"]["last_login"].as_str().is_some());
    assert!(body["data"].get("password").is_none());
}

#[tokio::test]
async fn me_returns_401_without_token() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .get(&format!("{}/api/me", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], 401);
    assert_eq!(app.audit.entries().len(), 1);
}

#[tokio::test]
async fn me_rejection_carries_request_id() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .get(&format!("{}/api/me", &app.address))
        .header("x-request-id", "trace-me-401")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("trace-me-401")
    );
    assert_eq!(app.audit.entries()[0].request_id, "trace-me-401");
}

#[tokio::test]
async fn me_rejects_refresh_token_as_bearer() {
    let app = spawn_app().await;
    let login = app.login().await;
    let refresh = login["data"]["refresh_token"].as_str().unwrap();

    let response = reqwest::Client::new()
        .get(&format!("{}/api/me", &app.address))
        .bearer_auth(refresh)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

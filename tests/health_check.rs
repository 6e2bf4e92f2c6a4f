//! Integration tests for the inventory auth server

use std::net::TcpListener;
use std::sync::Arc;

use inventory_auth::auth::{AuthService, SessionTokens, MIN_HASH_COST};
use inventory_auth::clock::{Clock, SystemClock};
use inventory_auth::configuration::{ApplicationSettings, Environment, StorageSettings};
use inventory_auth::startup::run;
use inventory_auth::storage::AuthStore;

struct TestApp {
    address: String,
    _data_dir: tempfile::TempDir,
}

fn spawn_app() -> TestApp {
    let data_dir = tempfile::tempdir().expect("Failed to create data dir");
    let storage = StorageSettings {
        data_dir: data_dir.path().to_path_buf(),
        ..StorageSettings::default()
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = AuthStore::open(&storage).expect("Failed to open store");
    let tokens = SessionTokens::new(
        b"health-check-secret-at-least-32-bytes",
        "inventory-auth".to_string(),
        3600,
        Arc::clone(&clock),
    );
    let auth = AuthService::new(store, tokens, clock, MIN_HASH_COST)
        .expect("Failed to build auth service");

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let application = ApplicationSettings {
        host: "127.0.0.1".to_string(),
        port,
        environment: Environment::Local,
        trust_forwarded_for: false,
    };
    let server = run(listener, auth, application).expect("Failed to create server");

    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        _data_dir: data_dir,
    }
}

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_public_path_returns_404() {
    let app = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/nothing-here", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(404, response.status().as_u16());
}

//! End to end, over real HTTP: a hosting bot heartbeats in, the listing
//! reports it online, and once its heartbeat goes stale past the
//! configured threshold the listing reports it offline; deleting that
//! entry always reports success.

use hive_orchestrator::auth::AuthConfig;
use hive_orchestrator::config::RuntimeConfig;
use hive_orchestrator::connector::{DelegatedKey, InstrumentMeta};
use hive_orchestrator::orchestrator::{Orchestrator, OrchestratorArgs};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

mod support;

async fn spawn_hive_api(
    rest_base_url: String,
    bot_offline_after: Duration,
) -> (String, tempfile::NamedTempFile) {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let runtime_config = RuntimeConfig {
        bot_offline_after,
        ..RuntimeConfig::default()
    };

    let args = OrchestratorArgs {
        database_path: db_file.path().to_string_lossy().to_string(),
        rest_base_url,
        ws_url: "ws://127.0.0.1:1/ws".to_string(),
        delegated_key: DelegatedKey::new("0xtest-main".into(), "test-agent-secret".into()),
        instrument_meta: InstrumentMeta {
            tick_size: 0.01,
            lot_size: 0.001,
        },
        dashboard_url: None,
        bot_id: "hive-test".into(),
        api_port: 0,
        runtime_config,
    };
    let orchestrator = Orchestrator::new(args).unwrap();

    let auth_config = Arc::new(AuthConfig {
        admin_token: Some("test-admin-token".to_string()),
        timestamp_freshness_window: None,
    });
    let app = hive_orchestrator::api::router(orchestrator, auth_config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{addr}"), db_file)
}

fn heartbeat_body(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": "hive-test-instance",
        "status": "running",
        "strategies": [],
        "uptime": 42,
        "total_strategies": 0,
        "total_actions": 0,
        "actions_per_minute": 0.0,
        "memory_usage": 0,
        "cpu_usage": 0.0,
        "api_port": 9090,
        "last_activity": chrono::Utc::now().to_rfc3339(),
    })
}

#[tokio::test]
async fn bot_goes_offline_after_threshold_and_deletes_cleanly() {
    let (_venue_url, _venue) = support::spawn_stub_venue().await;
    let (base_url, _db_file) = spawn_hive_api(_venue_url, Duration::from_millis(50)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base_url}/bots"))
        .header("x-admin-token", "test-admin-token")
        .json(&heartbeat_body("hive-test"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    let listing = client
        .get(format!("{base_url}/bots"))
        .header("x-admin-token", "test-admin-token")
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let bots = listing["bots"].as_array().unwrap();
    assert_eq!(bots.len(), 1);
    assert_eq!(bots[0]["offline"], false);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let listing = client
        .get(format!("{base_url}/bots"))
        .header("x-admin-token", "test-admin-token")
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let bots = listing["bots"].as_array().unwrap();
    assert_eq!(bots[0]["id"], "hive-test");
    assert_eq!(bots[0]["offline"], true);

    let resp = client
        .delete(format!("{base_url}/bots/hive-test"))
        .header("x-admin-token", "test-admin-token")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    let listing = client
        .get(format!("{base_url}/bots"))
        .header("x-admin-token", "test-admin-token")
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(listing["bots"].as_array().unwrap().len(), 0);
}

//! End-to-end smoke test for troop-coordinator.
//!
//! Starts the real coordinator process against a fresh temp directory and
//! drives the marketplace lifecycle over HTTP: proof-of-hardware, heartbeat
//! and discovery, authorization with starter credits, settlement of a signed
//! receipt, and the forged/replayed receipt failure paths.
//!
//! Run with:
//!   cargo test -p troop-coordinator --test smoke

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use troop_core::constants::{ESTIMATED_JOB_DURATION, STARTER_CREDITS};
use troop_crypto::receipt_signature;
use troop_crypto::ticket::verify_with_public_pem;

const RECEIPT_SECRET: &str = "smoke-receipt-secret";
const ADMIN_PASSWORD: &str = "smoke-admin-password";
const GOOD_HASH: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

// ── Coordinator lifecycle ─────────────────────────────────────────────────────

struct CoordinatorGuard {
    child: Child,
    root_dir: PathBuf,
}

impl Drop for CoordinatorGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.root_dir);
    }
}

/// Find a free TCP port on loopback.
fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Poll /health until the coordinator responds or the timeout elapses.
/// First startup includes RSA keygen, so this is generous.
async fn wait_for_health(client: &reqwest::Client, base: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.get(format!("{base}/health")).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

async fn post_json(client: &reqwest::Client, url: String, body: Value) -> (u16, Value) {
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .expect("POST request");
    let status = resp.status().as_u16();
    (status, resp.json().await.expect("JSON body"))
}

async fn get_json(client: &reqwest::Client, url: String) -> Value {
    client
        .get(url)
        .send()
        .await
        .expect("GET request")
        .json()
        .await
        .expect("JSON body")
}

async fn balance_of(client: &reqwest::Client, base: &str, pk: &str) -> i64 {
    get_json(client, format!("{base}/users/{pk}/balance")).await["balance_seconds"]
        .as_i64()
        .unwrap()
}

fn heartbeat_body(node_id: &str, status: &str, models: &[&str]) -> Value {
    json!({
        "node_id": node_id,
        "mesh_ip": "100.64.0.7",
        "status": status,
        "models": models,
        "hardware": {"gpu": "RTX 3060", "vram_free": 10240},
        "engine": {"type": "ollama", "version": "0.1.17", "port": 11434},
    })
}

/// Challenge + verify for `node_id`, returning the assigned multiplier.
async fn prove_hardware(
    client: &reqwest::Client,
    base: &str,
    node_id: &str,
    duration: f64,
    device: &str,
) -> Value {
    let (status, challenge) = post_json(
        client,
        format!("{base}/hardware/challenge"),
        json!({"node_id": node_id}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(challenge["matrix_size"], 4096);
    assert!(!challenge["seed"].as_str().unwrap().is_empty());

    let (status, verified) = post_json(
        client,
        format!("{base}/hardware/verify"),
        json!({
            "node_id": node_id,
            "challenge_token": challenge["challenge_token"],
            "proof_hash": GOOD_HASH,
            "duration": duration,
            "device_name": device,
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(verified["status"], "verified");
    verified
}

// ── Smoke test ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn smoke_marketplace_lifecycle() {
    // ── 1. Fresh directories, spawn the coordinator ───────────────────────────
    let root_dir = std::env::temp_dir().join(format!("troop_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root_dir);
    std::fs::create_dir_all(&root_dir).unwrap();

    let port = free_port();
    let base = format!("http://127.0.0.1:{port}");

    let coordinator_bin = env!("CARGO_BIN_EXE_troop-coordinator");
    let child = Command::new(coordinator_bin)
        .args([
            "--data-dir",    root_dir.join("data").to_str().unwrap(),
            "--keys-dir",    root_dir.join("keys").to_str().unwrap(),
            "--audit-log",   root_dir.join("logs/audit.log").to_str().unwrap(),
            "--listen-addr", &format!("127.0.0.1:{port}"),
        ])
        .env("RECEIPT_SECRET", RECEIPT_SECRET)
        .env("ADMIN_PASSWORD", ADMIN_PASSWORD)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn troop-coordinator");

    let _guard = CoordinatorGuard { child, root_dir };

    let http = reqwest::Client::new();
    assert!(
        wait_for_health(&http, &base, Duration::from_secs(30)).await,
        "coordinator did not become ready within 30 seconds"
    );

    // ── 2. Cold start: baseline GPU proves hardware at 1.0× ───────────────────
    let verified = prove_hardware(&http, &base, "n1", 35.0, "RTX 3060").await;
    assert_eq!(verified["assigned_multiplier"], 1.0);
    assert_eq!(verified["tier"], "Standard");

    // ── 3. Fast GPU lands in the High Performance tier ────────────────────────
    let verified = prove_hardware(&http, &base, "n2", 7.0, "RTX 4090").await;
    assert_eq!(verified["assigned_multiplier"], 5.0);
    assert_eq!(verified["tier"], "High Performance");

    // ── 4. Heartbeat → discovery ──────────────────────────────────────────────
    let (status, ack) = post_json(
        &http,
        format!("{base}/heartbeat"),
        heartbeat_body("n1", "IDLE", &["llama2:7b"]),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(ack["status"], "seen");

    let peers = get_json(&http, format!("{base}/peers?model=llama2:7b")).await;
    assert_eq!(peers["count"], 1);
    assert_eq!(peers["nodes"][0]["node_id"], "n1");

    let models = get_json(&http, format!("{base}/v1/models")).await;
    assert_eq!(models["object"], "list");
    assert_eq!(models["data"][0]["id"], "llama2:7b");
    assert_eq!(models["data"][0]["owned_by"], "monkey-troop");

    // ── 5. First authorization: lazy user, reservation, verifiable ticket ─────
    let (status, authorized) = post_json(
        &http,
        format!("{base}/authorize"),
        json!({"model": "llama2:7b", "requester": "u1"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(authorized["target_ip"], "100.64.0.7");
    assert_eq!(authorized["estimated_cost"], ESTIMATED_JOB_DURATION);

    assert_eq!(
        balance_of(&http, &base, "u1").await,
        STARTER_CREDITS - ESTIMATED_JOB_DURATION
    );

    // Workers verify tickets offline against the distributed public key.
    let pem = get_json(&http, format!("{base}/public-key")).await["public_key"]
        .as_str()
        .unwrap()
        .to_string();
    let claims = verify_with_public_pem(&pem, authorized["token"].as_str().unwrap())
        .expect("fresh ticket verifies against distributed key");
    assert_eq!(claims.sub, "u1");
    assert_eq!(claims.target_node, "n1");

    // ── 6. Starvation: no worker serves this model ────────────────────────────
    let (status, _) = post_json(
        &http,
        format!("{base}/authorize"),
        json!({"model": "gpt-oss:20b", "requester": "u2"}),
    )
    .await;
    assert_eq!(status, 503);
    // u2 was created with the starter grant, and nothing was reserved.
    assert_eq!(balance_of(&http, &base, "u2").await, STARTER_CREDITS);

    // ── 7. Settlement of a signed receipt ─────────────────────────────────────
    let signature = receipt_signature(RECEIPT_SECRET, &"j1".into(), &"n1".into(), 200);
    let (status, settled) = post_json(
        &http,
        format!("{base}/transactions/submit"),
        json!({
            "job_id": "j1",
            "requester_public_key": "u1",
            "worker_node_id": "n1",
            "duration_seconds": 200,
            "signature": signature,
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(settled["status"], "success");
    assert_eq!(settled["credits_transferred"], 200);
    assert_eq!(settled["requester_balance"], 3300);

    let history = get_json(&http, format!("{base}/users/u1/transactions")).await;
    let completions: Vec<&Value> = history["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|t| t["type"] == "job_completion")
        .collect();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0]["job_id"], "j1");
    assert_eq!(completions[0]["credits"], 200);

    // ── 8. Forged receipt: rejected, nothing settles ──────────────────────────
    let (status, body) = post_json(
        &http,
        format!("{base}/transactions/submit"),
        json!({
            "job_id": "j2",
            "requester_public_key": "u1",
            "worker_node_id": "n1",
            "duration_seconds": 200,
            "signature": "0".repeat(64),
        }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "error");

    // ── 9. Replay of the settled receipt is rejected ──────────────────────────
    let signature = receipt_signature(RECEIPT_SECRET, &"j1".into(), &"n1".into(), 200);
    let (status, body) = post_json(
        &http,
        format!("{base}/transactions/submit"),
        json!({
            "job_id": "j1",
            "requester_public_key": "u1",
            "worker_node_id": "n1",
            "duration_seconds": 200,
            "signature": signature,
        }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "error");

    // ── 10. Admin audit trail ─────────────────────────────────────────────────
    let unauthorized = http
        .get(format!("{base}/admin/audit"))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status().as_u16(), 401);

    let audit: Value = http
        .get(format!("{base}/admin/audit?limit=100"))
        .basic_auth("admin", Some(ADMIN_PASSWORD))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let events: Vec<&str> = audit["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["event_type"].as_str().unwrap())
        .collect();
    assert!(events.contains(&"authorization"));
    assert!(events.contains(&"transaction"));
    assert!(events.contains(&"security"));
}

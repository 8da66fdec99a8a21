use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
struct DeviceResponse {
    device_id: String,
}

#[derive(Debug, Deserialize)]
struct RoomResponse {
    code: String,
}

#[derive(Debug, Deserialize)]
struct ToggleResponse {
    day: String,
    done: bool,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_data_path(kind: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "sober_board_http_{kind}_{}_{}.json",
        std::process::id(),
        nanos
    ));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/period")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_sober_board"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", unique_data_path("devices"))
        .env("BACKEND_DATA_PATH", unique_data_path("backend"))
        .env("TRACKED_PERIOD", "2026-02")
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

async fn register_device(client: &Client, server: &TestServer) -> String {
    let response = client
        .post(format!("{}/api/devices", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json::<DeviceResponse>().await.unwrap().device_id
}

fn device_url(server: &TestServer, device: &str, path: &str) -> String {
    format!("{}/api/devices/{device}/{path}", server.base_url)
}

fn done_on(dashboard: &Value, nickname: &str, index: usize) -> bool {
    dashboard["players"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|player| player["nickname"] == nickname)
        .and_then(|player| player["days"][index].as_bool())
        .unwrap_or(false)
}

#[tokio::test]
async fn http_period_lists_tracked_days() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let period: Value = client
        .get(format!("{}/api/period", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(period["label"], "February 2026");
    assert_eq!(period["days"].as_array().unwrap().len(), 28);
    assert_eq!(period["days"][0], "2026-02-01");
    assert_eq!(period["avatars"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn http_two_devices_share_a_room() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let ana = register_device(&client, &server).await;
    let ben = register_device(&client, &server).await;

    let response = client
        .post(device_url(&server, &ana, "rooms"))
        .json(&json!({ "code": null, "nickname": "Ana", "avatar": "fox" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let room: RoomResponse = response.json().await.unwrap();
    assert_eq!(room.code.len(), 6);

    let response = client
        .post(device_url(&server, &ben, "join"))
        .json(&json!({ "code": room.code.to_lowercase(), "nickname": "Ben" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let toggled: ToggleResponse = client
        .post(device_url(&server, &ana, "toggle"))
        .json(&json!({ "day": "2026-02-03" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled.day, "2026-02-03");
    assert!(toggled.done);

    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let dashboard: Value = client
            .get(device_url(&server, &ben, "dashboard"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if done_on(&dashboard, "Ana", 2) {
            assert_eq!(dashboard["room_code"], room.code.as_str());
            assert_eq!(dashboard["players"].as_array().unwrap().len(), 2);
            break;
        }
        if Instant::now() > deadline {
            panic!("partner never saw the check-in: {dashboard}");
        }
        sleep(Duration::from_millis(50)).await;
    }

    let response = client
        .post(device_url(&server, &ben, "leave"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let dashboard: Value = client
        .get(device_url(&server, &ben, "dashboard"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(dashboard["room_code"].is_null());
}

#[tokio::test]
async fn http_join_unknown_room_is_not_found() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let device = register_device(&client, &server).await;

    let response = client
        .post(device_url(&server, &device, "join"))
        .json(&json!({ "code": "NOSUCHROOM", "nickname": "Ana" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_create_with_taken_code_conflicts() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let first = register_device(&client, &server).await;
    let second = register_device(&client, &server).await;

    let response = client
        .post(device_url(&server, &first, "rooms"))
        .json(&json!({ "code": "httptaken", "nickname": "Ana" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .post(device_url(&server, &second, "rooms"))
        .json(&json!({ "code": "HTTPTAKEN", "nickname": "Ben" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn http_toggle_rejects_bad_days() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let device = register_device(&client, &server).await;

    let response = client
        .post(device_url(&server, &device, "toggle"))
        .json(&json!({ "day": "2026-02-03" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    client
        .post(device_url(&server, &device, "rooms"))
        .json(&json!({ "nickname": "Ana" }))
        .send()
        .await
        .unwrap();

    for day in ["yesterday", "2026-03-01"] {
        let response = client
            .post(device_url(&server, &device, "toggle"))
            .json(&json!({ "day": day }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "day {day}");
    }
}

#[tokio::test]
async fn http_unregistered_device_is_not_found() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let stranger = "6f1c1f64-3c2b-4d7e-9a51-0f5c2b1e9d42";

    let response = client
        .get(device_url(&server, stranger, "dashboard"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client
        .post(device_url(&server, stranger, "join"))
        .json(&json!({ "code": "ANY", "nickname": "Eve" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let device = register_device(&client, &server).await;
    let response = client
        .get(device_url(&server, &device, "dashboard"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let dashboard: Value = response.json().await.unwrap();
    assert!(dashboard["room_code"].is_null());
    assert_eq!(dashboard["live"], false);
}

//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use model_router::config::RouterConfig;
use model_router::lifecycle::{ModelLifecycle, ModelRouter, Shutdown, StartupError};
use model_router::loader::ProcessLoader;
use sdk_rust::client::{ModelInfo, RouterClient};

/// Read one request head so the client is not reset mid-write.
async fn read_head(socket: &mut TcpStream) {
    let mut buf = [0u8; 4096];
    let mut seen = Vec::new();
    while let Ok(n) = socket.read(&mut buf).await {
        if n == 0 {
            break;
        }
        seen.extend_from_slice(&buf[..n]);
        if seen.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
}

async fn respond(socket: &mut TcpStream, status: u16, body: &str) {
    let status_text = match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Start a mock model server that answers every request with `response`.
///
/// Returns the bound address (use port 0 for an ephemeral one).
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) -> SocketAddr {
    start_programmable_backend(addr, move || async move { (200, response.to_string()) }).await
}

/// Start a mock model server whose responses come from `f`.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let local = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_head(&mut socket).await;
                        let (status, body) = f().await;
                        respond(&mut socket, status, &body).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    local
}

/// A preset file in its own temporary directory.
pub struct PresetFile {
    _dir: tempfile::TempDir,
    pub path: PathBuf,
}

impl PresetFile {
    pub fn new(content: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.ini");
        std::fs::write(&path, content).unwrap();
        Self { _dir: dir, path }
    }

    pub fn write(&self, content: &str) {
        std::fs::write(&self.path, content).unwrap();
    }

    pub fn append(&self, content: &str) {
        let mut current = std::fs::read_to_string(&self.path).unwrap();
        current.push_str(content);
        self.write(&current);
    }
}

/// A router serving on an ephemeral port.
pub struct TestRouter {
    pub url: String,
    pub client: RouterClient,
    pub lifecycle: Arc<ModelLifecycle>,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), StartupError>>,
}

impl TestRouter {
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.task.await;
    }

    pub async fn model(&self, name: &str) -> Option<ModelInfo> {
        self.client.model(name).await.unwrap()
    }

    pub async fn model_ids(&self) -> Vec<String> {
        self.client
            .list_models()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect()
    }
}

/// Config for tests: ephemeral port, 1s watch, fast probes.
pub fn test_config(preset: &PresetFile) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.models.preset = preset.path.to_string_lossy().into_owned();
    config.models.watch = true;
    config.models.watch_interval_secs = 1;
    config.models.load_timeout_secs = 10;
    config.backend.probe_interval_ms = 20;
    config.backend.probe_max_delay_ms = 100;
    config.backend.upstream_probe_attempts = 3;
    config
}

pub async fn start_router(config: RouterConfig) -> TestRouter {
    let loader = Arc::new(ProcessLoader::new(config.backend.clone()));
    let router = ModelRouter::start(config, loader).await.unwrap();
    let listener = router.bind().await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let lifecycle = router.lifecycle().clone();
    let shutdown = router.shutdown();
    let task = tokio::spawn(router.serve(listener));

    TestRouter {
        client: RouterClient::new(&url),
        url,
        lifecycle,
        shutdown,
        task,
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

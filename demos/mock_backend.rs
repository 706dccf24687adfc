//! Stand-in for a model server: answers `/health` and `/v1/chat/completions`.
//!
//! Point an `upstream` preset entry at it to try the router without a GPU:
//!
//! ```text
//! cargo run --example mock_backend -- 8081
//! [demo]
//! upstream = 127.0.0.1:8081
//! ```

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(8081);

    let app = Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/v1/chat/completions", post(chat));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("Mock model server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn chat(Json(request): Json<Value>) -> Json<Value> {
    let model = request["model"].as_str().unwrap_or("unknown").to_string();
    Json(json!({
        "object": "chat.completion",
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": "hello from the mock backend" },
            "finish_reason": "stop"
        }]
    }))
}

//! Walk through the router API with the Rust SDK.
//!
//! Expects a router on localhost:8080 whose preset declares `demo`.

use sdk_rust::client::RouterClient;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = RouterClient::new("http://localhost:8080");

    println!("Models:");
    for model in client.list_models().await? {
        println!(
            "  {:<20} {:<10} rev {} {}",
            model.id,
            model.status.value,
            model.status.revision,
            model.last_error.unwrap_or_default()
        );
    }

    println!("Loading demo...");
    client.load_model("demo").await?;

    let reply = client
        .chat(&json!({
            "model": "demo",
            "messages": [{ "role": "user", "content": "hi" }]
        }))
        .await?;
    println!("Reply: {}", reply["choices"][0]["message"]["content"]);

    client.unload_model("demo").await?;
    Ok(())
}

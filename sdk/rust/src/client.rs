use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Status block of a listed model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatusInfo {
    /// One of `unloaded`, `loading`, `loaded`, `error`.
    pub value: String,
    pub revision: u64,
    pub in_config: bool,
    #[serde(default)]
    pub failed: bool,
}

/// One entry of `GET /models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub status: ModelStatusInfo,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelInfo>,
}

pub struct RouterClient {
    client: Client,
    router_url: String,
}

impl RouterClient {
    pub fn new(router_url: &str) -> Self {
        Self {
            client: Client::new(),
            router_url: router_url.trim_end_matches('/').to_string(),
        }
    }

    /// All models known to the router, including removed and invalid ones.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, Box<dyn std::error::Error>> {
        let resp = self
            .client
            .get(format!("{}/models", self.router_url))
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(format!("Router returned error status {}: {}", status, text).into());
        }
        Ok(serde_json::from_str::<ModelList>(&text)?.data)
    }

    /// A single model by name, if listed.
    pub async fn model(&self, name: &str) -> Result<Option<ModelInfo>, Box<dyn std::error::Error>> {
        Ok(self.list_models().await?.into_iter().find(|m| m.id == name))
    }

    /// Load a model and wait until it is ready.
    pub async fn load_model(&self, name: &str) -> Result<Value, Box<dyn std::error::Error>> {
        self.post_json("/models/load", &json!({ "model": name })).await
    }

    pub async fn unload_model(&self, name: &str) -> Result<Value, Box<dyn std::error::Error>> {
        self.post_json("/models/unload", &json!({ "model": name })).await
    }

    /// Send a chat completion request; the body is passed through unchanged.
    pub async fn chat(&self, body: &Value) -> Result<Value, Box<dyn std::error::Error>> {
        self.post_json("/v1/chat/completions", body).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, Box<dyn std::error::Error>> {
        let resp = self
            .client
            .post(format!("{}{}", self.router_url, path))
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(format!("Router returned error status {}: {}", status, text).into());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "router-cli")]
#[command(about = "Management CLI for the model router", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key (only needed for `status` and `reload`)
    #[arg(short, long, env = "ROUTER_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List models with their status
    Models,
    /// Load a model now
    Load { name: String },
    /// Unload a model
    Unload { name: String },
    /// Router status (admin)
    Status,
    /// Force a preset reload (admin)
    Reload,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut admin_headers = HeaderMap::new();
    if !cli.key.is_empty() {
        admin_headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
        );
    }

    match cli.command {
        Commands::Models => {
            let res = client.get(format!("{}/models", cli.url)).send().await?;
            let status = res.status();
            let body: Value = res.json().await?;
            if !status.is_success() {
                eprintln!("Error: router returned status {}", status);
                std::process::exit(1);
            }
            print_models(&body);
        }
        Commands::Load { name } => {
            let res = client
                .post(format!("{}/models/load", cli.url))
                .json(&json!({ "model": name }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Unload { name } => {
            let res = client
                .post(format!("{}/models/unload", cli.url))
                .json(&json!({ "model": name }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.url))
                .headers(admin_headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Reload => {
            let res = client
                .post(format!("{}/admin/reload", cli.url))
                .headers(admin_headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn print_models(body: &Value) {
    let empty = Vec::new();
    let models = body["data"].as_array().unwrap_or(&empty);
    println!("{:<24} {:<10} {:>8} {:<9} {}", "MODEL", "STATUS", "REVISION", "IN CONFIG", "LAST ERROR");
    for model in models {
        println!(
            "{:<24} {:<10} {:>8} {:<9} {}",
            model["id"].as_str().unwrap_or("?"),
            model["status"]["value"].as_str().unwrap_or("?"),
            model["status"]["revision"].as_u64().unwrap_or(0),
            model["status"]["in_config"].as_bool().unwrap_or(false),
            model["last_error"].as_str().unwrap_or("-"),
        );
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: router returned status {}", status);
        eprintln!("{}", text);
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}

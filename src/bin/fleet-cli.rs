use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "fleet-cli")]
#[command(about = "Query a running fleet-router over its admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Bearer token, if the admin API requires one.
    #[arg(short, long, env = "FLEET_ADMIN_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Router version and instance counts
    Status,
    /// Fleet-wide snapshot
    Fleet,
    /// Per-category breakdown
    Categories,
    /// One category with its instances
    Category { name: String },
    /// Health of every instance
    Health,
    /// Circuit breaker states
    Breakers,
    /// Unresolved alerts, most recent first
    Alerts {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Health record of one instance
    InstanceHealth { id: String },
    /// Metric history of one instance
    InstanceMetrics { id: String },
}

impl Commands {
    fn path(&self) -> String {
        match self {
            Commands::Status => "/admin/status".to_string(),
            Commands::Fleet => "/admin/fleet".to_string(),
            Commands::Categories => "/admin/categories".to_string(),
            Commands::Category { name } => format!("/admin/categories/{name}"),
            Commands::Health => "/admin/health".to_string(),
            Commands::Breakers => "/admin/breakers".to_string(),
            Commands::Alerts { limit: Some(limit) } => format!("/admin/alerts?limit={limit}"),
            Commands::Alerts { limit: None } => "/admin/alerts".to_string(),
            Commands::InstanceHealth { id } => format!("/admin/instances/{id}/health"),
            Commands::InstanceMetrics { id } => format!("/admin/instances/{id}/metrics"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }

    let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.command.path());
    let res = client.get(url).headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

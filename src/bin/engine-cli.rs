use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "engine-cli")]
#[command(about = "Management CLI for the endpoint engine", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key (not needed for `status`).
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show engine health, route and snapshot counts
    Status,
    /// List declared routes
    Routes,
    /// List snapshot keys holding state
    Snapshots,
    /// Show one snapshot record
    Snapshot { key: String },
    /// Reload the endpoint file
    Reload,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}"))?,
        );
    }

    let request = match &cli.command {
        Commands::Status => client.get(format!("{base}/_engine/health")),
        Commands::Routes => client.get(format!("{base}/_engine/routes")),
        Commands::Snapshots => client.get(format!("{base}/_engine/snapshots")),
        Commands::Snapshot { key } => client.get(format!(
            "{base}/_engine/snapshots/{}",
            urlencoding::encode(key)
        )),
        Commands::Reload => client.post(format!("{base}/_engine/reload")),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: engine returned status {status}");
        if let Ok(text) = res.text().await {
            eprintln!("Response: {text}");
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

use clap::{Parser, Subcommand};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::{json, Value};

/// Bytes escaped in a route path; `/` is kept as the segment separator.
const ROUTE_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Parser)]
#[command(name = "switchyard-cli")]
#[command(about = "Manage routes on a running switchyard proxy", long_about = None)]
struct Cli {
    /// Control API base URL.
    #[arg(short, long, default_value = "http://127.0.0.1:8001")]
    url: String,

    /// Control API token; read from SWITCHYARD_AUTH_TOKEN when unset.
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List routes, optionally only those idle since a timestamp
    List {
        #[arg(long)]
        inactive_since: Option<String>,
    },
    /// Show one route
    Get { path: String },
    /// Add or replace a route
    Add { path: String, target: String },
    /// Delete a route
    Delete { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = format!("{}/api/routes", cli.url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    if let Some(token) = cli.token.or_else(|| std::env::var("SWITCHYARD_AUTH_TOKEN").ok()) {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("token {token}"))?);
    }

    let res = match cli.command {
        Commands::List { inactive_since } => {
            let mut req = client.get(&base).headers(headers);
            if let Some(since) = inactive_since {
                req = req.query(&[("inactive_since", since)]);
            }
            req.send().await?
        }
        Commands::Get { path } => client.get(route_url(&base, &path)).headers(headers).send().await?,
        Commands::Add { path, target } => {
            client
                .post(route_url(&base, &path))
                .headers(headers)
                .json(&json!({ "target": target }))
                .send()
                .await?
        }
        Commands::Delete { path } => client.delete(route_url(&base, &path)).headers(headers).send().await?,
    };

    print_response(res).await
}

fn route_url(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    format!("{base}/{}", utf8_percent_encode(path, ROUTE_PATH))
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: control API returned status {status}");
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {text}");
            }
        }
        std::process::exit(1);
    }

    match status {
        StatusCode::CREATED => println!("Created"),
        StatusCode::NO_CONTENT => println!("Deleted"),
        _ => {
            let json: Value = res.json().await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

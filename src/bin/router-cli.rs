use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "router-cli")]
#[command(about = "Management CLI for the subdomain router admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081", env = "ROUTER_ADMIN_URL")]
    url: String,

    #[arg(short, long, env = "ROUTER_ADMIN_KEY")]
    key: String,

    /// Tenant id for per-site commands.
    #[arg(short, long, default_value_t = 1)]
    tenant: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogKind {
    All,
    Domain,
    Subdomain,
}

#[derive(Subcommand)]
enum Commands {
    /// Router version and tenant count
    Status,
    /// Per-tenant mapping and redirect totals
    Network,
    /// Every tenant's mappings
    NetworkMappings,
    /// Busiest keys summed across tenants
    NetworkStats {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// List subdomain mappings
    Mappings,
    /// Map a subdomain to a content id
    MapResource {
        subdomain: String,
        resource_id: i64,
    },
    /// Map a subdomain to an external URL
    MapUrl {
        subdomain: String,
        url: String,
        #[arg(long, default_value_t = 301)]
        code: u16,
    },
    /// Redirect a subdomain to the site root
    MapHome {
        subdomain: String,
        #[arg(long, default_value_t = 301)]
        code: u16,
    },
    /// Enable or disable a mapping
    SetActive {
        id: i64,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },
    /// Delete a mapping
    Unmap { id: i64 },
    /// Show routing settings
    Settings,
    /// Add a whole-domain redirect rule
    AddRedirect {
        domain: String,
        target_url: String,
        #[arg(long, default_value_t = 301)]
        code: u16,
        #[arg(long)]
        drop_path: bool,
        #[arg(long)]
        drop_query: bool,
    },
    /// Remove a domain redirect rule by position
    RemoveRedirect { index: usize },
    /// Statistics summary with top and recent keys
    Stats,
    /// Reset one key's statistics, or all with no key
    ResetStats { key: Option<String> },
    /// Browse the event log
    Logs {
        #[arg(long, value_enum, default_value_t = LogKind::All)]
        kind: LogKind,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Delete log entries older than N days (tenant setting when omitted)
    PruneLogs { days: Option<u32> },
    /// Delete every log entry
    ClearLogs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", cli.key))?);
    let client = reqwest::Client::builder().default_headers(headers).build()?;

    let base = cli.url.trim_end_matches('/');
    let tenant = format!("{base}/admin/tenants/{}", cli.tenant);
    let call = |method: Method, url: String| client.request(method, url);

    let request = match cli.command {
        Commands::Status => call(Method::GET, format!("{base}/admin/status")),
        Commands::Network => call(Method::GET, format!("{base}/admin/network")),
        Commands::NetworkMappings => call(Method::GET, format!("{base}/admin/network/mappings")),
        Commands::NetworkStats { limit } => {
            call(Method::GET, format!("{base}/admin/network/statistics?limit={limit}"))
        }
        Commands::Mappings => call(Method::GET, format!("{tenant}/mappings")),
        Commands::MapResource { subdomain, resource_id } => call(Method::POST, format!("{tenant}/mappings"))
            .json(&json!({ "subdomain": subdomain, "kind": "serve_resource", "resource_id": resource_id })),
        Commands::MapUrl { subdomain, url, code } => call(Method::POST, format!("{tenant}/mappings"))
            .json(&json!({ "subdomain": subdomain, "kind": "redirect_url", "url": url, "status_code": code })),
        Commands::MapHome { subdomain, code } => call(Method::POST, format!("{tenant}/mappings"))
            .json(&json!({ "subdomain": subdomain, "kind": "redirect_home", "status_code": code })),
        Commands::SetActive { id, active } => {
            call(Method::POST, format!("{tenant}/mappings/{id}/active")).json(&json!({ "active": active }))
        }
        Commands::Unmap { id } => call(Method::DELETE, format!("{tenant}/mappings/{id}")),
        Commands::Settings => call(Method::GET, format!("{tenant}/settings")),
        Commands::AddRedirect {
            domain,
            target_url,
            code,
            drop_path,
            drop_query,
        } => call(Method::POST, format!("{tenant}/settings/redirect-domains")).json(&json!({
            "from_domain": domain,
            "target_url": target_url,
            "status_code": code,
            "keep_path": !drop_path,
            "keep_query": !drop_query,
        })),
        Commands::RemoveRedirect { index } => {
            call(Method::DELETE, format!("{tenant}/settings/redirect-domains/{index}"))
        }
        Commands::Stats => call(Method::GET, format!("{tenant}/statistics/summary")),
        Commands::ResetStats { key: Some(key) } => call(Method::DELETE, format!("{tenant}/statistics/{key}")),
        Commands::ResetStats { key: None } => call(Method::DELETE, format!("{tenant}/statistics")),
        Commands::Logs { kind, limit } => {
            let kind = match kind {
                LogKind::All => "all",
                LogKind::Domain => "domain",
                LogKind::Subdomain => "subdomain",
            };
            call(Method::GET, format!("{tenant}/logs")).query(&[("kind", kind.to_string()), ("limit", limit.to_string())])
        }
        Commands::PruneLogs { days } => call(Method::POST, format!("{tenant}/logs/prune")).json(&json!({ "days": days })),
        Commands::ClearLogs => call(Method::DELETE, format!("{tenant}/logs")),
    };

    send(request).await
}

async fn send(request: RequestBuilder) -> Result<(), Box<dyn std::error::Error>> {
    let res = request.send().await?;
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

use anyhow::{bail, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use snaplink::analytics::summarize_owner;
use snaplink::auth::AuthService;
use snaplink::config::Config;
use snaplink::storage::{self, LinkStore};

#[derive(Parser)]
#[command(name = "snaplink-admin")]
#[command(about = "Snaplink operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign an auth token for an owner
    IssueToken {
        /// Opaque owner identifier (token subject)
        owner: String,
    },
    /// List the links created by an owner
    List { owner: String },
    /// Show total links and clicks of an owner
    Summary { owner: String },
    /// Show a link with its visit history
    Show { code: String },
}

fn format_millis(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    if let Commands::IssueToken { owner } = &cli.command {
        let auth = AuthService::new(&config.auth);
        println!("{}", auth.issue_token(owner)?);
        return Ok(());
    }

    let store = storage::connect(&config.database).await?;
    store.init().await?;

    match cli.command {
        Commands::IssueToken { .. } => {}
        Commands::List { owner } => {
            let links = store.list_by_owner(&owner).await?;
            if links.is_empty() {
                println!("No links found for '{}'.", owner);
            } else {
                println!("{:<12} {:>8}  {}", "Code", "Clicks", "Destination");
                println!("{}", "-".repeat(80));
                for link in links {
                    println!(
                        "{:<12} {:>8}  {}",
                        link.code, link.click_count, link.destination
                    );
                }
            }
        }
        Commands::Summary { owner } => {
            let summary = summarize_owner(store.as_ref(), &owner).await?;
            println!("Owner:        {}", owner);
            println!("Total links:  {}", summary.total_links);
            println!("Total clicks: {}", summary.total_clicks);
        }
        Commands::Show { code } => {
            let Some((link, visits)) = store.analytics(&code).await? else {
                bail!("short link '{}' not found", code);
            };

            println!("Code:        {}", link.code);
            println!("Destination: {}", link.destination);
            println!("Owner:       {}", link.owner);
            println!("Created:     {}", format_millis(link.created_at));
            println!("Clicks:      {}", link.click_count);

            if !visits.is_empty() {
                println!();
                println!("{:<32} {:<40} {}", "Visited at", "Address", "User agent");
                println!("{}", "-".repeat(100));
                for visit in visits {
                    println!(
                        "{:<32} {:<40} {}",
                        format_millis(visit.visited_at),
                        visit.ip_address,
                        visit.user_agent
                    );
                }
            }
        }
    }

    Ok(())
}

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

use yachts::config::Config;
use yachts::init::setup_logging;
use yachts::YachtsClient;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load Config
    let config_path = std::env::args().nth(1).unwrap_or("yachts.toml".to_string());
    let config_exists = std::path::Path::new(&config_path).exists();
    let config = if config_exists {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    // 2. Setup Logging
    setup_logging(&config);
    info!("Starting yachts...");
    if !config_exists {
        info!("Config file not found, using defaults.");
    }

    // 3. Build client and hooks
    let client = YachtsClient::new(config).context("Failed to build lookup client")?;
    client.set_on_domain_added(|domain| info!(domain, "Domain added to phishing list"));
    client.set_on_domain_deleted(|domain| info!(domain, "Domain removed from phishing list"));

    // 4. Start background sync
    client.start();

    match client.get_database_size().await {
        Ok(size) => info!("Remote database holds {} domains", size),
        Err(e) => warn!("Could not fetch database size: {}", e),
    }

    // 5. Classify stdin lines until EOF or Ctrl-C
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => classify(&client, &line).await,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // 6. Graceful Shutdown
    client.shutdown().await;
    Ok(())
}

async fn classify(client: &YachtsClient, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    if let Some(window) = line.strip_prefix("/recent ") {
        match window.trim().parse::<i64>() {
            Ok(seconds) => match client.get_recent(seconds).await {
                Ok(events) => {
                    for event in events {
                        println!("{:?} {}", event.kind, event.domains.join(", "));
                    }
                }
                Err(e) => println!("error: {e}"),
            },
            Err(_) => println!("error: /recent expects a number of seconds"),
        }
        return;
    }

    // Bare hostnames are checked directly; anything else is scanned for URLs.
    let verdict = if line.contains(char::is_whitespace) || line.contains("://") {
        client.is_phishing(line).await
    } else {
        client.is_phishing_domain(line).await
    };

    match verdict {
        Ok(true) => println!("PHISHING  {line}"),
        Ok(false) => println!("clean     {line}"),
        Err(e) => println!("error: {e}"),
    }
}

use clap::Parser;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rumor::cli;
use rumor::gossip::Gossiper;
use rumor::membership::Node;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rumor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let args = cli::Cli::parse();
    let report_interval = args.report_interval();
    let json = args.json;
    let settings = args.into_settings()?;

    let gossiper = Gossiper::from_settings(&settings).await?;
    info!(
        "Starting {} {} on {} with {} seed peer(s)",
        cli::APP_NAME,
        cli::APP_VERSION,
        gossiper.local_address(),
        settings.peers.len()
    );
    gossiper.start()?;

    let mut reports = time::interval(report_interval);
    reports.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                info!("Received Ctrl-C, shutting down");
                break;
            }
            _ = reports.tick() => report(&gossiper, json)?,
        }
    }

    gossiper.shutdown().await;
    Ok(())
}

fn report(gossiper: &Gossiper, json: bool) -> anyhow::Result<()> {
    let mut members = gossiper.members();
    members.sort_by(|a, b| a.address.cmp(&b.address));

    if json {
        println!("{}", serde_json::to_string(&members)?);
        return Ok(());
    }

    info!("[{}] {} member(s)", gossiper.local_address(), members.len());
    for member in &members {
        info!("  {}", describe(member));
    }
    Ok(())
}

fn describe(node: &Node) -> String {
    let seen = node
        .last_updated_at()
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "{} {} seen={} payload={}",
        node.address,
        node.state,
        seen,
        String::from_utf8_lossy(&node.payload)
    )
}

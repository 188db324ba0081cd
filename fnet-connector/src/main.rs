//! Conduit connector (fnet-connector) - command-line entry point
//!
//! Drives one pairing session against the FNET database: select a node,
//! load two conduits, pair tubes and commit.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fnet_common::config::{RootFolderInitializer, RootFolderResolver};
use fnet_connector::occupancy::OccupancyResolver;
use fnet_connector::{ConduitId, ConnectorSession, NodeId, Side, StatusId, Store};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for fnet-connector
#[derive(Parser, Debug)]
#[command(name = "fnet-connector")]
#[command(about = "Connect tubes of two conduits at a network node")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Database file, overriding the one in the root folder
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Config file to read instead of the platform default
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema and default settings
    Init,

    /// List connection statuses
    Statuses,

    /// Show tube occupancy of a conduit at a node
    Occupancy {
        #[arg(long)]
        conduit: i64,
        #[arg(long)]
        node: i64,
    },

    /// Pair tubes of two conduits at a node and commit
    Connect {
        #[arg(long)]
        node: i64,
        #[arg(long)]
        left: i64,
        #[arg(long)]
        right: i64,
        /// Tube pair as LEFT:RIGHT tube numbers, repeatable
        #[arg(long = "pair", value_parser = parse_pair)]
        pairs: Vec<(u32, u32)>,
        /// Pair all remaining free tubes sequentially
        #[arg(long)]
        auto: bool,
        /// Status for new pairings
        #[arg(long)]
        status: Option<i64>,
        /// Apply the status to every pairing, not only new ones
        #[arg(long, requires = "status")]
        all: bool,
        /// Split fraction on the left conduit
        #[arg(long)]
        split_left: Option<f64>,
        /// Split fraction on the right conduit
        #[arg(long)]
        split_right: Option<f64>,
        /// Remove existing pairings before applying new ones
        #[arg(long)]
        clear: bool,
        /// Print the pending changes without committing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the tubes and pairings of a conduit pair at a node
    Show {
        #[arg(long)]
        node: i64,
        #[arg(long)]
        left: i64,
        #[arg(long)]
        right: i64,
    },
}

fn parse_pair(value: &str) -> std::result::Result<(u32, u32), String> {
    let (left, right) = value
        .split_once(':')
        .ok_or_else(|| format!("expected LEFT:RIGHT, got '{}'", value))?;
    let left = left.trim().parse().map_err(|e| format!("left tube '{}': {}", left, e))?;
    let right = right.trim().parse().map_err(|e| format!("right tube '{}': {}", right, e))?;
    Ok((left, right))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut resolver = RootFolderResolver::new("fnet-connector").with_cli_arg(args.root_folder.clone());
    if let Some(config) = args.config.clone() {
        resolver = resolver.with_config_file(config);
    }
    let file_config = resolver.load_toml().unwrap_or_default();
    let log_level = file_config.log_level.clone().unwrap_or_else(|| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fnet_connector={0},fnet_common={0}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let db_path = match args.database.clone() {
        Some(path) => path,
        None => {
            let root_folder = resolver.resolve();
            let initializer = RootFolderInitializer::new(root_folder.clone())
                .with_database_file(file_config.database_file.clone());
            initializer
                .ensure_directory_exists()
                .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
            initializer.database_path()
        }
    };
    info!("Database: {}", db_path.display());

    let store = Store::new(db_path);

    match args.command {
        Command::Init => {
            store.pool().await.context("Failed to initialize database")?;
            store.close().await;
            info!("Database initialized");
        }

        Command::Statuses => {
            let session = ConnectorSession::open(store).await.context("Failed to open session")?;
            if session.statuses().is_fallback() {
                info!("Status catalog unavailable, showing built-in statuses");
            }
            print_json(&session.statuses().iter().collect::<Vec<_>>())?;
            session.close().await;
        }

        Command::Occupancy { conduit, node } => {
            let pool = store.pool().await.context("Failed to open database")?;
            let mut resolver = OccupancyResolver::new();
            let map = resolver.occupancy(pool, ConduitId(conduit), NodeId(node)).await;
            print_json(&map)?;
            store.close().await;
        }

        Command::Connect {
            node,
            left,
            right,
            pairs,
            auto,
            status,
            all,
            split_left,
            split_right,
            clear,
            dry_run,
        } => {
            let mut session = ConnectorSession::open(store).await.context("Failed to open session")?;
            session.select_node(NodeId(node)).await.context("Failed to select node")?;
            session
                .load_conduits(ConduitId(left), ConduitId(right))
                .await
                .context("Failed to load conduits")?;

            if clear {
                session.remove_all();
            }
            if let Some(status) = status {
                session.set_default_status(StatusId(status))?;
            }
            for (l, r) in pairs {
                session
                    .add_pairing(l, r)
                    .with_context(|| format!("Cannot pair left tube {} with right tube {}", l, r))?;
            }
            if auto {
                let created = session.auto_pair()?;
                info!(count = created.len(), "Auto-paired tubes");
            }
            if let (Some(status), true) = (status, all) {
                session.apply_status_to_all(StatusId(status))?;
            }
            for (side, fraction) in [(Side::Left, split_left), (Side::Right, split_right)] {
                if let Some(fraction) = fraction {
                    if !(0.0..=1.0).contains(&fraction) {
                        bail!("Split fraction for {} conduit must be within 0..1, got {}", side, fraction);
                    }
                    session.fix_split(side, fraction)?;
                }
            }

            if dry_run {
                print_json(&session.preview())?;
            } else {
                let report = session.commit().await.context("Commit failed")?;
                print_json(&report)?;
            }
            session.close().await;
        }

        Command::Show { node, left, right } => {
            let mut session = ConnectorSession::open(store).await.context("Failed to open session")?;
            session.select_node(NodeId(node)).await.context("Failed to select node")?;
            session
                .load_conduits(ConduitId(left), ConduitId(right))
                .await
                .context("Failed to load conduits")?;

            print_json(&serde_json::json!({
                "node": node,
                "left": session.gallery(Side::Left),
                "right": session.gallery(Side::Right),
                "pairings": session.graph().pairings().collect::<Vec<_>>(),
            }))?;
            session.close().await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("2:3"), Ok((2, 3)));
        assert_eq!(parse_pair(" 1 : 12 "), Ok((1, 12)));
        assert!(parse_pair("2-3").is_err());
        assert!(parse_pair("a:1").is_err());
    }

    #[test]
    fn test_cli_parses_connect() {
        let args = Args::try_parse_from([
            "fnet-connector",
            "--database",
            "/tmp/x.db",
            "connect",
            "--node",
            "1",
            "--left",
            "10",
            "--right",
            "20",
            "--pair",
            "1:1",
            "--pair",
            "2:3",
            "--auto",
        ])
        .unwrap();

        match args.command {
            Command::Connect { pairs, auto, status, .. } => {
                assert_eq!(pairs, vec![(1, 1), (2, 3)]);
                assert!(auto);
                assert_eq!(status, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_all_requires_status() {
        let result = Args::try_parse_from([
            "fnet-connector", "connect", "--node", "1", "--left", "10", "--right", "20", "--all",
        ]);
        assert!(result.is_err());
    }
}

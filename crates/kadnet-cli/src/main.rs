//! Command-line front-end for kadnet.
//!
//! This binary drives a running [`kadnet_node::Node`] purely through its
//! public Command API (`submit_publish`, `submit_fetch`, `submit_status`,
//! `start`/`stop`). It owns no overlay or transfer state of its own:
//! everything here is argument parsing, a thin interactive loop, and
//! operator-facing formatting.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use kadnet_node::{CommandSender, FileDescriptor, Node, NodeConfig, ResultCode};
use kadnet_proto::NodeId;
use tracing::{error, info};

/// kadnet - a Kademlia-style peer-to-peer file-sharing node.
#[derive(Parser)]
#[command(name = "kadnet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address the combined RPC / bulk-transfer listener binds to.
    #[arg(long, default_value = "0.0.0.0:8182")]
    bind: SocketAddrV4,

    /// UDP port used for BROADCAST discovery (defaults to bind port + 1).
    #[arg(long)]
    discovery_port: Option<u16>,

    /// Bucket capacity and STORE replication factor (valid range 2..=20).
    #[arg(long, default_value_t = kadnet_node::config::DEFAULT_K)]
    k: usize,

    /// Directory of files this node makes available to FETCH.
    #[arg(long, default_value = "./upload")]
    upload_dir: PathBuf,

    /// Directory fetched files are written into.
    #[arg(long, default_value = "./download")]
    download_dir: PathBuf,

    /// A bootstrap peer to ping once at startup (repeatable).
    #[arg(long = "bootstrap")]
    bootstrap_peers: Vec<SocketAddrV4>,

    /// Seconds between discovery BROADCAST datagrams.
    #[arg(long, default_value_t = 30)]
    broadcast_interval_secs: u64,

    /// Run one command non-interactively instead of opening the menu.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Publish a file from the upload directory and exit.
    Publish {
        /// Name of the file within the upload directory.
        name: String,
    },
    /// Fetch a file by its magnet reference (`hash:name:size`) and exit.
    Fetch {
        /// The magnet reference to fetch.
        magnet: String,
    },
    /// Print routing table / content store counts and exit.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();

    let mut config = NodeConfig::new(cli.bind)
        .with_k(cli.k)
        .with_upload_dir(cli.upload_dir.clone())
        .with_download_dir(cli.download_dir.clone())
        .with_broadcast_interval(Duration::from_secs(cli.broadcast_interval_secs));
    if let Some(port) = cli.discovery_port {
        config = config.with_discovery_port(port);
    }
    for peer in &cli.bootstrap_peers {
        config = config.with_bootstrap_peer(*peer);
    }

    let mut node = Node::new(config);
    node.start().await.context("failed to start node")?;
    info!(id = %node.id(), "kadnet node running");

    let result = run(&node, cli).await;

    node.stop().await.context("failed to stop node cleanly")?;
    result
}

async fn run(node: &Node, cli: Cli) -> Result<()> {
    let commands = node.commands();

    match cli.command {
        Some(Command::Publish { name }) => run_publish(&commands, &node.config().upload_dir, &name).await,
        Some(Command::Fetch { magnet }) => run_fetch(&commands, &magnet).await,
        Some(Command::Status) => run_status(&commands).await,
        None => {
            if std::env::var("DISABLE_CLI").as_deref() == Ok("1") {
                info!("DISABLE_CLI=1: reactor running non-interactively, awaiting Ctrl-C");
                tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
                Ok(())
            } else {
                interactive_menu(&commands, &node.config().upload_dir).await
            }
        }
    }
}

/// A line-oriented command menu over stdin: `publish <name>`,
/// `fetch <magnet>`, `status`, `quit`. Kept deliberately minimal: it only
/// needs to drive the Command API, not reimplement any of its logic.
async fn interactive_menu(commands: &CommandSender, upload_dir: &std::path::Path) -> Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    println!("kadnet ready. Commands: publish <name> | fetch <hash:name:size> | status | quit");
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let verb = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        let outcome = match verb {
            "publish" => run_publish(commands, upload_dir, rest).await,
            "fetch" => run_fetch(commands, rest).await,
            "status" => run_status(commands).await,
            "quit" | "exit" => break,
            other => {
                println!("unknown command: {other}");
                Ok(())
            }
        };
        if let Err(err) = outcome {
            error!(error = %err, "command failed");
        }
    }
    Ok(())
}

async fn run_publish(commands: &CommandSender, upload_dir: &std::path::Path, name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("usage: publish <name>");
    }
    let path = upload_dir.join(name);
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {} from the upload directory", path.display()))?;
    let hash = NodeId::hash_content(&bytes);
    let descriptor = FileDescriptor::new(hash, name, bytes.len() as u64);
    println!("publishing {} ({} bytes)", descriptor.to_magnet(), bytes.len());

    let handle = commands
        .submit_publish(descriptor)
        .map_err(|code| anyhow::anyhow!("publish queue rejected the request: {code:?}"))?;
    let outcome = handle.wait().await;
    print_result_code("publish", outcome.code)
}

async fn run_fetch(commands: &CommandSender, magnet: &str) -> Result<()> {
    if magnet.is_empty() {
        anyhow::bail!("usage: fetch <hash:name:size>");
    }
    let descriptor = FileDescriptor::parse(magnet).context("malformed magnet reference")?;
    let handle = commands
        .submit_fetch(descriptor)
        .map_err(|code| anyhow::anyhow!("fetch queue rejected the request: {code:?}"))?;
    let outcome = handle.wait().await;
    print_result_code("fetch", outcome.code)
}

async fn run_status(commands: &CommandSender) -> Result<()> {
    let handle = commands
        .submit_status()
        .map_err(|code| anyhow::anyhow!("status queue rejected the request: {code:?}"))?;
    let outcome = handle.wait().await;
    if let Some(status) = outcome.status {
        println!(
            "id={} peers={} stored_keys={}",
            status.local_id, status.peer_count, status.stored_keys
        );
    }
    print_result_code("status", outcome.code)
}

fn print_result_code(op: &str, code: ResultCode) -> Result<()> {
    match code {
        ResultCode::Success => {
            println!("{op}: ok");
            Ok(())
        }
        ResultCode::NotFound => {
            println!("{op}: not found");
            Ok(())
        }
        other => {
            println!("{op}: failed ({other:?})");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_default_bind_address() {
        let cli = Cli::parse_from(["kadnet"]);
        assert_eq!(cli.bind, SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8182));
        assert_eq!(cli.k, kadnet_node::config::DEFAULT_K);
    }

    #[test]
    fn cli_parses_publish_subcommand() {
        let cli = Cli::parse_from(["kadnet", "publish", "file.txt"]);
        assert!(matches!(cli.command, Some(Command::Publish { name }) if name == "file.txt"));
    }

    #[test]
    fn cli_parses_repeated_bootstrap_peers() {
        let cli = Cli::parse_from(["kadnet", "--bootstrap", "127.0.0.1:9000", "--bootstrap", "127.0.0.1:9001"]);
        assert_eq!(cli.bootstrap_peers.len(), 2);
    }
}

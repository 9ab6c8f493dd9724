//! # DSM Demo
//!
//! A standalone CLI that runs a whole DSM node set inside one process over
//! the in-memory transport. Every node gets its own driver task, the way each
//! node would run its own application loop in a real deployment.
//!
//! ## Scenario layout (five nodes, four variables)
//!
//! ```text
//! node 1  subscribes  0 1 2 3
//! node 2  subscribes  0 1
//! node 3  subscribes  0 3
//! node 4  subscribes  2 3
//! ```
//!
//! Nodes 1-3 then run a short script of writes and compare-exchanges, print
//! their `inspect()` view every tick, and start closing after tick 2.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::*;
use dsm_sdk::{cluster, Dsm, DsmConfigBuilder, DsmError, ListenerOutcome, MemoryTransport, NodeId};
use tracing_subscriber::EnvFilter;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "dsm-demo")]
#[command(about = "Coordinator-mediated distributed shared memory demo")]
#[command(version)]
struct Cli {
    /// Log filter, e.g. `info` or `dsm_sdk=debug`
    #[arg(long, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scripted multi-node run: subscribe, write, compare-exchange, quorum close
    Scenario {
        /// Number of nodes, coordinator included (at least 2)
        #[arg(long, default_value_t = 5)]
        nodes: u32,
        /// Delay between driver ticks in milliseconds
        #[arg(long, default_value_t = 400)]
        tick_ms: u64,
        /// Delay before the first tick in milliseconds
        #[arg(long, default_value_t = 2000)]
        warmup_ms: u64,
    },
    /// Two nodes race compare-exchanges; the coordinator's arrival order decides
    Race,
    /// A late subscriber replays a compare-exchange against a stale replica
    Stale,
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn show_node(node: &Dsm<MemoryTransport>, tick: usize) {
    let label = format!("[{}] tick {}", node.node_id(), tick);
    println!("{} {}", label.bright_magenta(), node.inspect());
}

fn show_outcome(node: NodeId, outcome: &ListenerOutcome) {
    let text = match outcome {
        ListenerOutcome::Closed => "closed".bright_green().to_string(),
        ListenerOutcome::ProtocolViolation(reason) => {
            format!("{} ({})", "protocol violation".bright_red(), reason)
        }
        ListenerOutcome::Disconnected => "disconnected".bright_red().to_string(),
    };
    step(&format!("node {} listener finished: {}", node, text));
}

// ─── Scenario ─────────────────────────────────────────────────────────────

fn subscriptions(node: u32) -> &'static [usize] {
    match node {
        1 => &[0, 1, 2, 3],
        2 => &[0, 1],
        3 => &[0, 3],
        4 => &[2, 3],
        _ => &[],
    }
}

async fn script(node: &Dsm<MemoryTransport>, tick: usize) -> Result<(), DsmError> {
    match (node.node_id().0, tick) {
        (1, 0) => {
            node.write(0, -5).await?;
            node.write(1, -10).await?;
            node.write(3, -15).await?;
        }
        (1, 1) => node.write(1, 5).await?,
        (1, 2) => node.write(2, 100).await?,

        (2, 0) => {
            node.compare_and_exchange(0, 62, -5).await?;
            node.compare_and_exchange(1, 72, -10).await?;
        }
        (2, 1) => node.write(1, 27).await?,
        (2, 2) => node.write(1, 100).await?,

        (3, 1) => {
            node.compare_and_exchange(3, 15, -15).await?;
        }
        (3, 2) => {
            node.compare_and_exchange(0, 99, 62).await?;
            node.compare_and_exchange(0, 999, -5).await?;
        }

        _ => {}
    }
    Ok(())
}

/// One node's application loop: tick until its listener has finished.
async fn drive(node: Arc<Dsm<MemoryTransport>>, tick: Duration, warmup: Duration) -> Result<ListenerOutcome, DsmError> {
    let id = node.node_id();
    for &index in subscriptions(id.0) {
        node.subscribe(index, id).await?;
    }

    tokio::time::sleep(warmup).await;

    let mut iteration = 0;
    while !node.is_terminated() {
        script(&node, iteration).await?;
        if iteration > 2 {
            node.close().await?;
        }
        show_node(&node, iteration);

        iteration += 1;
        tokio::time::sleep(tick).await;
    }

    node.join().await
}

async fn run_scenario(nodes: u32, tick_ms: u64, warmup_ms: u64) -> Result<(), DsmError> {
    header("SCENARIO — Subscribe, Write, Compare-Exchange, Quorum Close");

    let config = DsmConfigBuilder::new().total_nodes(nodes).variable_count(4).build();
    let cluster: Vec<_> = cluster::start_memory_cluster(&config)?
        .into_iter()
        .map(Arc::new)
        .collect();

    section("Subscriptions");
    for node in &cluster[1..] {
        let indices = subscriptions(node.node_id().0);
        if !indices.is_empty() {
            step(&format!("node {} follows {:?}", node.node_id(), indices));
        }
    }

    section("Running drivers");
    let handles: Vec<_> = cluster
        .iter()
        .map(|node| {
            let node = Arc::clone(node);
            tokio::spawn(drive(
                node,
                Duration::from_millis(tick_ms),
                Duration::from_millis(warmup_ms),
            ))
        })
        .collect();

    section("Listener outcomes");
    for (node, handle) in cluster.iter().zip(handles) {
        let outcome = handle
            .await
            .map_err(|e| DsmError::Listener(e.to_string()))??;
        show_outcome(node.node_id(), &outcome);
    }

    section("Final coordinator state");
    println!("{}", cluster[0].inspect());
    Ok(())
}

// ─── Race ─────────────────────────────────────────────────────────────────

async fn run_race() -> Result<(), DsmError> {
    header("RACE — Compare-Exchange Decided by Coordinator Arrival Order");

    let config = DsmConfigBuilder::new().total_nodes(3).variable_count(1).build();
    let nodes = cluster::start_memory_cluster(&config)?;
    nodes[1].subscribe(0, NodeId(1)).await?;
    nodes[2].subscribe(0, NodeId(2)).await?;

    section("Both participants try 0 → own id");
    let first = nodes[1].compare_and_exchange(0, 1, 0).await?;
    step(&format!("node 1 local outcome: {}", first));
    let second = nodes[2].compare_and_exchange(0, 2, 0).await?;
    step(&format!("node 2 local outcome: {}", second));

    cluster::shutdown(&nodes).await?;

    section("After quorum close");
    for node in &nodes {
        step(&format!("node {} var[0] = {}", node.node_id(), node.load(0)?));
    }
    Ok(())
}

// ─── Stale ────────────────────────────────────────────────────────────────

async fn run_stale() -> Result<(), DsmError> {
    header("STALE — Compare-Exchange Replay on a Late Subscriber");

    let config = DsmConfigBuilder::new().total_nodes(3).variable_count(1).build();
    let nodes = cluster::start_memory_cluster(&config)?;

    nodes[1].write(0, 3).await?;
    step("node 1: var[0] = 3 (nobody subscribed yet)");
    nodes[2].subscribe(0, NodeId(2)).await?;
    step("node 2: subscribes to var[0], replica still 0");
    nodes[1].compare_and_exchange(0, 9, 0).await?;
    step("node 1: compare-exchange 0 → 9");

    cluster::shutdown(&nodes).await?;

    section("After quorum close");
    let authoritative = nodes[0].load(0)?;
    let replica = nodes[2].load(0)?;
    step(&format!("coordinator var[0] = {}", authoritative));
    step(&format!("node 2      var[0] = {}", replica));
    if authoritative == replica {
        println!("\n  {} {}", "✓".bright_green().bold(), "replica matches".bright_green());
    } else {
        println!(
            "\n  {} {}",
            "✗".bright_red().bold(),
            "replica diverged: the replayed compare saw a stale value".bright_red()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .init();

    let result = match cli.command {
        Commands::Scenario {
            nodes,
            tick_ms,
            warmup_ms,
        } => run_scenario(nodes, tick_ms, warmup_ms).await,
        Commands::Race => run_race().await,
        Commands::Stale => run_stale().await,
    };

    if let Err(err) = result {
        eprintln!("{} {}", "error:".bright_red().bold(), err);
        std::process::exit(1);
    }
}

//! # Mooring Notes
//!
//! A standalone CLI that shares a note between simulated clients and an
//! in-memory entity server. Every client edits optimistically, pushes its
//! commits, and reconciles with what the others wrote.
//!
//! ## Entity model
//!
//! ```text
//! note/groceries   { id, title, items: [..], views }
//! origin           last version acknowledged by the server
//! commits          local edits not yet acknowledged
//! head             origin with the commits applied
//! ```

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use mooring_assign::{PushModifier, SortDirection, UpdateOperation, Value};
use mooring_client::prelude::*;
use mooring_state::VersionDiff;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "mooring-notes")]
#[command(about = "Offline-first note sync demo (Mooring client)")]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Basic demo: two clients commit, push, and converge
    Demo,
    /// Conflict scenario: concurrent pushes, out-of-order and duplicated diffs
    Conflict,
    /// Offline scenario: edits while unreachable, reconnect, repush
    Offline,
}

const NOTE: &str = "note";
const NOTE_ID: &str = "groceries";

// ─── Peer: a simulated client with its own local store ─────────────────────

struct Peer {
    name: String,
    sync: SyncManager<MemoryEntityClient>,
    diffs: broadcast::Receiver<VersionDiff>,
}

impl Peer {
    fn new(name: &str, server: &Arc<MemoryEntityClient>) -> Result<Self> {
        let config = ClientConfigBuilder::new().entity(NOTE).build();
        let store = Arc::new(LocalStore::new(&config)?);
        Ok(Self {
            name: name.to_string(),
            sync: SyncManager::new(store, server.clone(), config),
            diffs: server.subscribe(),
        })
    }

    async fn join(&self) -> Result<()> {
        self.sync.follow(NOTE, NOTE_ID).await?;
        Ok(())
    }

    fn edit(&self, operation: UpdateOperation) -> Result<()> {
        self.sync.commit(NOTE, NOTE_ID, operation)?;
        Ok(())
    }

    async fn push(&self) -> Result<PushOutcome> {
        Ok(self.sync.push(NOTE, NOTE_ID).await?)
    }

    /// Apply every diff the server has broadcast since the last call.
    fn catch_up(&mut self) -> Result<usize> {
        Ok(self.sync.pump_diffs(&mut self.diffs)?)
    }

    /// Take the waiting diffs without applying them.
    fn drain(&mut self) -> Vec<VersionDiff> {
        let mut diffs = Vec::new();
        while let Ok(diff) = self.diffs.try_recv() {
            diffs.push(diff);
        }
        diffs
    }

    fn head(&self) -> Result<Value> {
        Ok(self
            .sync
            .store()
            .snapshot()
            .head_entity(NOTE, NOTE_ID)?
            .clone())
    }

    fn pending(&self) -> usize {
        self.sync
            .store()
            .snapshot()
            .entity_info(NOTE, NOTE_ID)
            .map(|info| info.commits.len())
            .unwrap_or(0)
    }

    fn version(&self) -> String {
        self.sync
            .store()
            .snapshot()
            .entity_info(NOTE, NOTE_ID)
            .ok()
            .and_then(|info| info.version_id.clone())
            .map(|v| short(&v))
            .unwrap_or_else(|| "-".to_string())
    }
}

fn short(version_id: &str) -> String {
    let start = version_id.len().saturating_sub(6);
    format!("…{}", &version_id[start..])
}

fn shared_note(server: &MemoryEntityClient) -> Result<()> {
    let note = Value::from(serde_json::json!({
        "id": NOTE_ID,
        "title": "Groceries",
        "items": [],
        "views": 0,
    }));
    server.insert(NOTE, note)?;
    Ok(())
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

fn sync_arrow(from: &str, to: &str, detail: &str) {
    println!(
        "  {} {} {} {}",
        from.bright_magenta(),
        "──push──▶".bright_cyan(),
        to.bright_magenta(),
        detail.bright_green()
    );
}

fn describe(outcome: &PushOutcome) -> String {
    match outcome {
        PushOutcome::Clean => "nothing to push".to_string(),
        PushOutcome::Synced { acknowledged } => format!("✓ {} acknowledged", acknowledged),
        PushOutcome::Queued { pending } => format!("⏸ {} queued", pending),
        PushOutcome::Ignored => "response ignored".to_string(),
        PushOutcome::InFlight => "push already in flight".to_string(),
    }
}

fn show_peer(peer: &Peer) -> Result<()> {
    let border = "─".repeat(56);
    let state = peer.sync.store().snapshot();
    let status = if state.is_online() {
        "online".bright_green()
    } else {
        "offline".bright_red()
    };
    println!("  ┌{}┐", border);
    println!(
        "  │ {:<30} {:>7} v{:<7} {:>2} pending │",
        format!("Client: {}", peer.name).bright_yellow().to_string(),
        status.to_string(),
        peer.version(),
        peer.pending()
    );
    println!("  ├{}┤", border);
    let head = serde_json::Value::from(&peer.head()?);
    if let Some(fields) = head.as_object() {
        for (key, value) in fields.iter().filter(|(key, _)| *key != "id") {
            println!("  │ {:<54} │", format!("{:<8} = {}", key, value));
        }
    }
    println!("  └{}┘", border);
    Ok(())
}

fn convergence_check(server: &MemoryEntityClient, peers: &[&Peer]) -> Result<bool> {
    let Some(expected) = server.entity(NOTE, NOTE_ID) else {
        return Ok(false);
    };
    for peer in peers {
        if peer.pending() > 0 || peer.head()? != expected {
            return Ok(false);
        }
    }
    Ok(true)
}

fn convergence_result(converged: bool) {
    if converged {
        println!(
            "\n  {} {}",
            "✓".bright_green().bold(),
            "ALL CLIENTS CONVERGED ON THE SERVER VERSION"
                .bright_green()
                .bold()
        );
    } else {
        println!(
            "\n  {} {}",
            "✗".bright_red().bold(),
            "DIVERGENCE DETECTED: clients differ from the server"
                .bright_red()
                .bold()
        );
    }
}

// ─── Demo ──────────────────────────────────────────────────────────────────

async fn run_demo() -> Result<()> {
    header("DEMO: Optimistic Commits, Push & Rebase");
    let server = Arc::new(MemoryEntityClient::new());
    shared_note(&server)?;

    section("Phase 1: Two clients follow the same note");
    let mut alice = Peer::new("alice", &server)?;
    let mut bob = Peer::new("bob", &server)?;
    alice.join().await?;
    bob.join().await?;
    step("alice, bob: follow note/groceries");

    section("Phase 2: Both edit locally, nothing sent yet");
    alice.edit(UpdateOperation::new().push("items", "milk"))?;
    step("alice: $push items \"milk\"");
    alice.edit(UpdateOperation::new().push("items", "bread"))?;
    step("alice: $push items \"bread\"");
    bob.edit(UpdateOperation::new().add_to_set("items", "eggs"))?;
    step("bob:   $addToSet items \"eggs\"");
    bob.edit(UpdateOperation::new().inc("views", 1))?;
    step("bob:   $inc views 1");
    show_peer(&alice)?;
    show_peer(&bob)?;

    section("Phase 3: Push; bob's commits are rebased onto alice's");
    let outcome = alice.push().await?;
    sync_arrow("alice", "server", &describe(&outcome));
    let outcome = bob.push().await?;
    sync_arrow("bob", "server", &describe(&outcome));
    let applied = alice.catch_up()?;
    step(&format!("alice: applied {} version diff(s) from the server", applied));
    bob.catch_up()?;

    section("Phase 4: Post-sync state");
    show_peer(&alice)?;
    show_peer(&bob)?;
    convergence_result(convergence_check(&server, &[&alice, &bob])?);

    section("Final values");
    let head = serde_json::Value::from(&alice.head()?);
    step(&format!("items = {} (alice's two, then bob's)", head["items"]));
    step(&format!("views = {} (bob: +1)", head["views"]));
    Ok(())
}

// ─── Conflict ──────────────────────────────────────────────────────────────

async fn run_conflict() -> Result<()> {
    header("CONFLICT: Concurrent Pushes, Stale & Duplicated Diffs");
    let server = Arc::new(MemoryEntityClient::new());
    shared_note(&server)?;

    section("Phase 1: Three clients follow, two of them edit concurrently");
    let mut alice = Peer::new("alice", &server)?;
    let mut bob = Peer::new("bob", &server)?;
    let mut carol = Peer::new("carol", &server)?;
    for peer in [&alice, &bob, &carol] {
        peer.join().await?;
    }

    alice.edit(UpdateOperation::new().push_with(
        "items",
        PushModifier::each(vec![Value::from("pears"), Value::from("apples")])
            .sort(SortDirection::Ascending),
    ))?;
    alice.edit(UpdateOperation::new().inc("views", 5))?;
    step("alice: $push items {$each: [pears, apples], $sort: 1}, $inc views 5");

    bob.edit(UpdateOperation::new().add_to_set("items", "apples"))?;
    bob.edit(UpdateOperation::new().set("title", "Fruit"))?;
    step("bob:   $addToSet items \"apples\", $set title \"Fruit\"");

    section("Phase 2: Both push; the server orders alice first");
    let outcome = alice.push().await?;
    sync_arrow("alice", "server", &describe(&outcome));
    let outcome = bob.push().await?;
    sync_arrow("bob", "server", &describe(&outcome));
    step("bob's $addToSet replays on top of alice's items: no duplicate apples");

    section("Phase 3: carol receives the diffs reversed, then twice in order");
    let diffs = carol.drain();
    step(&format!("carol: {} diff(s) waiting", diffs.len()));

    let mut applied = 0;
    for diff in diffs.iter().rev() {
        if carol.sync.apply_version_diff(diff.clone())? {
            applied += 1;
        }
    }
    step(&format!(
        "reversed:   {} applied, {} discarded as stale",
        applied,
        diffs.len() - applied
    ));

    for round in ["in order:  ", "duplicate: "] {
        let mut applied = 0;
        for diff in &diffs {
            if carol.sync.apply_version_diff(diff.clone())? {
                applied += 1;
            }
        }
        step(&format!(
            "{} {} applied, {} discarded as stale",
            round,
            applied,
            diffs.len() - applied
        ));
    }

    alice.catch_up()?;
    bob.catch_up()?;

    section("Phase 4: Everyone agrees with the server");
    show_peer(&alice)?;
    show_peer(&bob)?;
    show_peer(&carol)?;
    convergence_result(convergence_check(&server, &[&alice, &bob, &carol])?);
    Ok(())
}

// ─── Offline ───────────────────────────────────────────────────────────────

async fn run_offline() -> Result<()> {
    header("OFFLINE: Edit While Unreachable, Reconnect & Repush");
    let server = Arc::new(MemoryEntityClient::new());
    shared_note(&server)?;

    let mut alice = Peer::new("alice", &server)?;
    let mut bob = Peer::new("bob", &server)?;
    alice.join().await?;
    bob.join().await?;

    section("Phase 1: The server becomes unreachable");
    server.set_reachable(false);
    println!(
        "  {}  {}  {}",
        "alice".bright_magenta(),
        "──✗──".bright_red(),
        "server".bright_magenta()
    );

    alice.edit(UpdateOperation::new().set("title", "Weekend groceries"))?;
    let outcome = alice.push().await?;
    step(&format!("alice: $set title, push → {}", describe(&outcome)));
    alice.edit(UpdateOperation::new().push("items", "tea"))?;
    let outcome = alice.push().await?;
    step(&format!("alice: $push items \"tea\", push → {}", describe(&outcome)));
    alice.edit(UpdateOperation::new().inc("views", 2))?;
    step("alice: $inc views 2 (not pushed)");

    let state = alice.sync.store().snapshot();
    step(&format!(
        "alice: {} commit(s) queued for repush, store is {}",
        state.enqueued_commit_count(NOTE, NOTE_ID),
        if state.is_online() { "online" } else { "offline" }
    ));
    show_peer(&alice)?;

    section("Phase 2: Connectivity returns; bob pushes first");
    server.set_reachable(true);
    bob.edit(UpdateOperation::new().push("items", "coffee"))?;
    let outcome = bob.push().await?;
    sync_arrow("bob", "server", &describe(&outcome));

    section("Phase 3: alice reconnects and repushes");
    for outcome in alice.sync.go_online().await? {
        sync_arrow("alice", "server", &describe(&outcome));
    }
    let outcome = alice.push().await?;
    sync_arrow("alice", "server", &describe(&outcome));
    alice.catch_up()?;
    let applied = bob.catch_up()?;
    step(&format!("bob: applied {} version diff(s)", applied));
    info!(
        queued = alice.sync.store().snapshot().unreached_commits.len(),
        "repush finished"
    );

    section("Phase 4: Post-repush state");
    show_peer(&alice)?;
    show_peer(&bob)?;
    convergence_result(convergence_check(&server, &[&alice, &bob])?);
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Demo => run_demo().await,
        Commands::Conflict => run_conflict().await,
        Commands::Offline => run_offline().await,
    }
}

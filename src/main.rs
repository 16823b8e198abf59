//! Peer backup status
//!
//! Restores the persisted component snapshots from the data directory and
//! reports where the node's backups stand.

use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use peer_backup_lib::config::BackupConfig;
use peer_backup_lib::snapshot::SnapshotError;
use peer_backup_lib::storage::ChunkStore;
use peer_backup_lib::{ExchangeBook, ProofLedger, ReplicationTracker};

const CONFIG_FILE: &str = "config.json";
const LEDGER_FILE: &str = "ledger.bin";
const REPLICATION_FILE: &str = "replication.bin";
const EXCHANGE_FILE: &str = "exchange.bin";

/// Load a snapshot file, falling back to a fresh component when the file
/// is missing or unreadable
fn restore<T>(
    path: &Path,
    decode: impl FnOnce(&[u8]) -> Result<T, SnapshotError>,
    fresh: impl FnOnce() -> T,
) -> T {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::info!("No snapshot at {:?}, starting empty", path);
            return fresh();
        }
    };

    match decode(&bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Discarding snapshot {:?}: {}", path, e);
            fresh()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = std::env::args().nth(1);
    let config = match config_path {
        Some(path) => BackupConfig::load(path)?,
        None => {
            let default_path = BackupConfig::default().data_dir().join(CONFIG_FILE);
            if default_path.exists() {
                BackupConfig::load(default_path)?
            } else {
                BackupConfig::default()
            }
        }
    };

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Using data directory {:?}", data_dir);

    let shard_store = ChunkStore::open(data_dir.join("shards"), 10)?;

    let ledger = restore(
        &data_dir.join(LEDGER_FILE),
        |b| ProofLedger::deserialize(b, &config.proof),
        || ProofLedger::new(&config.proof),
    );

    let tracker = match std::fs::read(data_dir.join(REPLICATION_FILE)) {
        Ok(bytes) => ReplicationTracker::deserialize(&bytes, config.replication).or_else(|e| {
            tracing::warn!("Discarding replication snapshot: {}", e);
            ReplicationTracker::new(config.replication)
        })?,
        Err(_) => ReplicationTracker::new(config.replication)?,
    };

    let exchange = restore(
        &data_dir.join(EXCHANGE_FILE),
        |b| ExchangeBook::deserialize(b, config.exchange),
        || ExchangeBook::new(config.exchange),
    );

    tracing::info!(
        "Shards stored locally: {} ({} bytes)",
        shard_store.shard_count(),
        shard_store.total_size()?
    );
    tracing::info!(
        "Shards tracked: {} (needing peers: {}, partially deployed: {}, fully deployed: {})",
        tracker.len(),
        tracker.shards_needing_peers().len(),
        tracker.partially_deployed().len(),
        tracker.fully_deployed().len()
    );
    tracing::info!("Blocks under audit: {}", ledger.len());

    for peer in exchange.peers() {
        let contract = exchange.contract(&peer);
        tracing::info!(
            "Peer {}: storing {} for them, {} with them, room mine={} theirs={}",
            peer,
            contract.mine().len(),
            contract.theirs().len(),
            contract.available_my_space(),
            contract.available_their_space()
        );
    }

    Ok(())
}

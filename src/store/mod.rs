//! WAL-backed tables for venues, zones, events and reservations.
//!
//! All tables sit behind one `RwLock`, so a read is a consistent point-in-time view
//! and every mutation re-checks its preconditions under the write lock before the
//! change is logged and applied.

mod error;
mod mutations;
mod persistence;
mod queries;
mod tables;

pub use error::StoreError;
pub use persistence::Persistence;
pub use tables::Tables;

use std::io;
use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{error, info};

use crate::model::Change;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

type Ack = oneshot::Sender<io::Result<()>>;

pub(super) enum WalCommand {
    Append {
        change: Change,
        response: Ack,
    },
    Compact {
        changes: Vec<Change>,
        response: Ack,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that queue up while a flush is in progress are committed
/// together with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { change, response } = cmd else {
            handle_control(&mut wal, cmd);
            continue;
        };

        let mut batch = vec![(change, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { change, response } => batch.push((change, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_control(&mut wal, cmd);
        }
    }
    info!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: Vec<(Change, Ack)>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    let mut result = batch
        .iter()
        .try_for_each(|(change, _)| wal.append_buffered(change));
    // Flush even after a failed append so stray bytes don't bleed into the next batch.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        error!(error = %e, batch = batch.len(), "WAL flush failed");
    }
    for (_, ack) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = ack.send(reply);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { changes, response } => {
            let result = Wal::write_compact_file(wal.path(), &changes).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { change, response } => commit_batch(wal, vec![(change, response)]),
    }
}

pub struct Store {
    pub(super) tables: RwLock<Tables>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

impl Store {
    /// Replay the WAL at `wal_path` and start its writer task. Must be called inside a
    /// tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let (wal, changes) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut tables = Tables::default();
        for change in &changes {
            tables.apply(change);
        }
        info!(
            path = %wal_path.display(),
            changes = changes.len(),
            venues = tables.venues.len(),
            reservations = tables.reservations.len(),
            "store opened"
        );

        Ok(Self {
            tables: RwLock::new(tables),
            wal_tx,
        })
    }

    async fn wal_request<T>(&self, cmd: WalCommand, rx: oneshot::Receiver<T>) -> Result<T, StoreError> {
        self.wal_tx
            .send(cmd)
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))
    }

    async fn wal_append(&self, change: &Change) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        let cmd = WalCommand::Append {
            change: change.clone(),
            response: tx,
        };
        self.wal_request(cmd, rx)
            .await?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }

    /// Log `change`, then apply it. The caller holds the write lock and has validated it.
    pub(super) async fn commit(&self, tables: &mut Tables, change: Change) -> Result<(), StoreError> {
        self.wal_append(&change).await?;
        tables.apply(&change);
        Ok(())
    }
}

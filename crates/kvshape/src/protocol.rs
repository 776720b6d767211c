use std::fmt;

use tracing::{debug, warn};

use kvshape_store::{Batch, KvStore};

use crate::error::{CommitStage, RepoError, RepoResult};

/// Acknowledgement of a committed batch. Displays as `OK`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ack {
    /// Number of commands the store applied.
    pub commands: usize,
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OK")
    }
}

/// Commit `batch` atomically.
///
/// A rejected batch is discarded before the error is returned. The error
/// names the discard failure if there was one, otherwise the original
/// rejection. Nothing is retried.
pub async fn commit(store: &dyn KvStore, batch: &Batch) -> RepoResult<Ack> {
    debug!(commands = batch.len(), keys = batch.keys().len(), "committing batch");
    match store.exec(batch).await {
        Ok(()) => Ok(Ack {
            commands: batch.len(),
        }),
        Err(source) => {
            warn!(error = %source, "batch rejected, discarding");
            if let Err(discard) = store.discard(batch).await {
                warn!(error = %discard, "discard failed");
                return Err(RepoError::BatchCommit {
                    stage: CommitStage::Discard,
                    source: discard,
                });
            }
            Err(RepoError::BatchCommit {
                stage: CommitStage::Exec,
                source,
            })
        }
    }
}

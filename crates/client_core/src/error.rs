use thiserror::Error;

use crate::cache::QueryKey;

/// Failure surfaced by the synchronization layer.
///
/// Remote failures are flattened to their message so a single outcome can
/// be handed to every waiter of a coalesced fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("{0}")]
    Remote(String),
    #[error("cached value for {0:?} has an unexpected type")]
    TypeMismatch(QueryKey),
}

impl SyncError {
    pub(crate) fn remote(err: &anyhow::Error) -> Self {
        SyncError::Remote(format!("{err:#}"))
    }
}

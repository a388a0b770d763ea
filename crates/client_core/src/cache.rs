//! Key/value query cache with in-flight coalescing and root invalidation.
//!
//! Every [`QueryKey`] belongs to one [`QueryRoot`]. Invalidating a root drops
//! all keys under it and bumps the root's generation; a fetch started under
//! an older generation still answers its waiters but is never stored.

use std::{
    any::Any,
    collections::HashMap,
    future::Future,
    sync::Arc,
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use shared::domain::{DayOfWeek, ShowId};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::{error::SyncError, sync::SyncEvent};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    CurrentUserProfile,
    CallerRole,
    IsAdmin,
    Shows,
    Show(ShowId),
    Schedules,
    SchedulesByDay(DayOfWeek),
    SchedulesByShow(ShowId),
    UpcomingSchedules(u32),
}

impl QueryKey {
    pub fn root(&self) -> QueryRoot {
        match self {
            QueryKey::CurrentUserProfile => QueryRoot::CurrentUserProfile,
            QueryKey::CallerRole => QueryRoot::CallerRole,
            QueryKey::IsAdmin => QueryRoot::IsAdmin,
            QueryKey::Shows | QueryKey::Show(_) => QueryRoot::Shows,
            QueryKey::Schedules
            | QueryKey::SchedulesByDay(_)
            | QueryKey::SchedulesByShow(_)
            | QueryKey::UpcomingSchedules(_) => QueryRoot::Schedules,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryRoot {
    CurrentUserProfile,
    CallerRole,
    IsAdmin,
    Shows,
    Schedules,
}

impl QueryRoot {
    pub const ALL: [QueryRoot; 5] = [
        QueryRoot::CurrentUserProfile,
        QueryRoot::CallerRole,
        QueryRoot::IsAdmin,
        QueryRoot::Shows,
        QueryRoot::Schedules,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error(String),
}

type CachedValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<CachedValue, SyncError>>>;

struct InFlight {
    ticket: u64,
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKey, CachedValue>,
    in_flight: HashMap<QueryKey, InFlight>,
    status: HashMap<QueryKey, QueryStatus>,
    generations: HashMap<QueryRoot, u64>,
    next_ticket: u64,
}

impl CacheState {
    fn generation(&self, root: QueryRoot) -> u64 {
        self.generations.get(&root).copied().unwrap_or(0)
    }
}

pub struct QueryCache {
    state: Mutex<CacheState>,
    events: broadcast::Sender<SyncEvent>,
}

impl QueryCache {
    pub fn new(events: broadcast::Sender<SyncEvent>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            events,
        }
    }

    /// Returns the cached value for `key`, joins a fetch already in flight,
    /// or starts `load`. The lock is released while the remote call runs.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, load: F) -> Result<T, SyncError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (ticket, fetch) = {
            let mut state = self.state.lock().await;
            if let Some(value) = state.entries.get(&key) {
                return downcast(&key, value);
            }
            match state.in_flight.get(&key) {
                Some(in_flight) => (in_flight.ticket, in_flight.fetch.clone()),
                None => {
                    let ticket = state.next_ticket;
                    state.next_ticket += 1;
                    let generation = state.generation(key.root());
                    let pending = load();
                    let fetch = async move {
                        pending
                            .await
                            .map(|value| Arc::new(value) as CachedValue)
                            .map_err(|err| SyncError::remote(&err))
                    }
                    .boxed()
                    .shared();
                    state.in_flight.insert(
                        key.clone(),
                        InFlight {
                            ticket,
                            generation,
                            fetch: fetch.clone(),
                        },
                    );
                    state.status.insert(key.clone(), QueryStatus::Loading);
                    debug!(?key, "query fetch started");
                    (ticket, fetch)
                }
            }
        };

        let outcome = fetch.await;
        self.settle(&key, ticket, &outcome).await;
        let value = outcome?;
        downcast(&key, &value)
    }

    /// First waiter to finish records the outcome; later waiters find the
    /// ticket gone and leave the cache alone.
    async fn settle(&self, key: &QueryKey, ticket: u64, outcome: &Result<CachedValue, SyncError>) {
        let mut state = self.state.lock().await;
        let current = match state.in_flight.get(key) {
            Some(in_flight) if in_flight.ticket == ticket => in_flight.generation,
            _ => return,
        };
        state.in_flight.remove(key);
        match outcome {
            Ok(value) if current == state.generation(key.root()) => {
                state.entries.insert(key.clone(), Arc::clone(value));
                state.status.insert(key.clone(), QueryStatus::Success);
                let _ = self.events.send(SyncEvent::QueryFetched(key.clone()));
            }
            Ok(_) => {
                debug!(?key, "discarding fetch that finished after invalidation");
            }
            Err(err) => {
                state
                    .status
                    .insert(key.clone(), QueryStatus::Error(err.to_string()));
                let _ = self.events.send(SyncEvent::QueryFailed {
                    key: key.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    pub async fn peek<T: Clone + 'static>(&self, key: &QueryKey) -> Option<T> {
        let state = self.state.lock().await;
        state
            .entries
            .get(key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    pub async fn status(&self, key: &QueryKey) -> QueryStatus {
        let state = self.state.lock().await;
        state.status.get(key).cloned().unwrap_or_default()
    }

    pub async fn invalidate(&self, roots: &[QueryRoot]) {
        if roots.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        for root in roots {
            *state.generations.entry(*root).or_insert(0) += 1;
        }
        state.entries.retain(|key, _| !roots.contains(&key.root()));
        state.in_flight.retain(|key, _| !roots.contains(&key.root()));
        state.status.retain(|key, _| !roots.contains(&key.root()));
        debug!(?roots, "query roots invalidated");
        let _ = self.events.send(SyncEvent::Invalidated(roots.to_vec()));
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        for root in QueryRoot::ALL {
            *state.generations.entry(root).or_insert(0) += 1;
        }
        state.entries.clear();
        state.in_flight.clear();
        state.status.clear();
        let _ = self.events.send(SyncEvent::Cleared);
    }
}

fn downcast<T: Clone + 'static>(key: &QueryKey, value: &CachedValue) -> Result<T, SyncError> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| SyncError::TypeMismatch(key.clone()))
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;

//! Client side of the broadcast catalog: remote API access, a cached
//! synchronization layer, and the view-models and forms built on it.

pub mod admin;
pub mod api;
pub mod app;
pub mod blob;
pub mod cache;
pub mod error;
pub mod forms;
pub mod http;
pub mod session;
pub mod sync;
pub mod views;

pub use admin::{AdminConsole, AdminError, DeletionRequest, Notice};
pub use api::BackendApi;
pub use app::{AppShell, AppView, Page};
pub use blob::ExternalBlob;
pub use cache::{QueryKey, QueryRoot, QueryStatus};
pub use error::SyncError;
pub use http::HttpBackend;
pub use session::{Connector, HttpConnector, LoginStatus, SessionContext};
pub use sync::{MutationKind, MutationStatus, SyncClient, SyncEvent};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

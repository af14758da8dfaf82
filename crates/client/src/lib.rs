pub mod loader;
pub mod rest;
pub mod session;

pub use loader::{
    AccountDataLoader, DashboardSnapshot, LoadOutcome, LoadState, LoaderConfig, LoaderEvent,
};
pub use rest::{RestClient, RestConfig};
pub use session::{SessionGuard, SessionStore, SessionStoreError};

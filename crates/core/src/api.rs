use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Errors surfaced by the backend API.
///
/// `AuthExpired` is always fatal to the session; the other variants are
/// recoverable and must leave any previously loaded data untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("session expired or credentials rejected")]
    AuthExpired,
    #[error("login rejected: {0}")]
    LoginRejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    /// Whether this error invalidates the stored session.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::AuthExpired)
    }
}

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

/// The account backend consumed by the data loader.
///
/// All data calls carry the session token; any endpoint may answer with
/// `AuthExpired`, which callers must treat as fatal to the whole batch.
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Exchange credentials for a bearer token and the account record.
    async fn login(&self, request: &LoginRequest) -> Result<LoginOk, ApiError>;

    /// Current account monetary state.
    async fn account_info(&self, token: &str) -> Result<AccountSnapshot, ApiError>;

    /// All currently open positions.
    async fn open_positions(&self, token: &str) -> Result<Vec<Position>, ApiError>;

    /// Closed trades within the given window.
    async fn closed_trades(
        &self,
        token: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HistoryTrade>, ApiError>;
}

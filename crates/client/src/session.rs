use mthub_core::{ApiError, Session};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

/// Errors from reading or writing the persisted session record.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session store encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Synchronous file-backed store for the single session record.
///
/// One flat JSON object at a well-known path, readable across process
/// runs. A missing or corrupt file reads as "no session".
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<Session> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Discarding corrupt session file");
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Owns the current session and decides whether data requests may be made.
///
/// Single writer for session state; the loader and the CLI share one guard.
pub struct SessionGuard {
    store: SessionStore,
    current: Mutex<Option<Session>>,
}

impl SessionGuard {
    /// Create a guard, restoring any session persisted by a previous run.
    pub fn new(store: SessionStore) -> Self {
        let current = store.load();
        Self {
            store,
            current: Mutex::new(current),
        }
    }

    /// The bearer token, only if an authenticated session exists.
    pub async fn current_token(&self) -> Option<String> {
        let current = self.current.lock().await;
        current
            .as_ref()
            .filter(|s| s.is_authenticated)
            .map(|s| s.token.clone())
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.lock().await.clone()
    }

    /// Store a freshly authenticated session, overwriting any prior one.
    pub async fn establish(
        &self,
        token: String,
        account_number: String,
        server: String,
    ) -> Result<(), SessionStoreError> {
        let session = Session {
            account_number,
            server,
            token,
            is_authenticated: true,
        };
        self.store.save(&session)?;
        *self.current.lock().await = Some(session);
        Ok(())
    }

    /// Drop the session unconditionally, in memory and on disk.
    pub async fn clear(&self) {
        *self.current.lock().await = None;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to remove persisted session");
        }
    }

    /// Mount-time check: the authenticated session, or `AuthExpired` as
    /// the signal to send the viewer back to the login entry point.
    pub async fn require_authenticated(&self) -> Result<Session, ApiError> {
        let current = self.current.lock().await;
        current
            .as_ref()
            .filter(|s| s.is_authenticated)
            .cloned()
            .ok_or(ApiError::AuthExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(dir.path().join("session.json"))
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        let session = Session {
            account_number: "12345678".to_string(),
            server: "MetaQuotes-Demo".to_string(),
            token: "tok-1".to_string(),
            is_authenticated: true,
        };
        store.save(&session).expect("save");
        assert_eq!(store.load(), Some(session));

        store.clear().expect("clear");
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_corrupt_file_reads_as_no_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        std::fs::write(store.path(), "not json").expect("write");
        assert_eq!(store.load(), None);
    }

    #[tokio::test]
    async fn test_guard_establish_and_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let guard = SessionGuard::new(store_in(&dir));

        assert_eq!(guard.current_token().await, None);
        assert!(guard.require_authenticated().await.is_err());

        guard
            .establish(
                "tok-2".to_string(),
                "12345678".to_string(),
                "Exness-Demo".to_string(),
            )
            .await
            .expect("establish");
        assert_eq!(guard.current_token().await, Some("tok-2".to_string()));

        guard.clear().await;
        assert_eq!(guard.current_token().await, None);
    }

    #[tokio::test]
    async fn test_guard_restores_persisted_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let guard = SessionGuard::new(store_in(&dir));
            guard
                .establish(
                    "tok-3".to_string(),
                    "999".to_string(),
                    "FXTM-Real".to_string(),
                )
                .await
                .expect("establish");
        }
        let guard = SessionGuard::new(store_in(&dir));
        assert_eq!(guard.current_token().await, Some("tok-3".to_string()));
    }

    #[tokio::test]
    async fn test_unauthenticated_session_yields_no_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        store
            .save(&Session {
                account_number: "1".to_string(),
                server: "s".to_string(),
                token: "tok-4".to_string(),
                is_authenticated: false,
            })
            .expect("save");

        let guard = SessionGuard::new(store);
        assert_eq!(guard.current_token().await, None);
        assert!(guard.require_authenticated().await.is_err());
    }
}

use coinquest_types::UserRecord;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct SessionState {
    user: UserRecord,
    token: String,
}

/// Local session state: the cached user record and the opaque auth token
/// issued by the account store at login.
///
/// The cache is best effort. The store's record is authoritative, so every
/// store response that carries a canonical record is pushed back in through
/// [`Session::replace_user`].
#[derive(Clone, Default)]
pub struct Session {
    state: Arc<RwLock<Option<SessionState>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session from a successful login response.
    pub async fn install(&self, user: UserRecord, token: impl Into<String>) {
        let mut state = self.state.write().await;
        info!(username = %user.username, "🔑 Session installed");
        *state = Some(SessionState {
            user,
            token: token.into(),
        });
    }

    pub async fn is_active(&self) -> bool {
        self.state.read().await.is_some()
    }

    pub async fn current_user(&self) -> Option<UserRecord> {
        self.state.read().await.as_ref().map(|s| s.user.clone())
    }

    pub async fn username(&self) -> Option<String> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.user.username.clone())
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.as_ref().map(|s| s.token.clone())
    }

    /// Reconcile the cache from a canonical store record. Ignored when the
    /// session is already torn down or belongs to a different account.
    pub async fn replace_user(&self, user: UserRecord) {
        let mut state = self.state.write().await;
        match state.as_mut() {
            Some(s) if s.user.username == user.username => s.user = user,
            Some(s) => warn!(
                cached = %s.user.username,
                incoming = %user.username,
                "Refusing to reconcile record for a different account"
            ),
            None => {}
        }
    }

    /// Drop the session entirely. Called on an unauthorized store response;
    /// the user must authenticate again.
    pub async fn teardown(&self) {
        let mut state = self.state.write().await;
        if let Some(s) = state.take() {
            warn!(username = %s.user.username, "🔒 Session torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinquest_types::Coins;

    fn user(name: &str) -> UserRecord {
        UserRecord::new(name, "", "", "x", "CODE11")
    }

    #[tokio::test]
    async fn install_read_teardown() {
        let session = Session::new();
        assert!(!session.is_active().await);
        assert!(session.current_user().await.is_none());

        session.install(user("alice"), "tok-1").await;
        assert!(session.is_active().await);
        assert_eq!(session.username().await.as_deref(), Some("alice"));
        assert_eq!(session.token().await.as_deref(), Some("tok-1"));

        session.teardown().await;
        assert!(!session.is_active().await);
        assert!(session.token().await.is_none());
    }

    #[tokio::test]
    async fn replace_user_reconciles_same_account_only() {
        let session = Session::new();
        session.install(user("alice"), "tok").await;

        let mut updated = user("alice");
        updated.balance = Coins::new(99);
        session.replace_user(updated).await;
        assert_eq!(
            session.current_user().await.unwrap().balance,
            Coins::new(99)
        );

        session.replace_user(user("mallory")).await;
        assert_eq!(session.username().await.as_deref(), Some("alice"));
    }
}

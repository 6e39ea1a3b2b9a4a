use crate::catalog::TaskDefinition;
use crate::error::{Result, TaskFlowError};
use crate::session::Session;
use coinquest_store::{AccountStore, StoreError};
use coinquest_types::{AccountPatch, UserRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Today's date in the user's local timezone; the quota day boundary.
pub fn today() -> String {
    chrono::Local::now().date_naive().to_string()
}

/// Per-user, per-task, per-day turn accounting. Every quota read goes
/// through [`QuotaTracker::remaining_turns`], which is also the only place
/// the day-boundary reset happens.
pub struct QuotaTracker {
    store: Arc<dyn AccountStore>,
    session: Session,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn AccountStore>, session: Session) -> Self {
        Self { store, session }
    }

    /// Turns still available today for a task. Resets the daily counters
    /// first when the calendar day has rolled over; the reset is persisted
    /// to the store before any count is computed, so a crash between reset
    /// and the next check cannot skip it.
    pub async fn remaining_turns(&self, def: &TaskDefinition) -> Result<u32> {
        let user = self
            .session
            .current_user()
            .await
            .ok_or(TaskFlowError::NotSignedIn)?;

        let user = self.refresh_day(user).await?;
        let done = user.turns_done(&def.id);
        Ok(def.max_turns.saturating_sub(done))
    }

    async fn refresh_day(&self, user: UserRecord) -> Result<UserRecord> {
        let today = today();
        if user.last_access_date.as_deref() == Some(today.as_str()) {
            return Ok(user);
        }

        let patch = AccountPatch {
            daily_tasks: Some(HashMap::new()),
            last_access_date: Some(today.clone()),
            ..Default::default()
        };

        let canonical = match self.store.update_fields(&user.username, patch).await {
            Ok(canonical) => canonical,
            Err(StoreError::Unauthorized) => {
                self.session.teardown().await;
                return Err(TaskFlowError::SessionExpired);
            }
            Err(e) => return Err(TaskFlowError::StoreUnavailable(e.to_string())),
        };

        info!(
            username = %canonical.username,
            day = %today,
            "🔄 Daily task counters reset"
        );
        self.session.replace_user(canonical.clone()).await;
        Ok(canonical)
    }
}

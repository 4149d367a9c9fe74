//! Token check → check-in → history, shared by the one-shot and scheduled paths.

use crate::checkin::{CheckinClient, CheckinResult};
use crate::error::Result;
use crate::history::HistoryStore;
use crate::oauth::AuthorizationFlow;
use crate::scheduler::ScheduledJob;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct CheckinRunner {
    flow: Arc<AuthorizationFlow>,
    client: CheckinClient,
    history: HistoryStore,
}

impl CheckinRunner {
    pub fn new(flow: Arc<AuthorizationFlow>, client: CheckinClient, history: HistoryStore) -> Self {
        Self {
            flow,
            client,
            history,
        }
    }

    /// Obtains a fresh token, checks in and records the outcome.
    ///
    /// A history write failure is logged; the check-in result is still returned.
    pub async fn run_once(&self) -> Result<CheckinResult> {
        let record = self.flow.ensure_fresh_token().await?;
        let result = self.client.perform_checkin(&record).await?;

        if let Err(e) = self.history.append(&result) {
            warn!(error = %format!("{:#}", e), "Failed to record check-in history");
        }

        Ok(result)
    }
}

#[async_trait]
impl ScheduledJob for CheckinRunner {
    async fn run(&self) -> anyhow::Result<()> {
        let result = self.run_once().await?;
        info!(result = %result, "Scheduled check-in finished");
        Ok(())
    }
}

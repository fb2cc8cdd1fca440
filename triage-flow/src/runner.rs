//! FlowRunner: loads a session, performs exactly **one** user action on it and persists the
//! updated session back to storage.
//!
//! A session is saved only when the action succeeds, so a failed submission or sub-flow never
//! leaves a half-updated record behind. Actions on the same session are serialized: the
//! session lock is held from load to save, so a slow sub-flow cannot write back a snapshot
//! older than a submission that finished in the meantime.
//!
//! Create one `FlowRunner` at startup and share it across requests:
//! ```rust,ignore
//! struct AppState {
//!     flow_runner: FlowRunner,
//! }
//!
//! let report = state.flow_runner.submit(&session_id, request).await?;
//! ```

use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::{
    dispatch::{DispatchController, SubmissionReport, SubmitRequest},
    error::{FlowError, Result},
    session::{Session, SessionStorage},
    subflows::{SubFlowInput, SubFlowOutcome},
};

/// High-level helper that orchestrates the common _load → act → save_ pattern.
#[derive(Clone)]
pub struct FlowRunner {
    controller: Arc<DispatchController>,
    storage: Arc<dyn SessionStorage>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl FlowRunner {
    pub fn new(controller: Arc<DispatchController>, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            controller,
            storage,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn controller(&self) -> &DispatchController {
        &self.controller
    }

    /// Start an empty session and return its id
    pub async fn create_session(&self) -> Result<String> {
        let session = Session::new();
        let id = session.id.clone();
        self.storage.save(session).await?;
        info!(session_id = %id, "Session created");
        Ok(id)
    }

    /// Create a session from its first submission. Nothing is stored if the submission fails.
    pub async fn start(&self, request: SubmitRequest) -> Result<(String, SubmissionReport)> {
        let mut session = Session::new();
        let id = session.id.clone();

        let report = self.controller.submit(&mut session.state, request).await?;
        session.status_message = Some(status_for(&report));
        session.touch();

        self.storage.save(session).await?;
        info!(session_id = %id, "Session created");
        Ok((id, report))
    }

    pub async fn session(&self, session_id: &str) -> Result<Session> {
        self.storage
            .get(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))
    }

    pub async fn submit(
        &self,
        session_id: &str,
        request: SubmitRequest,
    ) -> Result<SubmissionReport> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.session(session_id).await?;

        let report = self.controller.submit(&mut session.state, request).await?;
        session.status_message = Some(status_for(&report));
        session.touch();

        self.storage.save(session).await?;
        Ok(report)
    }

    pub async fn run_sub_flow(
        &self,
        session_id: &str,
        sub_flow: &str,
        input: &SubFlowInput,
    ) -> Result<SubFlowOutcome> {
        let _guard = self.lock_session(session_id).await;
        let mut session = self.session(session_id).await?;

        let outcome = self
            .controller
            .run_sub_flow(sub_flow, &mut session.state, input)
            .await?;
        if let Some(status) = &outcome.status_message {
            session.status_message = Some(status.clone());
        }
        session.touch();

        self.storage.save(session).await?;
        Ok(outcome)
    }

    pub async fn export_nutrition_plan(&self, session_id: &str) -> Result<Vec<u8>> {
        let session = self.session(session_id).await?;
        self.controller.export_nutrition_plan(&session.state).await
    }

    /// Drop sessions with no successful action for `max_idle`; returns how many went
    pub async fn evict_idle(&self, max_idle: Duration) -> Result<usize> {
        let max_idle = chrono::Duration::from_std(max_idle)
            .map_err(|e| FlowError::Config(format!("idle ttl out of range: {e}")))?;
        let evicted = self.storage.evict_idle(chrono::Utc::now() - max_idle).await?;

        // Locks nobody holds or waits on can be recreated on demand.
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted idle sessions");
        }
        debug!(remaining_locks = self.locks.len(), "Session sweep finished");
        Ok(evicted.len())
    }

    async fn lock_session(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(session_id.to_string()).or_default().clone();
        lock.lock_owned().await
    }
}

fn status_for(report: &SubmissionReport) -> String {
    match report.urgency {
        Some(level) => level.marker().to_string(),
        None => "Assessment ready".to_string(),
    }
}

//! Session - which run owns the visible result
//!
//! Every run is tagged with a ticket drawn from a monotonically increasing
//! counter. Starting a run invalidates all earlier tickets; a run whose ticket
//! is no longer current may finish, but its progress and its outcome are
//! discarded instead of overwriting fresher state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::addon::GenerationResult;
use crate::pipeline::{PipelineError, PipelineOrchestrator, ProgressSink, Stage};
use crate::request::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunTicket(u64);

impl RunTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Session-visible state of the latest started run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub running: bool,
    pub stage_label: Option<String>,
    pub result: Option<GenerationResult>,
    pub error: Option<String>,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// A newer run started in the meantime; nothing was changed.
    Superseded,
}

#[derive(Default)]
pub struct Session {
    current: AtomicU64,
    view: Mutex<SessionView>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new run, superseding any in flight, and reset the view.
    pub fn begin(&self) -> RunTicket {
        let mut view = self.lock();
        let ticket = RunTicket(self.current.fetch_add(1, Ordering::SeqCst) + 1);
        *view = SessionView { running: true, ..SessionView::default() };
        tracing::debug!(ticket = ticket.0, "run started");
        ticket
    }

    pub fn is_current(&self, ticket: RunTicket) -> bool {
        self.current.load(Ordering::SeqCst) == ticket.0
    }

    /// Apply a finished run's outcome if its ticket is still current.
    pub fn apply(
        &self,
        ticket: RunTicket,
        outcome: &Result<GenerationResult, PipelineError>,
    ) -> Applied {
        let mut view = self.lock();
        if !self.is_current(ticket) {
            tracing::debug!(ticket = ticket.0, "stale run completion discarded");
            return Applied::Superseded;
        }
        view.running = false;
        view.stage_label = None;
        match outcome {
            Ok(result) => {
                view.result = Some(result.clone());
                view.error = None;
            }
            Err(e) => {
                view.result = None;
                view.error = Some(e.to_string());
            }
        }
        Applied::Applied
    }

    pub fn view(&self) -> SessionView {
        self.lock().clone()
    }

    /// Run the pipeline under a fresh ticket, forwarding progress to `sink`
    /// and into the view while the ticket stays current.
    pub async fn generate(
        &self,
        orchestrator: &PipelineOrchestrator,
        request: &Request,
        sink: &dyn ProgressSink,
    ) -> (Result<GenerationResult, PipelineError>, Applied) {
        let ticket = self.begin();
        let scoped = TicketSink { session: self, ticket, inner: sink };
        let outcome = orchestrator.run(request, &scoped).await;
        let applied = self.apply(ticket, &outcome);
        (outcome, applied)
    }

    fn lock(&self) -> MutexGuard<'_, SessionView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops progress from runs that have been superseded.
struct TicketSink<'a> {
    session: &'a Session,
    ticket: RunTicket,
    inner: &'a dyn ProgressSink,
}

impl ProgressSink for TicketSink<'_> {
    fn stage(&self, stage: Stage, label: &str) {
        let mut view = self.session.lock();
        if !self.session.is_current(self.ticket) {
            return;
        }
        view.stage_label = Some(label.to_string());
        drop(view);
        self.inner.stage(stage, label);
    }

    fn diagnostic(&self, stage: Stage, message: &str) {
        let mut view = self.session.lock();
        if !self.session.is_current(self.ticket) {
            return;
        }
        view.diagnostics.push(format!("{}: {}", stage, message));
        drop(view);
        self.inner.diagnostic(stage, message);
    }
}

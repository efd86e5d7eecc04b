//! Session worker: a task that owns the [`StorySession`] exclusively.
//!
//! Front ends never touch the session directly. They send
//! [`WorkerRequest`]s over a channel and get one [`WorkerResponse`] back
//! per request, in order. Every intermediate view, including `Working`,
//! is also published on a watch channel.

use crate::session::{SessionError, SessionView, StorySession};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Request sent from a front end to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerRequest {
    /// Start a fresh story.
    Begin,
    /// Pick a continuation.
    Pick(String),
    /// Retry after a fatal failure.
    Retry,
    /// Restore the saved session.
    Resume,
    /// Delete the saved session.
    ClearSaved,
    /// Stop the worker.
    Shutdown,
}

/// Response sent from the worker once a request has settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResponse {
    /// The request was applied; this is the resulting view.
    Settled(SessionView),
    /// `Resume` found no saved session.
    NothingToResume(SessionView),
    /// The session refused the request in its current phase.
    Rejected(String),
}

/// Channel endpoints for a running worker.
pub struct SessionHandle {
    request_tx: mpsc::Sender<WorkerRequest>,
    response_rx: mpsc::Receiver<WorkerResponse>,
    views: watch::Receiver<SessionView>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Send a request and wait for its response.
    ///
    /// Returns `None` once the worker has stopped.
    pub async fn request(&mut self, request: WorkerRequest) -> Option<WorkerResponse> {
        self.request_tx.send(request).await.ok()?;
        self.response_rx.recv().await
    }

    /// Send a request without waiting for the response.
    pub async fn send(&self, request: WorkerRequest) -> bool {
        self.request_tx.send(request).await.is_ok()
    }

    /// Wait for the next response.
    pub async fn recv(&mut self) -> Option<WorkerResponse> {
        self.response_rx.recv().await
    }

    /// The most recently published view.
    pub fn view(&self) -> SessionView {
        self.views.borrow().clone()
    }

    /// A receiver observing every published view.
    pub fn views(&self) -> watch::Receiver<SessionView> {
        self.views.clone()
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.request_tx.send(WorkerRequest::Shutdown).await;
        let _ = self.task.await;
    }
}

/// Move `session` into a worker task on the current runtime.
pub fn spawn_session(session: StorySession) -> SessionHandle {
    let (request_tx, request_rx) = mpsc::channel(8);
    let (response_tx, response_rx) = mpsc::channel(8);
    let views = session.subscribe();

    let task = tokio::spawn(worker_loop(session, request_rx, response_tx));

    SessionHandle {
        request_tx,
        response_rx,
        views,
        task,
    }
}

async fn worker_loop(
    mut session: StorySession,
    mut request_rx: mpsc::Receiver<WorkerRequest>,
    response_tx: mpsc::Sender<WorkerResponse>,
) {
    while let Some(request) = request_rx.recv().await {
        debug!(?request, phase = %session.phase(), "Worker request");

        let response = match request {
            WorkerRequest::Begin => {
                let result = session.begin().await;
                settle(&session, result)
            }
            WorkerRequest::Retry => {
                let result = session.retry().await;
                settle(&session, result)
            }
            WorkerRequest::Pick(choice) => {
                let result = session.pick(&choice).await;
                settle(&session, result)
            }
            WorkerRequest::Resume => match session.resume().await {
                Ok(true) => WorkerResponse::Settled(session.view()),
                Ok(false) => WorkerResponse::NothingToResume(session.view()),
                Err(e) => WorkerResponse::Rejected(e.to_string()),
            },
            WorkerRequest::ClearSaved => {
                session.clear_saved().await;
                WorkerResponse::Settled(session.view())
            }
            WorkerRequest::Shutdown => break,
        };

        if response_tx.send(response).await.is_err() {
            break;
        }
    }
    debug!("Session worker stopped");
}

fn settle(session: &StorySession, result: Result<(), SessionError>) -> WorkerResponse {
    match result {
        Ok(()) => WorkerResponse::Settled(session.view()),
        Err(e) => WorkerResponse::Rejected(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrator::Narrator;
    use crate::persist::{MemoryStorage, SessionStore};
    use crate::provider::{CompletionError, CompletionRequest, TextCompletion};
    use crate::session::Phase;
    use crate::testing::MockCompletion;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Holds every reply until the gate is opened.
    struct Gated {
        gate: Arc<Notify>,
        inner: MockCompletion,
    }

    #[async_trait]
    impl TextCompletion for Gated {
        async fn complete_text(
            &self,
            request: CompletionRequest,
        ) -> Result<String, CompletionError> {
            self.gate.notified().await;
            self.inner.complete_text(request).await
        }
    }

    fn session_with(provider: impl TextCompletion + 'static) -> StorySession {
        StorySession::new(
            Narrator::new(provider),
            SessionStore::new(MemoryStorage::new()),
        )
    }

    #[tokio::test]
    async fn requests_settle_in_order() {
        let mock = MockCompletion::new();
        mock.push_segment("Rain.", &["A", "B", "C"]);
        mock.push_segment("More rain.", &["D"]);
        let mut handle = spawn_session(session_with(mock));

        let begun = handle.request(WorkerRequest::Begin).await.unwrap();
        let WorkerResponse::Settled(view) = begun else {
            panic!("unexpected response: {begun:?}");
        };
        assert_eq!(view.phase, Phase::Ready);

        let picked = handle.request(WorkerRequest::Pick("A".into())).await.unwrap();
        let WorkerResponse::Settled(view) = picked else {
            panic!("unexpected response: {picked:?}");
        };
        assert_eq!(view.transcript.len(), 3);
        assert_eq!(view.choices, vec!["D".to_string()]);
        assert_eq!(handle.view(), view);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_requests_report_reason() {
        let mut handle = spawn_session(session_with(MockCompletion::new()));

        let response = handle.request(WorkerRequest::Retry).await.unwrap();
        assert!(matches!(response, WorkerResponse::Rejected(reason) if reason.contains("retry")));

        let response = handle.request(WorkerRequest::Resume).await.unwrap();
        assert!(matches!(response, WorkerResponse::NothingToResume(view) if view.phase == Phase::Start));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn working_is_observable_and_choices_are_empty() {
        let gate = Arc::new(Notify::new());
        let mock = MockCompletion::new();
        mock.push_segment("Rain.", &["A", "B", "C"]);
        let mut handle = spawn_session(session_with(Gated {
            gate: gate.clone(),
            inner: mock,
        }));
        let mut views = handle.views();

        assert!(handle.send(WorkerRequest::Begin).await);
        let working = views
            .wait_for(|view| view.phase == Phase::Working)
            .await
            .unwrap()
            .clone();
        assert!(working.choices.is_empty());

        gate.notify_one();
        let response = handle.recv().await.unwrap();
        assert!(matches!(response, WorkerResponse::Settled(view) if view.phase == Phase::Ready));

        handle.shutdown().await;
    }
}

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::error::AppError;
use crate::models::input_file::InputFile;
use crate::models::run::{RenameOutcome, RunEvent, RunSummary};
use crate::services::rename_service::{commit_suggestion, lock_session, RenameEngine};
use crate::state::{RunSession, RunSnapshot, RunStatus};

const EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Extra delay after the cooperative yield between two files.
    pub pacing: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(50),
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns the imported files and the run state machine, and drives the rename
/// engine over the files strictly in index order.
pub struct RunController {
    files: RwLock<Arc<[InputFile]>>,
    session: Mutex<RunSession>,
    status: watch::Sender<RunStatus>,
    events: broadcast::Sender<RunEvent>,
    engine: RenameEngine,
    options: RunOptions,
}

impl RunController {
    pub fn new(files: Vec<InputFile>, engine: RenameEngine, options: RunOptions) -> Self {
        let (status, _) = watch::channel(RunStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = RunSession {
            total: files.len(),
            ..RunSession::default()
        };
        Self {
            files: RwLock::new(files.into()),
            session: Mutex::new(session),
            status,
            events,
            engine,
            options,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    pub fn files(&self) -> Arc<[InputFile]> {
        self.files
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let status = self.status();
        let session = lock_session(&self.session);
        RunSnapshot {
            run_id: session.run_id.clone(),
            status,
            processed: session.processed,
            total: session.total,
            percent: session.percent(),
            names: session.names.clone(),
        }
    }

    fn emit(&self, event: RunEvent) {
        let _ = self.events.send(event);
    }

    /// Moves from any status accepted by `allowed` to `to`, atomically.
    fn transition(
        &self,
        action: &'static str,
        allowed: impl Fn(RunStatus) -> bool,
        to: RunStatus,
    ) -> Result<(), AppError> {
        let mut rejected = None;
        self.status.send_if_modified(|status| {
            if allowed(*status) {
                *status = to;
                true
            } else {
                rejected = Some(*status);
                false
            }
        });
        match rejected {
            Some(from) => Err(AppError::InvalidTransition { from, action }),
            None => Ok(()),
        }
    }

    /// Swaps in a new import. Indices, names and reservations start over.
    pub fn replace_files(&self, files: Vec<InputFile>) -> Result<(), AppError> {
        let total = files.len();
        self.transition("import", |s| !s.is_active(), RunStatus::Idle)?;
        *self
            .files
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = files.into();
        lock_session(&self.session).clear(total);
        tracing::info!(total, "files replaced");
        Ok(())
    }

    /// Begins a new run and returns its id. The loop itself runs in [`drive`].
    ///
    /// [`drive`]: RunController::drive
    pub fn start(&self) -> Result<String, AppError> {
        let total = self.files().len();
        if total == 0 {
            return Err(AppError::MissingInput("Import files first.".to_string()));
        }
        if !self.engine.credential().is_usable() {
            return Err(AppError::MissingInput("Save a valid API key.".to_string()));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let mut rejected = None;
        self.status.send_if_modified(|status| {
            if status.can_start() {
                lock_session(&self.session).reset(run_id.clone(), total);
                *status = RunStatus::Running;
                true
            } else {
                rejected = Some(*status);
                false
            }
        });
        if let Some(from) = rejected {
            return Err(AppError::InvalidTransition {
                from,
                action: "start",
            });
        }

        tracing::info!(run_id = %run_id, total, "run started");
        self.emit(RunEvent::Started {
            run_id: run_id.clone(),
            total,
        });
        Ok(run_id)
    }

    pub fn pause(&self) -> Result<(), AppError> {
        self.transition("pause", |s| s == RunStatus::Running, RunStatus::Paused)?;
        tracing::info!("run paused");
        self.emit(RunEvent::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), AppError> {
        self.transition("resume", |s| s == RunStatus::Paused, RunStatus::Running)?;
        tracing::info!("run resumed");
        self.emit(RunEvent::Resumed);
        Ok(())
    }

    pub fn toggle_pause(&self) -> Result<RunStatus, AppError> {
        match self.status() {
            RunStatus::Paused => self.resume().map(|_| RunStatus::Running),
            _ => self.pause().map(|_| RunStatus::Paused),
        }
    }

    /// Halts the run before the next file. A naming request already in
    /// flight still completes and is recorded; the final count is reported
    /// by the run loop once it exits.
    pub fn stop(&self) -> Result<(), AppError> {
        self.transition("stop", RunStatus::is_active, RunStatus::Stopped)?;
        tracing::info!("stop requested");
        self.emit(RunEvent::StopRequested);
        Ok(())
    }

    fn is_current_run(&self, run_id: &str) -> bool {
        lock_session(&self.session).run_id.as_deref() == Some(run_id)
    }

    /// Processes every file of run `run_id` in order until done or stopped.
    pub async fn drive(&self, run_id: &str) -> RunSummary {
        let started_at = chrono::Utc::now().to_rfc3339();
        let files = self.files();
        let mut status_rx = self.status.subscribe();
        let mut fallbacks = 0usize;
        let mut attempted_all = true;

        for file in files.iter() {
            let status = match status_rx.wait_for(|s| *s != RunStatus::Paused).await {
                Ok(status) => *status,
                Err(_) => RunStatus::Stopped,
            };
            if status != RunStatus::Running {
                attempted_all = false;
                break;
            }
            if !self.is_current_run(run_id) {
                tracing::warn!(run_id, index = file.index, "run superseded before naming");
                attempted_all = false;
                break;
            }

            let suggestion = self.engine.suggest(file).await;

            let event = {
                let mut session = lock_session(&self.session);
                if session.run_id.as_deref() != Some(run_id) {
                    tracing::warn!(run_id, index = file.index, "run superseded, discarding result");
                    attempted_all = false;
                    break;
                }
                let outcome = commit_suggestion(&mut session, file.index, suggestion);
                session.processed += 1;
                tracing::debug!(
                    run_id,
                    index = outcome.index,
                    name = %outcome.final_name,
                    processed = session.processed,
                    "file renamed"
                );
                if outcome.is_fallback() {
                    fallbacks += 1;
                }
                RunEvent::FileRenamed {
                    outcome,
                    processed: session.processed,
                    total: session.total,
                    percent: session.percent(),
                }
            };
            self.emit(event);

            tokio::task::yield_now().await;
            if !self.options.pacing.is_zero() {
                tokio::time::sleep(self.options.pacing).await;
            }
        }

        if !attempted_all && self.status() == RunStatus::Stopped && self.is_current_run(run_id) {
            let (processed, total) = {
                let session = lock_session(&self.session);
                (session.processed, session.total)
            };
            tracing::info!(run_id, processed, total, "run stopped");
            self.emit(RunEvent::Stopped { processed, total });
        }

        if attempted_all {
            let completed = self.status.send_if_modified(|status| {
                if status.is_active() {
                    *status = RunStatus::Completed;
                    true
                } else {
                    false
                }
            });
            if completed {
                let (processed, total) = {
                    let session = lock_session(&self.session);
                    (session.processed, session.total)
                };
                tracing::info!(run_id, processed, total, fallbacks, "run completed");
                self.emit(RunEvent::Completed { processed, total });
            }
        }

        let snapshot = self.snapshot();
        RunSummary {
            run_id: run_id.to_string(),
            status: snapshot.status,
            processed: snapshot.processed,
            total: snapshot.total,
            fallbacks,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub async fn run(&self) -> Result<RunSummary, AppError> {
        let run_id = self.start()?;
        Ok(self.drive(&run_id).await)
    }

    /// Re-runs the rename engine for one file outside the main loop. The
    /// file's previous name stays reserved for the rest of the run. An index
    /// the run never reached counts as processed once it gets a name.
    pub async fn regenerate(&self, index: usize) -> Result<RenameOutcome, AppError> {
        let status = self.status();
        if status.is_active() {
            return Err(AppError::InvalidTransition {
                from: status,
                action: "regenerate",
            });
        }
        let files = self.files();
        let file = files.get(index).ok_or(AppError::IndexOutOfRange(index))?;

        let suggestion = self.engine.suggest(file).await;
        let outcome = {
            let mut session = lock_session(&self.session);
            let first_attempt = !session.names.contains_key(&index);
            let outcome = commit_suggestion(&mut session, index, suggestion);
            if first_attempt {
                session.processed += 1;
            }
            outcome
        };
        tracing::info!(index, name = %outcome.final_name, "file regenerated");
        self.emit(RunEvent::Regenerated {
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::name_service::is_token;
    use crate::services::naming_client::{NamingClient, NamingRequest};
    use crate::services::rename_service::tests::ScriptedClient;
    use crate::services::settings_service::Credential;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};

    fn svg_files(count: usize) -> Vec<InputFile> {
        (0..count)
            .map(|i| InputFile::new(i, &format!("art_{i}.svg"), b"<svg/>".to_vec()).unwrap())
            .collect()
    }

    fn options() -> RunOptions {
        RunOptions {
            pacing: Duration::ZERO,
        }
    }

    fn key() -> Credential {
        Credential::new(Some("sk-test".to_string()))
    }

    fn scripted(files: usize, answers: Vec<Result<&str, &str>>) -> RunController {
        let engine = RenameEngine::new(Arc::new(ScriptedClient::new(answers)), key());
        RunController::new(svg_files(files), engine, options())
    }

    /// Answers "Shape" and, on the given call number, acts on the controller
    /// while the request is still in flight.
    struct InterruptingClient {
        calls: AtomicUsize,
        on_call: usize,
        action: fn(&RunController),
        controller: OnceLock<Weak<RunController>>,
    }

    #[async_trait]
    impl NamingClient for InterruptingClient {
        async fn suggest(&self, _request: NamingRequest<'_>) -> Result<String, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.on_call {
                if let Some(controller) = self.controller.get().and_then(Weak::upgrade) {
                    (self.action)(&controller);
                }
            }
            Ok("Shape".to_string())
        }
    }

    fn interrupting(
        files: usize,
        on_call: usize,
        action: fn(&RunController),
    ) -> (Arc<RunController>, Arc<InterruptingClient>) {
        let client = Arc::new(InterruptingClient {
            calls: AtomicUsize::new(0),
            on_call,
            action,
            controller: OnceLock::new(),
        });
        let engine = RenameEngine::new(client.clone(), key());
        let controller = Arc::new(RunController::new(svg_files(files), engine, options()));
        let _ = client.controller.set(Arc::downgrade(&controller));
        (controller, client)
    }

    async fn wait_for_renamed(events: &mut broadcast::Receiver<RunEvent>, index: usize) {
        loop {
            if let RunEvent::FileRenamed { outcome, .. } = events.recv().await.unwrap() {
                if outcome.index == index {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn full_run_completes_with_unique_tokens() {
        let controller = scripted(
            5,
            vec![Ok("Gold Star"), Ok("GoldStar"), Err("HTTP status 503"), Ok("99"), Ok("Gold-Star")],
        );

        let summary = controller.run().await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.processed, 5);
        assert_eq!(summary.fallbacks, 1);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.percent, 100);
        assert_eq!(
            snapshot.names.values().cloned().collect::<Vec<_>>(),
            vec!["GoldStar", "GoldStara", "Untitled", "Untitleda", "GoldStarb"]
        );
        let distinct: HashSet<&String> = snapshot.names.values().collect();
        assert_eq!(distinct.len(), 5);
        assert!(snapshot.names.values().all(|n| is_token(n)));
    }

    #[tokio::test]
    async fn progress_events_are_ordered_and_monotonic() {
        let controller = scripted(4, vec![Ok("A"), Ok("B"), Ok("C"), Ok("D")]);
        let mut events = controller.subscribe();

        controller.run().await.unwrap();

        let mut last_processed = 0;
        let mut indices = Vec::new();
        let mut percents = Vec::new();
        let mut completed = false;
        while let Ok(event) = events.try_recv() {
            match event {
                RunEvent::FileRenamed {
                    outcome,
                    processed,
                    percent,
                    ..
                } => {
                    assert!(processed >= last_processed);
                    last_processed = processed;
                    indices.push(outcome.index);
                    percents.push(percent);
                }
                RunEvent::Completed { processed, total } => {
                    assert_eq!(processed, total);
                    completed = true;
                }
                _ => {}
            }
        }
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(percents, vec![25, 50, 75, 100]);
        assert!(completed);
    }

    #[tokio::test]
    async fn start_requires_files_and_credential() {
        let controller = scripted(0, vec![]);
        let err = controller.start().unwrap_err();
        assert!(matches!(err, AppError::MissingInput(_)));
        assert_eq!(controller.status(), RunStatus::Idle);

        let engine = RenameEngine::new(Arc::new(ScriptedClient::new(vec![])), Credential::new(None));
        let controller = RunController::new(svg_files(2), engine, options());
        let err = controller.start().unwrap_err();
        assert_eq!(err.to_string(), "Save a valid API key.");
        assert_eq!(controller.status(), RunStatus::Idle);
    }

    #[tokio::test]
    async fn second_start_while_running_is_rejected() {
        let controller = scripted(2, vec![]);
        controller.start().unwrap();
        let err = controller.start().unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: RunStatus::Running,
                action: "start"
            }
        ));
    }

    #[tokio::test]
    async fn pause_and_resume_only_from_matching_state() {
        let controller = scripted(2, vec![]);
        assert!(controller.pause().is_err());
        assert!(controller.resume().is_err());
        assert!(controller.stop().is_err());

        controller.start().unwrap();
        assert_eq!(controller.toggle_pause().unwrap(), RunStatus::Paused);
        assert!(controller.pause().is_err());
        assert_eq!(controller.toggle_pause().unwrap(), RunStatus::Running);
    }

    #[tokio::test]
    async fn stop_after_k_files_keeps_exactly_k_results() {
        let (controller, client) = interrupting(5, 3, |c| c.stop().unwrap());

        let summary = controller.run().await.unwrap();

        assert_eq!(summary.status, RunStatus::Stopped);
        assert_eq!(summary.processed, 3);
        assert_eq!(controller.snapshot().names.len(), 3);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn regenerating_an_unreached_file_counts_it_as_processed() {
        let (controller, _client) = interrupting(5, 3, |c| c.stop().unwrap());
        controller.run().await.unwrap();

        controller.regenerate(4).await.unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.names.len(), 4);
        assert_eq!(snapshot.processed, 4);
        assert_eq!(snapshot.percent, 80);

        controller.regenerate(4).await.unwrap();
        controller.regenerate(0).await.unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.processed, snapshot.names.len());
    }

    #[tokio::test]
    async fn stopped_event_reports_the_committed_count() {
        let (controller, _client) = interrupting(5, 2, |c| c.stop().unwrap());
        let mut events = controller.subscribe();

        controller.run().await.unwrap();

        let mut saw_request = false;
        let mut stopped = None;
        while let Ok(event) = events.try_recv() {
            match event {
                RunEvent::StopRequested => saw_request = true,
                RunEvent::Stopped { processed, total } => stopped = Some((processed, total)),
                _ => {}
            }
        }
        assert!(saw_request);
        assert_eq!(stopped, Some((2, 5)));
    }

    #[tokio::test]
    async fn superseded_loop_makes_no_naming_request() {
        let (controller, client) = interrupting(3, 0, |_| {});
        let old_run = controller.start().unwrap();
        controller.stop().unwrap();
        let current_run = controller.start().unwrap();

        let summary = controller.drive(&old_run).await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(summary.status, RunStatus::Running);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.run_id.as_deref(), Some(current_run.as_str()));
        assert!(snapshot.names.is_empty());
        assert_eq!(snapshot.processed, 0);
    }

    #[tokio::test]
    async fn paused_run_waits_then_finishes_after_resume() {
        let (controller, client) = interrupting(3, 1, |c| c.pause().unwrap());
        let mut events = controller.subscribe();
        let run_id = controller.start().unwrap();
        let driver = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.drive(&run_id).await })
        };

        wait_for_renamed(&mut events, 0).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(controller.status(), RunStatus::Paused);
        assert_eq!(controller.snapshot().processed, 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        controller.resume().unwrap();
        let summary = driver.await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.processed, 3);
    }

    #[tokio::test]
    async fn stop_while_paused_ends_the_run() {
        let (controller, client) = interrupting(4, 1, |c| c.pause().unwrap());
        let mut events = controller.subscribe();
        let run_id = controller.start().unwrap();
        let driver = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.drive(&run_id).await })
        };

        wait_for_renamed(&mut events, 0).await;
        controller.stop().unwrap();
        let summary = driver.await.unwrap();

        assert_eq!(summary.status, RunStatus::Stopped);
        assert_eq!(controller.snapshot().names.len(), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn restart_clears_previous_results() {
        let controller = scripted(2, vec![Ok("Leaf"), Ok("Leaf"), Ok("Leaf"), Ok("Tree")]);
        controller.run().await.unwrap();
        assert_eq!(controller.snapshot().names.get(&1).unwrap(), "Leafa");

        let summary = controller.run().await.unwrap();

        assert_eq!(summary.processed, 2);
        let names = controller.snapshot().names;
        assert_eq!(names.get(&0).unwrap(), "Leaf");
        assert_eq!(names.get(&1).unwrap(), "Tree");
    }

    #[tokio::test]
    async fn regenerate_after_completion_never_collides() {
        let controller = scripted(2, vec![Ok("Wave"), Ok("Sun"), Ok("Sun"), Ok("Wave")]);
        controller.run().await.unwrap();

        let first = controller.regenerate(0).await.unwrap();
        assert_eq!(first.final_name, "Suna");
        let second = controller.regenerate(1).await.unwrap();
        assert_eq!(second.final_name, "Wavea");

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.names.len(), 2);
    }

    #[tokio::test]
    async fn regenerate_is_rejected_during_run_and_out_of_range() {
        let controller = scripted(2, vec![Ok("Wave")]);
        assert!(matches!(
            controller.regenerate(7).await.unwrap_err(),
            AppError::IndexOutOfRange(7)
        ));

        controller.start().unwrap();
        assert!(matches!(
            controller.regenerate(0).await.unwrap_err(),
            AppError::InvalidTransition { .. }
        ));
    }

    #[tokio::test]
    async fn reimport_resets_indices_and_names() {
        let controller = scripted(2, vec![Ok("Wave"), Ok("Sun")]);
        controller.run().await.unwrap();

        controller.replace_files(svg_files(3)).unwrap();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.status, RunStatus::Idle);
        assert_eq!(snapshot.total, 3);
        assert!(snapshot.names.is_empty());
        assert_eq!(controller.files().len(), 3);
    }
}

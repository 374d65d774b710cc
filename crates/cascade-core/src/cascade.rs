//! Cascade orchestration
//!
//! Wires N ordered selectors so that a committed selection at stage `i`
//! clears every later stage unconditionally and, once stages `0..=i` are
//! all committed, triggers stage `i+1`'s retrieval with the composite key
//! (the ordered prefix of committed selections). Bursts of upstream changes
//! are coalesced through a short quiet window and trigger at most one
//! downstream retrieval per settled combination.
//!
//! All stage state is owned by one driver task. Retrievals run as spawned
//! tasks and post their completions back as messages stamped with the epoch
//! they were issued under; a completion from a superseded epoch is
//! discarded before it can touch any state.

use crate::cancel::{CancelScope, Epoch};
use crate::error::{RetryError, SourceError};
use crate::filter::FilterFn;
use crate::retry::RetryPolicy;
use crate::selector::{FilterGen, Key, KeyOutcome, Selector};
use crate::source::CandidateSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Timing and retry knobs for a cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Quiet window before the first filtered candidate is auto-highlighted
    pub highlight_quiet: Duration,
    /// Quiet window coalescing bursts of upstream selection changes
    pub cascade_quiet: Duration,
    /// Retry policy applied to every retrieval
    pub retry: RetryPolicy,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            highlight_quiet: Duration::from_millis(200),
            cascade_quiet: Duration::from_millis(50),
            retry: RetryPolicy::default(),
        }
    }
}

/// Whether a stage currently has a retrieval in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Idle,
    Retrieving,
}

/// Construction-time description of one stage.
pub struct StageSpec<T> {
    /// Pure filter for this stage's selector
    pub filter: FilterFn<T>,
    /// Candidate source fetched with the committed upstream prefix
    pub source: Arc<dyn CandidateSource<T>>,
}

/// Commands accepted by the cascade driver.
#[derive(Debug)]
pub enum Command<T> {
    /// Trigger stage 0's retrieval; the session entry point
    Start,
    /// Replace the filter input of one stage
    SetInput { stage: usize, text: String },
    /// Feed one logical key to one stage
    Press { stage: usize, key: Key },
    /// Enter search mode on one stage
    BeginSearch { stage: usize },
    /// Pointer commit of a displayed candidate
    Select { stage: usize, value: T },
    /// Drop one stage's committed selection, clearing everything downstream
    Clear { stage: usize },
    /// Point-in-time view of every stage
    Snapshot(oneshot::Sender<Vec<StageSnapshot<T>>>),
}

/// Observable state of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSnapshot<T> {
    pub candidates: Vec<T>,
    pub input: String,
    pub filtered: Vec<T>,
    pub highlighted: Option<T>,
    pub selection: Option<T>,
    pub searching: bool,
    pub status: StageStatus,
}

/// Notifications emitted by the driver, for UI glue.
#[derive(Debug, Clone, PartialEq)]
pub enum CascadeEvent<T> {
    /// A stage's committed selection changed, possibly to absent
    SelectionChanged { stage: usize, selection: Option<T> },
    /// A retrieval was issued for a stage
    Retrieving { stage: usize },
    /// A retrieval completed and replaced a stage's candidate set
    CandidatesReplaced { stage: usize, count: usize },
    /// A retrieval failed after retries; prior state was preserved
    RetrievalFailed { stage: usize, error: SourceError },
}

enum Internal<T> {
    Retrieved {
        stage: usize,
        epoch: Epoch,
        result: Result<Vec<T>, RetryError>,
    },
    AutoHighlight {
        stage: usize,
        generation: FilterGen,
    },
    Settle {
        generation: u64,
    },
}

struct Stage<T> {
    selector: Selector<T>,
    scope: CancelScope,
    source: Arc<dyn CandidateSource<T>>,
    status: StageStatus,
}

/// Handle for driving a running cascade.
///
/// Commands are fire-and-forget; they are applied in order by the driver
/// task. Dropping every handle tears the cascade down and cancels any
/// retrieval still in flight.
pub struct CascadeHandle<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
}

impl<T> Clone for CascadeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

impl<T> CascadeHandle<T> {
    pub fn start(&self) {
        self.send(Command::Start);
    }

    pub fn set_input(&self, stage: usize, text: impl Into<String>) {
        self.send(Command::SetInput {
            stage,
            text: text.into(),
        });
    }

    pub fn press(&self, stage: usize, key: Key) {
        self.send(Command::Press { stage, key });
    }

    pub fn begin_search(&self, stage: usize) {
        self.send(Command::BeginSearch { stage });
    }

    pub fn select(&self, stage: usize, value: T) {
        self.send(Command::Select { stage, value });
    }

    pub fn clear(&self, stage: usize) {
        self.send(Command::Clear { stage });
    }

    /// Point-in-time view of every stage. Empty when the driver is gone.
    pub async fn snapshot(&self) -> Vec<StageSnapshot<T>> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Snapshot(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    fn send(&self, command: Command<T>) {
        // A closed channel means the driver is gone; commands are moot.
        let _ = self.commands.send(command);
    }
}

/// The cascade driver: owns all stage state and serializes every mutation.
pub struct Cascade<T> {
    stages: Vec<Stage<T>>,
    config: CascadeConfig,
    commands: mpsc::UnboundedReceiver<Command<T>>,
    internal_tx: mpsc::UnboundedSender<Internal<T>>,
    internal_rx: mpsc::UnboundedReceiver<Internal<T>>,
    events: mpsc::UnboundedSender<CascadeEvent<T>>,
    cascade_generation: u64,
}

impl<T> Cascade<T>
where
    T: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static,
{
    /// Spawns the driver task for the given stages.
    ///
    /// Returns the command handle and the event stream.
    pub fn spawn(
        specs: Vec<StageSpec<T>>,
        config: CascadeConfig,
    ) -> (CascadeHandle<T>, mpsc::UnboundedReceiver<CascadeEvent<T>>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let stages = specs
            .into_iter()
            .map(|spec| Stage {
                selector: Selector::new(spec.filter),
                scope: CancelScope::new(),
                source: spec.source,
                status: StageStatus::Idle,
            })
            .collect();
        let driver = Cascade {
            stages,
            config,
            commands: command_rx,
            internal_tx,
            internal_rx,
            events: event_tx,
            cascade_generation: 0,
        };
        tokio::spawn(driver.run());
        (
            CascadeHandle {
                commands: command_tx,
            },
            event_rx,
        )
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    // Every handle is gone; dropping the stages cancels
                    // whatever is still in flight.
                    None => break,
                },
                Some(message) = self.internal_rx.recv() => self.on_internal(message),
            }
        }
    }

    fn on_command(&mut self, command: Command<T>) {
        match command {
            Command::Start => self.issue_retrieve(0),
            Command::SetInput { stage, text } => {
                let Some(s) = self.stages.get_mut(stage) else {
                    return;
                };
                let generation = s.selector.set_input(text);
                self.schedule_auto_highlight(stage, generation);
            }
            Command::Press { stage, key } => self.on_press(stage, key),
            Command::BeginSearch { stage } => {
                if let Some(s) = self.stages.get_mut(stage) {
                    s.selector.begin_search();
                }
            }
            Command::Select { stage, value } => {
                let Some(s) = self.stages.get_mut(stage) else {
                    return;
                };
                let before = s.selector.selection().cloned();
                match s.selector.select(value) {
                    Ok(()) => self.after_possible_commit(stage, before),
                    Err(error) => {
                        tracing::debug!(stage, %error, "pointer commit rejected");
                    }
                }
            }
            Command::Clear { stage } => {
                let Some(s) = self.stages.get_mut(stage) else {
                    return;
                };
                if s.selector.clear_selection() {
                    self.on_selection_changed(stage, None);
                }
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshots());
            }
        }
    }

    fn on_internal(&mut self, message: Internal<T>) {
        match message {
            Internal::Settle { generation } => {
                if generation == self.cascade_generation {
                    self.on_settled();
                }
            }
            Internal::AutoHighlight { stage, generation } => {
                if let Some(s) = self.stages.get_mut(stage) {
                    if s.selector.auto_highlight(generation) {
                        tracing::trace!(stage, "auto-highlighted first filtered candidate");
                    }
                }
            }
            Internal::Retrieved {
                stage,
                epoch,
                result,
            } => self.on_retrieved(stage, epoch, result),
        }
    }

    fn on_press(&mut self, stage: usize, key: Key) {
        let Some(s) = self.stages.get_mut(stage) else {
            return;
        };
        let before = s.selector.selection().cloned();
        if s.selector.handle_key(key) == KeyOutcome::Committed {
            self.after_possible_commit(stage, before);
        }
    }

    fn after_possible_commit(&mut self, stage: usize, before: Option<T>) {
        let after = self.stages[stage].selector.selection().cloned();
        // Re-committing the identical value changes nothing downstream.
        if before != after {
            self.on_selection_changed(stage, after);
        }
    }

    /// A stage's committed selection changed. Every downstream stage is
    /// reset unconditionally; the settle timer then decides whether a
    /// single retrieval fires.
    fn on_selection_changed(&mut self, stage: usize, selection: Option<T>) {
        tracing::debug!(stage, committed = selection.is_some(), "selection changed");
        self.emit(CascadeEvent::SelectionChanged { stage, selection });

        let mut cleared = Vec::new();
        for index in stage + 1..self.stages.len() {
            let s = &mut self.stages[index];
            s.scope.reset();
            s.status = StageStatus::Idle;
            if s.selector.clear() {
                cleared.push(index);
            }
        }
        for index in cleared {
            self.emit(CascadeEvent::SelectionChanged {
                stage: index,
                selection: None,
            });
        }
        self.schedule_settle();
    }

    /// The upstream burst has settled: retrieve for the stage just past the
    /// longest fully committed prefix, if there is one.
    fn on_settled(&mut self) {
        let mut committed = 0;
        while committed < self.stages.len()
            && self.stages[committed].selector.selection().is_some()
        {
            committed += 1;
        }
        if committed == 0 || committed >= self.stages.len() {
            // The chain halts at an absent stage 0, or every stage is done.
            return;
        }
        self.issue_retrieve(committed);
    }

    fn issue_retrieve(&mut self, stage: usize) {
        if stage >= self.stages.len() {
            return;
        }
        let key: Vec<T> = self.stages[..stage]
            .iter()
            .filter_map(|s| s.selector.selection().cloned())
            .collect();
        if key.len() != stage {
            tracing::debug!(stage, "retrieval skipped: upstream prefix not fully committed");
            return;
        }

        let s = &mut self.stages[stage];
        s.scope.reset();
        let token = s.scope.token();
        let epoch = s.scope.epoch();
        s.status = StageStatus::Retrieving;
        let source = Arc::clone(&s.source);
        let retry = self.config.retry.clone();
        let internal = self.internal_tx.clone();

        tracing::debug!(stage, %epoch, key_len = key.len(), "issuing retrieval");
        self.emit(CascadeEvent::Retrieving { stage });

        tokio::spawn(async move {
            let attempt_token = token.clone();
            let op = move || {
                let source = Arc::clone(&source);
                let key = key.clone();
                let token = attempt_token.clone();
                async move { source.fetch(&key, &token).await }
            };
            let result = retry.execute(op, &token).await;
            let _ = internal.send(Internal::Retrieved {
                stage,
                epoch,
                result,
            });
        });
    }

    fn on_retrieved(&mut self, stage: usize, epoch: Epoch, result: Result<Vec<T>, RetryError>) {
        {
            let Some(s) = self.stages.get(stage) else {
                return;
            };
            // Checked before anything is applied: a superseded completion
            // must not touch observable state.
            if !s.scope.is_current(epoch) {
                tracing::debug!(stage, %epoch, "discarding completion from superseded epoch");
                return;
            }
        }
        self.stages[stage].status = StageStatus::Idle;
        match result {
            Ok(candidates) => {
                let count = candidates.len();
                let (generation, selection_cleared) =
                    self.stages[stage].selector.replace_candidates(candidates);
                tracing::debug!(stage, count, "candidates replaced");
                self.emit(CascadeEvent::CandidatesReplaced { stage, count });
                self.schedule_auto_highlight(stage, generation);
                if selection_cleared {
                    self.on_selection_changed(stage, None);
                }
            }
            Err(RetryError::Cancelled) => {
                // Token fired without an epoch change (teardown path).
                tracing::debug!(stage, "retrieval cancelled");
            }
            Err(RetryError::Exhausted { attempts, source }) => {
                tracing::warn!(
                    stage,
                    attempts,
                    error = %source,
                    "retrieval failed; keeping last-known-good state"
                );
                self.emit(CascadeEvent::RetrievalFailed {
                    stage,
                    error: source,
                });
            }
        }
    }

    fn schedule_settle(&mut self) {
        self.cascade_generation += 1;
        let generation = self.cascade_generation;
        let quiet = self.config.cascade_quiet;
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _ = internal.send(Internal::Settle { generation });
        });
    }

    fn schedule_auto_highlight(&self, stage: usize, generation: FilterGen) {
        let quiet = self.config.highlight_quiet;
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _ = internal.send(Internal::AutoHighlight { stage, generation });
        });
    }

    fn snapshots(&self) -> Vec<StageSnapshot<T>> {
        self.stages
            .iter()
            .map(|s| StageSnapshot {
                candidates: s.selector.candidates().to_vec(),
                input: s.selector.input().to_string(),
                filtered: s.selector.filtered().to_vec(),
                highlighted: s.selector.highlighted().cloned(),
                selection: s.selector.selection().cloned(),
                searching: s.selector.is_searching(),
                status: s.status,
            })
            .collect()
    }

    fn emit(&self, event: CascadeEvent<T>) {
        // UI glue may only poll snapshots and drop the event receiver.
        let _ = self.events.send(event);
    }
}

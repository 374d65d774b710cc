use async_trait::async_trait;
use cascade_core::{
    identity_filter, Cascade, CascadeConfig, CascadeEvent, CandidateSource, Key, RetryPolicy,
    SourceError, StageSpec, StageStatus, StaticSource,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

fn s(value: &str) -> String {
    value.to_string()
}

fn spec(source: Arc<StaticSource<String>>) -> StageSpec<String> {
    StageSpec {
        filter: identity_filter(),
        source,
    }
}

/// Sources for a three-stage cascade: sources -> flows -> dimensions.
fn three_stage_sources() -> (
    Arc<StaticSource<String>>,
    Arc<StaticSource<String>>,
    Arc<StaticSource<String>>,
) {
    let sources = Arc::new(
        StaticSource::new().with_entry(vec![], vec![s("alpha"), s("beta")]),
    );
    let flows = Arc::new(
        StaticSource::new()
            .with_entry(vec![s("alpha")], vec![s("one"), s("two")])
            .with_entry(vec![s("beta")], vec![s("three")]),
    );
    let dimensions = Arc::new(
        StaticSource::new().with_entry(vec![s("alpha"), s("one")], vec![s("x")]),
    );
    (sources, flows, dimensions)
}

fn drain(events: &mut UnboundedReceiver<CascadeEvent<String>>) -> Vec<CascadeEvent<String>> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(500)).await;
}

#[tokio::test(start_paused = true)]
async fn three_stage_commit_flow_retrieves_with_composite_keys() {
    let (sources, flows, dimensions) = three_stage_sources();
    let (handle, mut events) = Cascade::spawn(
        vec![
            spec(Arc::clone(&sources)),
            spec(Arc::clone(&flows)),
            spec(Arc::clone(&dimensions)),
        ],
        CascadeConfig::default(),
    );

    handle.start();
    settle().await;
    assert_eq!(flows.fetch_count(), 0);

    // Stage 0: filter, auto-highlight, commit.
    handle.begin_search(0);
    handle.set_input(0, "al");
    settle().await;
    handle.press(0, Key::Enter);
    settle().await;
    assert_eq!(flows.fetch_log(), vec![vec![s("alpha")]]);

    // Stage 1: the quiet window has elapsed, so the first flow is already
    // auto-highlighted; Enter commits it.
    handle.press(1, Key::Enter);
    settle().await;
    assert_eq!(dimensions.fetch_log(), vec![vec![s("alpha"), s("one")]]);

    let snapshots = handle.snapshot().await;
    assert_eq!(snapshots[0].selection, Some(s("alpha")));
    assert_eq!(snapshots[1].selection, Some(s("one")));
    assert_eq!(snapshots[2].candidates, vec![s("x")]);
    assert_eq!(snapshots[2].selection, None);
    assert!(snapshots.iter().all(|st| st.status == StageStatus::Idle));

    // A commit at stage 0 is observed before stage 1's retrieval is issued.
    let log = drain(&mut events);
    let committed = log
        .iter()
        .position(|e| {
            matches!(e, CascadeEvent::SelectionChanged { stage: 0, selection: Some(_) })
        })
        .unwrap();
    let retrieving = log
        .iter()
        .position(|e| matches!(e, CascadeEvent::Retrieving { stage: 1 }))
        .unwrap();
    assert!(committed < retrieving);
}

#[tokio::test(start_paused = true)]
async fn clearing_upstream_resets_downstream_and_halts_the_chain() {
    let (sources, flows, dimensions) = three_stage_sources();
    let (handle, mut events) = Cascade::spawn(
        vec![
            spec(Arc::clone(&sources)),
            spec(Arc::clone(&flows)),
            spec(Arc::clone(&dimensions)),
        ],
        CascadeConfig::default(),
    );

    handle.start();
    settle().await;
    handle.select(0, s("alpha"));
    settle().await;
    handle.select(1, s("one"));
    settle().await;
    assert_eq!(dimensions.fetch_count(), 1);
    let flow_fetches = flows.fetch_count();
    drain(&mut events);

    handle.clear(0);
    settle().await;

    let snapshots = handle.snapshot().await;
    // Stage 0 keeps its candidates; only the commitment is gone.
    assert_eq!(snapshots[0].candidates, vec![s("alpha"), s("beta")]);
    assert_eq!(snapshots[0].selection, None);
    for snapshot in &snapshots[1..] {
        assert!(snapshot.candidates.is_empty());
        assert!(snapshot.filtered.is_empty());
        assert_eq!(snapshot.highlighted, None);
        assert_eq!(snapshot.selection, None);
    }

    // No retrieval fires until stage 0 commits again.
    assert_eq!(flows.fetch_count(), flow_fetches);
    assert_eq!(dimensions.fetch_count(), 1);
    let log = drain(&mut events);
    assert!(log
        .iter()
        .any(|e| matches!(e, CascadeEvent::SelectionChanged { stage: 1, selection: None })));
    assert!(log
        .iter()
        .any(|e| matches!(e, CascadeEvent::SelectionChanged { stage: 2, selection: None })));
    assert!(!log.iter().any(|e| matches!(e, CascadeEvent::Retrieving { .. })));
}

#[tokio::test(start_paused = true)]
async fn rapid_upstream_commits_coalesce_into_one_retrieval() {
    let (sources, flows, dimensions) = three_stage_sources();
    let (handle, _events) = Cascade::spawn(
        vec![
            spec(Arc::clone(&sources)),
            spec(Arc::clone(&flows)),
            spec(dimensions),
        ],
        CascadeConfig::default(),
    );

    handle.start();
    settle().await;

    // Two commits inside one quiet window: only the settled combination
    // triggers a retrieval.
    handle.select(0, s("alpha"));
    handle.select(0, s("beta"));
    settle().await;

    assert_eq!(flows.fetch_log(), vec![vec![s("beta")]]);
}

#[tokio::test(start_paused = true)]
async fn retrieval_failure_preserves_last_known_good_state() {
    let sources = Arc::new(
        StaticSource::new().with_entry(vec![], vec![s("alpha"), s("beta")]),
    );
    let flows = Arc::new(StaticSource::new().with_entry(vec![s("alpha")], vec![s("one")]));
    let config = CascadeConfig {
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        ..CascadeConfig::default()
    };
    let (handle, mut events) = Cascade::spawn(
        vec![spec(Arc::clone(&sources)), spec(Arc::clone(&flows))],
        config,
    );

    handle.start();
    settle().await;
    handle.select(0, s("alpha"));
    settle().await;
    drain(&mut events);

    // Re-entering the session hits a source that is now down.
    sources.script_failures(vec![], 5);
    handle.start();
    settle().await;

    let log = drain(&mut events);
    let failures = log
        .iter()
        .filter(|e| matches!(e, CascadeEvent::RetrievalFailed { stage: 0, .. }))
        .count();
    assert_eq!(failures, 1);

    // Candidates and the committed selection survive the failed refresh.
    let snapshots = handle.snapshot().await;
    assert_eq!(snapshots[0].candidates, vec![s("alpha"), s("beta")]);
    assert_eq!(snapshots[0].selection, Some(s("alpha")));
    assert_eq!(snapshots[0].status, StageStatus::Idle);
    assert_eq!(snapshots[1].candidates, vec![s("one")]);
}

/// Source whose fetches block until a permit is released, for exercising
/// supersession of in-flight retrievals.
struct GatedSource {
    entries: HashMap<Vec<String>, Vec<String>>,
    gate: Arc<Semaphore>,
    log: Mutex<Vec<Vec<String>>>,
}

impl GatedSource {
    fn new(entries: HashMap<Vec<String>, Vec<String>>) -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(Self {
            entries,
            gate: Arc::clone(&gate),
            log: Mutex::new(Vec::new()),
        });
        (source, gate)
    }

    fn fetch_log(&self) -> Vec<Vec<String>> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl CandidateSource<String> for GatedSource {
    async fn fetch(
        &self,
        key: &[String],
        _cancel: &CancellationToken,
    ) -> Result<Vec<String>, SourceError> {
        self.log.lock().push(key.to_vec());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| SourceError::Unavailable("gate closed".into()))?;
        permit.forget();
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| SourceError::Fetch("no entry".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn superseded_retrieval_never_mutates_state() {
    let sources = Arc::new(
        StaticSource::new().with_entry(vec![], vec![s("alpha"), s("beta")]),
    );
    let mut entries = HashMap::new();
    entries.insert(vec![s("alpha")], vec![s("stale-flow")]);
    entries.insert(vec![s("beta")], vec![s("fresh-flow")]);
    let (flows, gate) = GatedSource::new(entries);

    let (handle, _events) = Cascade::spawn(
        vec![
            spec(Arc::clone(&sources)),
            StageSpec {
                filter: identity_filter(),
                source: Arc::clone(&flows) as Arc<dyn CandidateSource<String>>,
            },
        ],
        CascadeConfig::default(),
    );

    handle.start();
    settle().await;

    // First commit leaves a retrieval for ["alpha"] blocked on the gate.
    handle.select(0, s("alpha"));
    settle().await;
    assert_eq!(handle.snapshot().await[1].status, StageStatus::Retrieving);
    assert_eq!(flows.fetch_log(), vec![vec![s("alpha")]]);

    // A second commit supersedes it before it can complete.
    handle.select(0, s("beta"));
    settle().await;
    assert_eq!(flows.fetch_log(), vec![vec![s("alpha")], vec![s("beta")]]);

    // Releasing the gate lets only the live retrieval through.
    gate.add_permits(1);
    settle().await;

    let snapshots = handle.snapshot().await;
    assert_eq!(snapshots[0].selection, Some(s("beta")));
    assert_eq!(snapshots[1].candidates, vec![s("fresh-flow")]);
    assert_eq!(snapshots[1].selection, None);
    assert_eq!(snapshots[1].status, StageStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn refresh_of_a_committed_stage_clears_it_and_everything_below() {
    let (sources, flows, dimensions) = three_stage_sources();
    let (handle, _events) = Cascade::spawn(
        vec![
            spec(sources),
            spec(Arc::clone(&flows)),
            spec(Arc::clone(&dimensions)),
        ],
        CascadeConfig::default(),
    );

    handle.start();
    settle().await;
    handle.select(0, s("alpha"));
    settle().await;
    handle.select(1, s("one"));
    settle().await;
    assert_eq!(dimensions.fetch_count(), 1);

    // A fresh stage-0 retrieval invalidates the committed selection, which
    // cascades: downstream stages empty out and stage 1 is re-fetched only
    // after stage 0 commits again.
    handle.start();
    settle().await;

    let snapshots = handle.snapshot().await;
    assert_eq!(snapshots[0].selection, None);
    assert!(snapshots[1].candidates.is_empty());
    assert!(snapshots[2].candidates.is_empty());
    let flow_fetches = flows.fetch_count();

    handle.select(0, s("beta"));
    settle().await;
    assert_eq!(flows.fetch_count(), flow_fetches + 1);
    assert_eq!(flows.fetch_log().last().unwrap(), &vec![s("beta")]);
}

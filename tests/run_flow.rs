//! End-to-end run flows against fake page, agent, and planner seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use runcast::orchestrator::{
    AgentFactory, PageLease, PageProvider, RunCoordinator, RunDefaults, RunRequest,
};
use runcast::registry::RunRegistry;
use runcast_agent::{
    AgentError, AutomationAgent, ActionTaken, EpisodeOutcome, EpisodePlan, EpisodePlanner,
    PlanRequest,
};
use runcast_browser::{ConsoleNotice, DriverError, DriverPage};
use runcast_core_types::{EpisodeSpec, EventEnvelope, RunEvent, RunId, RunStatus};
use runcast_event_bus::EventBus;

struct FakePage;

#[async_trait]
impl DriverPage for FakePage {
    async fn navigate(&self, _url: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn content(&self) -> Result<String, DriverError> {
        Ok("<html><body>stub page</body></html>".to_string())
    }

    async fn fix_viewport(&self, _width: u32, _height: u32) -> Result<(), DriverError> {
        Ok(())
    }

    async fn capture_jpeg(&self, _quality: u32) -> Result<Vec<u8>, DriverError> {
        Ok(vec![0xFF, 0xD8, 0xFF])
    }

    async fn capture_png(&self) -> Result<Vec<u8>, DriverError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    fn supports_fast_capture(&self) -> bool {
        true
    }

    async fn navigations(&self) -> Result<BoxStream<'static, String>, DriverError> {
        Ok(stream::empty().boxed())
    }

    async fn consoles(&self) -> Result<BoxStream<'static, ConsoleNotice>, DriverError> {
        Ok(stream::empty().boxed())
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

struct FakeLease {
    page: Arc<FakePage>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl PageLease for FakeLease {
    fn page(&self) -> Arc<dyn DriverPage> {
        self.page.clone()
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeProvider {
    closes: Arc<AtomicUsize>,
}

impl FakeProvider {
    fn new() -> (Arc<Self>, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                closes: closes.clone(),
            }),
            closes,
        )
    }
}

#[async_trait]
impl PageProvider for FakeProvider {
    async fn acquire(&self) -> Result<Arc<dyn PageLease>, DriverError> {
        Ok(Arc::new(FakeLease {
            page: Arc::new(FakePage),
            closes: self.closes.clone(),
        }))
    }
}

#[derive(Default)]
struct FakeAgent {
    script: Mutex<VecDeque<Result<EpisodeOutcome, AgentError>>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl FakeAgent {
    fn scripted(script: Vec<Result<EpisodeOutcome, AgentError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn done(message: &str) -> Result<EpisodeOutcome, AgentError> {
        Ok(EpisodeOutcome {
            message: message.to_string(),
            actions: vec![ActionTaken::new("click", message)],
        })
    }
}

#[async_trait]
impl AutomationAgent for FakeAgent {
    async fn execute(
        &self,
        instruction: &str,
        max_steps: u32,
    ) -> Result<EpisodeOutcome, AgentError> {
        self.calls.lock().push((instruction.to_string(), max_steps));
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| FakeAgent::done(&format!("completed: {instruction}")))
    }
}

struct FakeFactory {
    agent: Arc<FakeAgent>,
    last_instructions: Mutex<Option<String>>,
}

impl FakeFactory {
    fn new(agent: Arc<FakeAgent>) -> Arc<Self> {
        Arc::new(Self {
            agent,
            last_instructions: Mutex::new(None),
        })
    }
}

impl AgentFactory for FakeFactory {
    fn agent_for(
        &self,
        _model: &str,
        instructions: &str,
    ) -> Result<Arc<dyn AutomationAgent>, AgentError> {
        *self.last_instructions.lock() = Some(instructions.to_string());
        Ok(self.agent.clone())
    }
}

struct FakePlanner {
    plan: Option<EpisodePlan>,
    calls: AtomicUsize,
}

impl FakePlanner {
    fn with_plan(plan: EpisodePlan) -> Arc<Self> {
        Arc::new(Self {
            plan: Some(plan),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            plan: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EpisodePlanner for FakePlanner {
    async fn plan(&self, _request: &PlanRequest) -> Result<EpisodePlan, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.plan
            .clone()
            .ok_or_else(|| AgentError::request("planner unavailable"))
    }
}

struct Harness {
    coordinator: Arc<RunCoordinator>,
    bus: Arc<EventBus>,
    registry: Arc<RunRegistry>,
    closes: Arc<AtomicUsize>,
}

fn harness(agent: Arc<FakeAgent>, planner: Option<Arc<FakePlanner>>) -> (Harness, Arc<FakeFactory>) {
    let bus = Arc::new(EventBus::default());
    let registry = RunRegistry::new();
    let (provider, closes) = FakeProvider::new();
    let factory = FakeFactory::new(agent);
    let coordinator = Arc::new(RunCoordinator::new(
        bus.clone(),
        registry.clone(),
        provider,
        factory.clone(),
        planner.map(|p| p as Arc<dyn EpisodePlanner>),
        RunDefaults::default(),
    ));
    (
        Harness {
            coordinator,
            bus,
            registry,
            closes,
        },
        factory,
    )
}

fn request(body: serde_json::Value) -> RunRequest {
    serde_json::from_value(body).expect("valid run request")
}

async fn wait_terminal(registry: &RunRegistry, run_id: &RunId) -> RunStatus {
    loop {
        if let Some(snapshot) = registry.get(run_id.as_str()) {
            match snapshot.status {
                RunStatus::Pending | RunStatus::Running => {}
                terminal => return terminal,
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn history(bus: &EventBus, run_id: &RunId) -> Vec<EventEnvelope> {
    bus.subscribe(run_id, None)
        .history
        .into_iter()
        .map(|delivery| delivery.envelope)
        .collect()
}

fn kinds(events: &[EventEnvelope]) -> Vec<&'static str> {
    events.iter().map(|envelope| envelope.event.kind()).collect()
}

#[tokio::test(start_paused = true)]
async fn explicit_episodes_run_in_order_without_the_planner() {
    let agent = FakeAgent::scripted(vec![]);
    let planner = FakePlanner::failing();
    let (h, _) = harness(agent.clone(), Some(planner.clone()));

    let run_id = h.coordinator.accept(request(serde_json::json!({
        "live": false,
        "episodes": [
            {"task": "open the docs page", "maxSteps": 5},
            {"task": "search for pricing"},
        ],
    })));
    assert_eq!(wait_terminal(&h.registry, &run_id).await, RunStatus::Finished);

    assert_eq!(planner.calls.load(Ordering::SeqCst), 0);
    let events = history(&h.bus, &run_id);
    assert_eq!(
        kinds(&events),
        vec![
            "session.created",
            "episode.start",
            "agent.action",
            "episode.finish",
            "episode.start",
            "agent.action",
            "episode.finish",
            "session.finished",
        ]
    );

    // Explicit maxSteps passes through; absent falls back to the request default.
    let calls = agent.calls.lock().clone();
    assert_eq!(calls[0], ("open the docs page".to_string(), 5));
    assert_eq!(calls[1], ("search for pricing".to_string(), 8));
    assert_eq!(h.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_episode_waits_and_retries_exactly_once() {
    let agent = FakeAgent::scripted(vec![
        Err(AgentError::RateLimited {
            retry_after_seconds: 2,
        }),
        FakeAgent::done("second attempt worked"),
    ]);
    let (h, _) = harness(agent.clone(), None);

    let started = tokio::time::Instant::now();
    let run_id = h.coordinator.accept(request(serde_json::json!({
        "live": false,
        "task": "open the docs page",
    })));
    assert_eq!(wait_terminal(&h.registry, &run_id).await, RunStatus::Finished);
    assert!(started.elapsed() >= Duration::from_secs(2));

    let events = history(&h.bus, &run_id);
    let rate_limits: Vec<_> = events
        .iter()
        .filter_map(|envelope| match &envelope.event {
            RunEvent::RateLimit {
                episode,
                retry_after,
            } => Some((*episode, *retry_after)),
            _ => None,
        })
        .collect();
    assert_eq!(rate_limits, vec![(0, 2)]);
    let finishes = kinds(&events)
        .iter()
        .filter(|kind| **kind == "episode.finish")
        .count();
    assert_eq!(finishes, 1);
    assert_eq!(agent.calls.lock().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn second_failure_after_retry_is_fatal_and_tears_down() {
    let agent = FakeAgent::scripted(vec![
        Err(AgentError::RateLimited {
            retry_after_seconds: 1,
        }),
        Err(AgentError::request("still failing")),
    ]);
    let (h, _) = harness(agent, None);

    // keepOpen must not survive the error path.
    let run_id = h.coordinator.accept(request(serde_json::json!({
        "live": false,
        "task": "open the docs page",
        "keepOpen": true,
    })));
    assert_eq!(wait_terminal(&h.registry, &run_id).await, RunStatus::Failed);

    let events = history(&h.bus, &run_id);
    let event_kinds = kinds(&events);
    assert!(event_kinds.contains(&"rate_limit"));
    assert!(event_kinds.contains(&"episode.error"));
    assert_eq!(event_kinds.last(), Some(&"error"));
    assert!(!event_kinds.contains(&"session.finished"));
    assert_eq!(h.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn blocked_summary_halts_before_later_episodes() {
    let agent = FakeAgent::scripted(vec![
        Ok(EpisodeOutcome {
            message: "BLOCKED: captcha wall".to_string(),
            actions: Vec::new(),
        }),
        FakeAgent::done("should never run"),
    ]);
    let (h, _) = harness(agent.clone(), None);

    let run_id = h.coordinator.accept(request(serde_json::json!({
        "live": false,
        "episodes": [
            {"task": "first"},
            {"task": "second"},
        ],
    })));
    assert_eq!(wait_terminal(&h.registry, &run_id).await, RunStatus::Blocked);

    let event_kinds = kinds(&history(&h.bus, &run_id));
    let starts = event_kinds.iter().filter(|kind| **kind == "episode.start").count();
    assert_eq!(starts, 1);
    assert_eq!(event_kinds.last(), Some(&"session.finished"));
    assert_eq!(agent.calls.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn planner_plan_drives_episodes_and_unions_the_allowlist() {
    let agent = FakeAgent::scripted(vec![]);
    let planner = FakePlanner::with_plan(EpisodePlan {
        allowlist: vec!["example.com".to_string(), "help.example.com".to_string()],
        episodes: vec![EpisodeSpec::new("locate contact link", 5)],
    });
    let (h, factory) = harness(agent.clone(), Some(planner));

    let run_id = h.coordinator.accept(request(serde_json::json!({
        "live": false,
        "goal": "find the contact page",
        "allowlist": ["example.com"],
    })));
    assert_eq!(wait_terminal(&h.registry, &run_id).await, RunStatus::Finished);

    let events = history(&h.bus, &run_id);
    let planned = events
        .iter()
        .find_map(|envelope| match &envelope.event {
            RunEvent::Planned {
                allowlist,
                episodes,
            } => Some((allowlist.clone(), episodes.clone())),
            _ => None,
        })
        .expect("planned event");
    assert_eq!(
        planned.0,
        vec!["example.com".to_string(), "help.example.com".to_string()]
    );
    assert_eq!(planned.1, vec![EpisodeSpec::new("locate contact link", 5)]);

    assert_eq!(
        agent.calls.lock().as_slice(),
        &[("locate contact link".to_string(), 5)]
    );
    let instructions = factory.last_instructions.lock().clone().expect("instructions");
    assert!(instructions.contains("example.com, help.example.com"));
}

#[tokio::test(start_paused = true)]
async fn planner_failure_falls_back_to_a_single_episode() {
    let agent = FakeAgent::scripted(vec![]);
    let planner = FakePlanner::failing();
    let (h, _) = harness(agent.clone(), Some(planner.clone()));

    let run_id = h.coordinator.accept(request(serde_json::json!({
        "live": false,
        "goal": "find the contact page",
    })));
    assert_eq!(wait_terminal(&h.registry, &run_id).await, RunStatus::Finished);

    assert_eq!(planner.calls.load(Ordering::SeqCst), 1);
    let events = history(&h.bus, &run_id);
    assert!(!kinds(&events).contains(&"planned"));
    assert_eq!(
        agent.calls.lock().as_slice(),
        &[("find the contact page".to_string(), 8)]
    );
}

#[tokio::test(start_paused = true)]
async fn keep_open_skips_page_teardown_on_success() {
    let agent = FakeAgent::scripted(vec![]);
    let (h, _) = harness(agent, None);

    let run_id = h.coordinator.accept(request(serde_json::json!({
        "live": false,
        "task": "stay around",
        "keepOpen": true,
    })));
    assert_eq!(wait_terminal(&h.registry, &run_id).await, RunStatus::Finished);
    assert_eq!(h.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn live_run_announces_session_before_episodes() {
    let agent = FakeAgent::scripted(vec![]);
    let (h, _) = harness(agent, None);

    let run_id = h.coordinator.accept(request(serde_json::json!({
        "url": "https://example.com",
        "task": "look around",
    })));
    assert_eq!(wait_terminal(&h.registry, &run_id).await, RunStatus::Finished);

    let event_kinds = kinds(&history(&h.bus, &run_id));
    let position = |kind: &str| event_kinds.iter().position(|k| *k == kind);
    let nav = position("nav").expect("nav event");
    let started = position("session.started").expect("session.started event");
    let first_episode = position("episode.start").expect("episode.start event");
    assert!(nav < started);
    assert!(started < first_episode);
    assert!(event_kinds.contains(&"session.finished"));
    // Replay keeps lifecycle events intact and only the newest frame.
    let frames = event_kinds.iter().filter(|kind| **kind == "frame").count();
    assert_eq!(frames, 1);
}

#[tokio::test(start_paused = true)]
async fn finished_runs_age_out_of_the_bus_and_registry() {
    let agent = FakeAgent::scripted(vec![]);
    let (h, _) = harness(agent, None);

    let run_id = h.coordinator.accept(request(serde_json::json!({
        "live": false,
        "task": "short lived",
    })));
    assert_eq!(wait_terminal(&h.registry, &run_id).await, RunStatus::Finished);

    // Late subscribers still get the replay inside the retention window.
    assert!(!history(&h.bus, &run_id).is_empty());
    assert!(h.registry.get(run_id.as_str()).is_some());

    tokio::time::sleep(RunDefaults::default().room_retention + Duration::from_secs(1)).await;
    assert!(history(&h.bus, &run_id).is_empty());
    assert!(h.registry.get(run_id.as_str()).is_none());
}

#[tokio::test(start_paused = true)]
async fn run_registry_accumulates_tagged_actions() {
    let agent = FakeAgent::scripted(vec![
        FakeAgent::done("first done"),
        FakeAgent::done("second done"),
    ]);
    let (h, _) = harness(agent, None);

    let run_id = h.coordinator.accept(request(serde_json::json!({
        "live": false,
        "episodes": [
            {"task": "first"},
            {"task": "second"},
        ],
    })));
    assert_eq!(wait_terminal(&h.registry, &run_id).await, RunStatus::Finished);

    let snapshot = h.registry.get(run_id.as_str()).expect("run snapshot");
    assert_eq!(snapshot.episodes_completed, 2);
    assert_eq!(snapshot.actions.len(), 2);
    assert_eq!(snapshot.actions[0].episode, 0);
    assert_eq!(snapshot.actions[1].episode, 1);
    assert_eq!(snapshot.actions[0].action_index, 0);
}

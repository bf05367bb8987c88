//! Shared harness for the behavioral suite.

use std::sync::Arc;
use std::time::Duration;

use tq_adapters::{FakeRunner, FakeSessionHost};
use tq_core::{Event, FakeClock, Project, Task, TaskId, TaskStatus};
use tq_daemon::{Api, CreateTask, EventBus};
use tq_engine::executor::ExecutorDeps;
use tq_engine::{EngineConfig, Executor, HookHandler, Provisioner, Scheduler, TailManager};
use tq_storage::Store;

pub struct Harness {
    pub api: Api<FakeSessionHost, FakeClock>,
    pub store: Store,
    pub bus: EventBus,
    pub executor: Arc<Executor<FakeSessionHost, FakeClock>>,
    pub scheduler: Scheduler<FakeClock>,
    pub handler: HookHandler<FakeClock>,
    pub host: FakeSessionHost,
    pub runner: FakeRunner,
    pub clock: FakeClock,
    _hooks_dir: tempfile::TempDir,
}

pub async fn harness() -> Harness {
    harness_with_ports(3100, 3199).await
}

pub async fn harness_with_ports(port_min: u16, port_max: u16) -> Harness {
    let hooks_dir = tempfile::tempdir().unwrap();
    let store = Store::open_in_memory().await.unwrap();
    let (bus, worker) = EventBus::new(store.clone(), hooks_dir.path().to_path_buf());
    tokio::spawn(worker.run());

    let clock = FakeClock::new();
    let host = FakeSessionHost::new();
    let runner = FakeRunner::new();
    let provisioner = Provisioner::with_runner(Arc::new(runner.clone()));
    let handler = HookHandler::new(store.clone(), bus.sender(), clock.clone());
    let tails = TailManager::new(
        store.clone(),
        bus.sender(),
        host.clone(),
        handler.clone(),
    );

    let config = EngineConfig {
        port_min,
        port_max,
        ..EngineConfig::default()
    };
    let executor = Arc::new(Executor::new(
        ExecutorDeps {
            store: store.clone(),
            events: bus.sender(),
            sessions: host.clone(),
            provisioner,
            tails,
            clock: clock.clone(),
        },
        config.clone(),
    ));
    let scheduler = Scheduler::new(store.clone(), bus.sender(), clock.clone(), config);

    store
        .upsert_project(&Project::new("personal", "/home/u/personal"))
        .await
        .unwrap();

    Harness {
        api: Api::new(store.clone(), bus.clone(), Arc::clone(&executor), clock.clone()),
        store,
        bus,
        executor,
        scheduler,
        handler,
        host,
        runner,
        clock,
        _hooks_dir: hooks_dir,
    }
}

impl Harness {
    /// Create a `code` task bound to the `personal` project.
    pub async fn create(&self, title: &str) -> Task {
        self.api
            .create_task(CreateTask {
                title: title.to_string(),
                project: "personal".to_string(),
                task_type: "code".to_string(),
                ..CreateTask::default()
            })
            .await
            .unwrap()
    }

    /// Create, queue, and run one executor tick.
    pub async fn start(&self, title: &str) -> Task {
        let task = self.create(title).await;
        self.api.queue(task.id).await.unwrap();
        self.executor.tick().await.unwrap();
        self.store.get_task(task.id).await.unwrap()
    }

    /// Inject a hook line as the agent's hook scripts would.
    pub async fn inject_hook(&self, task_id: TaskId, rest: &str) {
        let line = format!(r#"{{"task_id":{},{rest}}}"#, task_id.as_i64());
        self.handler.apply_line(&line).await.unwrap();
    }

    /// Wait until the durable event log holds `kind` for the task.
    pub async fn wait_for_event(&self, task_id: TaskId, kind: &str) {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            let events = self.store.events_for_task(task_id, 100).await.unwrap();
            if events.iter().any(|e| e.event_type == kind) {
                return;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "timed out waiting for {kind}; have {:?}",
                events.iter().map(|e| e.event_type.clone()).collect::<Vec<_>>()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Count occurrences of an event type for a task in the durable log.
    pub async fn event_count(&self, task_id: TaskId, kind: &str) -> usize {
        self.store
            .events_for_task(task_id, 1000)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.event_type == kind)
            .count()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Fetch the task's current status.
    pub async fn status(&self, task_id: TaskId) -> TaskStatus {
        self.store.get_task(task_id).await.unwrap().status
    }
}

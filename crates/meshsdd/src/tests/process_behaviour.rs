//! Behavioural tests covering daemon process supervision and lifecycle files.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::Value;

use crate::bootstrap::ConfigLoader;
use crate::health::HealthReporter;
use crate::process::LaunchError;
use crate::process::launch::{LaunchPlan, ProcessControl, ServiceDeps, run_daemon_with};
use crate::registry::InMemoryRegistry;
use crate::tests::support::{
    FailingConfigLoader, RecordingEngine, RecordingHealthReporter, TestConfigLoader,
    TestDaemonizer, TestSignalSource,
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

type StepResult = Result<(), String>;

struct ProcessTestWorld {
    loader: TestConfigLoader,
    reporter: Arc<RecordingHealthReporter>,
    daemonizer: TestDaemonizer,
    signals: TestSignalSource,
    handle: Option<thread::JoinHandle<Result<(), LaunchError>>>,
    result: Option<Result<(), LaunchError>>,
    second_start: Option<Result<(), LaunchError>>,
}

impl ProcessTestWorld {
    fn new(loader: TestConfigLoader) -> Self {
        Self {
            loader,
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemonizer: TestDaemonizer::default(),
            signals: TestSignalSource::default(),
            handle: None,
            result: None,
            second_start: None,
        }
    }

    fn plan<L: ConfigLoader>(
        &self,
        loader: L,
        signals: TestSignalSource,
    ) -> LaunchPlan<L, TestDaemonizer, TestSignalSource, RecordingEngine, InMemoryRegistry> {
        LaunchPlan {
            process: ProcessControl {
                daemonizer: self.daemonizer.clone(),
                signals,
            },
            services: ServiceDeps {
                loader,
                reporter: Arc::clone(&self.reporter) as Arc<dyn HealthReporter>,
                engine: RecordingEngine::new(),
                registry: InMemoryRegistry::new(),
            },
        }
    }

    fn start_background(&mut self) -> StepResult {
        if self.handle.is_some() {
            return Err("daemon already running".to_owned());
        }
        let plan = self.plan(self.loader.clone(), self.signals.clone());
        self.handle = Some(thread::spawn(move || run_daemon_with(plan)));
        self.wait_for(|world| {
            world.signals.is_installed()
                && world
                    .read_health()
                    .is_ok_and(|snapshot| snapshot_status(&snapshot) == Some("ready"))
        })
        .map_err(|()| "daemon did not publish a ready health snapshot".to_owned())
    }

    fn run_foreground(&mut self) {
        let plan = self.plan(self.loader.clone(), TestSignalSource::pretriggered());
        self.result = Some(run_daemon_with(plan));
    }

    fn run_with_invalid_config(&mut self) {
        let plan = self.plan(FailingConfigLoader, TestSignalSource::pretriggered());
        self.result = Some(run_daemon_with(plan));
    }

    fn start_again(&mut self) {
        let plan = self.plan(self.loader.clone(), TestSignalSource::pretriggered());
        self.second_start = Some(run_daemon_with(plan));
    }

    fn join_background(&mut self) -> StepResult {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| "daemon not running".to_owned())?;
        let result = handle
            .join()
            .map_err(|_| "daemon thread panicked".to_owned())?;
        self.result = Some(result);
        Ok(())
    }

    fn wait_for(&self, condition: impl Fn(&Self) -> bool) -> Result<(), ()> {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while Instant::now() < deadline {
            if condition(self) {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Err(())
    }

    fn lock_path(&self) -> PathBuf {
        self.loader.runtime_dir().join("meshsdd.lock")
    }

    fn pid_path(&self) -> PathBuf {
        self.loader.runtime_dir().join("meshsdd.pid")
    }

    fn health_path(&self) -> PathBuf {
        self.loader.runtime_dir().join("meshsdd.health")
    }

    fn read_health(&self) -> Result<Value, String> {
        let content = fs::read_to_string(self.health_path()).map_err(|error| error.to_string())?;
        serde_json::from_str(&content).map_err(|error| error.to_string())
    }

    fn write_stale_runtime(&self) -> StepResult {
        fs::write(self.lock_path(), b"").map_err(|error| error.to_string())?;
        fs::write(self.pid_path(), b"0\n").map_err(|error| error.to_string())?;
        Ok(())
    }
}

impl Drop for ProcessTestWorld {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if self.signals.is_installed() {
                self.signals.trigger_quit();
            }
            if let Err(panic) = handle.join()
                && !thread::panicking()
            {
                std::panic::resume_unwind(panic);
            }
        }
    }
}

#[derive(Default)]
struct World {
    inner: Option<ProcessTestWorld>,
}

impl World {
    fn process(&mut self) -> &mut ProcessTestWorld {
        self.inner.get_or_insert_with(|| ProcessTestWorld::new(TestConfigLoader::new()))
    }
}

fn snapshot_status(snapshot: &Value) -> Option<&str> {
    snapshot.get("status").and_then(Value::as_str)
}

#[fixture]
fn world() -> RefCell<World> {
    RefCell::new(World::default())
}

#[given("a fresh daemon process world")]
fn given_world(world: &RefCell<World>) {
    world.borrow_mut().process();
}

#[given("a fresh daemon process world configured for background mode")]
fn given_background_world(world: &RefCell<World>) {
    world.borrow_mut().inner = Some(ProcessTestWorld::new(TestConfigLoader::new().background()));
}

#[given("a fresh daemon process world with a restart interval of \"{interval}\" seconds")]
fn given_world_with_interval(world: &RefCell<World>, interval: String) -> StepResult {
    let secs = interval.parse().map_err(|_| format!("invalid interval '{interval}'"))?;
    world.borrow_mut().inner = Some(ProcessTestWorld::new(
        TestConfigLoader::new().with_restart_interval(secs),
    ));
    Ok(())
}

#[given("stale runtime artefacts exist")]
fn given_stale_runtime(world: &RefCell<World>) -> StepResult {
    world.borrow_mut().process().write_stale_runtime()
}

#[when("the daemon starts")]
fn when_daemon_starts(world: &RefCell<World>) -> StepResult {
    world.borrow_mut().process().start_background()
}

#[when("the daemon runs in the foreground until terminated")]
fn when_daemon_runs_foreground(world: &RefCell<World>) {
    world.borrow_mut().process().run_foreground();
}

#[when("the daemon starts with an invalid configuration")]
fn when_invalid_configuration(world: &RefCell<World>) {
    world.borrow_mut().process().run_with_invalid_config();
}

#[when("termination is requested")]
fn when_termination_requested(world: &RefCell<World>) {
    world.borrow_mut().process().signals.trigger_quit();
}

#[when("a dump is signalled")]
fn when_dump_signalled(world: &RefCell<World>) {
    world.borrow_mut().process().signals.trigger_dump();
}

#[when("the daemon run completes")]
fn when_daemon_completes(world: &RefCell<World>) -> StepResult {
    world.borrow_mut().process().join_background()
}

#[then("daemonisation was requested")]
fn then_daemonisation_requested(world: &RefCell<World>) {
    assert_eq!(world.borrow_mut().process().daemonizer.calls(), 1);
}

#[then("daemonisation was not requested")]
fn then_daemonisation_skipped(world: &RefCell<World>) {
    assert_eq!(world.borrow_mut().process().daemonizer.calls(), 0);
}

#[then("the daemon wrote the lock file")]
fn then_lock_file_exists(world: &RefCell<World>) {
    assert!(
        world.borrow_mut().process().lock_path().exists(),
        "lock file should exist whilst daemon is running"
    );
}

#[then("the daemon wrote the pid file")]
fn then_pid_file_exists(world: &RefCell<World>) {
    let path = world.borrow_mut().process().pid_path();
    let content = fs::read_to_string(&path).expect("pid file should be readable");
    let pid: u32 = content
        .trim()
        .parse()
        .expect("pid file should contain an integer");
    assert_eq!(pid, std::process::id(), "pid file should record current process");
}

#[then("the daemon wrote the ready health snapshot")]
fn then_health_ready(world: &RefCell<World>) {
    let snapshot = world
        .borrow_mut()
        .process()
        .read_health()
        .expect("health snapshot should parse");
    assert_eq!(snapshot_status(&snapshot), Some("ready"));
}

#[then("starting the daemon again fails with already running")]
fn then_duplicate_start_fails(world: &RefCell<World>) {
    let mut world = world.borrow_mut();
    let process = world.process();
    process.start_again();
    match process.second_start.as_ref() {
        Some(Err(LaunchError::AlreadyRunning { pid })) => {
            assert_eq!(*pid, std::process::id(), "pid should match current process");
        }
        other => panic!("unexpected second start result: {other:?}"),
    }
    assert!(process.lock_path().exists(), "first daemon keeps its lock");
}

#[then("the daemon run succeeds")]
fn then_daemon_succeeds(world: &RefCell<World>) {
    let mut world = world.borrow_mut();
    let result = world
        .process()
        .result
        .as_ref()
        .expect("expected a recorded daemon result");
    assert!(result.is_ok(), "daemon run should succeed: {result:?}");
}

#[then("the runtime artefacts are removed")]
fn then_runtime_removed(world: &RefCell<World>) {
    let mut world = world.borrow_mut();
    let process = world.process();
    assert!(!process.lock_path().exists(), "lock file should be removed after shutdown");
    assert!(!process.pid_path().exists(), "pid file should be removed after shutdown");
    assert!(!process.health_path().exists(), "health file should be removed after shutdown");
}

#[then("the snapshot file appears")]
fn then_snapshot_appears(world: &RefCell<World>) -> StepResult {
    let mut world = world.borrow_mut();
    let process = world.process();
    let output = process.loader.output_file();
    process
        .wait_for(|_| output.exists())
        .map_err(|()| format!("snapshot '{}' was not written", output.display()))
}

#[then("the launch fails during bootstrap")]
fn then_bootstrap_fails(world: &RefCell<World>) {
    let mut world = world.borrow_mut();
    let result = world.process().result.as_ref();
    assert!(
        matches!(result, Some(Err(LaunchError::Bootstrap { .. }))),
        "expected a bootstrap failure, got {result:?}"
    );
}

#[then("no lock file was written")]
fn then_no_lock(world: &RefCell<World>) {
    assert!(!world.borrow_mut().process().lock_path().exists());
}

#[scenario(path = "tests/features/daemon_process.feature")]
fn daemon_process(#[from(world)] _: RefCell<World>) -> Result<(), String> {
    Ok(())
}

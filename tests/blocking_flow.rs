//! End-to-end flows over the full stack with scripted platform surfaces:
//! tag scan to activation, interception with cooldown, overlay teardown,
//! and restart recovery.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use appfence::{
    ActivationError, BlockingOrchestrator, BlockingStateStore, Database, MonitorConfig,
    OverlayController, OverlaySurface, PermissionGate, ScanOutcome, SessionTracker, TagToggle,
    UsageEvent, UsageEventSource,
};
use chrono::{DateTime, Utc};
use tempfile::TempDir;

const HOST_PACKAGE: &str = "com.example.appfence";

/// Event source scripted by the test: whatever package is set as current
/// shows up as the latest foreground transition in every queried window.
#[derive(Clone, Default)]
struct ScriptedEvents {
    foreground: Arc<Mutex<Option<String>>>,
}

impl ScriptedEvents {
    fn set_foreground(&self, package: &str) {
        *self.foreground.lock().unwrap() = Some(package.to_string());
    }

    fn clear(&self) {
        *self.foreground.lock().unwrap() = None;
    }
}

impl UsageEventSource for ScriptedEvents {
    fn query_events(&self, _from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<UsageEvent>> {
        Ok(self
            .foreground
            .lock()
            .unwrap()
            .iter()
            .map(|package| UsageEvent::foreground(package, to))
            .collect())
    }
}

struct AllGranted;

impl PermissionGate for AllGranted {
    fn has_usage_access(&self) -> bool {
        true
    }

    fn has_overlay_permission(&self) -> bool {
        true
    }
}

#[derive(Clone, Default)]
struct CountingSurface {
    attaches: Arc<Mutex<Vec<String>>>,
    detaches: Arc<Mutex<u32>>,
}

impl OverlaySurface for CountingSurface {
    fn attach(&mut self, blocked_package: &str) -> Result<()> {
        self.attaches.lock().unwrap().push(blocked_package.to_string());
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        *self.detaches.lock().unwrap() += 1;
        Ok(())
    }
}

struct Stack {
    store: BlockingStateStore,
    orchestrator: BlockingOrchestrator,
    toggle: TagToggle,
    overlay: OverlayController,
    events: ScriptedEvents,
    surface: CountingSurface,
    _dir: TempDir,
}

fn build_stack() -> Stack {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = TempDir::new().unwrap();
    let store = BlockingStateStore::open(dir.path().join("blocking.json")).unwrap();
    let db = Database::new(dir.path().join("appfence.sqlite3")).unwrap();
    let sessions = SessionTracker::new(db);

    let surface = CountingSurface::default();
    let surface_for_factory = surface.clone();
    let overlay =
        OverlayController::new(move || Ok(Box::new(surface_for_factory) as Box<dyn OverlaySurface>))
            .unwrap();

    let events = ScriptedEvents::default();

    // Fast cadence so tests settle in tens of milliseconds.
    let mut config = MonitorConfig::new(HOST_PACKAGE);
    config.poll_interval = Duration::from_millis(10);
    config.block_cooldown = Duration::from_millis(100);

    let orchestrator = BlockingOrchestrator::new(
        store.clone(),
        overlay.clone(),
        Arc::new(events.clone()),
        config,
    );
    let toggle = TagToggle::new(
        store.clone(),
        orchestrator.clone(),
        sessions,
        Arc::new(AllGranted),
    );

    Stack {
        store,
        orchestrator,
        toggle,
        overlay,
        events,
        surface,
        _dir: dir,
    }
}

fn killswitch_tag() -> Vec<u8> {
    let text = b"KillSwitch";
    let mut payload = vec![2u8];
    payload.extend_from_slice(b"en");
    payload.extend_from_slice(text);

    let mut message = vec![0xD1, 0x01, payload.len() as u8, b'T'];
    message.extend_from_slice(&payload);
    message
}

fn apps(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 1s");
}

#[tokio::test]
async fn scan_activates_and_blocked_app_is_intercepted() {
    let stack = build_stack();
    stack
        .store
        .save_blocked_apps(&apps(&["com.example.social"]))
        .unwrap();

    let outcome = stack.toggle.handle_scan(&killswitch_tag()).await.unwrap();
    assert_eq!(outcome, ScanOutcome::Activated { app_count: 1 });
    assert!(stack.orchestrator.is_monitoring().await);

    stack.events.set_foreground("com.example.social");
    wait_until(|| stack.overlay.is_showing()).await;
    assert_eq!(
        *stack.surface.attaches.lock().unwrap(),
        vec!["com.example.social".to_string()]
    );
}

#[tokio::test]
async fn cooldown_keeps_overlay_from_reattaching() {
    let stack = build_stack();
    stack
        .store
        .save_blocked_apps(&apps(&["com.example.social"]))
        .unwrap();
    stack
        .orchestrator
        .start_blocking(&apps(&["com.example.social"]))
        .await
        .unwrap();

    stack.events.set_foreground("com.example.social");
    wait_until(|| stack.overlay.is_showing()).await;

    // Many more poll cycles pass while the same app stays in front.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(stack.surface.attaches.lock().unwrap().len(), 1);

    stack.orchestrator.stop_blocking().await.unwrap();
}

#[tokio::test]
async fn leaving_the_blocked_app_dismisses_the_overlay() {
    let stack = build_stack();
    stack
        .store
        .save_blocked_apps(&apps(&["com.example.social"]))
        .unwrap();
    stack
        .orchestrator
        .start_blocking(&apps(&["com.example.social"]))
        .await
        .unwrap();

    stack.events.set_foreground("com.example.social");
    wait_until(|| stack.overlay.is_showing()).await;

    stack.events.set_foreground("com.example.notes");
    wait_until(|| !stack.overlay.is_showing()).await;
    assert!(*stack.surface.detaches.lock().unwrap() >= 1);

    // Returning to the blocked app intercepts again immediately; the
    // cooldown was cleared on exit.
    stack.events.set_foreground("com.example.social");
    wait_until(|| stack.overlay.is_showing()).await;
    assert_eq!(stack.surface.attaches.lock().unwrap().len(), 2);

    stack.orchestrator.stop_blocking().await.unwrap();
}

#[tokio::test]
async fn host_package_is_never_intercepted() {
    let stack = build_stack();
    let blocked: BTreeSet<String> = apps(&[HOST_PACKAGE, "com.example.social"]);
    stack.store.save_blocked_apps(&blocked).unwrap();
    stack.orchestrator.start_blocking(&blocked).await.unwrap();

    stack.events.set_foreground(HOST_PACKAGE);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!stack.overlay.is_showing());

    stack.orchestrator.stop_blocking().await.unwrap();
}

#[tokio::test]
async fn empty_set_is_rejected_without_touching_state() {
    let stack = build_stack();
    let err = stack
        .orchestrator
        .start_blocking(&BTreeSet::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ActivationError::NoAppsToBlock));
    assert!(!stack.store.is_blocking_active());
    assert!(!stack.orchestrator.is_monitoring().await);
}

#[tokio::test]
async fn double_start_replaces_the_loop_and_stop_is_idempotent() {
    let stack = build_stack();
    let blocked = apps(&["com.example.social"]);

    stack.orchestrator.start_blocking(&blocked).await.unwrap();
    stack.orchestrator.start_blocking(&blocked).await.unwrap();
    assert!(stack.orchestrator.is_monitoring().await);

    stack.orchestrator.stop_blocking().await.unwrap();
    stack.orchestrator.stop_blocking().await.unwrap();
    wait_until(|| !stack.store.is_blocking_active()).await;
    assert!(!stack.orchestrator.is_monitoring().await);
}

#[tokio::test]
async fn deactivation_stops_the_loop_and_clears_the_overlay() {
    let stack = build_stack();
    stack
        .store
        .save_blocked_apps(&apps(&["com.example.social"]))
        .unwrap();

    stack.toggle.handle_scan(&killswitch_tag()).await.unwrap();
    stack.events.set_foreground("com.example.social");
    wait_until(|| stack.overlay.is_showing()).await;

    let outcome = stack.toggle.handle_scan(&killswitch_tag()).await.unwrap();
    assert_eq!(outcome, ScanOutcome::Deactivated);

    wait_until(|| !stack.overlay.is_showing()).await;
    stack.events.clear();
    assert!(!stack.orchestrator.is_monitoring().await);
}

#[tokio::test]
async fn restart_resumes_enforcement_from_persisted_state() {
    let stack = build_stack();
    stack
        .store
        .save_blocked_apps(&apps(&["com.example.social"]))
        .unwrap();
    stack.store.set_blocking_active(true).unwrap();

    stack.orchestrator.handle_restart().await.unwrap();
    assert!(stack.orchestrator.is_monitoring().await);

    stack.events.set_foreground("com.example.social");
    wait_until(|| stack.overlay.is_showing()).await;

    stack.orchestrator.stop_blocking().await.unwrap();
}

#[tokio::test]
async fn restart_while_inactive_does_nothing() {
    let stack = build_stack();
    stack.orchestrator.handle_restart().await.unwrap();
    assert!(!stack.orchestrator.is_monitoring().await);
}

//! Log output of the failure paths, captured with a scoped subscriber.

use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use tabsync::{BindOptions, Capability, ComponentScope, ManualScheduler, MemoryHub, SyncEnv, bind};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn text(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut bytes) = self.0.lock() {
            bytes.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn captured(f: impl FnOnce()) -> String {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .without_time()
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    capture.text()
}

fn lines_at<'a>(log: &'a str, level: &str) -> Vec<&'a str> {
    log.lines().filter(|l| l.contains(level)).collect()
}

#[test]
fn local_only_logs_one_error() {
    let log = captured(|| {
        let env = SyncEnv::new(
            Capability::local_only("BroadcastChannel is not defined"),
            Rc::new(ManualScheduler::new()),
        );
        let scope = ComponentScope::new();
        let b = bind(&env, &scope, "t", 0u8, BindOptions::default()).unwrap();
        scope.attach();
        b.value.set(1);
        b.value.set(2);
        scope.detach();
    });

    let errors = lines_at(&log, "ERROR");
    assert_eq!(errors.len(), 1, "{log}");
    assert!(errors[0].contains("value is local only"));
    assert!(errors[0].contains("BroadcastChannel is not defined"));
}

#[test]
fn failed_publish_logs_warning_with_topic() {
    let hub = MemoryHub::new();
    let log = captured(|| {
        let env = SyncEnv::new(Capability::transport(hub.clone()), Rc::new(ManualScheduler::new()));
        let scope = ComponentScope::new();
        let b = bind(&env, &scope, "cart", 0u8, BindOptions::default()).unwrap();
        scope.attach();
        hub.fail_sends_after("cart", 1, 1);
        b.value.set(1);
    });

    let warnings = lines_at(&log, "WARN");
    assert_eq!(warnings.len(), 1, "{log}");
    assert!(warnings[0].contains("publish failed; reopening channel"));
    assert!(warnings[0].contains("topic=cart"));
    assert!(log.contains("channel reopened"));
}

#[test]
fn clamped_interval_is_reported() {
    let log = captured(|| {
        let env = SyncEnv::new(
            Capability::transport(MemoryHub::new()),
            Rc::new(ManualScheduler::new()),
        );
        let scope = ComponentScope::new();
        let _b = bind(
            &env,
            &scope,
            "t",
            0u8,
            BindOptions::new().with_health_check_interval_ms(3),
        )
        .unwrap();
    });

    let warnings = lines_at(&log, "WARN");
    assert_eq!(warnings.len(), 1, "{log}");
    assert!(warnings[0].contains("health-check interval raised to minimum"));
}

#[test]
fn undecodable_message_logs_error() {
    let hub = MemoryHub::new();
    let log = captured(|| {
        let env = SyncEnv::new(Capability::transport(hub.clone()), Rc::new(ManualScheduler::new()));
        let scope = ComponentScope::new();
        let _b = bind(&env, &scope, "t", 0u8, BindOptions::default()).unwrap();
        scope.attach();
        hub.inject_frame("t", "{");
        hub.dispatch();
    });

    let errors = lines_at(&log, "ERROR");
    assert_eq!(errors.len(), 1, "{log}");
    assert!(errors[0].contains("inbound delivery failed"));
    assert!(errors[0].contains("undecodable message"));
}

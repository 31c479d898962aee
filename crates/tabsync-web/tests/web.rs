#![cfg(target_arch = "wasm32")]

use js_sys::{Function, Promise};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tabsync::{
    BindOptions, Channel, ComponentScope, ListenerKind, Scheduler, Transport, TransportErrorKind,
    bind,
};
use tabsync_web::{BroadcastTransport, IntervalScheduler, SyncedJson, browser_env, detect_capability};
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

/// Resolve after `ms` milliseconds, letting queued events run.
async fn sleep(ms: i32) {
    let promise = Promise::new(&mut |resolve: Function, _reject: Function| {
        let _ = web_sys::window()
            .expect("window")
            .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms);
    });
    let _ = JsFuture::from(promise).await;
}

#[wasm_bindgen_test]
fn capability_is_detected() {
    assert!(!detect_capability().is_local_only());
    assert!(!browser_env().capability().is_local_only());
}

#[wasm_bindgen_test]
fn closed_channel_rejects_sends() {
    let channel = BroadcastTransport::new().open("tabsync-web-closed").unwrap();
    assert!(channel.send("{}").is_ok());
    channel.close();
    assert_eq!(
        channel.send("{}").unwrap_err().kind,
        TransportErrorKind::Closed
    );
}

#[wasm_bindgen_test]
async fn frames_reach_other_channels_only() {
    let transport = BroadcastTransport::new();
    let a = transport.open("tabsync-web-pair").unwrap();
    let b = transport.open("tabsync-web-pair").unwrap();
    let (a_log, b_log) = (Rc::new(RefCell::new(Vec::new())), Rc::new(RefCell::new(Vec::new())));
    {
        let log = Rc::clone(&a_log);
        a.add_listener(ListenerKind::Message, Rc::new(move |f: &str| log.borrow_mut().push(f.to_owned())));
        let log = Rc::clone(&b_log);
        b.add_listener(ListenerKind::Message, Rc::new(move |f: &str| log.borrow_mut().push(f.to_owned())));
    }

    a.send("hello").unwrap();
    sleep(50).await;

    assert_eq!(*b_log.borrow(), vec!["hello".to_string()]);
    assert!(a_log.borrow().is_empty());
    a.close();
    b.close();
}

#[wasm_bindgen_test]
async fn bindings_sync_through_broadcast_channel() {
    let env = browser_env();
    let (tab_a, tab_b) = (ComponentScope::new(), ComponentScope::new());
    let a = bind(&env, &tab_a, "tabsync-web-bind", 0u32, BindOptions::default()).unwrap();
    let b = bind(&env, &tab_b, "tabsync-web-bind", 0u32, BindOptions::default()).unwrap();
    tab_a.attach();
    tab_b.attach();

    a.value.set(5);
    sleep(50).await;
    assert_eq!(b.value.get(), 5);
    assert_eq!(a.value.version(), 1);

    tab_b.detach();
    a.value.set(6);
    sleep(50).await;
    assert_eq!(b.value.get(), 5);
    tab_a.detach();
}

#[wasm_bindgen_test]
async fn interval_fires_until_cleared() {
    let scheduler = IntervalScheduler::new();
    let ticks = Rc::new(RefCell::new(0u32));
    let t = Rc::clone(&ticks);
    let id = scheduler.set_interval(Duration::from_millis(10), Rc::new(move || *t.borrow_mut() += 1));
    assert_eq!(scheduler.armed(), 1);

    sleep(60).await;
    scheduler.clear_interval(id);
    let seen = *ticks.borrow();
    assert!(seen >= 1);
    assert_eq!(scheduler.armed(), 0);

    sleep(40).await;
    assert_eq!(*ticks.borrow(), seen);
}

#[wasm_bindgen_test]
async fn synced_json_round_trip() {
    let a = SyncedJson::new("tabsync-web-json", "{\"n\":0}", Some(0)).unwrap();
    let b = SyncedJson::new("tabsync-web-json", "{\"n\":0}", Some(0)).unwrap();
    a.attach();
    b.attach();
    assert!(!a.is_local_only());

    a.set("{\"n\":3}").unwrap();
    sleep(50).await;
    assert_eq!(b.get().unwrap(), "{\"n\":3}");
    assert!(a.set("not json").is_err());

    let lines = a.drain_transitions_jsonl("web-test").unwrap();
    assert_eq!(lines.length(), 1);
}

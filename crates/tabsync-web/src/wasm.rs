#![forbid(unsafe_code)]

use crate::broadcast::browser_env;
use js_sys::{Array, Function};
use serde_json::Value;
use std::time::Duration;
use tabsync::reactive::Subscription;
use tabsync::{BindOptions, Binding, ComponentScope, bind};
use wasm_bindgen::prelude::*;

/// A JSON value shared with every other context that binds the same topic.
///
/// JS owns the lifecycle: call `attach()` when the owning view mounts and
/// `detach()` when it unmounts.
#[wasm_bindgen]
pub struct SyncedJson {
    scope: ComponentScope,
    binding: Binding<Value>,
    subscriptions: Vec<Subscription>,
}

fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[wasm_bindgen]
impl SyncedJson {
    /// `initial` is JSON text. `healthCheckIntervalMs` defaults to 1000; 0
    /// disables the recurring check.
    #[wasm_bindgen(constructor)]
    pub fn new(
        topic: &str,
        initial: &str,
        health_check_interval_ms: Option<u32>,
    ) -> Result<SyncedJson, JsValue> {
        let initial: Value = serde_json::from_str(initial).map_err(to_js_error)?;
        let mut options = BindOptions::new();
        if let Some(ms) = health_check_interval_ms {
            options = options.with_health_check_interval(Duration::from_millis(u64::from(ms)));
        }
        let scope = ComponentScope::new();
        let binding = bind(&browser_env(), &scope, topic, initial, options).map_err(to_js_error)?;
        Ok(Self {
            scope,
            binding,
            subscriptions: Vec::new(),
        })
    }

    pub fn attach(&self) -> bool {
        self.scope.attach()
    }

    pub fn detach(&self) -> bool {
        self.scope.detach()
    }

    /// Current value as JSON text.
    pub fn get(&self) -> Result<String, JsValue> {
        self.binding
            .value
            .with(serde_json::to_string)
            .map_err(to_js_error)
    }

    /// Replace the value with parsed JSON text and publish it.
    pub fn set(&self, json: &str) -> Result<(), JsValue> {
        let value: Value = serde_json::from_str(json).map_err(to_js_error)?;
        self.binding.value.set(value);
        Ok(())
    }

    /// Call `callback(json)` after every applied write, local or remote.
    #[wasm_bindgen(js_name = onChange)]
    pub fn on_change(&mut self, callback: Function) {
        let value = self.binding.value.clone();
        let subscription = self.binding.value.subscribe(move || {
            if let Ok(json) = serde_json::to_string(&value.peek()) {
                let _ = callback.call1(&JsValue::NULL, &JsValue::from_str(&json));
            }
        });
        self.subscriptions.push(subscription);
    }

    pub fn topic(&self) -> String {
        self.binding.channel.topic().to_string()
    }

    #[wasm_bindgen(js_name = isLocalOnly)]
    pub fn is_local_only(&self) -> bool {
        self.binding.channel.is_local_only()
    }

    #[wasm_bindgen(js_name = isOpen)]
    pub fn is_open(&self) -> bool {
        self.binding.channel.is_open()
    }

    pub fn generation(&self) -> f64 {
        self.binding.channel.generation() as f64
    }

    pub fn version(&self) -> f64 {
        self.binding.value.version() as f64
    }

    /// Counters as a plain object.
    pub fn stats(&self) -> Result<JsValue, JsValue> {
        let json = serde_json::to_string(&self.binding.channel.stats()).map_err(to_js_error)?;
        js_sys::JSON::parse(&json)
    }

    /// Recorded channel transitions as JSONL strings, oldest first.
    #[wasm_bindgen(js_name = drainTransitionsJsonl)]
    pub fn drain_transitions_jsonl(&self, run_id: &str) -> Result<Array, JsValue> {
        if run_id.is_empty() {
            return Err(JsValue::from_str("run_id must not be empty"));
        }
        let out = Array::new();
        for line in self.binding.channel.drain_transition_jsonl(run_id) {
            out.push(&JsValue::from_str(&line));
        }
        Ok(out)
    }
}

impl Drop for SyncedJson {
    fn drop(&mut self) {
        self.subscriptions.clear();
        let _ = self.scope.detach();
    }
}

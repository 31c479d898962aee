#![forbid(unsafe_code)]

//! `setInterval` scheduler.

use crate::broadcast::js_error_text;
use crate::convert::interval_delay_ms;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tabsync::{Scheduler, TimerId};
use tracing::error;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Window, WorkerGlobalScope};

enum Scope {
    Window(Window),
    Worker(WorkerGlobalScope),
}

impl Scope {
    fn current() -> Option<Self> {
        let global = js_sys::global();
        if let Some(window) = global.dyn_ref::<Window>() {
            return Some(Self::Window(window.clone()));
        }
        global
            .dyn_into::<WorkerGlobalScope>()
            .ok()
            .map(Self::Worker)
    }

    fn set_interval(&self, callback: &js_sys::Function, delay_ms: i32) -> Result<i32, JsValue> {
        match self {
            Self::Window(w) => w.set_interval_with_callback_and_timeout_and_arguments_0(callback, delay_ms),
            Self::Worker(w) => w.set_interval_with_callback_and_timeout_and_arguments_0(callback, delay_ms),
        }
    }

    fn clear_interval(&self, handle: i32) {
        match self {
            Self::Window(w) => w.clear_interval_with_handle(handle),
            Self::Worker(w) => w.clear_interval_with_handle(handle),
        }
    }
}

struct Armed {
    handle: i32,
    _callback: Closure<dyn FnMut()>,
}

/// Intervals on the window or worker global scope.
///
/// Each interval keeps its JS callback alive until cleared.
pub struct IntervalScheduler {
    scope: Option<Scope>,
    next_id: Cell<u64>,
    armed: RefCell<HashMap<u64, Armed>>,
}

impl Default for IntervalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IntervalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalScheduler")
            .field("has_scope", &self.scope.is_some())
            .field("armed", &self.armed.borrow().len())
            .finish()
    }
}

impl IntervalScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scope: Scope::current(),
            next_id: Cell::new(0),
            armed: RefCell::new(HashMap::new()),
        }
    }

    /// Intervals currently running.
    #[must_use]
    pub fn armed(&self) -> usize {
        self.armed.borrow().len()
    }
}

impl Scheduler for IntervalScheduler {
    fn set_interval(&self, period: Duration, callback: Rc<dyn Fn()>) -> TimerId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let Some(scope) = &self.scope else {
            error!("no window or worker scope; interval not scheduled");
            return TimerId(id);
        };
        let closure = Closure::<dyn FnMut()>::new(move || callback());
        match scope.set_interval(closure.as_ref().unchecked_ref(), interval_delay_ms(period)) {
            Ok(handle) => {
                self.armed.borrow_mut().insert(
                    id,
                    Armed {
                        handle,
                        _callback: closure,
                    },
                );
            }
            Err(err) => {
                error!(error = %js_error_text(&err), "setInterval failed; interval not scheduled");
            }
        }
        TimerId(id)
    }

    fn clear_interval(&self, id: TimerId) {
        let armed = self.armed.borrow_mut().remove(&id.0);
        if let (Some(armed), Some(scope)) = (armed, &self.scope) {
            scope.clear_interval(armed.handle);
        }
    }

    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        if let Some(scope) = &self.scope {
            for armed in self.armed.borrow().values() {
                scope.clear_interval(armed.handle);
            }
        }
    }
}

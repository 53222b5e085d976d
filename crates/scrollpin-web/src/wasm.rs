#![forbid(unsafe_code)]

//! `wasm-bindgen` exports and the `web-sys` host.
//!
//! Only compiled on `wasm32` targets.

use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use js_sys::{Array, Function, Object, Reflect};
use scrollpin::handle::WeakFollowerHandle;
use scrollpin::{
    FollowConfig, FollowerHandle, ScrollHost, ScrollMetrics, ScrollOutcome, ScrollTarget, Trigger,
};
use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, Event, HtmlElement, MutationObserver, MutationObserverInit, Window};

use crate::binding_core::{InstallError, defer_until_ready, outcome_label, parse_config, stats_fields};

thread_local! {
    static DEFAULT_BINDING: RefCell<Option<Rc<Binding>>> = const { RefCell::new(None) };
}

fn console_error(msg: &str) {
    let global = js_sys::global();
    let Ok(console) = Reflect::get(&global, &"console".into()) else {
        return;
    };
    let Ok(error) = Reflect::get(&console, &"error".into()) else {
        return;
    };
    let Ok(error_fn) = error.dyn_into::<Function>() else {
        return;
    };
    let _ = error_fn.call1(&console, &JsValue::from_str(msg));
}

fn install_panic_hook() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = if let Some(loc) = info.location() {
                format!(
                    "panic at {}:{}:{}: {info}",
                    loc.file(),
                    loc.line(),
                    loc.column()
                )
            } else {
                format!("panic: {info}")
            };
            console_error(&msg);
        }));
    });
}

fn set_js(obj: &Object, key: &str, value: JsValue) {
    let _ = Reflect::set(obj, &JsValue::from_str(key), &value);
}

fn js_error(err: &InstallError) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

fn outcome_object(outcome: Option<ScrollOutcome>) -> JsValue {
    let obj = Object::new();
    match outcome {
        Some(outcome) => {
            set_js(&obj, "outcome", JsValue::from_str(outcome_label(outcome)));
            let offset = outcome.offset().map_or(JsValue::NULL, JsValue::from_f64);
            set_js(&obj, "offset", offset);
        }
        None => {
            set_js(&obj, "outcome", JsValue::from_str("busy"));
            set_js(&obj, "offset", JsValue::NULL);
        }
    }
    obj.into()
}

// ---------------------------------------------------------------------------
// web-sys host
// ---------------------------------------------------------------------------

/// The resolved `#chatlist` element.
#[derive(Clone)]
pub(crate) struct WebContainer(Element);

impl ScrollTarget for WebContainer {
    fn metrics(&self) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top: f64::from(self.0.scroll_top()),
            scroll_height: f64::from(self.0.scroll_height()),
            client_height: f64::from(self.0.client_height()),
        }
    }

    fn set_scroll_top(&self, offset: f64) {
        // Reflection keeps us independent of the web-sys numeric type for
        // `scrollTop`; the browser clamps the value.
        let _ = Reflect::set(
            self.0.as_ref(),
            &JsValue::from_str("scrollTop"),
            &JsValue::from_f64(offset),
        );
    }

    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }

    fn same_node(&self, other: &Self) -> bool {
        let other: &web_sys::Node = &other.0;
        self.0.is_same_node(Some(other))
    }
}

/// Document lookups plus the single `MutationObserver` used for watching.
pub(crate) struct WebDocument {
    document: Document,
    observer: MutationObserver,
}

impl ScrollHost for WebDocument {
    type Target = WebContainer;

    fn resolve(&self, id: &str) -> Option<WebContainer> {
        self.document.get_element_by_id(id).map(WebContainer)
    }

    fn watch(&mut self, target: &WebContainer, subtree: bool) {
        self.observer.disconnect();
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(subtree);
        if let Err(err) = self.observer.observe_with_options(&target.0, &init) {
            warn!(?err, "MutationObserver.observe failed");
        }
    }

    fn unwatch(&mut self) {
        self.observer.disconnect();
    }
}

// ---------------------------------------------------------------------------
// Binding: closures and registrations owned by one installation
// ---------------------------------------------------------------------------

type EventClosure = Closure<dyn FnMut(Event)>;

struct BodyListeners {
    body: HtmlElement,
    closures: Vec<(String, EventClosure)>,
}

impl BodyListeners {
    fn connect(document: &Document, handle: &FollowerHandle<WebDocument>) -> Option<Self> {
        let body = document.body()?;
        let names = handle.with(|f| f.config().event_names().map(str::to_owned))?;
        let closures = names
            .into_iter()
            .map(|name| {
                let weak = handle.downgrade();
                let event_name = name.clone();
                let closure = Closure::wrap(Box::new(move |_event: Event| {
                    if let Some(handle) = weak.upgrade() {
                        handle.dispatch_event(&event_name);
                    }
                }) as Box<dyn FnMut(Event)>);
                if let Err(err) =
                    body.add_event_listener_with_callback(&name, closure.as_ref().unchecked_ref())
                {
                    warn!(event = %name, ?err, "failed to add body listener");
                }
                (name, closure)
            })
            .collect();
        debug!("body listeners registered");
        Some(Self { body, closures })
    }

    fn disconnect(&self) {
        for (name, closure) in &self.closures {
            let _ = self
                .body
                .remove_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
        }
    }
}

/// `window[name]` pointing at our scroll callable.
///
/// The function is owned by the JS garbage collector, so references page
/// script saved before teardown stay callable. Once the follower is gone
/// they do nothing.
struct GlobalExport {
    name: String,
    callback: Function,
}

impl GlobalExport {
    fn publish(window: &Window, name: &str, handle: &FollowerHandle<WebDocument>) -> Self {
        let weak = handle.downgrade();
        let callback: Function = Closure::wrap(Box::new(move || {
            if let Some(handle) = weak.upgrade() {
                handle.scroll_to_bottom();
            }
        }) as Box<dyn FnMut()>)
        .into_js_value()
        .unchecked_into();
        if let Err(err) = Reflect::set(window.as_ref(), &JsValue::from_str(name), &callback) {
            warn!(global = name, ?err, "failed to publish global");
        }
        Self {
            name: name.to_owned(),
            callback,
        }
    }

    /// Remove the property, unless someone else replaced it meanwhile.
    fn retract(&self, window: &Window) {
        let key = JsValue::from_str(&self.name);
        let current = Reflect::get(window.as_ref(), &key).unwrap_or(JsValue::UNDEFINED);
        if &current == self.callback.as_ref() {
            let _ = Reflect::delete_property(window.unchecked_ref::<Object>(), &key);
        }
    }
}

#[derive(Default)]
struct Registrations {
    ready: Option<EventClosure>,
    body: Option<BodyListeners>,
    global: Option<GlobalExport>,
}

struct Binding {
    handle: FollowerHandle<WebDocument>,
    window: Window,
    document: Document,
    // Kept alive for the observer's lifetime.
    _observer_callback: Closure<dyn FnMut(Array, MutationObserver)>,
    registrations: Rc<RefCell<Registrations>>,
}

impl Binding {
    fn install(config: FollowConfig) -> Result<Rc<Self>, InstallError> {
        let window = web_sys::window().ok_or(InstallError::NoWindow)?;
        let document = window.document().ok_or(InstallError::NoDocument)?;

        // The observer needs its callback before the follower (which owns the
        // observer) exists; the slot is filled right after.
        let slot: Rc<OnceCell<WeakFollowerHandle<WebDocument>>> = Rc::new(OnceCell::new());
        let observer_slot = Rc::clone(&slot);
        let observer_callback = Closure::wrap(Box::new(
            move |_records: Array, _observer: MutationObserver| {
                if let Some(handle) = observer_slot.get().and_then(WeakFollowerHandle::upgrade) {
                    handle.trigger(Trigger::Mutation);
                }
            },
        ) as Box<dyn FnMut(Array, MutationObserver)>);
        let observer = MutationObserver::new(observer_callback.as_ref().unchecked_ref())
            .map_err(|err| InstallError::Observer(format!("{err:?}")))?;

        let global_name = config.global_name.clone();
        let host = WebDocument {
            document: document.clone(),
            observer,
        };
        let handle = FollowerHandle::from_parts(config, host);
        let _ = slot.set(handle.downgrade());

        let registrations = Rc::new(RefCell::new(Registrations::default()));
        if let Some(name) = global_name {
            registrations.borrow_mut().global =
                Some(GlobalExport::publish(&window, &name, &handle));
        }

        let binding = Rc::new(Self {
            handle,
            window,
            document,
            _observer_callback: observer_callback,
            registrations,
        });

        let ready_state = Reflect::get(binding.document.as_ref(), &"readyState".into())
            .ok()
            .and_then(|v| v.as_string())
            .unwrap_or_default();
        if defer_until_ready(&ready_state) {
            binding.defer_ready();
        } else {
            Self::on_ready(&binding.document, &binding.handle, &binding.registrations);
        }
        Ok(binding)
    }

    fn defer_ready(&self) {
        let weak = self.handle.downgrade();
        let document = self.document.clone();
        let registrations = Rc::downgrade(&self.registrations);
        let closure = Closure::wrap(Box::new(move |_event: Event| {
            let (Some(handle), Some(registrations)) = (weak.upgrade(), registrations.upgrade())
            else {
                return;
            };
            Self::on_ready(&document, &handle, &registrations);
        }) as Box<dyn FnMut(Event)>);
        if let Err(err) = self
            .document
            .add_event_listener_with_callback("DOMContentLoaded", closure.as_ref().unchecked_ref())
        {
            warn!(?err, "failed to add DOMContentLoaded listener");
        }
        self.registrations.borrow_mut().ready = Some(closure);
        debug!("waiting for DOMContentLoaded");
    }

    fn on_ready(
        document: &Document,
        handle: &FollowerHandle<WebDocument>,
        registrations: &RefCell<Registrations>,
    ) {
        {
            let mut regs = registrations.borrow_mut();
            if regs.body.is_none() {
                regs.body = BodyListeners::connect(document, handle);
            }
        }
        handle.attach();
    }

    fn teardown(&self) {
        let mut regs = self.registrations.borrow_mut();
        if let Some(ready) = regs.ready.as_ref() {
            let _ = self.document.remove_event_listener_with_callback(
                "DOMContentLoaded",
                ready.as_ref().unchecked_ref(),
            );
        }
        if let Some(body) = regs.body.take() {
            body.disconnect();
        }
        if let Some(global) = regs.global.take() {
            global.retract(&self.window);
        }
        self.handle.detach();
        debug!("binding torn down");
    }
}

fn replace_default(binding: Option<Rc<Binding>>) {
    let previous = DEFAULT_BINDING.with(|cell| std::mem::replace(&mut *cell.borrow_mut(), binding));
    if let Some(previous) = previous {
        previous.teardown();
    }
}

fn install_default(config: FollowConfig) -> Result<Rc<Binding>, InstallError> {
    // Tear the old one down first so it releases the global name.
    replace_default(None);
    let binding = Binding::install(config)?;
    DEFAULT_BINDING.with(|cell| *cell.borrow_mut() = Some(Rc::clone(&binding)));
    Ok(binding)
}

// ---------------------------------------------------------------------------
// JS surface
// ---------------------------------------------------------------------------

/// Module entry point: install with the default config.
#[wasm_bindgen(start)]
pub fn start() {
    install_panic_hook();
    if let Err(err) = install_default(FollowConfig::default()) {
        console_error(&format!("scrollpin: {err}"));
    }
}

/// Replace the current installation with one built from a JSON config.
///
/// An empty string means the default config.
#[wasm_bindgen(js_name = installWithConfig)]
pub fn install_with_config(json: &str) -> Result<AutoScroll, JsValue> {
    let config = parse_config(json).map_err(|e| js_error(&e))?;
    let binding = install_default(config).map_err(|e| js_error(&e))?;
    Ok(AutoScroll { binding })
}

/// Handle to the current installation, if any.
#[wasm_bindgen(js_name = currentAutoScroll)]
pub fn current_auto_scroll() -> Option<AutoScroll> {
    DEFAULT_BINDING.with(|cell| {
        cell.borrow()
            .as_ref()
            .map(|binding| AutoScroll {
                binding: Rc::clone(binding),
            })
    })
}

/// Remove every listener, the observer and the global export.
#[wasm_bindgen]
pub fn uninstall() {
    replace_default(None);
}

/// Explicit handle to one installation.
#[wasm_bindgen]
pub struct AutoScroll {
    binding: Rc<Binding>,
}

#[wasm_bindgen]
impl AutoScroll {
    /// Pin the container now. Returns `{ outcome, offset }`.
    #[wasm_bindgen(js_name = scrollToBottom)]
    pub fn scroll_to_bottom(&self) -> JsValue {
        outcome_object(self.binding.handle.scroll_to_bottom())
    }

    /// Counters since installation.
    pub fn stats(&self) -> JsValue {
        let obj = Object::new();
        let Some(stats) = self.binding.handle.stats() else {
            return obj.into();
        };
        for (key, value) in stats_fields(&stats, self.binding.handle.reentrant_skips()) {
            set_js(&obj, key, JsValue::from_f64(value));
        }
        obj.into()
    }

    /// Whether the ready pass ran and the installation is live.
    #[wasm_bindgen(js_name = isAttached)]
    pub fn is_attached(&self) -> bool {
        self.binding
            .handle
            .with(scrollpin::ScrollFollower::is_attached)
            .unwrap_or(false)
    }

    /// Whether a `MutationObserver` currently watches the container.
    #[wasm_bindgen(js_name = isWatching)]
    pub fn is_watching(&self) -> bool {
        self.binding
            .handle
            .with(scrollpin::ScrollFollower::is_watching)
            .unwrap_or(false)
    }

    /// Tear this installation down. Also clears it as the current one.
    pub fn detach(&self) {
        let is_default = DEFAULT_BINDING.with(|cell| {
            cell.borrow()
                .as_ref()
                .is_some_and(|b| Rc::ptr_eq(b, &self.binding))
        });
        if is_default {
            replace_default(None);
        } else {
            self.binding.teardown();
        }
    }
}

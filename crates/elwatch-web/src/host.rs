#![forbid(unsafe_code)]

//! [`TreeHost`] and [`SubtreeWatch`] over the browser DOM.
//!
//! Queries go straight to `Element.matches`, `querySelectorAll` and
//! `querySelector`. Change notification is a `MutationObserver` watching
//! `childList` over the whole subtree, so batches arrive on the browser's
//! microtask checkpoint.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | Selector rejected by the browser | `WebError::Js` with the `SyntaxError` message |
//! | Handler returns an error (bad selector, throwing callback) | Rest of the batch skipped; logged at `error` and reported with `console.error`; the observer stays connected |
//! | Detach from inside the observer callback | `disconnect()` now, closure released on the next microtask |

use std::cell::RefCell;

use elwatch_core::{MutationHandler, MutationRecord, SubtreeWatch, TreeHost, WatchRegistration};
use js_sys::{Array, Function, Reflect};
use tracing::{debug, error};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, MutationObserver, MutationObserverInit, Node, NodeList};

use crate::error::WebError;

type ObserverCallback = Closure<dyn FnMut(Array, MutationObserver)>;

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

/// Browser document as an `elwatch` host.
#[derive(Debug, Clone)]
pub struct WebHost {
    document: Document,
}

impl WebHost {
    #[must_use]
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    /// Host over `window.document`.
    pub fn from_window() -> Result<Self, WebError> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or(WebError::NoDocument)?;
        Ok(Self::new(document))
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }
}

fn elements(list: &NodeList) -> Vec<Element> {
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

fn convert(record: &web_sys::MutationRecord) -> Option<MutationRecord<Node>> {
    let target = record.target()?;
    let nodes = |list: NodeList| (0..list.length()).filter_map(|i| list.item(i)).collect();
    Some(MutationRecord {
        target,
        added_nodes: nodes(record.added_nodes()),
        removed_nodes: nodes(record.removed_nodes()),
    })
}

impl TreeHost for WebHost {
    type Node = Node;
    type Element = Element;
    type Error = WebError;

    fn default_root(&self) -> Result<Element, WebError> {
        match self.document.body() {
            Some(body) => Ok(body.into()),
            None => self.document.document_element().ok_or(WebError::NoRoot),
        }
    }

    fn as_element(&self, node: &Node) -> Option<Element> {
        node.dyn_ref::<Element>().cloned()
    }

    fn matches(&self, element: &Element, selector: &str) -> Result<bool, WebError> {
        Ok(element.matches(selector)?)
    }

    fn query_all(&self, root: &Element, selector: &str) -> Result<Vec<Element>, WebError> {
        Ok(elements(&root.query_selector_all(selector)?))
    }

    fn query_first(&self, root: &Element, selector: &str) -> Result<Option<Element>, WebError> {
        Ok(root.query_selector(selector)?)
    }
}

/// A connected `MutationObserver` and the closure backing its callback.
pub struct WebRegistration {
    observer: MutationObserver,
    callback: RefCell<Option<ObserverCallback>>,
}

impl std::fmt::Debug for WebRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRegistration")
            .field("connected", &self.callback.borrow().is_some())
            .finish()
    }
}

impl WatchRegistration for WebRegistration {
    fn detach(&self) {
        let Some(callback) = self.callback.borrow_mut().take() else {
            return;
        };
        self.observer.disconnect();
        debug!("mutation observer disconnected");
        // The callback may be running right now; free it once it has returned.
        wasm_bindgen_futures::spawn_local(async move {
            drop(callback);
        });
    }
}

impl SubtreeWatch for WebHost {
    type Registration = WebRegistration;

    fn watch(
        &self,
        root: &Element,
        mut handler: MutationHandler<Self>,
    ) -> Result<WebRegistration, WebError> {
        let host = self.clone();
        let callback = ObserverCallback::new(move |records: Array, _observer: MutationObserver| {
            let batch: Vec<MutationRecord<Node>> = records
                .iter()
                .filter_map(|value| value.dyn_into::<web_sys::MutationRecord>().ok())
                .filter_map(|record| convert(&record))
                .collect();
            if let Err(err) = handler(&host, &batch) {
                error!(error = %err, "mutation handler failed");
                console_error(&format!("elwatch: {err}"));
            }
        });

        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        observer.observe_with_options(root, &init)?;
        debug!(root = %root.tag_name(), "mutation observer connected");

        Ok(WebRegistration {
            observer,
            callback: RefCell::new(Some(callback)),
        })
    }
}

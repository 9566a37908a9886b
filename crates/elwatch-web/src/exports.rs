#![forbid(unsafe_code)]

//! `wasm-bindgen` exports for page scripts.
//!
//! ```js
//! const stop = observeAll(".card", (el) => el.classList.add("seen"));
//! observeFirst("#dialog", (el) => el.focus(), false);
//! stop();
//! ```
//!
//! Both return a zero-argument function that cancels the watch. A callback
//! that throws on an existing match makes the call itself throw. A throw
//! while reporting inserted elements ends that batch and is reported with
//! `console.error`; the watch keeps running.

use elwatch_core::{WatchHandle, WatchOptions, try_observe_all_with, try_observe_first_with};
use js_sys::Function;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::Element;

use crate::error::WebError;
use crate::host::WebHost;

/// Calls a page callback with the element. A throw becomes the callback's
/// error: returned to the caller during the pre-scan, and ending the current
/// batch during delivery.
fn invoke(callback: &Function, element: Element) -> Result<(), WebError> {
    callback.call1(&JsValue::UNDEFINED, &element.into())?;
    Ok(())
}

fn options(current: Option<bool>, parent: Option<Element>) -> WatchOptions<Element> {
    let opts = WatchOptions::new().with_current(current.unwrap_or(true));
    match parent {
        Some(root) => opts.with_root(root),
        None => opts,
    }
}

fn cancel_function(handle: WatchHandle) -> Function {
    Closure::<dyn FnMut()>::new(move || handle.cancel())
        .into_js_value()
        .unchecked_into()
}

/// Calls `callback` for every element matching `selector` under `parent`
/// (default `document.body`), now and as matches are inserted.
///
/// Throws if the selector is invalid or the callback throws while reporting
/// existing matches.
#[wasm_bindgen(js_name = observeAll)]
pub fn observe_all_js(
    selector: &str,
    callback: Function,
    current: Option<bool>,
    parent: Option<Element>,
) -> Result<Function, JsValue> {
    let host = WebHost::from_window()?;
    let handle = try_observe_all_with(&host, selector, options(current, parent), move |el| {
        invoke(&callback, el)
    })?;
    Ok(cancel_function(handle))
}

/// Calls `callback` once, for the first element matching `selector` under
/// `parent`, then stops watching.
///
/// Throws if the selector is invalid or the callback throws on an existing
/// match.
#[wasm_bindgen(js_name = observeFirst)]
pub fn observe_first_js(
    selector: &str,
    callback: Function,
    current: Option<bool>,
    parent: Option<Element>,
) -> Result<Function, JsValue> {
    let host = WebHost::from_window()?;
    let handle = try_observe_first_with(&host, selector, options(current, parent), move |el| {
        invoke(&callback, el)
    })?;
    Ok(cancel_function(handle))
}

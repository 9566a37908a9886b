#![forbid(unsafe_code)]

//! Browser host for `elwatch`.
//!
//! [`WebHost`] implements the `elwatch-core` host traits over `web-sys`, with
//! a `MutationObserver` as the subtree notifier. The `observeAll` and
//! `observeFirst` exports make the matchers callable from page scripts.
//!
//! Everything except [`WebError`] is only compiled on `wasm32` targets.

pub mod error;

#[cfg(target_arch = "wasm32")]
mod exports;
#[cfg(target_arch = "wasm32")]
mod host;

pub use error::WebError;

#[cfg(target_arch = "wasm32")]
pub use exports::{observe_all_js, observe_first_js};
#[cfg(target_arch = "wasm32")]
pub use host::{WebHost, WebRegistration};

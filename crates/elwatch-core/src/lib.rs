#![forbid(unsafe_code)]

//! Core: selector-driven watchers over a subtree change notifier.
//!
//! # Role in elwatch
//! `elwatch-core` owns the two matchers and the traits a tree host must
//! implement for them. It contains no tree and no selector engine; hosts
//! (`elwatch-dom` in memory, `elwatch-web` in the browser) supply both.
//!
//! # Primary responsibilities
//! - **Host seam**: [`TreeHost`] structural queries and the [`SubtreeWatch`]
//!   notifier.
//! - **Matchers**: [`observe_all`] reports every current and future match;
//!   [`observe_first`] reports the first one and detaches itself. The
//!   `try_*` forms take callbacks that can fail.
//! - **Cancellation**: [`WatchHandle`] (idempotent `cancel`) and the scope-bound
//!   [`WatchGuard`].
//!
//! # Threading
//! Everything here is single-threaded. Handles and handlers are built on
//! `Rc`/`RefCell` and are `!Send`; hosts must deliver mutation
//! batches on the thread that registered the watch.

pub mod handle;
pub mod host;
pub mod matcher;
pub mod options;

pub use handle::{WatchGuard, WatchHandle, WatchStatus};
pub use host::{MutationHandler, MutationRecord, SubtreeWatch, TreeHost, WatchRegistration};
pub use matcher::{
    observe_all, observe_all_with, observe_first, observe_first_with, try_observe_all_with,
    try_observe_first_with,
};
pub use options::WatchOptions;

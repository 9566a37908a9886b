#![forbid(unsafe_code)]

//! Cancellation handles and the watch state machine.
//!
//! Every subscription owns one slot holding its [`WatchStatus`] and, while
//! active, the host registration. The slot is shared (`Rc<RefCell<..>>`)
//! between the returned [`WatchHandle`] and the delivery handler.
//!
//! # Invariants
//!
//! 1. Status starts `Active` and moves at most once, to `Matched` or
//!    `Cancelled`. Terminal states never change.
//! 2. The registration is detached exactly once, on the transition out of
//!    `Active`.
//! 3. A registration arriving after the slot settled is detached on arrival.
//! 4. No `RefCell` borrow is held while calling into the host.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::host::WatchRegistration;

/// Lifecycle of one subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchStatus {
    /// Watching; callbacks may still fire.
    Active,
    /// A first-match watch fired and detached itself.
    Matched,
    /// Stopped through [`WatchHandle::cancel`].
    Cancelled,
}

impl WatchStatus {
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

struct SlotInner {
    status: WatchStatus,
    registration: Option<Box<dyn WatchRegistration>>,
}

/// Shared state between a handle and its delivery handler.
#[derive(Clone)]
pub(crate) struct RegistrationSlot {
    inner: Rc<RefCell<SlotInner>>,
}

impl RegistrationSlot {
    pub(crate) fn new() -> Self {
        Self::with_status(WatchStatus::Active)
    }

    pub(crate) fn with_status(status: WatchStatus) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SlotInner {
                status,
                registration: None,
            })),
        }
    }

    pub(crate) fn status(&self) -> WatchStatus {
        self.inner.borrow().status
    }

    pub(crate) fn is_active(&self) -> bool {
        self.status().is_active()
    }

    /// Store the host registration, or detach it right away if the slot
    /// already settled.
    pub(crate) fn fill(&self, registration: Box<dyn WatchRegistration>) {
        let registration = {
            let mut inner = self.inner.borrow_mut();
            if inner.status.is_active() {
                inner.registration = Some(registration);
                return;
            }
            registration
        };
        registration.detach();
    }

    /// Leave `Active` for `status`, detaching the registration.
    ///
    /// Returns `false` if the slot had already settled.
    pub(crate) fn settle(&self, status: WatchStatus) -> bool {
        debug_assert!(!status.is_active());
        let registration = {
            let mut inner = self.inner.borrow_mut();
            if !inner.status.is_active() {
                return false;
            }
            inner.status = status;
            inner.registration.take()
        };
        if let Some(registration) = registration {
            registration.detach();
        }
        true
    }
}

/// Cancellation handle returned by both matchers.
///
/// Clones share the same subscription. Dropping the handle does **not** stop
/// the watch; use [`WatchHandle::guard`] for scope-bound watches.
#[derive(Clone)]
#[must_use = "dropping a WatchHandle leaves the watch running; keep it to cancel later"]
pub struct WatchHandle {
    slot: RegistrationSlot,
}

impl WatchHandle {
    pub(crate) fn from_slot(slot: RegistrationSlot) -> Self {
        Self { slot }
    }

    /// Handle for a first-match watch that resolved during the pre-scan.
    pub(crate) fn matched() -> Self {
        Self::from_slot(RegistrationSlot::with_status(WatchStatus::Matched))
    }

    /// Stop the watch. Safe to call any number of times, including after a
    /// first-match watch already fired.
    pub fn cancel(&self) {
        if self.slot.settle(WatchStatus::Cancelled) {
            debug!("watch cancelled");
        }
    }

    #[must_use]
    pub fn status(&self) -> WatchStatus {
        self.slot.status()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.slot.is_active()
    }

    /// Tie the watch to a scope: the returned guard cancels on drop.
    pub fn guard(self) -> WatchGuard {
        WatchGuard {
            handle: self,
            armed: true,
        }
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("status", &self.status())
            .finish()
    }
}

/// RAII form of [`WatchHandle`]: cancels the watch when dropped.
#[must_use = "dropping a WatchGuard cancels the watch immediately"]
pub struct WatchGuard {
    handle: WatchHandle,
    armed: bool,
}

impl WatchGuard {
    /// The underlying handle.
    pub fn handle(&self) -> &WatchHandle {
        &self.handle
    }

    /// Give up scope-bound cancellation and return the plain handle.
    pub fn disarm(mut self) -> WatchHandle {
        self.armed = false;
        self.handle.clone()
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if self.armed {
            self.handle.cancel();
        }
    }
}

impl fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchGuard")
            .field("status", &self.handle.status())
            .field("armed", &self.armed)
            .finish()
    }
}

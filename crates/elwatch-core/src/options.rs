#![forbid(unsafe_code)]

//! Per-call configuration for the matchers.

/// Options shared by [`observe_all_with`](crate::observe_all_with) and
/// [`observe_first_with`](crate::observe_first_with).
///
/// `E` is the host's element type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchOptions<E> {
    /// Scan for matches already present before watching for new ones.
    pub current: bool,
    /// Subtree to watch. `None` means the host's default root.
    pub root: Option<E>,
}

impl<E> Default for WatchOptions<E> {
    fn default() -> Self {
        Self {
            current: true,
            root: None,
        }
    }
}

impl<E> WatchOptions<E> {
    /// Defaults: pre-scan enabled, host default root.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: enable or disable the pre-scan.
    #[must_use]
    pub fn with_current(mut self, current: bool) -> Self {
        self.current = current;
        self
    }

    /// Builder: watch under `root` instead of the host default.
    #[must_use]
    pub fn with_root(mut self, root: E) -> Self {
        self.root = Some(root);
        self
    }

    /// Builder: only report elements inserted from now on.
    #[must_use]
    pub fn future_only(self) -> Self {
        self.with_current(false)
    }
}

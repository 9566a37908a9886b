#![forbid(unsafe_code)]

//! The seam between the matchers and the environment that owns the tree.
//!
//! A host answers three synchronous structural queries and offers one
//! asynchronous facility: a subtree change notifier. The matchers in
//! [`crate::matcher`] are written purely against these traits, so the same
//! code runs over the in-memory document of `elwatch-dom` and the browser DOM
//! of `elwatch-web`.
//!
//! # Delivery contract
//!
//! 1. [`SubtreeWatch::watch`] never invokes the handler synchronously; batches
//!    are delivered later, on the host's schedule.
//! 2. A batch contains every record queued for that registration since the
//!    previous delivery, in the order the edits happened.
//! 3. After [`WatchRegistration::detach`] returns, no queued-but-undelivered
//!    batch is delivered to that handler.
//! 4. Delivery is single-threaded. Handlers are not `Send`.

/// One structural change observed under a watched root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRecord<N> {
    /// The node whose child list changed.
    pub target: N,
    /// Nodes inserted under `target`, in insertion order.
    pub added_nodes: Vec<N>,
    /// Nodes removed from `target`, in removal order.
    pub removed_nodes: Vec<N>,
}

impl<N> MutationRecord<N> {
    /// Record for nodes inserted under `target`.
    #[must_use]
    pub fn added(target: N, added_nodes: Vec<N>) -> Self {
        Self {
            target,
            added_nodes,
            removed_nodes: Vec::new(),
        }
    }

    /// Record for nodes removed from `target`.
    #[must_use]
    pub fn removed(target: N, removed_nodes: Vec<N>) -> Self {
        Self {
            target,
            added_nodes: Vec::new(),
            removed_nodes,
        }
    }
}

/// Synchronous structural queries over a tree.
///
/// `Node` is anything that can show up in a mutation record (elements, text,
/// comments). `Element` is the subset that selectors apply to; equality is
/// node identity.
pub trait TreeHost {
    type Node: Clone + 'static;
    type Element: Clone + PartialEq + 'static;
    type Error: std::error::Error + 'static;

    /// Root used when the caller does not name one.
    fn default_root(&self) -> Result<Self::Element, Self::Error>;

    /// View `node` as an element, or `None` for non-element nodes.
    fn as_element(&self, node: &Self::Node) -> Option<Self::Element>;

    /// Does `element` itself match `selector`?
    fn matches(&self, element: &Self::Element, selector: &str) -> Result<bool, Self::Error>;

    /// All descendants of `root` (excluding `root`) matching `selector`, in
    /// document order.
    fn query_all(
        &self,
        root: &Self::Element,
        selector: &str,
    ) -> Result<Vec<Self::Element>, Self::Error>;

    /// First descendant of `root` in document order matching `selector`.
    fn query_first(
        &self,
        root: &Self::Element,
        selector: &str,
    ) -> Result<Option<Self::Element>, Self::Error>;
}

/// Handler invoked with each delivered batch.
///
/// The host passes itself in so handlers never need to keep a strong handle
/// to it. An `Err` is handed to the host's delivery error policy.
pub type MutationHandler<H> = Box<
    dyn FnMut(&H, &[MutationRecord<<H as TreeHost>::Node>]) -> Result<(), <H as TreeHost>::Error>,
>;

/// A host that can notify about insertions anywhere below a root.
pub trait SubtreeWatch: TreeHost + Sized {
    type Registration: WatchRegistration;

    /// Watch the whole subtree of `root` for child-list changes.
    fn watch(
        &self,
        root: &Self::Element,
        handler: MutationHandler<Self>,
    ) -> Result<Self::Registration, Self::Error>;
}

/// A live registration with a subtree notifier.
pub trait WatchRegistration: 'static {
    /// Stop delivery. Calling this more than once is a no-op.
    fn detach(&self);
}

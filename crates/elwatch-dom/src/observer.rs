#![forbid(unsafe_code)]

//! Subtree observers and the microtask checkpoint that delivers to them.
//!
//! Edits queue records per observer; nothing is delivered until
//! [`Document::flush`] runs. That gives the same coalescing a browser's
//! mutation-observer microtask does: every edit made between two checkpoints
//! reaches a handler as one batch.
//!
//! # Invariants
//!
//! 1. Observers are notified in registration order within a round.
//! 2. Each delivery hands over every record queued for that observer so far.
//! 3. Records queued during a round are delivered in a later round of the
//!    same flush.
//! 4. Detaching drops the observer's queued records; it is never called again.
//! 5. A `flush` started from inside a handler returns immediately.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use elwatch_core::{MutationHandler, MutationRecord, SubtreeWatch, WatchRegistration};
use tracing::{debug, trace, warn};

use crate::document::{Document, DomInner};
use crate::error::DomError;
use crate::node::NodeId;

type SharedHandler = Rc<RefCell<MutationHandler<Document>>>;

pub(crate) struct Observer {
    pub(crate) id: u64,
    pub(crate) root: NodeId,
    pub(crate) pending: Vec<MutationRecord<NodeId>>,
    handler: SharedHandler,
}

/// Outcome of one [`Document::flush`].
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Delivery rounds run (edits made by handlers cause extra rounds).
    pub rounds: usize,
    /// Batches handed to handlers.
    pub batches: usize,
    /// Errors returned by handlers, in delivery order. An error never stops
    /// delivery to other observers.
    pub errors: Vec<DomError>,
}

impl FlushReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Registration returned by [`Document::watch`](SubtreeWatch::watch).
///
/// Holds the document weakly, so an outstanding registration does not keep
/// the tree alive.
#[derive(Debug)]
pub struct DomRegistration {
    inner: Weak<RefCell<DomInner>>,
    id: u64,
}

impl WatchRegistration for DomRegistration {
    fn detach(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let removed = {
            let mut inner = inner.borrow_mut();
            let pos = inner.observers.iter().position(|obs| obs.id == self.id);
            pos.map(|pos| inner.observers.remove(pos))
        };
        if removed.is_some() {
            debug!(observer = self.id, "observer detached");
        }
        // The handler (and whatever it captured) drops here, outside the borrow.
        drop(removed);
    }
}

/// Clears the `flushing` flag even if a handler panics.
struct FlushingGuard<'a>(&'a RefCell<DomInner>);

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().flushing = false;
    }
}

impl Document {
    /// Microtask checkpoint: deliver all queued records.
    ///
    /// Loops until no observer has pending records, so edits made by
    /// handlers are delivered in the same call. Calling `flush` from inside
    /// a handler is a no-op.
    pub fn flush(&self) -> FlushReport {
        let mut report = FlushReport::default();
        {
            let mut inner = self.inner.borrow_mut();
            if inner.flushing {
                return report;
            }
            inner.flushing = true;
        }
        let _guard = FlushingGuard(&self.inner);

        loop {
            let due: Vec<u64> = self
                .inner
                .borrow()
                .observers
                .iter()
                .filter(|obs| !obs.pending.is_empty())
                .map(|obs| obs.id)
                .collect();
            if due.is_empty() {
                break;
            }
            report.rounds += 1;
            trace!(round = report.rounds, observers = due.len(), "flush round");

            for id in due {
                let taken = {
                    let mut inner = self.inner.borrow_mut();
                    inner
                        .observers
                        .iter_mut()
                        .find(|obs| obs.id == id)
                        .map(|obs| (Rc::clone(&obs.handler), std::mem::take(&mut obs.pending)))
                };
                let Some((handler, records)) = taken else {
                    continue;
                };
                if records.is_empty() {
                    continue;
                }
                report.batches += 1;
                let result = {
                    let mut handler = handler.borrow_mut();
                    (*handler)(self, &records)
                };
                if let Err(err) = result {
                    warn!(observer = id, error = %err, "mutation handler failed");
                    report.errors.push(err);
                }
            }
        }
        report
    }

    /// Number of live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.borrow().observers.len()
    }

    /// Records queued and not yet delivered, summed over observers.
    #[must_use]
    pub fn pending_records(&self) -> usize {
        self.inner
            .borrow()
            .observers
            .iter()
            .map(|obs| obs.pending.len())
            .sum()
    }
}

impl SubtreeWatch for Document {
    type Registration = DomRegistration;

    fn watch(
        &self,
        root: &NodeId,
        handler: MutationHandler<Self>,
    ) -> Result<DomRegistration, DomError> {
        let mut inner = self.inner.borrow_mut();
        inner.node(*root)?;
        let id = inner.next_observer;
        inner.next_observer += 1;
        inner.observers.push(Observer {
            id,
            root: *root,
            pending: Vec::new(),
            handler: Rc::new(RefCell::new(handler)),
        });
        debug!(observer = id, root = %root, "observer attached");
        Ok(DomRegistration {
            inner: Rc::downgrade(&self.inner),
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    type Log = Rc<RefCell<Vec<Vec<MutationRecord<NodeId>>>>>;

    fn logging_handler(log: &Log) -> MutationHandler<Document> {
        let log = Rc::clone(log);
        Box::new(move |_doc, records| {
            log.borrow_mut().push(records.to_vec());
            Ok(())
        })
    }

    #[test]
    fn edits_coalesce_until_flush() {
        let doc = Document::new();
        let log: Log = Rc::default();
        let _reg = doc.watch(&doc.body(), logging_handler(&log)).unwrap();

        let a = doc.create_element("a");
        let b = doc.create_element("b");
        doc.append_child(doc.body(), a).unwrap();
        doc.append_child(doc.body(), b).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(doc.pending_records(), 2);

        let report = doc.flush();
        assert_eq!(report.batches, 1);
        assert!(report.is_clean());
        assert_eq!(
            *log.borrow(),
            vec![vec![
                MutationRecord::added(doc.body(), vec![a]),
                MutationRecord::added(doc.body(), vec![b]),
            ]]
        );
        assert_eq!(doc.pending_records(), 0);
    }

    #[test]
    fn subtree_scope() {
        let doc = Document::new();
        let watched = doc.create_element("section");
        let outside = doc.create_element("aside");
        doc.append_children(doc.body(), &[watched, outside]).unwrap();

        let log: Log = Rc::default();
        let _reg = doc.watch(&watched, logging_handler(&log)).unwrap();

        let deep = doc.create_element("div");
        doc.append_child(watched, deep).unwrap();
        doc.append_child(deep, doc.create_element("p")).unwrap();
        doc.append_child(outside, doc.create_element("p")).unwrap();
        doc.append_child(doc.head(), doc.create_element("meta")).unwrap();
        doc.flush();

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        let targets: Vec<NodeId> = log[0].iter().map(|r| r.target).collect();
        assert_eq!(targets, vec![watched, deep]);
    }

    #[test]
    fn moves_report_removal_and_insertion() {
        let doc = Document::new();
        let from = doc.create_element("div");
        let to = doc.create_element("div");
        let item = doc.create_element("p");
        doc.append_children(doc.body(), &[from, to]).unwrap();
        doc.append_child(from, item).unwrap();

        let log: Log = Rc::default();
        let _reg = doc.watch(&doc.body(), logging_handler(&log)).unwrap();
        doc.append_child(to, item).unwrap();
        doc.flush();

        assert_eq!(
            log.borrow()[0],
            vec![
                MutationRecord::removed(from, vec![item]),
                MutationRecord::added(to, vec![item]),
            ]
        );
    }

    #[test]
    fn detach_drops_queued_records() {
        let doc = Document::new();
        let log: Log = Rc::default();
        let reg = doc.watch(&doc.body(), logging_handler(&log)).unwrap();
        doc.append_child(doc.body(), doc.create_element("p")).unwrap();

        reg.detach();
        reg.detach();
        let report = doc.flush();
        assert_eq!(report.batches, 0);
        assert!(log.borrow().is_empty());
        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn handler_edits_run_in_a_later_round() {
        let doc = Document::new();
        let rounds = Rc::new(Cell::new(0));
        let seen = Rc::clone(&rounds);
        let _reg = doc
            .watch(
                &doc.body(),
                Box::new(move |doc: &Document, _records| {
                    seen.set(seen.get() + 1);
                    if seen.get() == 1 {
                        let extra = doc.create_element("p");
                        doc.append_child(doc.body(), extra)?;
                    }
                    Ok(())
                }),
            )
            .unwrap();

        doc.append_child(doc.body(), doc.create_element("p")).unwrap();
        let report = doc.flush();
        assert_eq!(report.rounds, 2);
        assert_eq!(rounds.get(), 2);
    }

    #[test]
    fn nested_flush_is_a_no_op() {
        let doc = Document::new();
        let inner_report = Rc::new(Cell::new(None));
        let slot = Rc::clone(&inner_report);
        let _reg = doc
            .watch(
                &doc.body(),
                Box::new(move |doc: &Document, _records| {
                    let extra = doc.create_element("p");
                    doc.append_child(doc.head(), extra)?;
                    slot.set(Some(doc.flush().batches));
                    Ok(())
                }),
            )
            .unwrap();

        doc.append_child(doc.body(), doc.create_element("p")).unwrap();
        doc.flush();
        assert_eq!(inner_report.get(), Some(0));
    }

    #[test]
    fn handler_errors_do_not_stop_other_observers() {
        let doc = Document::new();
        let _failing = doc
            .watch(
                &doc.body(),
                Box::new(|_doc: &Document, _records| {
                    Err(DomError::HierarchyRequest("boom"))
                }),
            )
            .unwrap();
        let log: Log = Rc::default();
        let _ok = doc.watch(&doc.body(), logging_handler(&log)).unwrap();

        doc.append_child(doc.body(), doc.create_element("p")).unwrap();
        let report = doc.flush();
        assert_eq!(report.errors, vec![DomError::HierarchyRequest("boom")]);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn watch_rejects_unknown_root() {
        let doc = Document::new();
        let log: Log = Rc::default();
        let err = doc.watch(&NodeId(42), logging_handler(&log)).unwrap_err();
        assert_eq!(err, DomError::UnknownNode(NodeId(42)));
    }

    #[test]
    fn registration_outlives_document() {
        let doc = Document::new();
        let log: Log = Rc::default();
        let reg = doc.watch(&doc.body(), logging_handler(&log)).unwrap();
        drop(doc);
        reg.detach();
    }
}

#![forbid(unsafe_code)]

//! The two matchers: every match, or the first match only.
//!
//! # Ordering
//!
//! Within one delivered batch, records are walked in delivery order and the
//! added nodes of a record in insertion order. For each added element the
//! element itself is tested before its descendants, and descendants come in
//! document order. Non-element nodes (text, comments) are skipped.
//!
//! The AllMatcher collects a batch's matches before running any callback and
//! reports each element at most once per batch. An element inserted under a
//! node added earlier in the same batch is already in that node's descendant
//! scan, and edits made by callbacks surface in a later batch.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Invalid selector, pre-scan | `Err` returned from the call; nothing registered |
//! | Invalid selector, delivery | Batch aborted; `Err` handed to the host |
//! | `try_*` callback returns `Err`, pre-scan | Remaining matches skipped; `Err` returned, nothing registered |
//! | `try_*` callback returns `Err`, delivery | Rest of the batch skipped; `Err` handed to the host |
//! | Panicking callback | Unwinds out of the handler; rest of the batch is skipped |
//! | Handle cancelled inside a callback | No further callbacks, even later in the same batch |

use tracing::{debug, trace};

use crate::handle::{RegistrationSlot, WatchHandle, WatchStatus};
use crate::host::{MutationHandler, MutationRecord, SubtreeWatch, TreeHost};
use crate::options::WatchOptions;

fn resolve_root<H: SubtreeWatch>(
    host: &H,
    root: Option<H::Element>,
) -> Result<H::Element, H::Error> {
    match root {
        Some(root) => Ok(root),
        None => host.default_root(),
    }
}

/// Matching elements introduced by one batch, in reporting order, each once.
fn batch_matches<H: TreeHost>(
    host: &H,
    records: &[MutationRecord<H::Node>],
    selector: &str,
) -> Result<Vec<H::Element>, H::Error> {
    let mut found: Vec<H::Element> = Vec::new();
    for record in records {
        for node in &record.added_nodes {
            let Some(element) = host.as_element(node) else {
                continue;
            };
            if host.matches(&element, selector)? {
                push_unique(&mut found, element.clone());
            }
            for descendant in host.query_all(&element, selector)? {
                push_unique(&mut found, descendant);
            }
        }
    }
    Ok(found)
}

fn push_unique<E: PartialEq>(found: &mut Vec<E>, element: E) {
    if !found.contains(&element) {
        found.push(element);
    }
}

/// Call `callback` for every element matching `selector` under the host's
/// default root, now and in the future.
pub fn observe_all<H, F>(host: &H, selector: &str, callback: F) -> Result<WatchHandle, H::Error>
where
    H: SubtreeWatch,
    F: FnMut(H::Element) + 'static,
{
    observe_all_with(host, selector, WatchOptions::default(), callback)
}

/// Call `callback` for every element matching `selector` in the configured
/// subtree: existing ones first (if `options.current`), then each element
/// inserted later, until the returned handle is cancelled.
pub fn observe_all_with<H, F>(
    host: &H,
    selector: &str,
    options: WatchOptions<H::Element>,
    mut callback: F,
) -> Result<WatchHandle, H::Error>
where
    H: SubtreeWatch,
    F: FnMut(H::Element) + 'static,
{
    try_observe_all_with(host, selector, options, move |element| {
        callback(element);
        Ok(())
    })
}

/// [`observe_all_with`] for a callback that can fail.
///
/// A failure during the pre-scan is returned from this call and nothing is
/// registered. A failure during delivery skips the rest of that batch and is
/// handed to the host; the watch stays active.
pub fn try_observe_all_with<H, F>(
    host: &H,
    selector: &str,
    options: WatchOptions<H::Element>,
    mut callback: F,
) -> Result<WatchHandle, H::Error>
where
    H: SubtreeWatch,
    F: FnMut(H::Element) -> Result<(), H::Error> + 'static,
{
    let current = options.current;
    let root = resolve_root(host, options.root)?;

    if current {
        for element in host.query_all(&root, selector)? {
            callback(element)?;
        }
    }

    let slot = RegistrationSlot::new();
    let handler_slot = slot.clone();
    let owned_selector = selector.to_owned();
    let handler: MutationHandler<H> = Box::new(
        move |host: &H, records: &[MutationRecord<H::Node>]| -> Result<(), H::Error> {
            if !handler_slot.is_active() {
                return Ok(());
            }
            let found = batch_matches(host, records, &owned_selector)?;
            trace!(records = records.len(), matches = found.len(), "all-matcher batch");
            for element in found {
                if !handler_slot.is_active() {
                    break;
                }
                callback(element)?;
            }
            Ok(())
        },
    );

    let registration = host.watch(&root, handler)?;
    slot.fill(Box::new(registration));
    debug!(selector, current, "watching for all matches");
    Ok(WatchHandle::from_slot(slot))
}

/// Call `callback` once, for the first element matching `selector` under the
/// host's default root.
pub fn observe_first<H, F>(host: &H, selector: &str, callback: F) -> Result<WatchHandle, H::Error>
where
    H: SubtreeWatch,
    F: FnOnce(H::Element) + 'static,
{
    observe_first_with(host, selector, WatchOptions::default(), callback)
}

/// Call `callback` once, for the first element matching `selector` in the
/// configured subtree, then stop watching.
///
/// When the pre-scan finds a match the callback runs before this returns and
/// the handle comes back already [`WatchStatus::Matched`]; no notifier is
/// registered in that case.
pub fn observe_first_with<H, F>(
    host: &H,
    selector: &str,
    options: WatchOptions<H::Element>,
    callback: F,
) -> Result<WatchHandle, H::Error>
where
    H: SubtreeWatch,
    F: FnOnce(H::Element) + 'static,
{
    try_observe_first_with(host, selector, options, move |element| {
        callback(element);
        Ok(())
    })
}

/// [`observe_first_with`] for a callback that can fail.
///
/// The watch is settled before the callback runs, so a failure never causes
/// a second call. A pre-scan failure is returned from this call; a delivery
/// failure is handed to the host.
pub fn try_observe_first_with<H, F>(
    host: &H,
    selector: &str,
    options: WatchOptions<H::Element>,
    callback: F,
) -> Result<WatchHandle, H::Error>
where
    H: SubtreeWatch,
    F: FnOnce(H::Element) -> Result<(), H::Error> + 'static,
{
    let current = options.current;
    let root = resolve_root(host, options.root)?;

    if current {
        if let Some(element) = host.query_first(&root, selector)? {
            debug!(selector, "first match already present");
            callback(element)?;
            return Ok(WatchHandle::matched());
        }
    }

    let slot = RegistrationSlot::new();
    let handler_slot = slot.clone();
    let owned_selector = selector.to_owned();
    let mut callback = Some(callback);
    let handler: MutationHandler<H> = Box::new(
        move |host: &H, records: &[MutationRecord<H::Node>]| -> Result<(), H::Error> {
            if !handler_slot.is_active() {
                return Ok(());
            }
            trace!(records = records.len(), "first-matcher batch");
            for record in records {
                for node in &record.added_nodes {
                    let Some(element) = host.as_element(node) else {
                        continue;
                    };
                    let found = if host.matches(&element, &owned_selector)? {
                        Some(element)
                    } else {
                        host.query_first(&element, &owned_selector)?
                    };
                    let Some(found) = found else {
                        continue;
                    };
                    if handler_slot.settle(WatchStatus::Matched) {
                        debug!(selector = %owned_selector, "first match inserted");
                        if let Some(callback) = callback.take() {
                            callback(found)?;
                        }
                    }
                    return Ok(());
                }
            }
            Ok(())
        },
    );

    let registration = host.watch(&root, handler)?;
    slot.fill(Box::new(registration));
    debug!(selector, current, "watching for first match");
    Ok(WatchHandle::from_slot(slot))
}

#![forbid(unsafe_code)]

//! In-memory document host for `elwatch`.
//!
//! Provides an arena-backed tree with [`TreeHost`](elwatch_core::TreeHost)
//! queries, a CSS-subset selector engine, and a subtree notifier whose
//! records coalesce until [`Document::flush`], the stand-in for a browser's
//! microtask checkpoint.
//!
//! ```
//! use elwatch_core::observe_all;
//! use elwatch_dom::Document;
//! use std::{cell::RefCell, rc::Rc};
//!
//! let doc = Document::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! let handle = observe_all(&doc, ".card", move |el| sink.borrow_mut().push(el)).unwrap();
//!
//! let card = doc.create_element_with("div", &[("class", "card")]);
//! doc.append_child(doc.body(), card).unwrap();
//! assert!(seen.borrow().is_empty());
//! doc.flush();
//! assert_eq!(*seen.borrow(), vec![card]);
//! handle.cancel();
//! ```

pub mod document;
pub mod error;
pub mod node;
pub mod observer;

mod selector;

pub use document::Document;
pub use error::DomError;
pub use node::{ElementData, NodeId, NodeKind};
pub use observer::{DomRegistration, FlushReport};

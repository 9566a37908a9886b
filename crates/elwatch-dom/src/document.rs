#![forbid(unsafe_code)]

//! The in-memory document: arena tree, edits, and structural queries.
//!
//! # Design
//!
//! [`Document`] is a cheap, clonable handle over shared storage
//! (`Rc<RefCell<..>>`); clones see the same tree. Nodes live in an arena and
//! are addressed by [`NodeId`]. Every child-list edit queues a
//! [`MutationRecord`] for each observer whose root contains the edited node;
//! records are delivered later by [`Document::flush`].
//!
//! # Invariants
//!
//! 1. `parent` and `children` links agree: `c ∈ children(p)` iff
//!    `parent(c) == Some(p)`.
//! 2. The tree is acyclic; inserting an inclusive ancestor of the parent is
//!    rejected.
//! 3. Only the document node and elements have children.
//! 4. Queries return nodes in document order (pre-order).
//! 5. No `RefCell` borrow is held while user code runs.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `UnknownNode` | Id from another document | Edit or query rejected |
//! | `HierarchyRequest` | Cycle, text parent, document child | Edit rejected, tree unchanged |
//! | `InvalidSelector` | Unsupported syntax | Query rejected |

use std::cell::RefCell;
use std::rc::Rc;

use elwatch_core::{MutationRecord, TreeHost};

use crate::error::DomError;
use crate::node::{ElementData, NodeData, NodeId, NodeKind};
use crate::observer::Observer;
use crate::selector::{ElementTree, SelectorList};

pub(crate) struct DomInner {
    pub(crate) nodes: Vec<NodeData>,
    pub(crate) document: NodeId,
    pub(crate) document_element: NodeId,
    pub(crate) head: NodeId,
    pub(crate) body: NodeId,
    pub(crate) observers: Vec<Observer>,
    pub(crate) next_observer: u64,
    pub(crate) flushing: bool,
}

impl ElementTree for DomInner {
    fn element(&self, node: NodeId) -> Option<&ElementData> {
        self.nodes.get(node.0).and_then(NodeData::element)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }
}

impl DomInner {
    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData::new(kind));
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&NodeData, DomError> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id))
    }

    /// `ancestor == node` or `ancestor` is above `node`.
    pub(crate) fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Strict descendants of `root` in pre-order.
    pub(crate) fn descendants(&self, root: NodeId) -> Descendants<'_> {
        let stack: Vec<NodeId> = self
            .nodes
            .get(root.0)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        Descendants { inner: self, stack }
    }

    fn queue(&mut self, record: MutationRecord<NodeId>) {
        let target = record.target;
        let interested: Vec<usize> = self
            .observers
            .iter()
            .enumerate()
            .filter(|(_, obs)| self.is_inclusive_ancestor(obs.root, target))
            .map(|(idx, _)| idx)
            .collect();
        for idx in interested {
            self.observers[idx].pending.push(record.clone());
        }
    }

    fn detach_from_parent(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes[child.0].parent.take()?;
        self.nodes[parent.0].children.retain(|c| *c != child);
        Some(parent)
    }

    fn insert(
        &mut self,
        parent: NodeId,
        children: &[NodeId],
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        match &self.node(parent)?.kind {
            NodeKind::Document | NodeKind::Element(_) => {}
            NodeKind::Text(_) => return Err(DomError::HierarchyRequest("text nodes have no children")),
        }
        if let Some(reference) = reference {
            if self.node(reference)?.parent != Some(parent) {
                return Err(DomError::HierarchyRequest("reference is not a child of parent"));
            }
        }
        for (idx, &child) in children.iter().enumerate() {
            if matches!(self.node(child)?.kind, NodeKind::Document) {
                return Err(DomError::HierarchyRequest("the document node cannot be inserted"));
            }
            if self.is_inclusive_ancestor(child, parent) {
                return Err(DomError::HierarchyRequest("insertion would create a cycle"));
            }
            if Some(child) == reference {
                return Err(DomError::HierarchyRequest("reference node is being inserted"));
            }
            if children[..idx].contains(&child) {
                return Err(DomError::HierarchyRequest("node listed twice"));
            }
        }
        if children.is_empty() {
            return Ok(());
        }

        for &child in children {
            if let Some(old_parent) = self.detach_from_parent(child) {
                self.queue(MutationRecord::removed(old_parent, vec![child]));
            }
        }
        let at = match reference {
            Some(reference) => self.nodes[parent.0]
                .children
                .iter()
                .position(|c| *c == reference)
                .unwrap_or(self.nodes[parent.0].children.len()),
            None => self.nodes[parent.0].children.len(),
        };
        for (offset, &child) in children.iter().enumerate() {
            self.nodes[child.0].parent = Some(parent);
            self.nodes[parent.0].children.insert(at + offset, child);
        }
        self.queue(MutationRecord::added(parent, children.to_vec()));
        Ok(())
    }
}

/// Pre-order iterator over the strict descendants of a node.
pub(crate) struct Descendants<'a> {
    inner: &'a DomInner,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let next = self.stack.pop()?;
        self.stack
            .extend(self.inner.nodes[next.0].children.iter().rev().copied());
        Some(next)
    }
}

/// Shared handle to an in-memory document.
///
/// A new document contains `#document > html > (head, body)`.
#[derive(Clone)]
pub struct Document {
    pub(crate) inner: Rc<RefCell<DomInner>>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Document")
            .field("nodes", &inner.nodes.len())
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        let mut inner = DomInner {
            nodes: Vec::new(),
            document: NodeId(0),
            document_element: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            observers: Vec::new(),
            next_observer: 1,
            flushing: false,
        };
        let document = inner.push(NodeKind::Document);
        let html = inner.push(NodeKind::Element(ElementData::new("html")));
        let head = inner.push(NodeKind::Element(ElementData::new("head")));
        let body = inner.push(NodeKind::Element(ElementData::new("body")));
        for (parent, child) in [(document, html), (html, head), (html, body)] {
            inner.nodes[child.0].parent = Some(parent);
            inner.nodes[parent.0].children.push(child);
        }
        inner.document = document;
        inner.document_element = html;
        inner.head = head;
        inner.body = body;
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    #[must_use]
    pub fn document_node(&self) -> NodeId {
        self.inner.borrow().document
    }

    #[must_use]
    pub fn document_element(&self) -> NodeId {
        self.inner.borrow().document_element
    }

    #[must_use]
    pub fn head(&self) -> NodeId {
        self.inner.borrow().head
    }

    #[must_use]
    pub fn body(&self) -> NodeId {
        self.inner.borrow().body
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.inner
            .borrow_mut()
            .push(NodeKind::Element(ElementData::new(tag)))
    }

    /// Create a detached element with attributes.
    pub fn create_element_with(&self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut el = ElementData::new(tag);
        for (name, value) in attrs {
            el.set_attr(name, value);
        }
        self.inner.borrow_mut().push(NodeKind::Element(el))
    }

    /// Create a detached text node.
    pub fn create_text(&self, text: &str) -> NodeId {
        self.inner
            .borrow_mut()
            .push(NodeKind::Text(text.to_owned()))
    }

    /// Set an attribute. Attribute changes are not child-list mutations and
    /// queue no records.
    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let mut inner = self.inner.borrow_mut();
        match inner.nodes.get_mut(node.0).map(|n| &mut n.kind) {
            Some(NodeKind::Element(el)) => {
                el.set_attr(name, value);
                Ok(())
            }
            Some(_) => Err(DomError::HierarchyRequest("only elements have attributes")),
            None => Err(DomError::UnknownNode(node)),
        }
    }

    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner
            .borrow()
            .element(node)
            .and_then(|el| el.attr(name))
            .map(str::to_owned)
    }

    #[must_use]
    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        self.inner.borrow().element(node).map(|el| el.tag.clone())
    }

    #[must_use]
    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.inner.borrow().nodes.get(node.0).map(|n| n.kind.clone())
    }

    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.borrow().parent(node)
    }

    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .borrow()
            .nodes
            .get(node.0)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// `node` is `ancestor` or lies below it.
    #[must_use]
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.inner.borrow().is_inclusive_ancestor(ancestor, node)
    }

    /// Append `child` as the last child of `parent`, moving it if attached
    /// elsewhere.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.inner.borrow_mut().insert(parent, &[child], None)
    }

    /// Append several nodes in one edit, producing a single record whose
    /// added nodes keep the given order.
    pub fn append_children(&self, parent: NodeId, children: &[NodeId]) -> Result<(), DomError> {
        self.inner.borrow_mut().insert(parent, children, None)
    }

    /// Insert `child` before `reference`, or append when `reference` is `None`.
    pub fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        self.inner.borrow_mut().insert(parent, &[child], reference)
    }

    /// Detach `node` from its parent. Detached nodes are left alone.
    pub fn remove(&self, node: NodeId) -> Result<(), DomError> {
        let mut inner = self.inner.borrow_mut();
        inner.node(node)?;
        if let Some(parent) = inner.detach_from_parent(node) {
            inner.queue(MutationRecord::removed(parent, vec![node]));
        }
        Ok(())
    }
}

impl TreeHost for Document {
    type Node = NodeId;
    type Element = NodeId;
    type Error = DomError;

    fn default_root(&self) -> Result<NodeId, DomError> {
        Ok(self.body())
    }

    fn as_element(&self, node: &NodeId) -> Option<NodeId> {
        self.inner.borrow().element(*node).map(|_| *node)
    }

    fn matches(&self, element: &NodeId, selector: &str) -> Result<bool, DomError> {
        let list = SelectorList::parse(selector)?;
        let inner = self.inner.borrow();
        inner.node(*element)?;
        Ok(list.matches(&*inner, *element))
    }

    fn query_all(&self, root: &NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let list = SelectorList::parse(selector)?;
        let inner = self.inner.borrow();
        inner.node(*root)?;
        Ok(inner
            .descendants(*root)
            .filter(|node| list.matches(&*inner, *node))
            .collect())
    }

    fn query_first(&self, root: &NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        let list = SelectorList::parse(selector)?;
        let inner = self.inner.borrow();
        inner.node(*root)?;
        Ok(inner
            .descendants(*root)
            .find(|node| list.matches(&*inner, *node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_document_skeleton() {
        let doc = Document::new();
        assert_eq!(doc.children(doc.document_node()), vec![doc.document_element()]);
        assert_eq!(doc.children(doc.document_element()), vec![doc.head(), doc.body()]);
        assert_eq!(doc.tag_name(doc.body()).as_deref(), Some("body"));
        assert_eq!(doc.default_root(), Ok(doc.body()));
    }

    #[test]
    fn append_and_insert_before_order() {
        let doc = Document::new();
        let body = doc.body();
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        let c = doc.create_element("c");
        doc.append_child(body, a).unwrap();
        doc.append_child(body, c).unwrap();
        doc.insert_before(body, b, Some(c)).unwrap();
        assert_eq!(doc.children(body), vec![a, b, c]);
        assert_eq!(doc.parent(b), Some(body));
    }

    #[test]
    fn moving_a_node_relinks_both_parents() {
        let doc = Document::new();
        let first = doc.create_element("div");
        let second = doc.create_element("div");
        let item = doc.create_element("span");
        doc.append_children(doc.body(), &[first, second]).unwrap();
        doc.append_child(first, item).unwrap();
        doc.append_child(second, item).unwrap();
        assert!(doc.children(first).is_empty());
        assert_eq!(doc.children(second), vec![item]);
    }

    #[test]
    fn hierarchy_errors_leave_tree_unchanged() {
        let doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        let text = doc.create_text("hi");
        doc.append_child(doc.body(), outer).unwrap();
        doc.append_child(outer, inner).unwrap();

        assert!(matches!(
            doc.append_child(inner, outer),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            doc.append_child(text, inner),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            doc.append_child(doc.body(), doc.document_node()),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            doc.append_children(doc.body(), &[text, text]),
            Err(DomError::HierarchyRequest(_))
        ));
        assert_eq!(
            doc.append_child(doc.body(), NodeId(999)),
            Err(DomError::UnknownNode(NodeId(999)))
        );
        assert_eq!(doc.children(outer), vec![inner]);
        assert_eq!(doc.parent(text), None);
    }

    #[test]
    fn insert_before_rejects_foreign_reference() {
        let doc = Document::new();
        let stray = doc.create_element("p");
        let child = doc.create_element("p");
        assert!(matches!(
            doc.insert_before(doc.body(), child, Some(stray)),
            Err(DomError::HierarchyRequest(_))
        ));
    }

    #[test]
    fn queries_follow_document_order_and_exclude_root() {
        let doc = Document::new();
        let list = doc.create_element_with("ul", &[("class", "item")]);
        let one = doc.create_element_with("li", &[("class", "item")]);
        let nested = doc.create_element_with("li", &[("class", "item")]);
        let two = doc.create_element_with("li", &[("class", "item")]);
        doc.append_child(doc.body(), list).unwrap();
        doc.append_children(list, &[one, two]).unwrap();
        doc.append_child(one, nested).unwrap();

        assert_eq!(doc.query_all(&list, ".item"), Ok(vec![one, nested, two]));
        assert_eq!(doc.query_first(&list, "li"), Ok(Some(one)));
        assert_eq!(doc.query_first(&two, "li"), Ok(None));
        assert_eq!(doc.matches(&list, "ul.item"), Ok(true));
    }

    #[test]
    fn text_nodes_are_not_elements() {
        let doc = Document::new();
        let text = doc.create_text("x");
        assert_eq!(doc.as_element(&text), None);
        assert_eq!(doc.kind(text), Some(NodeKind::Text("x".into())));
        assert!(doc.set_attribute(text, "id", "x").is_err());
    }

    #[test]
    fn invalid_selector_is_reported_by_every_query() {
        let doc = Document::new();
        let body = doc.body();
        assert!(matches!(doc.matches(&body, "a:b"), Err(DomError::InvalidSelector { .. })));
        assert!(matches!(doc.query_all(&body, ""), Err(DomError::InvalidSelector { .. })));
        assert!(matches!(doc.query_first(&body, ">"), Err(DomError::InvalidSelector { .. })));
    }

    #[test]
    fn remove_detaches_and_is_idempotent() {
        let doc = Document::new();
        let p = doc.create_element("p");
        doc.append_child(doc.body(), p).unwrap();
        doc.remove(p).unwrap();
        doc.remove(p).unwrap();
        assert_eq!(doc.parent(p), None);
        assert!(!doc.contains(doc.body(), p));
    }
}

#![forbid(unsafe_code)]

//! A small CSS selector engine for the in-memory document.
//!
//! Supported syntax:
//!
//! | Form | Example |
//! |------|---------|
//! | Type / universal | `div`, `*` |
//! | Id / class | `#main`, `.item` |
//! | Attribute presence / equality | `[hidden]`, `[data-kind="card"]` |
//! | Descendant / child combinator | `ul li`, `ul > li` |
//! | Selector list | `h1, h2` |
//!
//! Pseudo-classes, sibling combinators, and attribute operators other than
//! `=` are rejected with [`DomError::InvalidSelector`].
//!
//! Matching walks right to left: the rightmost compound is tested against
//! the candidate, then ancestors are searched for the remaining compounds.

use crate::error::DomError;
use crate::node::{ElementData, NodeId};

/// Read access to the tree needed for matching.
pub(crate) trait ElementTree {
    fn element(&self, node: NodeId) -> Option<&ElementData>;
    fn parent(&self, node: NodeId) -> Option<NodeId>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct AttrTest {
    name: String,
    value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    /// `None` is the universal selector.
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.ids.is_empty() && self.classes.is_empty() && self.attrs.is_empty()
    }

    fn matches(&self, el: &ElementData) -> bool {
        if let Some(tag) = &self.tag {
            if *tag != el.tag {
                return false;
            }
        }
        self.ids.iter().all(|id| el.id() == Some(id.as_str()))
            && self.classes.iter().all(|class| el.has_class(class))
            && self.attrs.iter().all(|test| match (&test.value, el.attr(&test.name)) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(want), Some(have)) => want == have,
            })
    }
}

/// One complex selector: compounds joined by combinators.
///
/// `combinators[i]` sits between `parts[i]` and `parts[i + 1]`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Complex {
    parts: Vec<Compound>,
    combinators: Vec<Combinator>,
}

impl Complex {
    fn matches_at<T: ElementTree>(&self, tree: &T, node: NodeId, idx: usize) -> bool {
        let Some(el) = tree.element(node) else {
            return false;
        };
        if !self.parts[idx].matches(el) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match self.combinators[idx - 1] {
            Combinator::Child => tree
                .parent(node)
                .is_some_and(|parent| self.matches_at(tree, parent, idx - 1)),
            Combinator::Descendant => {
                let mut cursor = tree.parent(node);
                while let Some(ancestor) = cursor {
                    if self.matches_at(tree, ancestor, idx - 1) {
                        return true;
                    }
                    cursor = tree.parent(ancestor);
                }
                false
            }
        }
    }
}

/// A parsed, comma-separated selector list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SelectorList {
    alternatives: Vec<Complex>,
}

impl SelectorList {
    pub(crate) fn parse(selector: &str) -> Result<Self, DomError> {
        Parser::new(selector).parse_list()
    }

    pub(crate) fn matches<T: ElementTree>(&self, tree: &T, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|complex| complex.matches_at(tree, node, complex.parts.len() - 1))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, reason: impl Into<String>) -> DomError {
        DomError::invalid_selector(self.src, reason)
    }

    /// Skip whitespace; report whether any was skipped.
    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        self.pos != start
    }

    fn ident(&mut self) -> Result<String, DomError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.bump();
        }
        if start == self.pos {
            return Err(self.error(format!("expected identifier at offset {start}")));
        }
        Ok(self.src[start..self.pos].to_owned())
    }

    fn parse_list(&mut self) -> Result<SelectorList, DomError> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_ws();
            alternatives.push(self.parse_complex()?);
            match self.bump() {
                None => break,
                Some(',') => continue,
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
            }
        }
        Ok(SelectorList { alternatives })
    }

    /// Parse up to (not including) a `,` or the end of input.
    fn parse_complex(&mut self) -> Result<Complex, DomError> {
        let mut parts = vec![self.parse_compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.bump();
                    self.skip_ws();
                    Combinator::Child
                }
                Some('+' | '~') => return Err(self.error("sibling combinators are not supported")),
                Some(_) if had_ws => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected '{c}'"))),
            };
            if matches!(self.peek(), None | Some(',')) {
                return Err(self.error("dangling combinator"));
            }
            combinators.push(combinator);
            parts.push(self.parse_compound()?);
        }
        Ok(Complex { parts, combinators })
    }

    fn parse_compound(&mut self) -> Result<Compound, DomError> {
        let mut compound = Compound::default();
        let mut universal = false;
        match self.peek() {
            Some('*') => {
                self.bump();
                universal = true;
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    compound.ids.push(self.ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.bump();
                    compound.attrs.push(self.parse_attr()?);
                }
                Some(':') => return Err(self.error("pseudo-classes are not supported")),
                _ => break,
            }
        }
        if compound.is_empty() && !universal {
            return Err(match self.peek() {
                None => self.error("expected a selector"),
                Some(c) => self.error(format!("unexpected '{c}'")),
            });
        }
        Ok(compound)
    }

    fn parse_attr(&mut self) -> Result<AttrTest, DomError> {
        self.skip_ws();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_ws();
        let value = match self.bump() {
            Some(']') => return Ok(AttrTest { name, value: None }),
            Some('=') => {
                self.skip_ws();
                let value = match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.bump();
                        let start = self.pos;
                        while self.peek().is_some_and(|c| c != quote) {
                            self.bump();
                        }
                        if self.bump().is_none() {
                            return Err(self.error("unterminated string"));
                        }
                        self.src[start..self.pos - 1].to_owned()
                    }
                    _ => self.ident()?,
                };
                self.skip_ws();
                value
            }
            Some(c) => return Err(self.error(format!("unsupported attribute operator '{c}'"))),
            None => return Err(self.error("unterminated attribute selector")),
        };
        match self.bump() {
            Some(']') => Ok(AttrTest {
                name,
                value: Some(value),
            }),
            _ => Err(self.error("expected ']'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ElementData;

    /// Parent links plus element data, indexed by node id.
    struct Fixture {
        nodes: Vec<(Option<usize>, Option<ElementData>)>,
    }

    impl Fixture {
        fn push(&mut self, parent: Option<usize>, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
            let mut el = ElementData::new(tag);
            for (name, value) in attrs {
                el.set_attr(name, value);
            }
            self.nodes.push((parent, Some(el)));
            NodeId(self.nodes.len() - 1)
        }
    }

    impl ElementTree for Fixture {
        fn element(&self, node: NodeId) -> Option<&ElementData> {
            self.nodes[node.0].1.as_ref()
        }

        fn parent(&self, node: NodeId) -> Option<NodeId> {
            self.nodes[node.0].0.map(NodeId)
        }
    }

    /// `#document > body > ul.list > li#first.item[data-kind=card] > span`
    fn fixture() -> (Fixture, [NodeId; 4]) {
        let mut fx = Fixture {
            nodes: vec![(None, None)],
        };
        let body = fx.push(Some(0), "body", &[]);
        let ul = fx.push(Some(body.0), "ul", &[("class", "list")]);
        let li = fx.push(
            Some(ul.0),
            "li",
            &[("id", "first"), ("class", "item"), ("data-kind", "card")],
        );
        let span = fx.push(Some(li.0), "span", &[]);
        (fx, [body, ul, li, span])
    }

    fn check(selector: &str, node: NodeId, fx: &Fixture) -> bool {
        SelectorList::parse(selector).unwrap().matches(fx, node)
    }

    #[test]
    fn simple_selectors() {
        let (fx, [_, ul, li, span]) = fixture();
        assert!(check("li", li, &fx));
        assert!(check("LI", li, &fx));
        assert!(check("*", span, &fx));
        assert!(check("#first", li, &fx));
        assert!(check(".item", li, &fx));
        assert!(check("li.item#first", li, &fx));
        assert!(check("ul.list", ul, &fx));
        assert!(!check(".item", ul, &fx));
        assert!(!check("li.missing", li, &fx));
    }

    #[test]
    fn attribute_selectors() {
        let (fx, [_, _, li, _]) = fixture();
        assert!(check("[data-kind]", li, &fx));
        assert!(check("[data-kind=card]", li, &fx));
        assert!(check("[data-kind=\"card\"]", li, &fx));
        assert!(check("li[ data-kind = 'card' ]", li, &fx));
        assert!(!check("[data-kind=row]", li, &fx));
        assert!(!check("[hidden]", li, &fx));
    }

    #[test]
    fn combinators() {
        let (fx, [_, _, li, span]) = fixture();
        assert!(check("ul span", span, &fx));
        assert!(check("body li > span", span, &fx));
        assert!(check("ul > li", li, &fx));
        assert!(!check("ul > span", span, &fx));
        assert!(!check("span li", li, &fx));
    }

    #[test]
    fn descendant_search_backtracks() {
        // The ancestor walk has to continue past ancestors that fail.
        let (fx, [_, _, _, span]) = fixture();
        assert!(check(".list > li span", span, &fx));
        assert!(check("body * span", span, &fx));
    }

    #[test]
    fn selector_lists() {
        let (fx, [_, ul, li, _]) = fixture();
        assert!(check("h1, li", li, &fx));
        assert!(check("h1,ul", ul, &fx));
        assert!(!check("h1, h2", li, &fx));
    }

    #[test]
    fn document_node_never_matches() {
        let (fx, _) = fixture();
        assert!(!check("*", NodeId(0), &fx));
    }

    #[test]
    fn rejects_invalid_syntax() {
        for bad in [
            "", "   ", "div >", "> div", ".", "#", "div,", ",div", "[attr", "[attr=",
            "[a=\"x]", "a:hover", "a + b", "a ~ b", "[a^=x]", "div!",
        ] {
            assert!(
                matches!(SelectorList::parse(bad), Err(DomError::InvalidSelector { .. })),
                "accepted {bad:?}"
            );
        }
    }
}

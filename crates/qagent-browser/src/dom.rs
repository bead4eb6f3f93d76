//! Arena representation of a parsed page. Nodes are addressed by index and
//! point to their parent by index; the root `html` element is node 0.

use std::collections::{BTreeMap, HashMap};

use scraper::{ElementRef, Html};

use qagent_core::error::{Error, Result};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageElement {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    /// Descendant text with whitespace collapsed.
    pub text: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// 1-based position among element siblings with the same tag.
    pub nth_of_type: usize,
}

impl PageElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|v| !v.trim().is_empty())
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attr("class").map(|c| c.split_whitespace().collect()).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct PageTree {
    nodes: Vec<PageElement>,
    parse_errors: usize,
}

fn collapse_text(el: &ElementRef<'_>) -> String {
    let raw: String = el.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl PageTree {
    /// Parses markup into the arena.
    ///
    /// Fails with `Error::PageUnparsable` for empty input, input without any
    /// markup, or a document whose body ends up with no content.
    pub fn parse(html: &str) -> Result<Self> {
        if html.trim().is_empty() {
            return Err(Error::PageUnparsable("page is empty".into()));
        }
        if !html.contains('<') {
            return Err(Error::PageUnparsable("page contains no markup".into()));
        }
        let doc = Html::parse_document(html);
        let mut tree = PageTree { nodes: Vec::new(), parse_errors: doc.errors.len() };

        let mut stack: Vec<(ElementRef<'_>, Option<NodeId>, usize)> = vec![(doc.root_element(), None, 1)];
        while let Some((el, parent, nth)) = stack.pop() {
            let id = tree.nodes.len();
            let value = el.value();
            tree.nodes.push(PageElement {
                tag: value.name().to_string(),
                attrs: value.attrs().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                text: collapse_text(&el),
                parent,
                children: Vec::new(),
                nth_of_type: nth,
            });
            if let Some(p) = parent {
                tree.nodes[p].children.push(id);
            }
            let mut seen: HashMap<&str, usize> = HashMap::new();
            let kids: Vec<(ElementRef<'_>, usize)> = el
                .children()
                .filter_map(ElementRef::wrap)
                .map(|child| {
                    let n = seen.entry(child.value().name()).or_insert(0);
                    *n += 1;
                    (child, *n)
                })
                .collect();
            // Reversed so children are popped, and numbered, in document order.
            for (child, n) in kids.into_iter().rev() {
                stack.push((child, Some(id), n));
            }
        }

        let has_content = tree.find_tag("body").is_some_and(|b| {
            let body = &tree.nodes[b];
            !body.children.is_empty() || !body.text.is_empty()
        });
        if !has_content {
            return Err(Error::PageUnparsable("page has no body content".into()));
        }
        if tree.parse_errors > 0 {
            tracing::debug!(errors = tree.parse_errors, "page parsed with recoveries");
        }
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parse_errors(&self) -> usize {
        self.parse_errors
    }

    pub fn get(&self, id: NodeId) -> Option<&PageElement> {
        self.nodes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &PageElement)> {
        self.nodes.iter().enumerate()
    }

    pub fn find_tag(&self, tag: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.tag == tag)
    }

    pub fn title(&self) -> Option<String> {
        self.find_tag("title").map(|t| self.nodes[t].text.clone()).filter(|t| !t.is_empty())
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.get(id).and_then(|n| n.parent), move |p| self.get(*p).and_then(|n| n.parent))
    }

    /// `(tag, nth-of-type)` segments from the root down to `id`.
    pub fn path_of(&self, id: NodeId) -> Vec<(String, usize)> {
        let mut chain: Vec<NodeId> = self.ancestors(id).collect();
        chain.reverse();
        chain.push(id);
        chain.into_iter().filter_map(|n| self.get(n)).map(|n| (n.tag.clone(), n.nth_of_type)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_keeps_order_parents_and_positions() {
        let tree = PageTree::parse(
            "<html><head><title> Checkout </title></head><body><div><p>a</p><span>b</span><p>c</p></div></body></html>",
        )
        .expect("parse");
        assert_eq!(tree.title().as_deref(), Some("Checkout"));
        let ps: Vec<NodeId> = tree.iter().filter(|(_, n)| n.tag == "p").map(|(i, _)| i).collect();
        assert_eq!(ps.len(), 2);
        let second = tree.get(ps[1]).expect("node");
        assert_eq!(second.nth_of_type, 2);
        assert_eq!(second.text, "c");
        let div = second.parent.expect("parent");
        assert_eq!(tree.get(div).map(|d| d.children.len()), Some(3));
        assert_eq!(
            tree.path_of(ps[1]),
            vec![("html".into(), 1), ("body".into(), 1), ("div".into(), 1), ("p".into(), 2)]
        );
    }

    #[test]
    fn empty_or_markup_free_input_is_rejected() {
        assert!(matches!(PageTree::parse("   "), Err(Error::PageUnparsable(_))));
        assert!(matches!(PageTree::parse("just words"), Err(Error::PageUnparsable(_))));
        assert!(matches!(PageTree::parse("<html><body></body></html>"), Err(Error::PageUnparsable(_))));
    }
}

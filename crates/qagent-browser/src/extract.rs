//! Interactive element extraction with labels and chosen selectors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use qagent_core::error::Result;
use qagent_core::types::{Diagnostic, IssueKind, Locator, SelectorStrategy};

use crate::dom::{NodeId, PageElement, PageTree};
use crate::selector::{candidates, choose, verify, SelectorCandidate, SelectorSpec};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    TextInput,
    Checkbox,
    Radio,
    Select,
    TextArea,
    Button,
    Link,
    /// Non-interactive element with an id and text, used as an assertion target.
    Text,
}

impl ElementKind {
    pub fn accepts_input(self) -> bool {
        matches!(self, ElementKind::TextInput | ElementKind::TextArea | ElementKind::Select)
    }

    pub fn clickable(self) -> bool {
        matches!(self, ElementKind::Button | ElementKind::Link | ElementKind::Checkbox | ElementKind::Radio)
    }
}

const TEXT_TAGS: &[&str] = &[
    "div", "span", "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "td", "strong", "em", "small", "output", "section",
    "label",
];

fn classify(el: &PageElement) -> Option<ElementKind> {
    match el.tag.as_str() {
        "input" => match el.attr("type").map(str::to_ascii_lowercase).as_deref() {
            Some("hidden") => None,
            Some("checkbox") => Some(ElementKind::Checkbox),
            Some("radio") => Some(ElementKind::Radio),
            Some("submit" | "button" | "reset" | "image") => Some(ElementKind::Button),
            _ => Some(ElementKind::TextInput),
        },
        "textarea" => Some(ElementKind::TextArea),
        "select" => Some(ElementKind::Select),
        "button" => Some(ElementKind::Button),
        "a" => Some(ElementKind::Link),
        _ if el.attr("role") == Some("button") => Some(ElementKind::Button),
        tag if TEXT_TAGS.contains(&tag) && el.id().is_some() => Some(ElementKind::Text),
        _ => None,
    }
}

/// An element a step can act on or assert against.
#[derive(Debug, Clone)]
pub struct InteractiveElement {
    pub node: NodeId,
    pub kind: ElementKind,
    pub tag: String,
    /// Human label from `<label for>`, a wrapping label, `aria-label` or the placeholder.
    pub label: Option<String>,
    pub text: String,
    pub locator: Locator,
    pub candidates: Vec<SelectorCandidate>,
}

impl InteractiveElement {
    pub fn strategy(&self) -> SelectorStrategy {
        self.locator.strategy
    }
}

/// Result of parsing a target page.
#[derive(Debug, Clone)]
pub struct PageModel {
    pub tree: PageTree,
    pub title: Option<String>,
    pub elements: Vec<InteractiveElement>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PageModel {
    pub fn parse(html: &str) -> Result<Self> {
        let tree = PageTree::parse(html)?;
        let mut diagnostics = Vec::new();
        if tree.parse_errors() > 0 {
            diagnostics.push(Diagnostic::new(
                IssueKind::PartialParse,
                format!("page parsed with {} recovered error(s)", tree.parse_errors()),
            ));
        }

        let labels_for = label_map(&tree);
        let mut elements = Vec::new();
        for (node, el) in tree.iter() {
            let Some(kind) = classify(el) else {
                continue;
            };
            if kind == ElementKind::Text && el.text.is_empty() {
                continue;
            }
            let cands = candidates(&tree, node);
            let Some(chosen) = choose(&cands).cloned() else {
                continue;
            };
            verify(&tree, &chosen.spec, node)?;
            if matches!(chosen.spec, SelectorSpec::Path(_)) && kind != ElementKind::Text {
                diagnostics.push(
                    Diagnostic::new(
                        IssueKind::SelectorResolution,
                        "no unique id, name or class; using structural path",
                    )
                    .with_subject(chosen.spec.css()),
                );
            }
            elements.push(InteractiveElement {
                node,
                kind,
                tag: el.tag.clone(),
                label: resolve_label(&tree, node, el, &labels_for),
                text: el.text.clone(),
                locator: chosen.spec.to_locator(),
                candidates: cands,
            });
        }
        tracing::debug!(elements = elements.len(), nodes = tree.len(), "page extracted");
        Ok(Self { title: tree.title(), tree, elements, diagnostics })
    }

    pub fn element(&self, node: NodeId) -> Option<&InteractiveElement> {
        self.elements.iter().find(|e| e.node == node)
    }

    /// Locator of the body, used for page-wide text assertions.
    pub fn body_locator(&self) -> Option<Locator> {
        self.tree.find_tag("body").map(|b| SelectorSpec::Path(self.tree.path_of(b)).to_locator())
    }
}

fn label_map(tree: &PageTree) -> HashMap<String, String> {
    tree.iter()
        .filter(|(_, n)| n.tag == "label" && !n.text.is_empty())
        .filter_map(|(_, n)| n.attr("for").map(|f| (f.to_string(), n.text.clone())))
        .collect()
}

fn resolve_label(tree: &PageTree, node: NodeId, el: &PageElement, labels_for: &HashMap<String, String>) -> Option<String> {
    el.id()
        .and_then(|id| labels_for.get(id).cloned())
        .or_else(|| {
            tree.ancestors(node)
                .filter_map(|a| tree.get(a))
                .find(|a| a.tag == "label")
                .map(|a| a.text.clone())
                .filter(|t| !t.is_empty())
        })
        .or_else(|| el.attr("aria-label").map(str::to_string))
        .or_else(|| el.attr("placeholder").map(str::to_string))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_labels_and_text_targets() {
        let page = PageModel::parse(
            r#"<html><head><title>Checkout</title></head><body>
            <label for="email">Email address</label><input id="email" type="email">
            <label>Subscribe <input type="checkbox" name="subscribe"></label>
            <input type="hidden" name="csrf" value="x">
            <input aria-label="Discount code" name="discount">
            <button type="submit">Place order</button>
            <div id="discount-message">Discount applied</div>
            <div class="decor">no id</div>
            </body></html>"#,
        )
        .expect("parse");
        assert_eq!(page.title.as_deref(), Some("Checkout"));
        let kinds: Vec<ElementKind> = page.elements.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ElementKind::TextInput, ElementKind::Checkbox, ElementKind::TextInput, ElementKind::Button, ElementKind::Text]
        );
        assert_eq!(page.elements[0].label.as_deref(), Some("Email address"));
        assert_eq!(page.elements[1].label.as_deref(), Some("Subscribe"));
        assert_eq!(page.elements[2].label.as_deref(), Some("Discount code"));
        assert_eq!(page.elements[4].locator.css, "#discount-message");
    }
}

//! Selector candidates and their uniqueness over the page arena.

use once_cell::sync::Lazy;
use regex::Regex;

use qagent_core::error::{Error, Result};
use qagent_core::types::{Locator, SelectorStrategy};

use crate::dom::{NodeId, PageTree};

static CSS_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[A-Za-z_][A-Za-z0-9_-]*$").expect("ident regex"));

pub fn is_css_identifier(value: &str) -> bool {
    CSS_IDENT.is_match(value)
}

/// Double-quoted CSS string.
pub fn quote_css(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\a ");
    format!("\"{escaped}\"")
}

/// The selector forms the extractor emits. Each can be checked against the
/// arena directly, so uniqueness does not depend on a CSS engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorSpec {
    Id(String),
    Name { tag: String, value: String },
    Class { tag: String, classes: Vec<String> },
    Path(Vec<(String, usize)>),
}

impl SelectorSpec {
    pub fn strategy(&self) -> SelectorStrategy {
        match self {
            SelectorSpec::Id(_) => SelectorStrategy::Identifier,
            SelectorSpec::Name { .. } => SelectorStrategy::Name,
            SelectorSpec::Class { .. } => SelectorStrategy::Class,
            SelectorSpec::Path(_) => SelectorStrategy::StructuralPath,
        }
    }

    pub fn css(&self) -> String {
        match self {
            SelectorSpec::Id(id) if is_css_identifier(id) => format!("#{id}"),
            SelectorSpec::Id(id) => format!("[id={}]", quote_css(id)),
            SelectorSpec::Name { tag, value } => format!("{tag}[name={}]", quote_css(value)),
            SelectorSpec::Class { tag, classes } => {
                let mut css = tag.clone();
                for c in classes {
                    css.push('.');
                    css.push_str(c);
                }
                css
            }
            SelectorSpec::Path(segments) => segments
                .iter()
                .enumerate()
                .map(|(i, (tag, nth))| if i == 0 { tag.clone() } else { format!("{tag}:nth-of-type({nth})") })
                .collect::<Vec<_>>()
                .join(" > "),
        }
    }

    pub fn matches(&self, tree: &PageTree, node: NodeId) -> bool {
        let Some(el) = tree.get(node) else {
            return false;
        };
        match self {
            SelectorSpec::Id(id) => el.attr("id") == Some(id.as_str()),
            SelectorSpec::Name { tag, value } => el.tag == *tag && el.attr("name") == Some(value.as_str()),
            SelectorSpec::Class { tag, classes } => {
                let own = el.classes();
                el.tag == *tag && classes.iter().all(|c| own.contains(&c.as_str()))
            }
            SelectorSpec::Path(segments) => {
                let mut current = Some(node);
                for (i, (tag, nth)) in segments.iter().enumerate().rev() {
                    let Some(n) = current.and_then(|c| tree.get(c)) else {
                        return false;
                    };
                    if n.tag != *tag || (i > 0 && n.nth_of_type != *nth) {
                        return false;
                    }
                    current = n.parent;
                }
                current.is_none()
            }
        }
    }

    /// Every node the selector matches, in document order.
    pub fn select(&self, tree: &PageTree) -> Vec<NodeId> {
        tree.iter().map(|(id, _)| id).filter(|id| self.matches(tree, *id)).collect()
    }

    pub fn to_locator(&self) -> Locator {
        let value = match self {
            SelectorSpec::Id(id) => id.clone(),
            SelectorSpec::Name { value, .. } => value.clone(),
            _ => self.css(),
        };
        Locator { strategy: self.strategy(), css: self.css(), value }
    }
}

/// One way to address an element, with how many arena nodes it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorCandidate {
    pub node: NodeId,
    pub spec: SelectorSpec,
    pub matches: usize,
    /// Higher is more specific; follows strategy priority.
    pub specificity: u32,
}

impl SelectorCandidate {
    pub fn is_unique(&self) -> bool {
        self.matches == 1
    }
}

fn specificity(spec: &SelectorSpec) -> u32 {
    match spec {
        SelectorSpec::Id(_) => 1000,
        SelectorSpec::Name { .. } => 500,
        SelectorSpec::Class { classes, .. } => 100 + classes.len() as u32,
        SelectorSpec::Path(_) => 1,
    }
}

/// All candidates for `node`, in strategy priority order. The structural path
/// is always present and always unique.
pub fn candidates(tree: &PageTree, node: NodeId) -> Vec<SelectorCandidate> {
    let Some(el) = tree.get(node) else {
        return Vec::new();
    };
    let mut specs = Vec::new();
    if let Some(id) = el.id() {
        specs.push(SelectorSpec::Id(id.to_string()));
    }
    if let Some(name) = el.attr("name").filter(|n| !n.trim().is_empty()) {
        specs.push(SelectorSpec::Name { tag: el.tag.clone(), value: name.to_string() });
    }
    let classes = el.classes();
    if !classes.is_empty() && classes.iter().all(|c| is_css_identifier(c)) {
        specs.push(SelectorSpec::Class { tag: el.tag.clone(), classes: classes.iter().map(|c| (*c).to_string()).collect() });
    }
    specs.push(SelectorSpec::Path(tree.path_of(node)));

    specs
        .into_iter()
        .map(|spec| {
            let matches = spec.select(tree).len();
            let specificity = specificity(&spec);
            SelectorCandidate { node, spec, matches, specificity }
        })
        .collect()
}

/// Picks the most specific unique candidate.
pub fn choose(candidates: &[SelectorCandidate]) -> Option<&SelectorCandidate> {
    candidates.iter().filter(|c| c.is_unique()).max_by_key(|c| c.specificity)
}

/// Checks that a chosen selector still addresses exactly `node`.
pub fn verify(tree: &PageTree, spec: &SelectorSpec, node: NodeId) -> Result<()> {
    let hits = spec.select(tree);
    if hits == [node] {
        Ok(())
    } else {
        Err(Error::SelectorResolution(format!("{} matches {} element(s)", spec.css(), hits.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <form>
          <input id="email" name="email" class="field">
          <input name="zip" class="field">
          <input class="field wide">
          <input class="field wide">
        </form>
        <button id="a b">Go</button>
    </body></html>"#;

    fn inputs(tree: &PageTree) -> Vec<NodeId> {
        tree.iter().filter(|(_, n)| n.tag == "input").map(|(i, _)| i).collect()
    }

    #[test]
    fn priority_order_is_respected() {
        let tree = PageTree::parse(PAGE).expect("parse");
        let ids = inputs(&tree);
        let pick = |n| choose(&candidates(&tree, n)).map(|c| c.spec.strategy());
        assert_eq!(pick(ids[0]), Some(SelectorStrategy::Identifier));
        assert_eq!(pick(ids[1]), Some(SelectorStrategy::Name));
        assert_eq!(pick(ids[2]), Some(SelectorStrategy::StructuralPath), "shared classes are not unique");
        assert_eq!(pick(ids[3]), Some(SelectorStrategy::StructuralPath));
    }

    #[test]
    fn awkward_ids_use_attribute_form() {
        let tree = PageTree::parse(PAGE).expect("parse");
        let button = tree.find_tag("button").expect("button");
        let chosen = candidates(&tree, button).into_iter().find(|c| c.is_unique()).expect("unique");
        assert_eq!(chosen.spec.css(), "[id=\"a b\"]");
        verify(&tree, &chosen.spec, button).expect("verify");
    }

    #[test]
    fn structural_path_css_and_match() {
        let tree = PageTree::parse(PAGE).expect("parse");
        let last = *inputs(&tree).last().expect("input");
        let spec = SelectorSpec::Path(tree.path_of(last));
        assert_eq!(spec.css(), "html > body:nth-of-type(1) > form:nth-of-type(1) > input:nth-of-type(4)");
        assert_eq!(spec.select(&tree), vec![last]);
        assert!(verify(&tree, &SelectorSpec::Class { tag: "input".into(), classes: vec!["field".into()] }, last).is_err());
    }
}

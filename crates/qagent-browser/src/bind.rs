//! Binds natural-language steps to actions, target elements and waits.

use once_cell::sync::Lazy;
use regex::Regex;

use qagent_core::types::{Action, Diagnostic, IssueKind, Locator, StepBinding, WaitCondition};

use crate::extract::{ElementKind, InteractiveElement, PageModel};

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)"|“([^”]*)”|'([^']+)'"#).expect("quoted regex"));
static CODE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{2,}[0-9]+[A-Z0-9]*\b").expect("code regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.]+").expect("email regex"));
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s\x22']+").expect("url regex"));
static AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("amount regex"));
static CAMEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("camel regex"));

const NAVIGATE: &[&str] = &["navigate", "open", "go", "visit", "load", "launch", "browse"];
const INPUT: &[&str] = &["enter", "type", "fill", "input", "provide", "set", "write", "select", "choose", "leave"];
const CLICK: &[&str] = &["click", "press", "tap", "submit", "check", "uncheck", "tick", "toggle", "hit"];
const ASSERT: &[&str] = &["verify", "assert", "ensure", "confirm", "expect", "observe", "validate", "see"];
const STATES: &[&str] = &["disabled", "enabled", "checked", "unchecked", "selected"];

const FILLER: &[&str] = &[
    "the", "a", "an", "in", "on", "into", "to", "of", "with", "is", "are", "be", "that", "it", "and", "or", "for",
    "then", "page", "value", "valid", "displayed", "shown", "appears", "visible", "empty", "blank", "field", "button",
    "link", "checkbox", "dropdown", "box", "form", "text", "any", "all", "this", "from", "as", "at", "by", "under",
    "test", "under", "within", "exactly", "beyond", "described", "behaviour", "behavior", "stated", "matches", "result",
];

const SYNONYMS: &[(&str, &[&str])] = &[
    ("discount", &["promo", "coupon", "voucher"]),
    ("coupon", &["discount", "promo", "voucher"]),
    ("promo", &["discount", "coupon"]),
    ("email", &["mail"]),
    ("apply", &["redeem", "use"]),
    ("submit", &["place", "pay", "checkout", "send", "continue"]),
    ("error", &["invalid", "warning", "alert"]),
    ("message", &["msg", "notice", "alert", "status", "feedback"]),
    ("total", &["amount", "sum", "price"]),
    ("name", &["fullname"]),
    ("phone", &["tel", "mobile"]),
];

fn words(text: &str) -> Vec<String> {
    let split = CAMEL.replace_all(text, "$1 $2");
    split.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(str::to_lowercase).collect()
}

fn same_word(a: &str, b: &str) -> bool {
    a == b || (a.len() >= 4 && b.len() >= 4 && (a.starts_with(b) || b.starts_with(a)))
}

fn synonyms(word: &str) -> &'static [&'static str] {
    SYNONYMS.iter().find(|(w, _)| *w == word).map(|(_, s)| *s).unwrap_or(&[])
}

/// Searchable text of an element with a weight per source.
fn descriptors(el: &InteractiveElement, page: &PageModel) -> Vec<(Vec<String>, u32)> {
    let node = page.tree.get(el.node);
    let attr = |name: &str| node.and_then(|n| n.attr(name)).map(words).unwrap_or_default();
    vec![
        (attr("id"), 3),
        (attr("name"), 3),
        (el.label.as_deref().map(words).unwrap_or_default(), 3),
        (words(&el.text), 2),
        (attr("aria-label"), 2),
        (attr("placeholder"), 2),
        (attr("value"), 2),
        (attr("class"), 1),
        (attr("type"), 1),
    ]
}

fn score(el: &InteractiveElement, page: &PageModel, tokens: &[String], quoted: Option<&str>) -> u32 {
    let fields = descriptors(el, page);
    let mut total = 0;
    for token in tokens {
        let direct = fields.iter().filter(|(ws, _)| ws.iter().any(|w| same_word(w, token))).map(|(_, weight)| *weight).max();
        let total_for_token = direct.unwrap_or_else(|| {
            let alt = synonyms(token);
            let hit = fields.iter().any(|(ws, _)| ws.iter().any(|w| alt.iter().any(|a| same_word(w, a))));
            u32::from(hit)
        });
        total += total_for_token;
    }
    if let Some(q) = quoted {
        if !q.is_empty() && el.text.eq_ignore_ascii_case(q) {
            total += 5;
        }
    }
    total
}

fn kind_hint(step_words: &[String]) -> Option<ElementKind> {
    step_words.iter().find_map(|w| match w.as_str() {
        "button" => Some(ElementKind::Button),
        "link" => Some(ElementKind::Link),
        "checkbox" => Some(ElementKind::Checkbox),
        "dropdown" => Some(ElementKind::Select),
        "field" | "box" | "input" => Some(ElementKind::TextInput),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Navigate,
    Input,
    Clear,
    Choose,
    Click,
    Submit,
    AssertText,
    AssertState,
}

fn intent(step_words: &[String]) -> Option<Intent> {
    let mentions_state = step_words.iter().any(|w| STATES.contains(&w.as_str()));
    for (i, w) in step_words.iter().enumerate() {
        let w = w.as_str();
        let next = step_words.get(i + 1).map(String::as_str);
        if ASSERT.contains(&w) || (w == "check" && matches!(next, Some("that" | "if" | "whether"))) {
            return Some(if mentions_state { Intent::AssertState } else { Intent::AssertText });
        }
        if w == "leave" {
            return Some(if mentions_state { Intent::AssertState } else { Intent::Clear });
        }
        if w == "submit" {
            return Some(Intent::Submit);
        }
        if matches!(w, "select" | "choose") {
            return Some(Intent::Choose);
        }
        if INPUT.contains(&w) {
            return Some(Intent::Input);
        }
        if CLICK.contains(&w) {
            return Some(Intent::Click);
        }
        if NAVIGATE.contains(&w) {
            return Some(Intent::Navigate);
        }
    }
    None
}

fn payload(step: &str) -> Option<String> {
    if let Some(caps) = QUOTED.captures(step) {
        return (1..=3).find_map(|i| caps.get(i)).map(|m| m.as_str().to_string());
    }
    if let Some(m) = EMAIL.find(step) {
        return Some(m.as_str().to_string());
    }
    if let Some(m) = CODE_TOKEN.find(step) {
        return Some(m.as_str().to_string());
    }
    AMOUNT.find(step).map(|m| m.as_str().to_string())
}

fn state_word(step_words: &[String]) -> Option<String> {
    step_words.iter().find(|w| STATES.contains(&w.as_str())).cloned()
}

/// Per-step binding against one parsed page.
pub struct StepBinder<'a> {
    page: &'a PageModel,
    base_url: &'a str,
}

impl<'a> StepBinder<'a> {
    pub fn new(page: &'a PageModel, base_url: &'a str) -> Self {
        Self { page, base_url }
    }

    fn best<F>(&self, tokens: &[String], hint: Option<ElementKind>, quoted: Option<&str>, allowed: F) -> Option<&'a InteractiveElement>
    where
        F: Fn(ElementKind) -> bool,
    {
        let pool: Vec<&'a InteractiveElement> = self.page.elements.iter().filter(|e| allowed(e.kind)).collect();
        let mut best: Option<(&'a InteractiveElement, u32)> = None;
        for &el in &pool {
            let mut s = score(el, self.page, tokens, quoted) * 2;
            if hint == Some(el.kind) {
                s += 1;
            }
            // Strictly greater keeps the earliest element on ties.
            if s >= 2 && best.map_or(true, |(_, b)| s > b) {
                best = Some((el, s));
            }
        }
        if best.is_none() {
            if let Some(kind) = hint {
                let same: Vec<&'a InteractiveElement> = pool.iter().copied().filter(|e| e.kind == kind).collect();
                if same.len() == 1 {
                    return Some(same[0]);
                }
            }
        }
        best.map(|(el, _)| el)
    }

    /// Explicit `type="submit"` first, then a button named like a submit
    /// action, then the only button on the page.
    fn submit_target(&self) -> Option<&'a InteractiveElement> {
        let explicit = self.page.elements.iter().find(|e| {
            e.kind == ElementKind::Button
                && self.page.tree.get(e.node).and_then(|n| n.attr("type")).is_some_and(|t| t.eq_ignore_ascii_case("submit"))
        });
        explicit.or_else(|| self.best(&["submit".to_string()], Some(ElementKind::Button), None, |k| k == ElementKind::Button))
    }

    pub fn bind(&self, index: usize, step: &str) -> StepBinding {
        let step_words = words(step);
        let tokens: Vec<String> = step_words
            .iter()
            .filter(|w| {
                !FILLER.contains(&w.as_str())
                    && !NAVIGATE.contains(&w.as_str())
                    && !INPUT.contains(&w.as_str())
                    && !CLICK.contains(&w.as_str())
                    && !ASSERT.contains(&w.as_str())
                    && !STATES.contains(&w.as_str())
                    && !w.chars().all(|c| c.is_ascii_digit())
            })
            .cloned()
            .collect();
        let hint = kind_hint(&step_words);
        let quoted = payload(step);

        let unresolved = |note: &str| StepBinding {
            index,
            step: step.to_string(),
            action: None,
            target: None,
            wait: None,
            value: None,
            note: Some(note.to_string()),
        };
        let bound = |action: Action, target: Option<Locator>, wait: WaitCondition, value: Option<String>| StepBinding {
            index,
            step: step.to_string(),
            action: Some(action),
            target,
            wait: Some(wait),
            value,
            note: None,
        };

        let Some(intent) = intent(&step_words) else {
            return unresolved("no recognised action verb");
        };
        match intent {
            Intent::Navigate => {
                let url = URL.find(step).map_or_else(|| self.base_url.to_string(), |m| m.as_str().to_string());
                bound(Action::Navigate, None, WaitCondition::PageLoaded, Some(url))
            }
            Intent::Input | Intent::Clear | Intent::Choose => {
                let allowed = |k: ElementKind| if intent == Intent::Choose { k == ElementKind::Select } else { k.accepts_input() };
                let hint = if intent == Intent::Choose { Some(ElementKind::Select) } else { hint };
                match self.best(&tokens, hint, None, allowed) {
                    Some(el) => {
                        let value = if intent == Intent::Clear { Some(String::new()) } else { quoted };
                        if value.is_none() {
                            return unresolved("no value to enter");
                        }
                        bound(Action::Input, Some(el.locator.clone()), WaitCondition::Visible, value)
                    }
                    None => unresolved("no matching input element"),
                }
            }
            Intent::Click => match self.best(&tokens, hint, quoted.as_deref(), ElementKind::clickable) {
                Some(el) => bound(Action::Click, Some(el.locator.clone()), WaitCondition::Clickable, None),
                None => unresolved("no matching clickable element"),
            },
            Intent::Submit => match self.submit_target() {
                Some(el) => bound(Action::Click, Some(el.locator.clone()), WaitCondition::Clickable, None),
                None => unresolved("no submit control on the page"),
            },
            Intent::AssertState => {
                let allowed = |k: ElementKind| k != ElementKind::Text && k != ElementKind::Link;
                match (self.best(&tokens, hint, None, allowed), state_word(&step_words)) {
                    (Some(el), Some(state)) => {
                        bound(Action::AssertState, Some(el.locator.clone()), WaitCondition::Present, Some(state))
                    }
                    _ => unresolved("no element for the state assertion"),
                }
            }
            Intent::AssertText => {
                let target = self
                    .best(&tokens, Some(ElementKind::Text), None, |k| k == ElementKind::Text)
                    .map(|el| el.locator.clone());
                let quoted_text = QUOTED.is_match(step).then(|| quoted.clone()).flatten();
                match (target, quoted_text) {
                    (Some(t), Some(v)) => bound(Action::AssertText, Some(t), WaitCondition::TextPresent, Some(v)),
                    (Some(t), None) => bound(Action::AssertText, Some(t), WaitCondition::Visible, None),
                    (None, Some(v)) => {
                        bound(Action::AssertText, self.page.body_locator(), WaitCondition::TextPresent, Some(v))
                    }
                    (None, None) => unresolved("no element or text to assert"),
                }
            }
        }
    }

    /// Binds every step; one `UnresolvedStep` diagnostic per step left unbound.
    pub fn bind_all(&self, steps: &[String]) -> (Vec<StepBinding>, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let bindings: Vec<StepBinding> = steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let b = self.bind(i + 1, step);
                if !b.is_resolved() {
                    let note = b.note.clone().unwrap_or_default();
                    diagnostics.push(
                        Diagnostic::new(IssueKind::UnresolvedStep, format!("{note}: {step}")).with_subject(format!("step {}", i + 1)),
                    );
                }
                b
            })
            .collect();
        (bindings, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <input id="discount-code" placeholder="Discount code">
        <button id="apply-discount" class="btn">Apply</button>
        <label for="terms">I accept the terms</label><input type="checkbox" id="terms">
        <select id="country"><option>NL</option></select>
        <div id="discount-error">Invalid code</div>
        <div id="order-total">$90.00</div>
        <button type="submit" class="btn">Place order</button>
    </body></html>"#;

    fn bind(step: &str) -> StepBinding {
        let page = PageModel::parse(PAGE).expect("parse");
        StepBinder::new(&page, "http://localhost/checkout.html").bind(1, step)
    }

    #[test]
    fn intents_and_targets() {
        let b = bind("Enter \"SAVE10\" in the discount code field");
        assert_eq!(b.action, Some(Action::Input));
        assert_eq!(b.target.map(|t| t.css), Some("#discount-code".into()));
        assert_eq!(b.value.as_deref(), Some("SAVE10"));

        let b = bind("Click the apply button");
        assert_eq!(b.target.map(|t| t.css), Some("#apply-discount".into()));
        assert_eq!(b.wait, Some(WaitCondition::Clickable));

        let b = bind("Submit the form");
        assert_eq!(b.action, Some(Action::Click));
        assert!(b.target.is_some_and(|t| t.css.contains("button")));

        let b = bind("Verify an error message is displayed");
        assert_eq!(b.action, Some(Action::AssertText));
        assert_eq!(b.target.map(|t| t.css), Some("#discount-error".into()));

        let b = bind("Open the checkout page");
        assert_eq!(b.action, Some(Action::Navigate));
        assert_eq!(b.value.as_deref(), Some("http://localhost/checkout.html"));

        let b = bind("Verify the terms checkbox is checked");
        assert_eq!(b.action, Some(Action::AssertState));
        assert_eq!(b.value.as_deref(), Some("checked"));

        let b = bind("Select \"NL\" from the country dropdown");
        assert_eq!(b.target.map(|t| t.css), Some("#country".into()));
    }

    #[test]
    fn unknown_steps_stay_unresolved() {
        let b = bind("Wait for the moon to rise");
        assert!(!b.is_resolved());
        assert!(b.note.is_some());
        let b = bind("Click the teleport lever");
        assert!(!b.is_resolved());
    }
}

//! Renders bound steps as a Python Selenium `unittest` module.
//!
//! Every interaction is preceded by an explicit `WebDriverWait` condition.
//! Steps without a binding become commented placeholders so the rest of the
//! script stays runnable.

use qagent_core::types::{Action, Locator, SelectorStrategy, StepBinding, TestCase, WaitCondition, NOT_SPECIFIED};

const INDENT: &str = "        ";

/// Python string literal. JSON string escaping is valid Python.
fn py_str(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn docstring_text(value: &str) -> String {
    value.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"")
}

fn one_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn feature_words(case: &TestCase) -> Vec<String> {
    if case.feature.trim().is_empty() || case.feature == NOT_SPECIFIED {
        return vec!["case".to_string()];
    }
    let words: Vec<String> = case
        .feature
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    if words.is_empty() {
        vec!["case".to_string()]
    } else {
        words
    }
}

fn safe_id(case: &TestCase) -> String {
    let id: String = case.id.chars().filter(char::is_ascii_alphanumeric).collect();
    if id.is_empty() {
        "TC000".to_string()
    } else {
        id
    }
}

/// `test_<id>_<feature_snake>.py`
pub fn script_filename(case: &TestCase) -> String {
    format!("test_{}_{}.py", safe_id(case).to_ascii_lowercase(), feature_words(case).join("_"))
}

pub fn class_name(case: &TestCase) -> String {
    let camel: String = feature_words(case)
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| first.to_ascii_uppercase().to_string() + chars.as_str())
        })
        .collect();
    format!("Test{}{camel}", safe_id(case).to_ascii_uppercase())
}

fn by(locator: &Locator) -> String {
    match locator.strategy {
        SelectorStrategy::Identifier => format!("(By.ID, {})", py_str(&locator.value)),
        _ => format!("(By.CSS_SELECTOR, {})", py_str(&locator.css)),
    }
}

fn condition(wait: WaitCondition, locator: &str) -> String {
    match wait {
        WaitCondition::Visible | WaitCondition::TextPresent => format!("EC.visibility_of_element_located({locator})"),
        WaitCondition::Clickable => format!("EC.element_to_be_clickable({locator})"),
        WaitCondition::Present | WaitCondition::PageLoaded => format!("EC.presence_of_element_located({locator})"),
    }
}

fn placeholder(lines: &mut Vec<String>, note: &str) {
    lines.push(format!("{INDENT}# UNRESOLVED: {}", one_line(note)));
}

/// Statement lines for one binding, without the leading step comment.
fn step_lines(binding: &StepBinding, lines: &mut Vec<String>) {
    let Some(action) = binding.action else {
        placeholder(lines, binding.note.as_deref().unwrap_or("step could not be bound"));
        return;
    };
    let wait = binding.wait.unwrap_or(WaitCondition::Present);
    if action == Action::Navigate {
        let url = binding.value.as_deref().unwrap_or_default();
        lines.push(format!("{INDENT}self.driver.get({})", py_str(url)));
        lines.push(format!(
            "{INDENT}self.wait.until(lambda d: d.execute_script(\"return document.readyState\") == \"complete\")"
        ));
        return;
    }
    let Some(target) = binding.target.as_ref() else {
        placeholder(lines, &format!("no target element for {}", action.name()));
        return;
    };
    let loc = by(target);
    match action {
        Action::Navigate => {}
        Action::Input => {
            let value = binding.value.as_deref().unwrap_or_default();
            lines.push(format!("{INDENT}element = self.wait.until({})", condition(wait, &loc)));
            lines.push(format!("{INDENT}self.fill(element, {})", py_str(value)));
        }
        Action::Click => {
            lines.push(format!("{INDENT}self.wait.until({}).click()", condition(WaitCondition::Clickable, &loc)));
        }
        Action::AssertText => match binding.value.as_deref() {
            Some(text) if !text.is_empty() => {
                lines.push(format!(
                    "{INDENT}self.assertTrue(self.wait.until(EC.text_to_be_present_in_element({loc}, {})))",
                    py_str(text)
                ));
            }
            _ => {
                lines.push(format!("{INDENT}element = self.wait.until({})", condition(WaitCondition::Visible, &loc)));
                lines.push(format!("{INDENT}self.assertTrue(element.text.strip())"));
            }
        },
        Action::AssertState => {
            lines.push(format!("{INDENT}element = self.wait.until({})", condition(wait, &loc)));
            let check = match binding.value.as_deref().unwrap_or_default() {
                "disabled" => "self.assertFalse(element.is_enabled())",
                "enabled" => "self.assertTrue(element.is_enabled())",
                "unchecked" => "self.assertFalse(element.is_selected())",
                "checked" | "selected" => "self.assertTrue(element.is_selected())",
                other => {
                    placeholder(lines, &format!("unknown state {other:?}"));
                    return;
                }
            };
            lines.push(format!("{INDENT}{check}"));
        }
    }
}

/// Full module source for `case` with its bindings.
pub fn render_script(case: &TestCase, bindings: &[StepBinding], base_url: &str, wait_secs: u64) -> String {
    let mut lines: Vec<String> = vec![
        "import unittest".into(),
        String::new(),
        "from selenium import webdriver".into(),
        "from selenium.webdriver.common.by import By".into(),
        "from selenium.webdriver.support import expected_conditions as EC".into(),
        "from selenium.webdriver.support.ui import Select, WebDriverWait".into(),
        String::new(),
        format!("BASE_URL = {}", py_str(base_url)),
        format!("WAIT_SECONDS = {wait_secs}"),
        String::new(),
        String::new(),
        format!("class {}(unittest.TestCase):", class_name(case)),
        format!("    \"\"\"{}: {}", safe_id(case), docstring_text(&one_line(&case.scenario))),
        String::new(),
        format!("    Feature: {}", docstring_text(&one_line(&case.feature))),
        format!("    Expected: {}", docstring_text(&one_line(&case.expected_result))),
        format!("    Grounded in: {}", docstring_text(&one_line(&case.grounded_in))),
        "    \"\"\"".into(),
        String::new(),
        "    def setUp(self):".into(),
        "        self.driver = webdriver.Chrome()".into(),
        "        self.wait = WebDriverWait(self.driver, WAIT_SECONDS)".into(),
        String::new(),
        "    def tearDown(self):".into(),
        "        self.driver.quit()".into(),
        String::new(),
        "    def fill(self, element, value):".into(),
        "        if element.tag_name == \"select\":".into(),
        "            Select(element).select_by_visible_text(value)".into(),
        "            return".into(),
        "        element.clear()".into(),
        "        if value:".into(),
        "            element.send_keys(value)".into(),
        String::new(),
        format!("    def test_{}(self):", safe_id(case).to_ascii_lowercase()),
        format!("{INDENT}\"\"\"{}\"\"\"", docstring_text(&one_line(&case.scenario))),
    ];
    for binding in bindings {
        lines.push(format!("{INDENT}# Step {}: {}", binding.index, one_line(&binding.step)));
        step_lines(binding, &mut lines);
    }
    lines.extend([
        String::new(),
        String::new(),
        "if __name__ == \"__main__\":".into(),
        "    unittest.main()".into(),
        String::new(),
    ]);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use qagent_core::types::Category;

    fn case(feature: &str) -> TestCase {
        TestCase {
            id: "TC007".into(),
            feature: feature.into(),
            scenario: "Valid: SAVE10 provides $10.00 off".into(),
            steps: vec![],
            expected_result: "SAVE10 provides $10.00 off".into(),
            grounded_in: "rules.md".into(),
            category: Category::Positive,
            notes: String::new(),
        }
    }

    #[test]
    fn names_follow_id_and_feature() {
        assert_eq!(script_filename(&case("Discount Code")), "test_tc007_discount_code.py");
        assert_eq!(class_name(&case("Discount Code")), "TestTC007DiscountCode");
        assert_eq!(script_filename(&case(NOT_SPECIFIED)), "test_tc007_case.py");
    }

    #[test]
    fn locators_and_placeholders() {
        let bindings = vec![
            StepBinding {
                index: 1,
                step: "Click apply".into(),
                action: Some(Action::Click),
                target: Some(Locator {
                    strategy: SelectorStrategy::Identifier,
                    css: "#apply".into(),
                    value: "apply".into(),
                }),
                wait: Some(WaitCondition::Clickable),
                value: None,
                note: None,
            },
            StepBinding {
                index: 2,
                step: "Ponder".into(),
                action: None,
                target: None,
                wait: None,
                value: None,
                note: Some("no recognised action verb".into()),
            },
        ];
        let src = render_script(&case("Discount Code"), &bindings, "http://localhost/", 5);
        assert!(src.contains("self.wait.until(EC.element_to_be_clickable((By.ID, \"apply\"))).click()"));
        assert!(src.contains("# Step 2: Ponder\n        # UNRESOLVED: no recognised action verb"));
        assert!(src.contains("WAIT_SECONDS = 5"));
        assert!(!src.contains("sleep"));
    }
}

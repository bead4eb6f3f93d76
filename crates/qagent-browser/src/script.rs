use serde::{Deserialize, Serialize};

use qagent_core::config::ScriptSettings;
use qagent_core::error::{Error, Result};
use qagent_core::types::{Diagnostic, GeneratedScript, TestCase};

use crate::bind::StepBinder;
use crate::extract::PageModel;
use crate::render::{render_script, script_filename};

/// A generated script plus what went wrong on the way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Synthesis {
    pub script: GeneratedScript,
    pub diagnostics: Vec<Diagnostic>,
    pub page_title: Option<String>,
}

impl Synthesis {
    pub fn unresolved_steps(&self) -> usize {
        self.script.bindings.iter().filter(|b| !b.is_resolved()).count()
    }
}

#[derive(Debug, Clone)]
pub struct ScriptSynthesizer {
    base_url: String,
    wait_secs: u64,
}

impl ScriptSynthesizer {
    pub fn new(base_url: impl Into<String>, wait_secs: u64) -> Self {
        Self { base_url: base_url.into(), wait_secs }
    }

    pub fn from_settings(settings: &ScriptSettings) -> Self {
        Self::new(settings.base_url.clone(), settings.wait_secs)
    }

    /// Parses `page_html` and binds every step of `case` against it.
    ///
    /// Only an unparsable page or a case without steps is an error; steps
    /// that cannot be bound are rendered as placeholders and reported.
    pub fn synthesize(&self, case: &TestCase, page_html: &str) -> Result<Synthesis> {
        let page = PageModel::parse(page_html)?;
        self.synthesize_page(case, &page)
    }

    pub fn synthesize_page(&self, case: &TestCase, page: &PageModel) -> Result<Synthesis> {
        if case.steps.iter().all(|s| s.trim().is_empty()) {
            return Err(Error::InvalidInput(format!("test case {} has no steps", case.id)));
        }
        let steps: Vec<String> = case.steps.iter().filter(|s| !s.trim().is_empty()).cloned().collect();
        let (bindings, unresolved) = StepBinder::new(page, &self.base_url).bind_all(&steps);

        let mut diagnostics = page.diagnostics.clone();
        diagnostics.extend(unresolved);
        let source = render_script(case, &bindings, &self.base_url, self.wait_secs);
        let script = GeneratedScript {
            test_case_id: case.id.clone(),
            filename: script_filename(case),
            bindings,
            source,
        };
        let synthesis = Synthesis { script, diagnostics, page_title: page.title.clone() };
        tracing::info!(
            case = %case.id,
            steps = steps.len(),
            unresolved = synthesis.unresolved_steps(),
            "script synthesized"
        );
        Ok(synthesis)
    }
}

impl Default for ScriptSynthesizer {
    fn default() -> Self {
        Self::from_settings(&ScriptSettings::default())
    }
}

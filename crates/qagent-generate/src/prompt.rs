use qagent_core::types::{EvidenceContext, NOT_SPECIFIED};

pub fn system_prompt() -> String {
    format!(
        "You are a QA engineer writing test cases for a web application. \
         You only use facts stated in the EVIDENCE block. \
         If a value (amount, limit, message, field name) is not stated in the evidence, \
         write \"{NOT_SPECIFIED}\" for that field instead of guessing. \
         Output that cannot be traced to the evidence is treated as a violation and discarded."
    )
}

/// Renders the evidence block with stable `[E<n>]` labels and source names.
pub fn render_evidence(evidence: &EvidenceContext) -> String {
    let mut out = String::new();
    for entry in &evidence.entries {
        out.push_str(&format!("[{}] source: {}\n{}\n\n", entry.label, entry.chunk.doc_id, entry.chunk.text.trim()));
    }
    out
}

pub fn build_prompt(query: &str, evidence: &EvidenceContext, max_cases: usize) -> String {
    format!(
        "EVIDENCE:\n{evidence}\
         REQUEST: {query}\n\n\
         RULES:\n\
         1. Use only the evidence above. Do not invent features, amounts, messages or fields.\n\
         2. Copy figures (prices, percentages, limits) exactly as written in the evidence.\n\
         3. Grounded_In must be the source name of the evidence entry you used (for example {example}).\n\
         4. Any field the evidence does not support must be \"{NOT_SPECIFIED}\".\n\
         5. Write at most {max_cases} test cases covering Positive, Negative and Edge behaviour where the evidence allows.\n\n\
         Respond with a JSON array only, no prose. Each element has exactly these keys:\n\
         {{\"Test_ID\": \"TC001\", \"Feature\": \"...\", \"Test_Scenario\": \"...\", \
         \"Steps\": [\"step 1\", \"step 2\"], \"Expected_Result\": \"...\", \
         \"Grounded_In\": \"<source>\", \"Type\": \"Positive|Negative|Edge\", \"Notes\": \"...\"}}\n",
        evidence = render_evidence(evidence),
        example = evidence.documents().first().copied().unwrap_or("document.md"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use qagent_core::types::{Chunk, EvidenceEntry};

    #[test]
    fn prompt_lists_labelled_evidence_and_schema() {
        let ev = EvidenceContext {
            query: "discount".into(),
            entries: vec![EvidenceEntry {
                label: "E1".into(),
                chunk: Chunk {
                    id: "rules.md#0".into(),
                    doc_id: "rules.md".into(),
                    seq: 0,
                    text: "SAVE10 provides $10.00 off".into(),
                    char_start: 0,
                    char_end: 26,
                },
                score: 0.9,
            }],
            ..Default::default()
        };
        let prompt = build_prompt("discount code rules", &ev, 5);
        assert!(prompt.contains("[E1] source: rules.md\nSAVE10 provides $10.00 off"));
        assert!(prompt.contains("\"Expected_Result\""));
        assert!(prompt.contains("at most 5"));
        assert!(system_prompt().contains(NOT_SPECIFIED));
    }
}

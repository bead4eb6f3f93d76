use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;

use qagent_core::config::GenerationSettings;
use qagent_core::retry::RetryPolicy;
use qagent_core::types::{Category, Chunk, EvidenceContext, EvidenceEntry, IssueKind, TestCase, NOT_SPECIFIED};
use qagent_generate::{
    CompletionProvider, CompletionRequest, FallbackGenerator, GroundingValidator, ModelBackedGenerator,
    RuleBasedGenerator, Strategy, TestCaseGenerator,
};

const RULES: &str = "Discount codes\nSAVE10 provides $10.00 off the order total.\nInvalid codes show an error message.";

fn evidence(chunks: &[(&str, &str)]) -> EvidenceContext {
    EvidenceContext {
        query: "discount code rules".into(),
        entries: chunks
            .iter()
            .enumerate()
            .map(|(i, (doc, text))| EvidenceEntry {
                label: format!("E{}", i + 1),
                chunk: Chunk {
                    id: Chunk::make_id(doc, i),
                    doc_id: (*doc).to_string(),
                    seq: i,
                    text: (*text).to_string(),
                    char_start: 0,
                    char_end: text.chars().count(),
                },
                score: 1.0 - i as f32 * 0.1,
            })
            .collect(),
        char_budget: 6000,
        truncated: 0,
        deduplicated: 0,
    }
}

struct StaticProvider {
    payload: String,
    calls: AtomicU32,
}

impl StaticProvider {
    fn new(payload: &str) -> Arc<Self> {
        Arc::new(Self { payload: payload.to_string(), calls: AtomicU32::new(0) })
    }
}

#[async_trait]
impl CompletionProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.clone())
    }
}

struct StuckProvider {
    calls: AtomicU32,
}

#[async_trait]
impl CompletionProvider for StuckProvider {
    fn name(&self) -> &'static str {
        "stuck"
    }

    async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("[]".into())
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(20), 3, Duration::from_millis(1))
}

fn model(provider: Arc<dyn CompletionProvider>) -> ModelBackedGenerator {
    ModelBackedGenerator::new(provider, &GenerationSettings::default()).with_policy(fast_policy())
}

fn chained(provider: Arc<dyn CompletionProvider>) -> FallbackGenerator {
    FallbackGenerator::new(Arc::new(model(provider)), RuleBasedGenerator::new(10))
}

#[tokio::test]
async fn model_amounts_are_grounded_or_not_specified() {
    let payload = r#"```json
[
 {"Test_ID":"1","Feature":"Discount codes","Test_Scenario":"Apply discount code SAVE10",
  "Steps":["Enter SAVE10 in the discount code field","Click apply"],
  "Expected_Result":"SAVE10 provides $15.00 off the order total","Grounded_In":"rules.md","Type":"Positive","Notes":""},
 {"Test_ID":"2","Feature":"Discount codes","Test_Scenario":"Apply discount code SAVE10 to the order",
  "Steps":["Enter SAVE10"],"Expected_Result":"SAVE10 provides $10.00 off the order total",
  "Grounded_In":"E1","Type":"Positive","Notes":"Free shipping included"}
]
```"#;
    let ev = evidence(&[("rules.md", RULES)]);
    let out = model(StaticProvider::new(payload)).generate("discount code rules", &ev).await.expect("generate");

    assert_eq!(out.strategy, Strategy::ModelBacked);
    assert_eq!(out.test_cases.len(), 2);
    for tc in &out.test_cases {
        assert!(
            tc.expected_result == NOT_SPECIFIED || tc.expected_result.contains("$10.00"),
            "unexpected amount: {}",
            tc.expected_result
        );
        assert!(!tc.expected_result.contains("$15"));
        assert_eq!(tc.grounded_in, "rules.md");
    }
    assert_eq!(out.test_cases[0].id, "TC001");
    assert_eq!(out.test_cases[0].expected_result, NOT_SPECIFIED);
    assert_eq!(out.test_cases[1].notes, NOT_SPECIFIED, "free shipping is not in evidence");
    assert!(out.diagnostics.iter().any(|d| d.kind == IssueKind::UngroundedContent));
}

#[tokio::test]
async fn rule_based_discount_cases_quote_the_evidence() {
    let ev = evidence(&[("rules.md", RULES)]);
    let out = RuleBasedGenerator::new(10).generate("discount code rules", &ev).await.expect("generate");

    assert_eq!(out.strategy, Strategy::RuleBased);
    assert_eq!(out.test_cases.len(), 2, "{:#?}", out.test_cases);
    let positive = &out.test_cases[0];
    assert_eq!(positive.expected_result, "SAVE10 provides $10.00 off the order total.");
    assert_eq!(positive.feature, "Discount Code");
    assert!(positive.steps.iter().any(|s| s.contains("SAVE10")));
    let negative = &out.test_cases[1];
    assert_eq!(negative.expected_result, "Invalid codes show an error message.");
    assert_eq!(negative.id, "TC002");
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
}

#[tokio::test]
async fn repeated_timeouts_fall_back_to_rules() {
    let stuck = Arc::new(StuckProvider { calls: AtomicU32::new(0) });
    let ev = evidence(&[("rules.md", RULES)]);
    let out = chained(stuck.clone()).generate("discount code rules", &ev).await.expect("generate");

    assert_eq!(stuck.calls.load(Ordering::SeqCst), 3);
    assert_eq!(out.strategy, Strategy::RuleBased);
    assert!(!out.test_cases.is_empty());
    assert_eq!(out.diagnostics[0].kind, IssueKind::GenerationTimeout);

    let json = serde_json::to_value(&out.test_cases).expect("serialize");
    for item in json.as_array().expect("array") {
        for key in ["Test_ID", "Feature", "Test_Scenario", "Steps", "Expected_Result", "Grounded_In", "Type", "Notes"] {
            assert!(item.get(key).is_some(), "missing {key}");
        }
        assert!(matches!(item["Type"].as_str(), Some("Positive" | "Negative" | "Edge")));
    }
}

#[tokio::test]
async fn unusable_payload_falls_back_with_schema_diagnostic() {
    let ev = evidence(&[("rules.md", RULES)]);
    let out = chained(StaticProvider::new("Sorry, I can't do that.")).generate("discount", &ev).await.expect("generate");
    assert_eq!(out.strategy, Strategy::RuleBased);
    assert_eq!(out.diagnostics[0].kind, IssueKind::SchemaValidation);
    assert!(!out.test_cases.is_empty());
}

#[tokio::test]
async fn fully_fabricated_output_falls_back() {
    let payload = r#"[{"Feature":"Loyalty points","Test_Scenario":"Redeem 500 loyalty points",
        "Steps":["Redeem points"],"Expected_Result":"Balance drops by 500 points","Type":"Positive"}]"#;
    let ev = evidence(&[("rules.md", RULES)]);
    let out = chained(StaticProvider::new(payload)).generate("discount", &ev).await.expect("generate");
    assert_eq!(out.strategy, Strategy::RuleBased);
    assert!(out.diagnostics.iter().any(|d| d.kind == IssueKind::UngroundedContent));
    assert!(out.diagnostics.iter().any(|d| d.kind == IssueKind::GenerationFailed));
    assert!(out.test_cases.iter().all(|tc| !tc.feature.contains("Loyalty")));
}

#[tokio::test]
async fn empty_evidence_never_calls_the_provider() {
    let provider = StaticProvider::new("[]");
    let out = chained(provider.clone()).generate("anything", &EvidenceContext::default()).await.expect("generate");
    assert!(out.test_cases.is_empty());
    assert_eq!(out.diagnostics.len(), 1);
    assert_eq!(out.diagnostics[0].kind, IssueKind::NoEvidence);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn limits_and_requirements_produce_edge_and_negative_cases() {
    let ev = evidence(&[
        ("shipping.md", "Free shipping applies to orders over $50."),
        ("form.html", "The email field is required.\nAn error message appears when the email is missing."),
    ]);
    let out = RuleBasedGenerator::new(10).generate("shipping and email", &ev).await.expect("generate");
    let kinds: Vec<_> = out.test_cases.iter().map(|tc| tc.category).collect();
    assert!(kinds.contains(&qagent_core::types::Category::Edge));
    let email_negative = out
        .test_cases
        .iter()
        .find(|tc| tc.steps.iter().any(|s| s == "Leave the email field empty"))
        .expect("email negative case");
    assert_eq!(email_negative.expected_result, "An error message appears when the email is missing.");
    assert_eq!(email_negative.grounded_in, "form.html");
}

#[tokio::test]
async fn max_cases_caps_the_batch() {
    let text = "CODE10 gives $10 off.\nCODE20 gives $20 off.\nCODE30 gives $30 off.";
    let ev = evidence(&[("codes.md", text)]);
    let out = RuleBasedGenerator::new(3).generate("codes", &ev).await.expect("generate");
    assert_eq!(out.test_cases.len(), 3);
    assert_eq!(out.test_cases.last().map(|t| t.id.as_str()), Some("TC003"));
}

fn claim(expected: &str) -> TestCase {
    TestCase {
        id: "TC001".into(),
        feature: "Discount codes".into(),
        scenario: "Apply a discount code".into(),
        steps: vec!["Enter the code".into()],
        expected_result: expected.into(),
        grounded_in: "rules.md".into(),
        category: Category::Positive,
        notes: String::new(),
    }
}

#[test]
fn figure_collisions_are_not_grounded() {
    let ev = evidence(&[(
        "rules.md",
        "Discount codes apply to the order. SAVE10 provides $10.00 off orders over $100. Limit 5 codes per customer.",
    )]);
    let validator = GroundingValidator::default();
    for invented in [
        "SAVE10 provides $5 off",
        "SAVE10 provides $1",
        "SAVE10 provides 10% off orders",
        "Limit 5% codes per customer",
    ] {
        let mut tc = claim(invented);
        let issues = validator.enforce(&mut tc, &ev);
        assert_eq!(tc.expected_result, NOT_SPECIFIED, "{invented} passed grounding");
        assert!(issues.iter().any(|d| d.subject.as_deref() == Some("TC001.Expected_Result")));
    }
    let mut exact = claim("SAVE10 provides $10.00 off orders over $100");
    assert!(validator.enforce(&mut exact, &ev).is_empty());
    assert_eq!(exact.expected_result, "SAVE10 provides $10.00 off orders over $100");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn altered_evidence_figures_become_not_specified(
        amount in 2u32..1000,
        limit in 1u32..20,
        shape in 0usize..4,
    ) {
        let text = format!(
            "Discount codes apply to the order. SAVE10 provides ${amount}.00 off orders. Limit {limit} codes per customer."
        );
        let ev = evidence(&[("rules.md", text.as_str())]);
        let altered = match shape {
            0 => format!("SAVE10 provides ${}.00 off orders", amount + 1),
            1 => format!("SAVE10 provides ${} off orders", amount / 10),
            2 => format!("SAVE10 provides {amount}% off orders"),
            _ => format!("SAVE10 provides ${}.00 off orders", amount * 10),
        };
        let mut tc = claim(&altered);
        GroundingValidator::default().enforce(&mut tc, &ev);
        prop_assert_eq!(tc.expected_result.as_str(), NOT_SPECIFIED, "kept {}", altered);
    }

    #[test]
    fn rule_based_output_is_already_grounded(
        code in "[A-Z]{3,5}[0-9]{1,2}",
        amount in 1u32..500,
        extra in prop::sample::select(vec!["The email field is required.", "Orders over $75 ship free.", "Invalid codes show an error."]),
    ) {
        let text = format!("{code} provides ${amount}.00 off your order.\n{extra}");
        let ev = evidence(&[("gen.md", text.as_str())]);
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
        let out = runtime.block_on(RuleBasedGenerator::new(10).generate("discount", &ev)).expect("generate");
        prop_assert!(!out.test_cases.is_empty());
        let validator = GroundingValidator::default();
        for tc in &out.test_cases {
            let mut again = tc.clone();
            prop_assert!(validator.enforce(&mut again, &ev).is_empty(), "not stable: {:?}", tc);
            prop_assert_eq!(&again, tc);
        }
    }
}

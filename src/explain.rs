// src/explain.rs
//! Explanation stage: turns detected narratives into readable titles,
//! a short overview and evidence bullets, then optionally build ideas.
//!
//! Runs strictly after detection and never changes scores. [`LlmExplainer`]
//! asks a language model for the `NAME:` / `EXPLANATION:` / `WHY IT MATTERS:`
//! format built by [`build_explanation_prompt`]; the offline
//! [`TemplateExplainer`] produces the same fields deterministically and is
//! used whenever the model is missing or fails.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LlmCfg;
use crate::ideas::IdeaGenerator;
use crate::llm::{client_from_config, DynLlm};
use crate::narrative::{Evidence, EvidenceItem, Narrative, NAME_KEYWORDS};

/// Evidence items listed per source type.
pub const EVIDENCE_ITEMS_PER_TYPE: usize = 3;
pub const MAX_BULLETS: usize = 4;
const EXPLAIN_TEMPERATURE: f32 = 0.7;
const EXPLAIN_MAX_TOKENS: u32 = 800;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub title: String,
    pub explanation: String,
    pub why_it_matters: Vec<String>,
}

impl Explanation {
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
            && self.explanation.trim().is_empty()
            && self.why_it_matters.is_empty()
    }
}

#[async_trait]
pub trait NarrativeExplainer: Send + Sync {
    async fn explain(&self, narrative: &Narrative) -> Explanation;
    /// Name for logs.
    fn name(&self) -> &'static str;
}

/// Deterministic explainer built only from the narrative's own fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateExplainer;

impl TemplateExplainer {
    pub fn render(&self, n: &Narrative) -> Explanation {
        let types = n
            .source_types
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Explanation {
            title: title_from_keywords(&n.keywords),
            explanation: format!(
                "{} signals across {} show {:.1}% average growth between the two halves of the window.",
                n.signal_count, types, n.momentum_score
            ),
            why_it_matters: evidence_lines(&n.evidence)
                .into_iter()
                .take(MAX_BULLETS)
                .collect(),
        }
    }
}

#[async_trait]
impl NarrativeExplainer for TemplateExplainer {
    async fn explain(&self, n: &Narrative) -> Explanation {
        self.render(n)
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

/// Language-model explainer. A failed call or a reply with none of the
/// expected fields falls back to the template.
pub struct LlmExplainer {
    llm: DynLlm,
}

impl LlmExplainer {
    pub fn new(llm: DynLlm) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl NarrativeExplainer for LlmExplainer {
    async fn explain(&self, n: &Narrative) -> Explanation {
        let prompt = build_explanation_prompt(n);
        match self
            .llm
            .generate(&prompt, EXPLAIN_TEMPERATURE, EXPLAIN_MAX_TOKENS)
            .await
        {
            Ok(text) => {
                let parsed = parse_explanation_response(&text);
                if parsed.is_empty() {
                    tracing::warn!(target: "explain", provider = self.llm.name(), narrative = %n.narrative_id, "unparsable explanation; using template");
                    TemplateExplainer.render(n)
                } else {
                    parsed
                }
            }
            Err(e) => {
                tracing::warn!(target: "explain", error = ?e, provider = self.llm.name(), narrative = %n.narrative_id, "explanation failed; using template");
                TemplateExplainer.render(n)
            }
        }
    }

    fn name(&self) -> &'static str {
        self.llm.name()
    }
}

/// Apply `explainer` to every narrative. Empty fields in the explanation leave
/// the narrative's corresponding field unset.
pub async fn explain_all(explainer: &dyn NarrativeExplainer, narratives: &mut [Narrative]) {
    for n in narratives.iter_mut() {
        let e = explainer.explain(n).await;
        tracing::debug!(
            target: "explain",
            explainer = explainer.name(),
            narrative = %n.narrative_id,
            title = %e.title,
            bullets = e.why_it_matters.len(),
            "narrative explained"
        );
        n.title = non_empty(e.title);
        n.explanation = non_empty(e.explanation);
        n.why_it_matters = e.why_it_matters;
    }
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

/// Post-detection enrichment: explanations always, build ideas only with a
/// language model.
pub struct Enricher {
    explainer: Box<dyn NarrativeExplainer>,
    ideas: Option<IdeaGenerator>,
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new(None, 0)
    }
}

impl Enricher {
    pub fn new(llm: Option<DynLlm>, ideas_per_narrative: usize) -> Self {
        match llm {
            Some(llm) => Self {
                explainer: Box::new(LlmExplainer::new(llm.clone())),
                ideas: (ideas_per_narrative > 0)
                    .then(|| IdeaGenerator::new(llm, ideas_per_narrative)),
            },
            None => Self {
                explainer: Box::new(TemplateExplainer),
                ideas: None,
            },
        }
    }

    pub fn from_config(cfg: &LlmCfg) -> Self {
        Self::new(client_from_config(cfg), cfg.ideas_per_narrative)
    }

    pub fn explainer_name(&self) -> &'static str {
        self.explainer.name()
    }

    pub fn generates_ideas(&self) -> bool {
        self.ideas.is_some()
    }

    pub async fn enrich(&self, narratives: &mut [Narrative]) {
        explain_all(self.explainer.as_ref(), narratives).await;
        if let Some(ideas) = &self.ideas {
            ideas.generate_all(narratives).await;
        }
    }
}

/// Parse the line-oriented response format. Unknown lines are ignored;
/// bullets only count after the `WHY IT MATTERS:` header.
pub fn parse_explanation_response(text: &str) -> Explanation {
    let mut out = Explanation::default();
    let mut in_bullets = false;

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("NAME:") {
            out.title = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("EXPLANATION:") {
            out.explanation = rest.trim().to_string();
        } else if line.starts_with("WHY IT MATTERS:") {
            in_bullets = true;
        } else if in_bullets && line.starts_with('-') {
            let bullet = line.trim_start_matches(['-', ' ']).trim();
            if !bullet.is_empty() {
                out.why_it_matters.push(bullet.to_string());
            }
        }
    }
    out
}

/// Prompt for a language-model explainer.
pub fn build_explanation_prompt(n: &Narrative) -> String {
    let types = n
        .source_types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "A narrative has been detected with the following characteristics:\n\n\
         Keywords: {}\n\
         Signal Types: {}\n\
         Momentum Score: {:.1}%\n\n\
         Evidence:\n{}\n\n\
         1. Give this narrative a clear, concise name (2-4 words)\n\
         2. Explain why this narrative matters\n\
         3. Provide 3-4 evidence-backed bullet points\n\n\
         Format your response EXACTLY as:\n\
         NAME: <narrative name>\n\
         EXPLANATION: <1-2 sentence overview>\n\
         WHY IT MATTERS:\n\
         - <bullet point 1>\n\
         - <bullet point 2>\n\
         - <bullet point 3>",
        n.keywords.join(", "),
        types,
        n.momentum_score,
        format_evidence(&n.evidence)
    )
}

/// Evidence as text: an upper-cased header per source type followed by up
/// to three item lines.
pub fn format_evidence(evidence: &Evidence) -> String {
    let mut parts = Vec::new();
    for (source_type, items) in evidence {
        if items.is_empty() {
            continue;
        }
        parts.push(format!("{}:", source_type.as_str().to_uppercase()));
        for item in items.iter().take(EVIDENCE_ITEMS_PER_TYPE) {
            parts.push(format!("  - {}", format_evidence_item(item)));
        }
    }
    parts.join("\n")
}

/// `metric: x.x% growth (category) [topic: t] [keywords: a, b, c]`
pub fn format_evidence_item(item: &EvidenceItem) -> String {
    let mut line = format!("{}: {:.1}% growth", item.metric, item.momentum);
    if let Some(category) = item.metadata.get("category").and_then(Value::as_str) {
        line.push_str(&format!(" ({category})"));
    }
    if let Some(topic) = item.metadata.get("topic").and_then(Value::as_str) {
        line.push_str(&format!(" [topic: {topic}]"));
    }
    if let Some(Value::Array(kws)) = item.metadata.get("keywords") {
        let kws: Vec<&str> = kws.iter().filter_map(Value::as_str).take(3).collect();
        if !kws.is_empty() {
            line.push_str(&format!(" [keywords: {}]", kws.join(", ")));
        }
    }
    line
}

/// Distinct evidence lines, top items per source type, in evidence order.
fn evidence_lines(evidence: &Evidence) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for items in evidence.values() {
        let mut taken = 0;
        for item in items {
            if taken == EVIDENCE_ITEMS_PER_TYPE {
                break;
            }
            let line = format_evidence_item(item);
            if out.contains(&line) {
                continue;
            }
            out.push(line);
            taken += 1;
        }
    }
    out
}

/// Title-case the leading keywords: `ai_agents` -> `AI Agents`.
pub fn title_from_keywords(keywords: &[String]) -> String {
    let words: Vec<String> = keywords
        .iter()
        .take(NAME_KEYWORDS)
        .flat_map(|k| k.split(|c: char| c == '_' || c.is_whitespace()))
        .filter(|w| !w.is_empty())
        .map(title_word)
        .collect();

    let mut deduped: Vec<String> = Vec::with_capacity(words.len());
    for w in words {
        if !deduped.contains(&w) {
            deduped.push(w);
        }
    }
    if deduped.is_empty() {
        "Unnamed Narrative".to_string()
    } else {
        deduped.join(" ")
    }
}

fn title_word(w: &str) -> String {
    // short tokens are almost always acronyms (ai, nft, dex)
    if w.chars().count() <= 3 {
        return w.to_uppercase();
    }
    let mut chars = w.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

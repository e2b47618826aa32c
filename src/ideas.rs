// src/ideas.rs
//! Build-idea generation for explained narratives.
//!
//! Only runs when a language model is configured; template-only runs leave
//! `build_ideas` empty.

use crate::llm::DynLlm;
use crate::narrative::{BuildIdea, Narrative};

const IDEAS_TEMPERATURE: f32 = 0.8;
const IDEAS_MAX_TOKENS: u32 = 1200;

pub struct IdeaGenerator {
    llm: DynLlm,
    ideas_per_narrative: usize,
}

impl IdeaGenerator {
    pub fn new(llm: DynLlm, ideas_per_narrative: usize) -> Self {
        Self {
            llm,
            ideas_per_narrative,
        }
    }

    pub fn ideas_per_narrative(&self) -> usize {
        self.ideas_per_narrative
    }

    /// Ideas for one narrative. A failed model call yields no ideas.
    pub async fn generate(&self, n: &Narrative) -> Vec<BuildIdea> {
        let prompt = build_ideas_prompt(n, self.ideas_per_narrative);
        match self
            .llm
            .generate(&prompt, IDEAS_TEMPERATURE, IDEAS_MAX_TOKENS)
            .await
        {
            Ok(text) => parse_ideas_response(&text, self.ideas_per_narrative),
            Err(e) => {
                tracing::warn!(
                    target: "ideas",
                    error = ?e,
                    provider = self.llm.name(),
                    narrative = %n.narrative_id,
                    "idea generation failed"
                );
                Vec::new()
            }
        }
    }

    pub async fn generate_all(&self, narratives: &mut [Narrative]) {
        for n in narratives.iter_mut() {
            n.build_ideas = self.generate(n).await;
            tracing::debug!(target: "ideas", narrative = %n.narrative_id, ideas = n.build_ideas.len(), "ideas generated");
        }
    }
}

pub fn build_ideas_prompt(n: &Narrative, count: usize) -> String {
    let why = n
        .why_it_matters
        .iter()
        .map(|p| format!("- {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a product strategist helping Solana builders identify opportunities.\n\n\
         Narrative: {}\n\n\
         Overview: {}\n\n\
         Why it matters:\n{}\n\n\
         Related keywords: {}\n\n\
         Generate {count} concrete, realistic product ideas that builders could create to capitalize on this narrative.\n\n\
         Requirements for each idea:\n\
         - Must be specific and actionable (not vague)\n\
         - Should be realistic for a small team to build\n\
         - Should directly address the narrative/trend\n\
         - Mix of new products and improvements to existing solutions\n\n\
         Format your response EXACTLY as:\n\
         IDEA 1: <Title>\n\
         <2-3 sentence description of what to build and why>\n\n\
         IDEA 2: <Title>\n\
         <2-3 sentence description>\n\n\
         [Continue for all {count} ideas]",
        n.display_name(),
        n.explanation.as_deref().unwrap_or_default(),
        why,
        n.keywords.join(", "),
    )
}

/// Parse `IDEA n: Title` blocks; the non-empty lines after a header form its
/// description. A header without a title closes the current idea without
/// opening a new one. At most `limit` ideas are kept.
pub fn parse_ideas_response(text: &str, limit: usize) -> Vec<BuildIdea> {
    let mut ideas = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines().map(str::trim) {
        if line.starts_with("IDEA ") {
            if let Some((title, desc)) = current.take() {
                ideas.push(BuildIdea {
                    title,
                    description: desc.join(" "),
                });
            }
            current = line
                .split_once(':')
                .map(|(_, title)| title.trim())
                .filter(|t| !t.is_empty())
                .map(|t| (t.to_string(), Vec::new()));
        } else if let Some((_, desc)) = current.as_mut() {
            if !line.is_empty() {
                desc.push(line);
            }
        }
    }
    if let Some((title, desc)) = current {
        ideas.push(BuildIdea {
            title,
            description: desc.join(" "),
        });
    }

    ideas.truncate(limit);
    ideas
}

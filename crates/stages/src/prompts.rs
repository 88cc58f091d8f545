//! Stage prompt templates.
//!
//! The system prompts are content handed to the provider verbatim. Only the
//! user message is assembled here: the previous stage's approved output plus
//! the optional brand section.

use pipeline::{BrandIdentity, StageId};

const ANALYSIS: &str = "\
You are a social media analyst. You receive an Instagram performance report \
(or a summary of one). Identify the strongest and weakest content formats, \
audience signals, posting patterns and three concrete opportunities. \
Answer in Markdown with short sections.";

const IDEATION: &str = "\
You are a content strategist. From the analysis provided, propose five to \
eight content ideas. Answer ONLY with JSON of the form \
{\"ideas\": [{\"id\": \"idea-1\", \"title\": \"...\", \"description\": \"...\"}]}.";

const RESEARCH: &str = "\
You are a research assistant. For each selected idea, gather supporting \
facts, statistics, audience pain points and reference examples. Cite sources \
where possible. Answer in Markdown, one section per idea.";

const NARRATIVE: &str = "\
You are a narrative designer for short-form video. Using the research, \
outline the piece as ordered blocks (hook, development, proof, call to \
action). Answer ONLY with a JSON array of {\"title\": \"...\", \"content\": \"...\"} \
objects in playing order.";

const WRITING: &str = "\
You are a scriptwriter. Turn the ordered narrative blocks into a final \
script for an Instagram Reel: spoken lines, on-screen text and caption. \
Keep every block in the given order. Answer in Markdown.";

/// System prompt for a stage.
pub fn system_prompt(stage: StageId) -> &'static str {
    match stage {
        StageId::Analysis => ANALYSIS,
        StageId::Ideation => IDEATION,
        StageId::Research => RESEARCH,
        StageId::Narrative => NARRATIVE,
        StageId::Writing => WRITING,
    }
}

fn context_heading(stage: StageId) -> &'static str {
    match stage {
        StageId::Analysis => "Uploaded report",
        StageId::Ideation => "Analysis",
        StageId::Research => "Selected ideas",
        StageId::Narrative => "Research",
        StageId::Writing => "Narrative blocks",
    }
}

/// Builds the user message from the stage context and optional brand.
pub fn user_message(stage: StageId, context: &str, brand: Option<&BrandIdentity>) -> String {
    let mut message = String::new();
    message.push_str("## ");
    message.push_str(context_heading(stage));
    message.push('\n');
    if context.trim().is_empty() {
        message.push_str("(no prior context; work from general best practices for Instagram content)");
    } else {
        message.push_str(context.trim());
    }

    if let Some(section) = brand.map(BrandIdentity::prompt_section).filter(|s| !s.is_empty()) {
        message.push_str("\n\n## Brand identity\n");
        message.push_str(&section);
    }
    message
}

//! Canned demo outputs substituted when the provider fails under the
//! `fallback` policy. Each one parses cleanly with the stage's sub-stage parser.

use pipeline::StageId;

const ANALYSIS: &str = "\
## Highlights
- Reels reach 3.2x more accounts than static posts.
- Carousels drive the most saves.

## Weak spots
- Stories completion drops after the third frame.

## Opportunities
1. Weekly educational Reel series.
2. Save-worthy checklists as carousels.
3. Shorter, question-led Stories.";

const IDEATION: &str = r#"{"ideas": [
  {"id": "idea-1", "title": "Myth vs fact", "description": "Bust one common industry myth per Reel."},
  {"id": "idea-2", "title": "60-second tutorial", "description": "A single practical tip, shown start to finish."},
  {"id": "idea-3", "title": "Behind the scenes", "description": "How the team prepares a launch."}
]}"#;

const RESEARCH: &str = "\
## Myth vs fact
- Myth-busting hooks raise 3-second retention in educational niches.
- Audiences save content that corrects a belief they held.

## 60-second tutorial
- Tutorials under 60 seconds keep completion rates high.";

const NARRATIVE: &str = r#"[
  {"title": "Hook", "content": "Open with the myth as a bold on-screen statement."},
  {"title": "Turn", "content": "Reveal the fact with one supporting number."},
  {"title": "Proof", "content": "Show a quick before/after example."},
  {"title": "Call to action", "content": "Ask viewers to save and share."}
]"#;

const WRITING: &str = "\
**[Hook]** \"Posting every day grows your account. Right? Not quite.\"

**[Turn]** \"Accounts posting three focused Reels a week grew faster in our data.\"

**[Proof]** On screen: before/after reach chart.

**[Call to action]** \"Save this for your next planning session.\"

Caption: Consistency beats volume. #contentstrategy";

/// Demo output for a stage.
pub fn demo_output(stage: StageId) -> &'static str {
    match stage {
        StageId::Analysis => ANALYSIS,
        StageId::Ideation => IDEATION,
        StageId::Research => RESEARCH,
        StageId::Narrative => NARRATIVE,
        StageId::Writing => WRITING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{parse_blocks, parse_ideas};

    #[test]
    fn test_demo_ideas_and_blocks_parse() {
        assert_eq!(parse_ideas(demo_output(StageId::Ideation)).len(), 3);
        assert_eq!(parse_blocks(demo_output(StageId::Narrative)).len(), 4);
    }

    #[test]
    fn test_every_demo_output_is_non_empty() {
        for stage in StageId::ALL {
            assert!(!demo_output(stage).trim().is_empty(), "{stage}");
        }
    }
}

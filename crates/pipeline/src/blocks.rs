//! Structure sub-stage: ordered content blocks.
//!
//! The narrative stage returns the outline of the piece. [`parse_blocks`]
//! turns it into an ordered list of [`Block`]s, the user reorders and edits
//! them on a [`BlockBoard`], and the board's payload becomes the writing
//! stage's context.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extract::{extract_json, first_array, first_text};
use crate::{Parsed, PipelineError};

const TITLE_KEYS: &[&str] = &["title", "heading", "section", "name"];
const CONTENT_KEYS: &[&str] = &["content", "text", "description", "body"];
const LIST_KEYS: &[&str] = &["blocks", "sections", "structure"];

/// One section of the narrative structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Optional section heading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Section body.
    pub content: String,
}

impl Block {
    /// A block with body text only.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            title: None,
            content: content.into(),
        }
    }
}

/// Parses narrative output into blocks. Never fails.
///
/// Falls back to splitting on blank lines, so non-empty input always yields
/// at least one block.
pub fn parse_blocks(raw: &str) -> Parsed<Block> {
    let text = raw.trim();
    if text.is_empty() {
        return Parsed::Empty;
    }

    let blocks = match extract_json(text) {
        Some(Value::Array(items)) => blocks_from_array(&items),
        Some(Value::Object(object)) => match first_array(&object, LIST_KEYS) {
            Some(items) => blocks_from_array(items),
            None if first_text(&object, CONTENT_KEYS).is_some() => {
                vec![block_from_object(&object)]
            }
            None => split_paragraphs(text),
        },
        Some(Value::String(s)) => split_paragraphs(&s),
        Some(_) | None => split_paragraphs(text),
    };
    Parsed::from_vec(blocks)
}

fn blocks_from_array(items: &[Value]) -> Vec<Block> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(object) => Some(block_from_object(object)),
            Value::String(s) if !s.trim().is_empty() => Some(Block::text(s.trim())),
            Value::Null => None,
            Value::String(_) => None,
            other => Some(Block::text(other.to_string())),
        })
        .collect()
}

fn block_from_object(object: &Map<String, Value>) -> Block {
    let title = first_text(object, TITLE_KEYS);
    let content = match first_text(object, CONTENT_KEYS) {
        Some(content) => content,
        None if title.is_some() => String::new(),
        None => Value::Object(object.clone()).to_string(),
    };
    Block { title, content }
}

/// Splits text into paragraphs separated by blank lines.
pub fn split_paragraphs(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(Block::text(current.join("\n")));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        blocks.push(Block::text(current.join("\n")));
    }
    blocks
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// Editable, reorderable list of blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBoard {
    blocks: Vec<Block>,
}

impl BlockBoard {
    /// Creates a board from blocks in their initial order.
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Parses narrative output straight onto a board.
    pub fn from_output(raw: &str) -> Self {
        Self::new(parse_blocks(raw).into_vec())
    }

    /// Blocks in their current order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` when the board holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Moves the block at `from` so it ends up at index `to`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Validation`] if either index is out of range.
    pub fn move_block(&mut self, from: usize, to: usize) -> Result<(), PipelineError> {
        self.check_index(from)?;
        self.check_index(to)?;
        let block = self.blocks.remove(from);
        self.blocks.insert(to, block);
        Ok(())
    }

    /// Replaces the body text of the block at `index`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Validation`] if `index` is out of range.
    pub fn edit_block(&mut self, index: usize, content: impl Into<String>) -> Result<(), PipelineError> {
        self.check_index(index)?;
        self.blocks[index].content = content.into();
        Ok(())
    }

    /// Reorders the whole board. `order` lists current indices in their new order.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Validation`] unless `order` is a permutation of the
    /// current indices.
    pub fn reorder(&mut self, order: &[usize]) -> Result<(), PipelineError> {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        if sorted != (0..self.blocks.len()).collect::<Vec<_>>() {
            return Err(PipelineError::Validation {
                message: format!(
                    "Block order must list each of the {} blocks exactly once",
                    self.blocks.len()
                ),
            });
        }
        self.blocks = order.iter().map(|&i| self.blocks[i].clone()).collect();
        Ok(())
    }

    /// Serialises the blocks in their current order as a JSON array.
    pub fn payload(&self) -> String {
        let blocks: Vec<Value> = self
            .blocks
            .iter()
            .enumerate()
            .map(|(position, block)| {
                let mut entry = Map::new();
                entry.insert("position".into(), Value::from(position + 1));
                if let Some(title) = &block.title {
                    entry.insert("title".into(), Value::from(title.as_str()));
                }
                entry.insert("content".into(), Value::from(block.content.as_str()));
                Value::Object(entry)
            })
            .collect();
        format!("{:#}", Value::Array(blocks))
    }

    fn check_index(&self, index: usize) -> Result<(), PipelineError> {
        if index < self.blocks.len() {
            Ok(())
        } else {
            Err(PipelineError::Validation {
                message: format!("No block at position {} (board has {})", index + 1, self.blocks.len()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(board: &BlockBoard) -> Vec<&str> {
        board.blocks().iter().map(|b| b.content.as_str()).collect()
    }

    #[test]
    fn test_array_of_objects_with_aliases() {
        let raw = r#"[{"heading": "Hook", "text": "Open strong"}, {"section": "Body", "body": "Explain"}]"#;
        let blocks = parse_blocks(raw).into_vec();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].title.as_deref(), Some("Hook"));
        assert_eq!(blocks[1].content, "Explain");
    }

    #[test]
    fn test_array_of_strings() {
        let blocks = parse_blocks(r#"["Hook", "", "Call to action"]"#).into_vec();
        assert_eq!(blocks, vec![Block::text("Hook"), Block::text("Call to action")]);
    }

    #[test]
    fn test_object_with_sections() {
        let raw = r#"{"sections": [{"title": "Intro", "content": "Hi"}]}"#;
        assert_eq!(parse_blocks(raw).len(), 1);
    }

    #[test]
    fn test_long_string_falls_back_to_paragraphs() {
        let raw = "Hook: ask a question.\n\nBody: three tips\nwith examples.\n\n\nClose: follow us.";
        let blocks = parse_blocks(raw).into_vec();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1].content, "Body: three tips\nwith examples.");
    }

    #[test]
    fn test_single_paragraph_yields_one_block() {
        assert_eq!(parse_blocks("one paragraph only").len(), 1);
        assert!(parse_blocks("  \n ").is_empty());
    }

    #[test]
    fn test_board_move_and_edit() {
        let mut board = BlockBoard::from_output(r#"["a", "b", "c"]"#);
        board.move_block(2, 0).unwrap();
        assert_eq!(contents(&board), vec!["c", "a", "b"]);
        board.edit_block(1, "A!").unwrap();
        assert_eq!(contents(&board), vec!["c", "A!", "b"]);
        assert!(board.move_block(0, 3).is_err());
        assert!(board.edit_block(9, "x").is_err());
    }

    #[test]
    fn test_board_reorder_requires_permutation() {
        let mut board = BlockBoard::from_output(r#"["a", "b", "c"]"#);
        assert!(board.reorder(&[0, 0, 1]).is_err());
        board.reorder(&[1, 2, 0]).unwrap();
        assert_eq!(contents(&board), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_payload_keeps_board_order() {
        let mut board = BlockBoard::from_output(r#"[{"title": "T", "content": "x"}, "y"]"#);
        board.move_block(1, 0).unwrap();
        let payload: Vec<Value> = serde_json::from_str(&board.payload()).unwrap();
        assert_eq!(payload[0]["content"], "y");
        assert_eq!(payload[0]["position"], 1);
        assert_eq!(payload[1]["title"], "T");
    }
}

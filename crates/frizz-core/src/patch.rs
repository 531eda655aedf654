//! Live patching of published cards
//!
//! Walks a fetched card, finds text blocks whose invisible token addresses a
//! given update, and rewrites the visible part in front of the token. The
//! token span itself is copied back byte for byte so the next pass finds the
//! same block again. The pass edits the card's raw JSON in place: only the
//! `content` string of a matching text block ever changes, every other block
//! and field is written back exactly as it was fetched.
//!
//! Blocks are addressed by their structural path (`/2/0` is the first child of
//! the third top-level block). The label in front of the value is remembered
//! per path, so a rewritten value never leaks into the next label.

use crate::blocks::{Card, TYPE_TEXT_DISPLAY};
use crate::token::{self, LiveToken, TokenKind};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Last known label per block path
pub type LabelCache = HashMap<String, String>;

static COUNT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*:\s*\d+\s*$").expect("count suffix pattern is a valid regex")
});

static TIME_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*:\s*<?t:\d+:R>?\s*$").expect("time suffix pattern is a valid regex")
});

/// Result of one patch pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Whether any block was rewritten
    pub changed: bool,
    /// Label cache including every label used in this pass
    pub cache: LabelCache,
}

/// Rewrite every text block carrying the `kind`/`update_id` token.
///
/// `render` receives the bare label and returns the new visible text; the
/// token span is appended after it unchanged.
pub fn patch_document<F>(
    card: &mut Card,
    kind: TokenKind,
    update_id: &str,
    render: F,
    cache: &LabelCache,
) -> PatchOutcome
where
    F: Fn(&str) -> String,
{
    let mut pass = Pass {
        kind,
        update_id,
        render: &render,
        outcome: PatchOutcome {
            changed: false,
            cache: cache.clone(),
        },
    };
    pass.walk(card.components_mut(), "");
    pass.outcome
}

/// Render a participant counter
#[must_use]
pub fn render_count(base: &str, count: usize) -> String {
    format!("{}: {}", base, count)
}

/// Render a countdown as a Discord relative timestamp
#[must_use]
pub fn render_countdown(base: &str, unix_secs: i64) -> String {
    format!("{}: <t:{}:R>", base, unix_secs)
}

struct Pass<'a> {
    kind: TokenKind,
    update_id: &'a str,
    render: &'a dyn Fn(&str) -> String,
    outcome: PatchOutcome,
}

impl Pass<'_> {
    fn walk(&mut self, blocks: &mut [Value], prefix: &str) {
        for (index, block) in blocks.iter_mut().enumerate() {
            let path = format!("{}/{}", prefix, index);
            let Some(fields) = block.as_object_mut() else {
                continue;
            };

            let is_text = fields.get("type").and_then(Value::as_u64) == Some(u64::from(TYPE_TEXT_DISPLAY));
            if is_text {
                if let Some(Value::String(content)) = fields.get_mut("content") {
                    self.rewrite(content, path);
                }
            } else if let Some(Value::Array(children)) = fields.get_mut("components") {
                // Containers, sections and action rows; accessories never carry tokens
                self.walk(children, &path);
            }
        }
    }

    fn rewrite(&mut self, content: &mut String, path: String) {
        let Some(decoded) = token::decode(content) else {
            return;
        };
        let Some(live) = LiveToken::parse(&decoded.token) else {
            return;
        };
        if !live.matches(self.kind, self.update_id) {
            return;
        }

        let base = match self.outcome.cache.get(&path).filter(|label| !label.is_empty()) {
            Some(label) => label.clone(),
            None => {
                let visible = content.replace(&decoded.span, "");
                strip_rendered_value(self.kind, &visible)
            }
        };

        *content = format!("{}{}", (self.render)(&base), decoded.span);
        self.outcome.cache.insert(path, base);
        self.outcome.changed = true;
    }
}

/// Drop a previously rendered value (`": 12"` or `": <t:..:R>"`) from a label
fn strip_rendered_value(kind: TokenKind, visible: &str) -> String {
    let pattern = match kind {
        TokenKind::Count => &*COUNT_SUFFIX,
        TokenKind::Time => &*TIME_SUFFIX,
    };
    pattern.replace(visible, "").trim_end().to_string()
}

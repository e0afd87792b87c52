use thiserror::Error;

use crate::keyboard::{Keyboard, BACKSPACE_MARKER, SPACE_MARKER};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("draft contains unsupported character {0:?}")]
    UnsupportedChar(char),
    #[error("backspace marker may only appear at the end of a draft")]
    MisplacedBackspace,
    #[error("empty draft segment")]
    Empty,
}

impl DraftError {
    pub fn metric_label(&self) -> &'static str {
        match self {
            DraftError::UnsupportedChar(_) => "unsupported_char",
            DraftError::MisplacedBackspace => "misplaced_backspace",
            DraftError::Empty => "empty_segment",
        }
    }
}

/// A draft transition carried by a `letter` request path.
///
/// The path always holds the whole intended draft. A trailing backspace
/// marker means "the draft shown in this path, minus its last character".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftEdit {
    Replace(String),
    Backspace(String),
}

impl DraftEdit {
    pub fn parse(raw: &str) -> Result<Self, DraftError> {
        if raw.is_empty() {
            return Err(DraftError::Empty);
        }
        let (body, backspace) = match raw.strip_suffix(BACKSPACE_MARKER) {
            Some(body) => (body, true),
            None => (raw, false),
        };
        for c in body.chars() {
            if c == BACKSPACE_MARKER {
                return Err(DraftError::MisplacedBackspace);
            }
            if !Keyboard::is_draft_char(c) {
                return Err(DraftError::UnsupportedChar(c));
            }
        }
        let body = body.to_string();
        Ok(if backspace {
            DraftEdit::Backspace(body)
        } else {
            DraftEdit::Replace(body)
        })
    }

    /// The draft text this edit produces.
    pub fn resolve(self) -> String {
        match self {
            DraftEdit::Replace(text) => text,
            DraftEdit::Backspace(mut text) => {
                text.pop();
                text
            }
        }
    }
}

/// Converts a path-encoded draft into the text shown to people.
pub fn display_text(encoded: &str) -> String {
    encoded.replace(SPACE_MARKER, " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(raw: &str) -> String {
        DraftEdit::parse(raw).expect("valid edit").resolve()
    }

    #[test_timeout::timeout]
    fn replace_takes_whole_path_value() {
        assert_eq!(apply("H"), "H");
        assert_eq!(apply("Hi"), "Hi");
        assert_eq!(apply("Hi_there"), "Hi_there");
    }

    #[test_timeout::timeout]
    fn append_then_backspace_restores_prior_draft() {
        for prior in ["", "H", "Hi_t"] {
            let appended = apply(&format!("{prior}x"));
            let restored = apply(&format!("{appended}-"));
            assert_eq!(restored, prior);
        }
    }

    #[test_timeout::timeout]
    fn backspace_on_empty_stays_empty() {
        assert_eq!(apply("-"), "");
    }

    #[test_timeout::timeout]
    fn rejects_markup_and_inner_markers() {
        assert_eq!(
            DraftEdit::parse("a<b"),
            Err(DraftError::UnsupportedChar('<'))
        );
        assert_eq!(
            DraftEdit::parse("a-b"),
            Err(DraftError::MisplacedBackspace)
        );
        assert_eq!(DraftEdit::parse("a--"), Err(DraftError::MisplacedBackspace));
        assert_eq!(DraftEdit::parse(""), Err(DraftError::Empty));
    }

    #[test_timeout::timeout]
    fn display_turns_markers_into_spaces() {
        assert_eq!(display_text("Hi_there_"), "Hi there ");
    }
}

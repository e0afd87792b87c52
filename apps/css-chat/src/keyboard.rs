/// Path character that stands for a space inside an encoded draft.
pub const SPACE_MARKER: char = '_';
/// Trailing path character that asks for the last draft character to be removed.
pub const BACKSPACE_MARKER: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Letter(char),
    Space,
    Backspace,
}

impl Symbol {
    pub fn path_char(self) -> char {
        match self {
            Symbol::Letter(c) => c,
            Symbol::Space => SPACE_MARKER,
            Symbol::Backspace => BACKSPACE_MARKER,
        }
    }

    pub fn label(self) -> String {
        match self {
            Symbol::Letter(c) => c.to_string(),
            Symbol::Space => "Space".to_string(),
            Symbol::Backspace => "Backspace".to_string(),
        }
    }

    /// Whether the on-screen layout wraps to a new row after this key.
    pub fn ends_row(self) -> bool {
        matches!(self, Symbol::Letter('Z') | Symbol::Letter('z') | Symbol::Backspace)
    }
}

/// Ordered set of selectable symbols rendered as interaction controls.
#[derive(Debug, Clone)]
pub struct Keyboard {
    symbols: Vec<Symbol>,
}

impl Keyboard {
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// True for characters that may appear inside a stored draft.
    pub fn is_draft_char(c: char) -> bool {
        c.is_ascii_alphabetic() || c == SPACE_MARKER
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        let symbols = ('A'..='Z')
            .chain('a'..='z')
            .map(Symbol::Letter)
            .chain([Symbol::Space, Symbol::Backspace])
            .collect();
        Self { symbols }
    }
}

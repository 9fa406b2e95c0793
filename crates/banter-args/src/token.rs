//! Tokenizer for raw argument content.
//!
//! Turns a raw content string into a flat token stream: flag words, option
//! flag words, quote delimiters, words, separators, whitespace runs, and a
//! closing [`TokenKind::Eof`]. Tokenization is total -- it never fails, it
//! always makes progress, and malformed quoting degrades into a
//! differently-grouped but valid stream.

use serde::{Deserialize, Serialize};

/// The kind of a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// A recognized boolean flag word (e.g. `--verbose`).
    FlagWord,
    /// A recognized option flag word expecting a value (e.g. `--level`).
    OptionFlagWord,
    /// A plain double-quote delimiter.
    Quote,
    /// An opening smart quote.
    OpenQuote,
    /// A closing smart quote.
    EndQuote,
    /// A run of non-whitespace characters.
    Word,
    /// The configured literal separator.
    Separator,
    /// A run of whitespace.
    Whitespace,
    /// End of input. Always the final token.
    Eof,
}

/// One token of the input stream, carrying its exact source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// The exact slice of the original input this token covers.
    pub value: String,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Options controlling tokenization.
#[derive(Debug, Clone)]
pub struct TokenizerOptions {
    /// Recognized boolean flag spellings.
    pub flag_words: Vec<String>,
    /// Recognized option flag spellings (a value phrase follows).
    pub option_flag_words: Vec<String>,
    /// Whether quote delimiters group phrases. Ignored in separator mode.
    pub quoted: bool,
    /// A literal separator. When set, flags and quotes are disabled and
    /// phrases run between separators.
    pub separator: Option<String>,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            flag_words: Vec::new(),
            option_flag_words: Vec::new(),
            quoted: true,
            separator: None,
        }
    }
}

/// Exclusive scan state. Plain and smart quotes never nest into each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    Default,
    InQuote,
    InSpecialQuote,
}

const OPEN_QUOTE: char = '\u{201C}';
const END_QUOTE: char = '\u{201D}';

/// Tokenize raw content into a flat token stream ending in `Eof`.
pub fn tokenize(content: &str, options: &TokenizerOptions) -> Vec<Token> {
    Tokenizer::new(content, options).run()
}

struct Tokenizer<'a> {
    content: &'a str,
    position: usize,
    state: QuoteState,
    tokens: Vec<Token>,
    // Flag spellings merged across both lists, longest first, so a longer
    // flag is never shadowed by a shorter prefix.
    flags: Vec<(String, TokenKind)>,
    quoted: bool,
    separator: Option<&'a str>,
}

impl<'a> Tokenizer<'a> {
    fn new(content: &'a str, options: &'a TokenizerOptions) -> Self {
        let mut flags: Vec<(String, TokenKind)> = options
            .flag_words
            .iter()
            .map(|w| (w.clone(), TokenKind::FlagWord))
            .chain(
                options
                    .option_flag_words
                    .iter()
                    .map(|w| (w.clone(), TokenKind::OptionFlagWord)),
            )
            .filter(|(w, _)| !w.is_empty())
            .collect();
        flags.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            content,
            position: 0,
            state: QuoteState::Default,
            tokens: Vec::new(),
            flags,
            quoted: options.quoted && options.separator.is_none(),
            separator: options.separator.as_deref(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while self.position < self.content.len() {
            self.step();
        }
        self.tokens.push(Token::new(TokenKind::Eof, ""));
        self.tokens
    }

    /// Consume exactly one token. Tries productions in fixed priority
    /// order; the word/whitespace fallbacks guarantee progress.
    fn step(&mut self) {
        if self.try_flag() {
            return;
        }
        if self.try_quote_delimiters() {
            return;
        }
        if self.try_separator() {
            return;
        }
        if self.try_word() {
            return;
        }
        self.take_whitespace();
    }

    fn rest(&self) -> &'a str {
        &self.content[self.position..]
    }

    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn push(&mut self, kind: TokenKind, len: usize) {
        let value = &self.content[self.position..self.position + len];
        self.tokens.push(Token::new(kind, value));
        self.position += len;
    }

    fn try_flag(&mut self) -> bool {
        if self.state != QuoteState::Default || self.separator.is_some() {
            return false;
        }
        let rest = self.rest();
        for i in 0..self.flags.len() {
            let (word, kind) = (&self.flags[i].0, self.flags[i].1);
            match rest.get(..word.len()) {
                Some(slice) if slice.to_lowercase() == word.to_lowercase() => {
                    let (len, kind) = (word.len(), kind);
                    self.push(kind, len);
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    fn try_quote_delimiters(&mut self) -> bool {
        if !self.quoted {
            return false;
        }
        let Some(ch) = self.current_char() else {
            return false;
        };
        match ch {
            '"' if self.state != QuoteState::InSpecialQuote => {
                self.state = if self.state == QuoteState::InQuote {
                    QuoteState::Default
                } else {
                    QuoteState::InQuote
                };
                self.push(TokenKind::Quote, ch.len_utf8());
                true
            }
            OPEN_QUOTE if self.state == QuoteState::Default => {
                self.state = QuoteState::InSpecialQuote;
                self.push(TokenKind::OpenQuote, ch.len_utf8());
                true
            }
            END_QUOTE if self.state != QuoteState::InQuote => {
                self.state = QuoteState::Default;
                self.push(TokenKind::EndQuote, ch.len_utf8());
                true
            }
            _ => false,
        }
    }

    fn try_separator(&mut self) -> bool {
        let Some(sep) = self.separator else {
            return false;
        };
        if sep.is_empty() {
            return false;
        }
        match self.rest().get(..sep.len()) {
            Some(slice) if slice.eq_ignore_ascii_case(sep) => {
                self.push(TokenKind::Separator, sep.len());
                true
            }
            _ => false,
        }
    }

    fn try_word(&mut self) -> bool {
        let stop = |state: QuoteState, ch: char| -> bool {
            ch.is_whitespace()
                || (state == QuoteState::InQuote && ch == '"')
                || (state == QuoteState::InSpecialQuote && ch == END_QUOTE)
        };
        let state = self.state;
        let len: usize = self
            .rest()
            .chars()
            .take_while(|&ch| !stop(state, ch))
            .map(char::len_utf8)
            .sum();
        if len == 0 {
            return false;
        }
        self.push(TokenKind::Word, len);
        true
    }

    fn take_whitespace(&mut self) {
        let len: usize = self
            .rest()
            .chars()
            .take_while(|ch| ch.is_whitespace())
            .map(char::len_utf8)
            .sum();
        debug_assert!(len > 0, "step must always make progress");
        self.push(TokenKind::Whitespace, len);
    }
}

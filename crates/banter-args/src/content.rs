//! Recursive-descent parser from a token stream to structured content.
//!
//! Consumes the tokenizer's output into ordered phrases, flags, and option
//! flags. Every parsed item carries both a semantic `value` (quotes
//! stripped) and the exact `raw` source span, with leading and trailing
//! whitespace folded into `raw` -- concatenating the raw spans of `all`
//! reproduces the original input exactly, for every input. An input of
//! nothing but whitespace parses to a single empty phrase carrying the run.
//!
//! One token of lookahead, no backtracking, every token consumed exactly
//! once. An unterminated quote runs to the end of input.

use serde::Serialize;

use crate::token::{tokenize, Token, TokenKind, TokenizerOptions};

/// One parsed item of the content stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Parsed {
    /// A semantic unit of user text, quotes stripped.
    Phrase {
        /// The semantic content.
        value: String,
        /// The exact original substring, including quotes and whitespace.
        raw: String,
    },
    /// A boolean presence marker.
    Flag {
        /// The flag spelling as typed.
        key: String,
        /// The exact original substring.
        raw: String,
    },
    /// A flag carrying a following phrase value.
    OptionFlag {
        /// The flag spelling as typed.
        key: String,
        /// The value phrase, quotes stripped.
        value: String,
        /// The exact original substring.
        raw: String,
    },
}

impl Parsed {
    /// The exact original substring this item covers.
    pub fn raw(&self) -> &str {
        match self {
            Parsed::Phrase { raw, .. } => raw,
            Parsed::Flag { raw, .. } => raw,
            Parsed::OptionFlag { raw, .. } => raw,
        }
    }

    fn prepend_raw(&mut self, prefix: &str) {
        if prefix.is_empty() {
            return;
        }
        let raw = match self {
            Parsed::Phrase { raw, .. } => raw,
            Parsed::Flag { raw, .. } => raw,
            Parsed::OptionFlag { raw, .. } => raw,
        };
        raw.insert_str(0, prefix);
    }

    fn append_raw(&mut self, suffix: &str) {
        if suffix.is_empty() {
            return;
        }
        let raw = match self {
            Parsed::Phrase { raw, .. } => raw,
            Parsed::Flag { raw, .. } => raw,
            Parsed::OptionFlag { raw, .. } => raw,
        };
        raw.push_str(suffix);
    }
}

/// The structured result of parsing one content string.
///
/// `all` preserves the original left-to-right order; the three filtered
/// sequences are stable sub-sequences of `all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentParserResult {
    /// Every parsed item in source order.
    pub all: Vec<Parsed>,
    /// The phrases of `all`, in order.
    pub phrases: Vec<Parsed>,
    /// The flags of `all`, in order.
    pub flags: Vec<Parsed>,
    /// The option flags of `all`, in order.
    pub option_flags: Vec<Parsed>,
}

/// Options for the combined tokenize-and-parse entry point.
#[derive(Debug, Clone, Default)]
pub struct ContentParserOptions {
    /// Tokenizer configuration (flag vocabulary, quoting, separator).
    pub tokenizer: TokenizerOptions,
}

/// Tokenize and parse a raw content string in one call.
pub fn parse_content(content: &str, options: &ContentParserOptions) -> ContentParserResult {
    let tokens = tokenize(content, &options.tokenizer);
    ContentParser::new(&tokens, options.tokenizer.separator.is_some()).parse()
}

/// Recursive-descent parser over a token stream.
pub struct ContentParser<'a> {
    tokens: &'a [Token],
    position: usize,
    separated: bool,
}

impl<'a> ContentParser<'a> {
    /// Create a parser. `separated` selects the separator grammar, which
    /// must match the tokenizer configuration that produced `tokens`.
    pub fn new(tokens: &'a [Token], separated: bool) -> Self {
        Self {
            tokens,
            position: 0,
            separated,
        }
    }

    /// Parse the whole token stream.
    pub fn parse(mut self) -> ContentParserResult {
        let mut all: Vec<Parsed> = Vec::new();
        loop {
            let leading = self.take_blank();
            if self.at(TokenKind::Eof) {
                // Trailing whitespace folds into the previous item. With no
                // previous item the run still has to live somewhere for the
                // raw spans to reassemble the input, so it becomes an empty
                // phrase.
                if let Some(last) = all.last_mut() {
                    last.append_raw(&leading);
                } else if !leading.is_empty() {
                    all.push(Parsed::Phrase {
                        value: String::new(),
                        raw: leading,
                    });
                }
                break;
            }
            let mut item = if self.at(TokenKind::FlagWord) || self.at(TokenKind::OptionFlagWord) {
                self.parse_flag()
            } else {
                self.parse_phrase()
            };
            item.prepend_raw(&leading);
            all.push(item);
        }

        let phrases = all
            .iter()
            .filter(|p| matches!(p, Parsed::Phrase { .. }))
            .cloned()
            .collect();
        let flags = all
            .iter()
            .filter(|p| matches!(p, Parsed::Flag { .. }))
            .cloned()
            .collect();
        let option_flags = all
            .iter()
            .filter(|p| matches!(p, Parsed::OptionFlag { .. }))
            .cloned()
            .collect();

        ContentParserResult {
            all,
            phrases,
            flags,
            option_flags,
        }
    }

    fn peek(&self) -> &Token {
        // The tokenizer guarantees a final Eof token.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> &'a Token {
        let token = &self.tokens[self.position.min(self.tokens.len() - 1)];
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    /// Consume a run of whitespace tokens, returning their raw text.
    fn take_blank(&mut self) -> String {
        let mut raw = String::new();
        while self.at(TokenKind::Whitespace) {
            raw.push_str(&self.advance().value);
        }
        raw
    }

    fn parse_flag(&mut self) -> Parsed {
        let token = self.advance();
        if token.kind == TokenKind::FlagWord {
            return Parsed::Flag {
                key: token.value.clone(),
                raw: token.value.clone(),
            };
        }

        // OptionFlagWord WS? Phrase?
        let key = token.value.clone();
        let mut raw = token.value.clone();
        let blank = self.take_blank();
        if self.starts_phrase() {
            raw.push_str(&blank);
            match self.parse_phrase() {
                Parsed::Phrase {
                    value,
                    raw: phrase_raw,
                } => {
                    raw.push_str(&phrase_raw);
                    return Parsed::OptionFlag { key, value, raw };
                }
                other => {
                    raw.push_str(other.raw());
                    return Parsed::OptionFlag {
                        key,
                        value: String::new(),
                        raw,
                    };
                }
            }
        }
        // No value followed; hand the whitespace back by folding it in.
        raw.push_str(&blank);
        Parsed::OptionFlag {
            key,
            value: String::new(),
            raw,
        }
    }

    fn starts_phrase(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Word | TokenKind::Quote | TokenKind::OpenQuote | TokenKind::EndQuote
        )
    }

    fn parse_phrase(&mut self) -> Parsed {
        if self.separated {
            return self.parse_separated_phrase();
        }

        match self.peek().kind {
            TokenKind::Quote => {
                let mut raw = self.advance().value.clone();
                let mut value = String::new();
                while matches!(self.peek().kind, TokenKind::Word | TokenKind::Whitespace) {
                    let token = self.advance();
                    value.push_str(&token.value);
                    raw.push_str(&token.value);
                }
                if self.at(TokenKind::Quote) {
                    raw.push_str(&self.advance().value);
                }
                Parsed::Phrase { value, raw }
            }
            TokenKind::OpenQuote => {
                let mut raw = self.advance().value.clone();
                let mut value = String::new();
                while matches!(
                    self.peek().kind,
                    TokenKind::Word | TokenKind::OpenQuote | TokenKind::Quote | TokenKind::Whitespace
                ) {
                    let token = self.advance();
                    value.push_str(&token.value);
                    raw.push_str(&token.value);
                }
                if self.at(TokenKind::EndQuote) {
                    raw.push_str(&self.advance().value);
                }
                Parsed::Phrase { value, raw }
            }
            // A stray closing smart quote stands alone as a phrase.
            TokenKind::EndQuote => {
                let token = self.advance();
                Parsed::Phrase {
                    value: token.value.clone(),
                    raw: token.value.clone(),
                }
            }
            _ => {
                let token = self.advance();
                Parsed::Phrase {
                    value: token.value.clone(),
                    raw: token.value.clone(),
                }
            }
        }
    }

    /// Separator grammar: a phrase greedily consumes `Word (WS Word)*` runs
    /// up to the next separator, which folds into the raw span.
    fn parse_separated_phrase(&mut self) -> Parsed {
        if self.at(TokenKind::Separator) {
            // An empty slot between separators.
            let raw = self.advance().value.clone();
            return Parsed::Phrase {
                value: String::new(),
                raw,
            };
        }

        let first = self.advance();
        let mut value = first.value.clone();
        let mut raw = first.value.clone();
        loop {
            let save = self.position;
            let blank = self.take_blank();
            if self.at(TokenKind::Word) {
                let word = self.advance();
                value.push_str(&blank);
                value.push_str(&word.value);
                raw.push_str(&blank);
                raw.push_str(&word.value);
            } else if self.at(TokenKind::Separator) {
                // Closing separator (and the whitespace before it) folds
                // into the raw span but not the value.
                raw.push_str(&blank);
                raw.push_str(&self.advance().value);
                break;
            } else {
                self.position = save;
                break;
            }
        }
        Parsed::Phrase { value, raw }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str, flags: &[&str], option_flags: &[&str]) -> ContentParserResult {
        let options = ContentParserOptions {
            tokenizer: TokenizerOptions {
                flag_words: flags.iter().map(|s| s.to_string()).collect(),
                option_flag_words: option_flags.iter().map(|s| s.to_string()).collect(),
                ..TokenizerOptions::default()
            },
        };
        parse_content(input, &options)
    }

    fn phrase_values(result: &ContentParserResult) -> Vec<&str> {
        result
            .phrases
            .iter()
            .map(|p| match p {
                Parsed::Phrase { value, .. } => value.as_str(),
                other => panic!("expected phrase, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn scenario_phrases_flags_and_option_flags() {
        let result = parse(r#"hello "foo bar" --flag -o 42"#, &["--flag"], &["-o"]);
        assert_eq!(phrase_values(&result), vec!["hello", "foo bar"]);
        assert_eq!(result.flags.len(), 1);
        match &result.flags[0] {
            Parsed::Flag { key, .. } => assert_eq!(key, "--flag"),
            other => panic!("expected flag, got {other:?}"),
        }
        assert_eq!(result.option_flags.len(), 1);
        match &result.option_flags[0] {
            Parsed::OptionFlag { key, value, .. } => {
                assert_eq!(key, "-o");
                assert_eq!(value, "42");
            }
            other => panic!("expected option flag, got {other:?}"),
        }
    }

    #[test]
    fn raw_spans_round_trip_exactly() {
        let inputs = [
            r#"hello "foo bar" --flag -o 42"#,
            "  leading and   trailing  ",
            r#""unterminated quote runs on"#,
            "\u{201C}smart quoted\u{201D} tail",
            r#"-o "quoted value" x"#,
            "plain",
            "   ",
        ];
        for input in inputs {
            let result = parse(input, &["--flag"], &["-o"]);
            let rebuilt: String = result.all.iter().map(Parsed::raw).collect();
            assert_eq!(rebuilt, input, "round-trip failed for {input:?}");
        }
    }

    #[test]
    fn filtered_sequences_are_stable_subsequences() {
        let result = parse("a --flag b -o v c", &["--flag"], &["-o"]);
        assert_eq!(result.all.len(), 5);
        assert_eq!(result.phrases.len(), 3);
        assert_eq!(result.flags.len(), 1);
        assert_eq!(result.option_flags.len(), 1);
        // Source order is preserved in `all`.
        assert!(matches!(result.all[0], Parsed::Phrase { .. }));
        assert!(matches!(result.all[1], Parsed::Flag { .. }));
        assert!(matches!(result.all[3], Parsed::OptionFlag { .. }));
    }

    #[test]
    fn quoted_phrase_strips_quotes_from_value() {
        let result = parse(r#""foo  bar""#, &[], &[]);
        assert_eq!(phrase_values(&result), vec!["foo  bar"]);
        assert_eq!(result.phrases[0].raw(), r#""foo  bar""#);
    }

    #[test]
    fn unterminated_quote_runs_to_end_of_input() {
        let result = parse(r#"x "a b"#, &[], &[]);
        assert_eq!(phrase_values(&result), vec!["x", "a b"]);
    }

    #[test]
    fn option_flag_without_value_yields_empty_value() {
        let result = parse("-o", &[], &["-o"]);
        match &result.option_flags[0] {
            Parsed::OptionFlag { value, .. } => assert_eq!(value, ""),
            other => panic!("expected option flag, got {other:?}"),
        }
    }

    #[test]
    fn option_flag_takes_quoted_phrase_value() {
        let result = parse(r#"-o "a b""#, &[], &["-o"]);
        match &result.option_flags[0] {
            Parsed::OptionFlag { value, raw, .. } => {
                assert_eq!(value, "a b");
                assert_eq!(raw, r#"-o "a b""#);
            }
            other => panic!("expected option flag, got {other:?}"),
        }
    }

    #[test]
    fn whitespace_only_input_is_one_empty_phrase() {
        let result = parse("   ", &[], &[]);
        assert_eq!(result.all.len(), 1);
        match &result.all[0] {
            Parsed::Phrase { value, raw } => {
                assert_eq!(value, "");
                assert_eq!(raw, "   ");
            }
            other => panic!("expected phrase, got {other:?}"),
        }
    }

    #[test]
    fn separator_mode_groups_word_runs() {
        let options = ContentParserOptions {
            tokenizer: TokenizerOptions {
                separator: Some("|".into()),
                ..TokenizerOptions::default()
            },
        };
        let input = "one two | three |  four";
        let result = parse_content(input, &options);
        assert_eq!(phrase_values(&result), vec!["one two", "three", "four"]);
        let rebuilt: String = result.all.iter().map(Parsed::raw).collect();
        assert_eq!(rebuilt, input);
    }
}

//! Argument parsing and resolution for chat commands.
//!
//! Turns raw message content into a named argument record in four layers:
//!
//! - [`token`] -- a total tokenizer producing flag, quote, word,
//!   separator, and whitespace tokens.
//! - [`content`] -- groups tokens into phrases, flags, and option flags
//!   while preserving the exact source text in raw spans.
//! - [`typing`] -- the [`TypeResolver`](typing::TypeResolver), built-in
//!   casters, and the [`TypeSpec`](typing::TypeSpec) combinators.
//! - [`argument`], [`prompt`], [`runner`], [`flow`] -- argument
//!   descriptors, the interactive prompt state machine, the per-command
//!   runner, and data-dependent argument flows.
//!
//! Failed casts and user-driven aborts are values ([`Cast`],
//! [`Signal`](banter_types::Signal)), never errors; `anyhow::Error` is
//! reserved for transport and configuration faults.

pub mod argument;
pub mod content;
pub mod flow;
pub mod prompt;
pub mod runner;
pub mod token;
pub mod typing;

pub use argument::{validate_arguments, ArgOutcome, Argument, DefaultValue, MatchKind, Unordered};
pub use content::{parse_content, ContentParserOptions, ContentParserResult, Parsed};
pub use flow::{ArgumentFlow, FlowStep};
pub use prompt::{PromptContent, PromptOptions, PromptOverrides, PromptState};
pub use runner::{parser_options_for, ArgumentRunner, RunOutcome};
pub use token::{tokenize, Token, TokenKind, TokenizerOptions};
pub use typing::{caster, Cast, TypeCaster, TypeResolver, TypeSpec};

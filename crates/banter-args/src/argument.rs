//! Single-argument descriptors and per-argument processing.
//!
//! An [`Argument`] describes how one named value is claimed from parsed
//! content: its match strategy, its type spec, and what happens when the
//! input is missing or fails to cast (default value, `otherwise` responder,
//! or an interactive prompt). Descriptors are built once when their owning
//! command loads and are immutable afterwards; [`validate_arguments`]
//! raises configuration mistakes loudly at that point.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use banter_types::{BanterError, CommandContext, Signal};

use crate::prompt::{collect, PromptContent, PromptOptions, PromptOverrides, PromptState};
use crate::typing::{Cast, TypeResolver, TypeSpec};

/// The strategy by which an argument claims a portion of parsed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Consume the next sequential phrase (or an explicit index).
    Phrase,
    /// Join all remaining phrases into one raw unit, cast once.
    Rest,
    /// Cast each remaining phrase independently, yielding a sequence.
    Separate,
    /// Boolean presence of one of the configured flag spellings.
    Flag,
    /// The value carried by one of the configured option flags.
    Option,
    /// A raw window of phrase spans, original formatting preserved.
    Text,
    /// A raw window of all content spans, original formatting preserved.
    Content,
    /// Cast an empty string; for side-effecting always-run arguments.
    None,
}

/// Candidate index set for unordered phrase matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unordered {
    /// Ordinary sequential matching.
    No,
    /// Scan every remaining phrase index.
    All,
    /// Scan from the given index to the end.
    From(usize),
    /// Scan exactly these indices.
    Positions(Vec<usize>),
}

/// The value used when an argument cannot be resolved from input.
#[derive(Clone)]
pub enum DefaultValue {
    /// No default configured; resolves to `Value::Null`.
    None,
    /// A literal value.
    Value(Value),
    /// Computed from the context.
    Supply(Arc<dyn Fn(&CommandContext) -> Value + Send + Sync>),
}

impl DefaultValue {
    /// Whether no default was configured.
    pub fn is_none(&self) -> bool {
        matches!(self, DefaultValue::None)
    }

    /// Resolve the default against the context.
    pub fn resolve(&self, ctx: &CommandContext) -> Value {
        match self {
            DefaultValue::None => Value::Null,
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Supply(f) => f(ctx),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::None => f.write_str("None"),
            DefaultValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DefaultValue::Supply(_) => f.write_str("Supply(..)"),
        }
    }
}

/// Outcome of processing one argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgOutcome {
    /// The resolved value for the argument record.
    Value(Value),
    /// A control-flow signal; the runner short-circuits on it.
    Signal(Signal),
}

/// Descriptor for one named argument of a command.
#[derive(Debug, Clone)]
pub struct Argument {
    /// Key in the final argument record.
    pub id: String,
    /// How this argument claims parsed content.
    pub match_kind: MatchKind,
    /// How the claimed raw unit is cast.
    pub type_spec: TypeSpec,
    /// Flag spellings for `Flag`/`Option` matches (case-insensitive).
    pub flags: Vec<String>,
    /// For `Option` matches, collect every matching occurrence.
    pub multiple_flags: bool,
    /// Explicit phrase index; `None` uses the shared sequential cursor.
    pub index: Option<usize>,
    /// Unordered candidate scan for `Phrase` matches.
    pub unordered: Unordered,
    /// Cap on how many phrases `Rest`/`Separate`/`Text`/`Content` claim,
    /// or how many values an infinite prompt accumulates.
    pub limit: usize,
    /// Per-argument prompt overrides; presence enables prompting.
    pub prompt: Option<PromptOverrides>,
    /// Value when input is missing or casting fails without a prompt.
    pub default: DefaultValue,
    /// Responder that cancels the command instead of prompting.
    pub otherwise: Option<PromptContent>,
}

impl Argument {
    /// Create a descriptor with the given id, match strategy, and type.
    pub fn new(
        id: impl Into<String>,
        match_kind: MatchKind,
        type_spec: impl Into<TypeSpec>,
    ) -> Self {
        Self {
            id: id.into(),
            match_kind,
            type_spec: type_spec.into(),
            flags: Vec::new(),
            multiple_flags: false,
            index: None,
            unordered: Unordered::No,
            limit: usize::MAX,
            prompt: None,
            default: DefaultValue::None,
            otherwise: None,
        }
    }

    /// Set the flag spellings for `Flag`/`Option` matches.
    pub fn with_flags(mut self, flags: &[&str]) -> Self {
        self.flags = flags.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Collect every matching option flag occurrence.
    pub fn with_multiple_flags(mut self) -> Self {
        self.multiple_flags = true;
        self
    }

    /// Claim the phrase at an explicit index instead of the cursor.
    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Enable unordered candidate scanning for `Phrase` matches.
    pub fn with_unordered(mut self, unordered: Unordered) -> Self {
        self.unordered = unordered;
        self
    }

    /// Cap the number of claimed phrases or collected values.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Enable interactive prompting with these overrides.
    pub fn with_prompt(mut self, prompt: PromptOverrides) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Set a literal default value.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = DefaultValue::Value(value.into());
        self
    }

    /// Set a default computed from the context.
    pub fn with_default_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&CommandContext) -> Value + Send + Sync + 'static,
    {
        self.default = DefaultValue::Supply(Arc::new(f));
        self
    }

    /// Set an `otherwise` responder. When resolution fails, it is sent and
    /// the command is cancelled; this takes priority over prompting.
    pub fn with_otherwise(mut self, content: PromptContent) -> Self {
        self.otherwise = Some(content);
        self
    }

    /// Cast one raw unit and resolve the outcome.
    ///
    /// `prompts` must already be merged across handler defaults, command
    /// overrides, and this argument's own overrides.
    pub async fn process(
        &self,
        ctx: &CommandContext,
        resolver: &TypeResolver,
        prompts: &PromptOptions,
        raw: &str,
    ) -> Result<ArgOutcome> {
        if raw.is_empty() && prompts.optional {
            if let Some(otherwise) = &self.otherwise {
                self.send_otherwise(ctx, otherwise, raw, None).await?;
                return Ok(ArgOutcome::Signal(Signal::Cancel));
            }
            debug!(id = %self.id, "optional argument resolved to default");
            return Ok(ArgOutcome::Value(self.default.resolve(ctx)));
        }

        match resolver.cast(&self.type_spec, ctx, raw).await? {
            Cast::Ok(value) => Ok(ArgOutcome::Value(value)),
            failure => {
                let reason = match failure {
                    Cast::Fail(reason) => reason,
                    _ => None,
                };
                if let Some(otherwise) = &self.otherwise {
                    self.send_otherwise(ctx, otherwise, raw, reason).await?;
                    return Ok(ArgOutcome::Signal(Signal::Cancel));
                }
                if self.prompt.is_some() {
                    return collect(&self.type_spec, resolver, ctx, prompts, raw).await;
                }
                debug!(id = %self.id, "cast failed without prompt, using default");
                Ok(ArgOutcome::Value(self.default.resolve(ctx)))
            }
        }
    }

    async fn send_otherwise(
        &self,
        ctx: &CommandContext,
        content: &PromptContent,
        raw: &str,
        failure: Option<Value>,
    ) -> Result<()> {
        let state = PromptState {
            retry: 1,
            infinite: false,
            phrase: raw.to_string(),
            failure,
        };
        let text = content.resolve(ctx, &state);
        if !text.is_empty() {
            ctx.conversation.send(&text).await?;
        }
        Ok(())
    }
}

/// Validate an argument list at command-load time.
///
/// Duplicate ids, flag matches without spellings, and empty literal alias
/// groups are programmer errors and fail loudly here rather than at parse
/// time.
pub fn validate_arguments(args: &[Argument]) -> Result<(), BanterError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for arg in args {
        if !seen.insert(arg.id.as_str()) {
            return Err(BanterError::DuplicateArgument(arg.id.clone()));
        }
        if matches!(arg.match_kind, MatchKind::Flag | MatchKind::Option) && arg.flags.is_empty() {
            return Err(BanterError::MissingFlagSpelling(arg.id.clone()));
        }
        arg.type_spec.validate_config(&arg.id)?;
    }
    Ok(())
}

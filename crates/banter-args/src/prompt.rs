//! Interactive prompt configuration and the collection state machine.
//!
//! When an argument's initial input fails to cast and a prompt is
//! configured, the pipeline enters a multi-turn loop: send a prompt, await
//! one reply, try the cancel/stop words and breakout, cast the reply, and
//! either finish, retry, or give up. Expected failure modes (timeout,
//! cancel word, retries exhausted) become [`Signal`] values; only genuine
//! errors from the conversation backend propagate.
//!
//! Prompt options merge in priority order: per-argument overrides, then
//! per-command overrides, then the handler-wide defaults. Missing keys fall
//! through to the next layer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use banter_types::{CommandContext, Signal};

use crate::argument::ArgOutcome;
use crate::typing::{Cast, TypeResolver, TypeSpec};

/// Snapshot of the collection loop passed to content suppliers and
/// modifiers.
#[derive(Debug, Clone)]
pub struct PromptState {
    /// The current attempt number, starting at 1. A non-empty command-line
    /// input that failed casting counts as the first attempt.
    pub retry: u32,
    /// Whether the loop is accumulating an infinite sequence.
    pub infinite: bool,
    /// The most recent raw input that was tried.
    pub phrase: String,
    /// Diagnostic payload from the most recent failed cast, if any.
    pub failure: Option<Value>,
}

/// A supplier of prompt text from the current context and loop state.
pub type Supplier = dyn Fn(&CommandContext, &PromptState) -> String + Send + Sync;

/// A transform applied to resolved prompt text before sending.
pub type Modifier = dyn Fn(&CommandContext, &PromptState, String) -> String + Send + Sync;

/// Prompt text: a literal, lines joined by newline, or a supplier.
#[derive(Clone)]
pub enum PromptContent {
    /// A literal string.
    Text(String),
    /// Multiple lines, joined with newline on resolution.
    Lines(Vec<String>),
    /// Computed from the context and loop state.
    Supply(Arc<Supplier>),
}

impl PromptContent {
    /// A literal string.
    pub fn text(text: impl Into<String>) -> Self {
        PromptContent::Text(text.into())
    }

    /// Multiple lines, joined with newline.
    pub fn lines(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        PromptContent::Lines(lines.into_iter().map(Into::into).collect())
    }

    /// Computed from the context and loop state.
    pub fn supply<F>(f: F) -> Self
    where
        F: Fn(&CommandContext, &PromptState) -> String + Send + Sync + 'static,
    {
        PromptContent::Supply(Arc::new(f))
    }

    /// Resolve to the final text.
    pub fn resolve(&self, ctx: &CommandContext, state: &PromptState) -> String {
        match self {
            PromptContent::Text(s) => s.clone(),
            PromptContent::Lines(lines) => lines.join("\n"),
            PromptContent::Supply(f) => f(ctx, state),
        }
    }
}

impl fmt::Debug for PromptContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptContent::Text(s) => f.debug_tuple("Text").field(s).finish(),
            PromptContent::Lines(l) => f.debug_tuple("Lines").field(l).finish(),
            PromptContent::Supply(_) => f.write_str("Supply(..)"),
        }
    }
}

/// Fully-resolved prompt options after layering.
#[derive(Clone)]
pub struct PromptOptions {
    /// Total prompts the user may receive for one value. A failing
    /// non-empty command-line input consumes the first attempt.
    pub retries: u32,
    /// How long to wait for each reply.
    pub time: Duration,
    /// Case-insensitive word that aborts the command.
    pub cancel_word: String,
    /// Case-insensitive word that ends an infinite collection.
    pub stop_word: String,
    /// Whether an empty initial input resolves to the default instead of
    /// casting and prompting.
    pub optional: bool,
    /// Whether to accumulate an ordered sequence of values.
    pub infinite: bool,
    /// Maximum number of values an infinite collection accumulates.
    pub limit: usize,
    /// Whether a reply that parses as another command aborts collection
    /// with a retry signal.
    pub breakout: bool,
    /// Content for the first prompt of each value.
    pub start: Option<PromptContent>,
    /// Content for subsequent attempts.
    pub retry: Option<PromptContent>,
    /// Content sent when the reply window elapses.
    pub timeout: Option<PromptContent>,
    /// Content sent when retries are exhausted.
    pub ended: Option<PromptContent>,
    /// Content sent when the user cancels.
    pub cancel: Option<PromptContent>,
    /// Transform for resolved start content.
    pub modify_start: Option<Arc<Modifier>>,
    /// Transform for resolved retry content.
    pub modify_retry: Option<Arc<Modifier>>,
    /// Transform for resolved timeout content.
    pub modify_timeout: Option<Arc<Modifier>>,
    /// Transform for resolved ended content.
    pub modify_ended: Option<Arc<Modifier>>,
    /// Transform for resolved cancel content.
    pub modify_cancel: Option<Arc<Modifier>>,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            retries: 2,
            time: Duration::from_secs(30),
            cancel_word: "cancel".to_string(),
            stop_word: "stop".to_string(),
            optional: false,
            infinite: false,
            limit: usize::MAX,
            breakout: true,
            start: None,
            retry: None,
            timeout: None,
            ended: None,
            cancel: None,
            modify_start: None,
            modify_retry: None,
            modify_timeout: None,
            modify_ended: None,
            modify_cancel: None,
        }
    }
}

impl fmt::Debug for PromptOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptOptions")
            .field("retries", &self.retries)
            .field("time", &self.time)
            .field("cancel_word", &self.cancel_word)
            .field("stop_word", &self.stop_word)
            .field("optional", &self.optional)
            .field("infinite", &self.infinite)
            .field("limit", &self.limit)
            .field("breakout", &self.breakout)
            .finish_non_exhaustive()
    }
}

impl PromptOptions {
    /// Layer a set of overrides on top of these options. Present keys win;
    /// missing keys fall through.
    pub fn apply(mut self, overrides: &PromptOverrides) -> Self {
        macro_rules! take {
            ($field:ident) => {
                if let Some(v) = &overrides.$field {
                    self.$field = v.clone();
                }
            };
        }
        macro_rules! take_opt {
            ($field:ident) => {
                if let Some(v) = &overrides.$field {
                    self.$field = Some(v.clone());
                }
            };
        }
        take!(retries);
        take!(time);
        take!(cancel_word);
        take!(stop_word);
        take!(optional);
        take!(infinite);
        take!(limit);
        take!(breakout);
        take_opt!(start);
        take_opt!(retry);
        take_opt!(timeout);
        take_opt!(ended);
        take_opt!(cancel);
        take_opt!(modify_start);
        take_opt!(modify_retry);
        take_opt!(modify_timeout);
        take_opt!(modify_ended);
        take_opt!(modify_cancel);
        self
    }

    /// Layer an optional set of overrides.
    pub fn apply_opt(self, overrides: Option<&PromptOverrides>) -> Self {
        match overrides {
            Some(o) => self.apply(o),
            None => self,
        }
    }
}

/// Partial prompt options for one layer of the merge.
#[derive(Clone, Default)]
pub struct PromptOverrides {
    /// See [`PromptOptions::retries`].
    pub retries: Option<u32>,
    /// See [`PromptOptions::time`].
    pub time: Option<Duration>,
    /// See [`PromptOptions::cancel_word`].
    pub cancel_word: Option<String>,
    /// See [`PromptOptions::stop_word`].
    pub stop_word: Option<String>,
    /// See [`PromptOptions::optional`].
    pub optional: Option<bool>,
    /// See [`PromptOptions::infinite`].
    pub infinite: Option<bool>,
    /// See [`PromptOptions::limit`].
    pub limit: Option<usize>,
    /// See [`PromptOptions::breakout`].
    pub breakout: Option<bool>,
    /// See [`PromptOptions::start`].
    pub start: Option<PromptContent>,
    /// See [`PromptOptions::retry`].
    pub retry: Option<PromptContent>,
    /// See [`PromptOptions::timeout`].
    pub timeout: Option<PromptContent>,
    /// See [`PromptOptions::ended`].
    pub ended: Option<PromptContent>,
    /// See [`PromptOptions::cancel`].
    pub cancel: Option<PromptContent>,
    /// See [`PromptOptions::modify_start`].
    pub modify_start: Option<Arc<Modifier>>,
    /// See [`PromptOptions::modify_retry`].
    pub modify_retry: Option<Arc<Modifier>>,
    /// See [`PromptOptions::modify_timeout`].
    pub modify_timeout: Option<Arc<Modifier>>,
    /// See [`PromptOptions::modify_ended`].
    pub modify_ended: Option<Arc<Modifier>>,
    /// See [`PromptOptions::modify_cancel`].
    pub modify_cancel: Option<Arc<Modifier>>,
}

impl PromptOverrides {
    /// Empty overrides; every key falls through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry budget.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Set the reply window.
    pub fn time(mut self, time: Duration) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the cancel word.
    pub fn cancel_word(mut self, word: impl Into<String>) -> Self {
        self.cancel_word = Some(word.into());
        self
    }

    /// Set the stop word.
    pub fn stop_word(mut self, word: impl Into<String>) -> Self {
        self.stop_word = Some(word.into());
        self
    }

    /// Mark the argument optional.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    /// Enable infinite collection.
    pub fn infinite(mut self, infinite: bool) -> Self {
        self.infinite = Some(infinite);
        self
    }

    /// Cap an infinite collection.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Enable or disable breakout.
    pub fn breakout(mut self, breakout: bool) -> Self {
        self.breakout = Some(breakout);
        self
    }

    /// Set the start content.
    pub fn start(mut self, content: PromptContent) -> Self {
        self.start = Some(content);
        self
    }

    /// Set the retry content.
    pub fn retry(mut self, content: PromptContent) -> Self {
        self.retry = Some(content);
        self
    }

    /// Set the timeout content.
    pub fn timeout(mut self, content: PromptContent) -> Self {
        self.timeout = Some(content);
        self
    }

    /// Set the ended content.
    pub fn ended(mut self, content: PromptContent) -> Self {
        self.ended = Some(content);
        self
    }

    /// Set the cancel content.
    pub fn cancel(mut self, content: PromptContent) -> Self {
        self.cancel = Some(content);
        self
    }
}

impl fmt::Debug for PromptOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptOverrides")
            .field("retries", &self.retries)
            .field("time", &self.time)
            .field("optional", &self.optional)
            .field("infinite", &self.infinite)
            .field("limit", &self.limit)
            .field("breakout", &self.breakout)
            .finish_non_exhaustive()
    }
}

/// Which prompt content the next loop iteration sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    Retry,
}

/// Send one stage's content, if configured and non-empty after resolution.
async fn send_stage(
    ctx: &CommandContext,
    content: &Option<PromptContent>,
    modifier: &Option<Arc<Modifier>>,
    state: &PromptState,
) -> Result<()> {
    let Some(content) = content else {
        return Ok(());
    };
    let mut text = content.resolve(ctx, state);
    if let Some(modifier) = modifier {
        text = modifier(ctx, state, text);
    }
    if text.is_empty() {
        return Ok(());
    }
    ctx.conversation.send(&text).await
}

/// Run the collection state machine for one argument.
///
/// `initial_phrase` is the command-line input that already failed casting;
/// when non-empty it counts as the first consumed attempt, so the loop
/// starts at attempt 2 with the retry prompt.
pub(crate) async fn collect(
    spec: &TypeSpec,
    resolver: &TypeResolver,
    ctx: &CommandContext,
    opts: &PromptOptions,
    initial_phrase: &str,
) -> Result<ArgOutcome> {
    ctx.conversation.begin_prompt();
    let outcome = drive(spec, resolver, ctx, opts, initial_phrase).await;
    ctx.conversation.end_prompt();
    outcome
}

async fn drive(
    spec: &TypeSpec,
    resolver: &TypeResolver,
    ctx: &CommandContext,
    opts: &PromptOptions,
    initial_phrase: &str,
) -> Result<ArgOutcome> {
    let mut values: Vec<Value> = Vec::new();
    let consumed_initial = !initial_phrase.is_empty();
    let mut attempt: u32 = if consumed_initial { 2 } else { 1 };
    let mut stage = if consumed_initial {
        Stage::Retry
    } else {
        Stage::Start
    };
    let mut last_input = initial_phrase.to_string();
    let mut last_failure: Option<Value> = None;

    loop {
        let state = PromptState {
            retry: attempt,
            infinite: opts.infinite,
            phrase: last_input.clone(),
            failure: last_failure.clone(),
        };

        if attempt > opts.retries {
            debug!(attempt, retries = opts.retries, "prompt retries exhausted");
            send_stage(ctx, &opts.ended, &opts.modify_ended, &state).await?;
            return Ok(ArgOutcome::Signal(Signal::Cancel));
        }

        match stage {
            Stage::Start => send_stage(ctx, &opts.start, &opts.modify_start, &state).await?,
            Stage::Retry => send_stage(ctx, &opts.retry, &opts.modify_retry, &state).await?,
        }

        let reply = match tokio::time::timeout(opts.time, ctx.conversation.await_reply()).await {
            Err(_elapsed) => {
                warn!(time_ms = opts.time.as_millis() as u64, "prompt timed out");
                send_stage(ctx, &opts.timeout, &opts.modify_timeout, &state).await?;
                return Ok(ArgOutcome::Signal(Signal::Cancel));
            }
            Ok(Err(e)) => return Err(e),
            Ok(Ok(None)) => {
                warn!("conversation closed while awaiting a prompt reply");
                return Ok(ArgOutcome::Signal(Signal::Cancel));
            }
            Ok(Ok(Some(reply))) => reply,
        };
        let trimmed = reply.trim();

        if opts.breakout && ctx.conversation.is_command_invocation(&reply).await {
            debug!("prompt breakout to another command invocation");
            return Ok(ArgOutcome::Signal(Signal::retry(reply)));
        }

        if trimmed.to_lowercase() == opts.cancel_word.to_lowercase() {
            send_stage(ctx, &opts.cancel, &opts.modify_cancel, &state).await?;
            return Ok(ArgOutcome::Signal(Signal::Cancel));
        }

        if opts.infinite && trimmed.to_lowercase() == opts.stop_word.to_lowercase() {
            if values.is_empty() {
                // An empty infinite collection is rejected; prompt afresh.
                stage = Stage::Start;
                continue;
            }
            return Ok(ArgOutcome::Value(Value::Array(values)));
        }

        last_input = reply.clone();
        match resolver.cast(spec, ctx, trimmed).await? {
            Cast::Ok(value) => {
                if !opts.infinite {
                    return Ok(ArgOutcome::Value(value));
                }
                values.push(value);
                if values.len() >= opts.limit {
                    return Ok(ArgOutcome::Value(Value::Array(values)));
                }
                // Fresh start-style prompt for the next value.
                attempt = 1;
                stage = Stage::Start;
                last_failure = None;
            }
            Cast::Fail(reason) => {
                last_failure = reason;
                attempt += 1;
                stage = Stage::Retry;
            }
            Cast::Miss => {
                last_failure = None;
                attempt += 1;
                stage = Stage::Retry;
            }
        }
    }
}

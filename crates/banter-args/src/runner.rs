//! The argument runner: orchestrates an argument list over parsed content.
//!
//! Dispatches each argument by its match kind, threads the shared phrase
//! cursor and used-index set through the run, and builds the final named
//! argument record. The first [`Signal`] produced by any argument
//! short-circuits the whole run; partial results are discarded by the
//! caller.
//!
//! All mutable run state lives in a per-run [`RunState`] -- concurrent
//! invocations share nothing.

use std::collections::HashSet;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::debug;

use banter_types::{CommandContext, Signal};

use crate::argument::{ArgOutcome, Argument, MatchKind, Unordered};
use crate::content::{parse_content, ContentParserOptions, ContentParserResult, Parsed};
use crate::prompt::{PromptOptions, PromptOverrides};
use crate::token::TokenizerOptions;
use crate::typing::{Cast, TypeResolver};

/// Result of running a full argument list.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The named argument record; keys are in declaration order.
    Record(Map<String, Value>),
    /// A control-flow signal that short-circuited the run.
    Signal(Signal),
}

impl RunOutcome {
    /// Extract the record on success.
    pub fn into_record(self) -> Option<Map<String, Value>> {
        match self {
            RunOutcome::Record(record) => Some(record),
            RunOutcome::Signal(_) => None,
        }
    }
}

/// Mutable state for one run, owned exclusively by that run.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    /// Next sequential phrase index.
    cursor: usize,
    /// Phrase indices consumed by unordered matching.
    used: HashSet<usize>,
}

impl RunState {
    /// Claim the next sequential phrase index, skipping indices already
    /// consumed by unordered arguments.
    fn take_next(&mut self) -> usize {
        let mut index = self.cursor;
        while self.used.contains(&index) {
            index += 1;
        }
        self.cursor = index + 1;
        index
    }
}

/// Derive tokenizer/parser options from an argument list: the flag
/// vocabulary comes from `Flag` and `Option` matches.
pub fn parser_options_for(
    args: &[Argument],
    quoted: bool,
    separator: Option<String>,
) -> ContentParserOptions {
    let mut flag_words: Vec<String> = Vec::new();
    let mut option_flag_words: Vec<String> = Vec::new();
    for arg in args {
        match arg.match_kind {
            MatchKind::Flag => flag_words.extend(arg.flags.iter().cloned()),
            MatchKind::Option => option_flag_words.extend(arg.flags.iter().cloned()),
            _ => {}
        }
    }
    flag_words.sort_unstable();
    flag_words.dedup();
    option_flag_words.sort_unstable();
    option_flag_words.dedup();
    ContentParserOptions {
        tokenizer: TokenizerOptions {
            flag_words,
            option_flag_words,
            quoted,
            separator,
        },
    }
}

/// Runs argument lists against parsed content.
///
/// Owns the type resolver and the handler-wide prompt defaults. Command
/// and argument prompt overrides layer on top per run.
#[derive(Debug)]
pub struct ArgumentRunner {
    resolver: TypeResolver,
    prompt_defaults: PromptOptions,
}

impl ArgumentRunner {
    /// Create a runner around a type resolver.
    pub fn new(resolver: TypeResolver) -> Self {
        Self {
            resolver,
            prompt_defaults: PromptOptions::default(),
        }
    }

    /// Layer handler-wide prompt defaults.
    pub fn with_prompt_defaults(mut self, overrides: PromptOverrides) -> Self {
        self.prompt_defaults = self.prompt_defaults.apply(&overrides);
        self
    }

    /// The type resolver backing this runner.
    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    /// Mutable access to the resolver, for registering types.
    pub fn resolver_mut(&mut self) -> &mut TypeResolver {
        &mut self.resolver
    }

    /// Run an argument list over parsed content.
    pub async fn run(
        &self,
        ctx: &CommandContext,
        content: &ContentParserResult,
        args: &[Argument],
    ) -> Result<RunOutcome> {
        self.run_with_overrides(ctx, content, args, None).await
    }

    /// Run with per-command prompt overrides layered between the handler
    /// defaults and each argument's own overrides.
    pub async fn run_with_overrides(
        &self,
        ctx: &CommandContext,
        content: &ContentParserResult,
        args: &[Argument],
        command_prompts: Option<&PromptOverrides>,
    ) -> Result<RunOutcome> {
        let mut state = RunState::default();
        let mut record = Map::new();
        for arg in args {
            match self
                .run_one(ctx, content, arg, command_prompts, &mut state)
                .await?
            {
                ArgOutcome::Value(value) => {
                    record.insert(arg.id.clone(), value);
                }
                ArgOutcome::Signal(signal) => {
                    debug!(id = %arg.id, ?signal, "argument run short-circuited");
                    return Ok(RunOutcome::Signal(signal));
                }
            }
        }
        Ok(RunOutcome::Record(record))
    }

    /// Tokenize, parse, and run raw content in one call, deriving the flag
    /// vocabulary from the argument list.
    pub async fn run_content(
        &self,
        ctx: &CommandContext,
        raw: &str,
        args: &[Argument],
        quoted: bool,
        separator: Option<String>,
    ) -> Result<RunOutcome> {
        let options = parser_options_for(args, quoted, separator);
        let content = parse_content(raw, &options);
        self.run(ctx, &content, args).await
    }

    /// Process one argument against the parsed content.
    pub(crate) async fn run_one(
        &self,
        ctx: &CommandContext,
        content: &ContentParserResult,
        arg: &Argument,
        command_prompts: Option<&PromptOverrides>,
        state: &mut RunState,
    ) -> Result<ArgOutcome> {
        let prompts = self
            .prompt_defaults
            .clone()
            .apply_opt(command_prompts)
            .apply_opt(arg.prompt.as_ref());
        debug!(id = %arg.id, kind = ?arg.match_kind, "running argument");
        match arg.match_kind {
            MatchKind::Phrase => self.run_phrase(ctx, content, arg, &prompts, state).await,
            MatchKind::Rest => self.run_rest(ctx, content, arg, &prompts, state).await,
            MatchKind::Separate => self.run_separate(ctx, content, arg, &prompts, state).await,
            MatchKind::Flag => Ok(self.run_flag(content, arg)),
            MatchKind::Option => self.run_option(ctx, content, arg, &prompts).await,
            MatchKind::Text => self.run_text(ctx, content, arg, &prompts, state).await,
            MatchKind::Content => self.run_all_content(ctx, content, arg, &prompts, state).await,
            MatchKind::None => arg.process(ctx, &self.resolver, &prompts, "").await,
        }
    }

    async fn run_phrase(
        &self,
        ctx: &CommandContext,
        content: &ContentParserResult,
        arg: &Argument,
        prompts: &PromptOptions,
        state: &mut RunState,
    ) -> Result<ArgOutcome> {
        if arg.unordered != Unordered::No {
            let candidates: Vec<usize> = match &arg.unordered {
                Unordered::All => (0..content.phrases.len()).collect(),
                Unordered::From(from) => (*from..content.phrases.len()).collect(),
                Unordered::Positions(positions) => positions.clone(),
                Unordered::No => Vec::new(),
            };
            for index in candidates {
                if state.used.contains(&index) {
                    continue;
                }
                let Some(phrase) = content.phrases.get(index) else {
                    continue;
                };
                let outcome = self
                    .resolver
                    .cast(&arg.type_spec, ctx, phrase_value(phrase))
                    .await?;
                if let Cast::Ok(value) = outcome {
                    state.used.insert(index);
                    return Ok(ArgOutcome::Value(value));
                }
            }
            // No candidate cast successfully; process an empty phrase.
            return arg.process(ctx, &self.resolver, prompts, "").await;
        }

        let index = match arg.index {
            Some(index) => index,
            None => state.take_next(),
        };
        let raw_unit = content.phrases.get(index).map(phrase_value).unwrap_or("");
        arg.process(ctx, &self.resolver, prompts, raw_unit).await
    }

    async fn run_rest(
        &self,
        ctx: &CommandContext,
        content: &ContentParserResult,
        arg: &Argument,
        prompts: &PromptOptions,
        state: &mut RunState,
    ) -> Result<ArgOutcome> {
        let start = arg.index.unwrap_or(state.cursor);
        let end = start.saturating_add(arg.limit).min(content.phrases.len());
        let window = content.phrases.get(start..end).unwrap_or(&[]);
        // Raw spans preserve the original interior spacing; only the outer
        // edges are trimmed.
        let joined: String = window.iter().map(Parsed::raw).collect();
        let joined = joined.trim().to_string();
        if arg.index.is_none() {
            state.cursor = end;
        }
        arg.process(ctx, &self.resolver, prompts, &joined).await
    }

    async fn run_separate(
        &self,
        ctx: &CommandContext,
        content: &ContentParserResult,
        arg: &Argument,
        prompts: &PromptOptions,
        state: &mut RunState,
    ) -> Result<ArgOutcome> {
        let start = arg.index.unwrap_or(state.cursor);
        let end = start.saturating_add(arg.limit).min(content.phrases.len());
        let window = content.phrases.get(start..end).unwrap_or(&[]);
        if window.is_empty() {
            return arg.process(ctx, &self.resolver, prompts, "").await;
        }
        let mut values = Vec::with_capacity(window.len());
        for phrase in window {
            match arg
                .process(ctx, &self.resolver, prompts, phrase_value(phrase))
                .await?
            {
                ArgOutcome::Value(value) => values.push(value),
                signal => return Ok(signal),
            }
        }
        if arg.index.is_none() {
            state.cursor = end;
        }
        Ok(ArgOutcome::Value(Value::Array(values)))
    }

    fn run_flag(&self, content: &ContentParserResult, arg: &Argument) -> ArgOutcome {
        let present = content.flags.iter().any(|flag| match flag {
            Parsed::Flag { key, .. } => arg
                .flags
                .iter()
                .any(|spelling| spelling.to_lowercase() == key.to_lowercase()),
            _ => false,
        });
        // A configured default inverts presence.
        let value = if arg.default.is_none() {
            present
        } else {
            !present
        };
        ArgOutcome::Value(Value::Bool(value))
    }

    async fn run_option(
        &self,
        ctx: &CommandContext,
        content: &ContentParserResult,
        arg: &Argument,
        prompts: &PromptOptions,
    ) -> Result<ArgOutcome> {
        let matching = content.option_flags.iter().filter_map(|item| match item {
            Parsed::OptionFlag { key, value, .. }
                if arg
                    .flags
                    .iter()
                    .any(|spelling| spelling.to_lowercase() == key.to_lowercase()) =>
            {
                Some(value.as_str())
            }
            _ => None,
        });

        if arg.multiple_flags {
            let mut values = Vec::new();
            for raw_unit in matching.take(arg.limit) {
                match arg.process(ctx, &self.resolver, prompts, raw_unit).await? {
                    ArgOutcome::Value(value) => values.push(value),
                    signal => return Ok(signal),
                }
            }
            return Ok(ArgOutcome::Value(Value::Array(values)));
        }

        let raw_unit = matching.into_iter().next().unwrap_or("");
        arg.process(ctx, &self.resolver, prompts, raw_unit).await
    }

    async fn run_text(
        &self,
        ctx: &CommandContext,
        content: &ContentParserResult,
        arg: &Argument,
        prompts: &PromptOptions,
        state: &mut RunState,
    ) -> Result<ArgOutcome> {
        let start = arg.index.unwrap_or(state.cursor);
        let end = start.saturating_add(arg.limit).min(content.phrases.len());
        let window = content.phrases.get(start..end).unwrap_or(&[]);
        let joined: String = window.iter().map(Parsed::raw).collect();
        arg.process(ctx, &self.resolver, prompts, joined.trim()).await
    }

    async fn run_all_content(
        &self,
        ctx: &CommandContext,
        content: &ContentParserResult,
        arg: &Argument,
        prompts: &PromptOptions,
        state: &mut RunState,
    ) -> Result<ArgOutcome> {
        let start = match arg.index {
            Some(index) => index,
            None => all_start(content, state.cursor),
        };
        let end = start.saturating_add(arg.limit).min(content.all.len());
        let window = content.all.get(start..end).unwrap_or(&[]);
        let joined: String = window.iter().map(Parsed::raw).collect();
        arg.process(ctx, &self.resolver, prompts, joined.trim()).await
    }
}

/// Map the shared phrase cursor into the all-items index space. Consuming
/// a phrase sequentially also consumes every non-phrase item before it, so
/// the window starts just past the cursor's last claimed phrase.
fn all_start(content: &ContentParserResult, cursor: usize) -> usize {
    if cursor == 0 {
        return 0;
    }
    let mut seen = 0;
    for (index, item) in content.all.iter().enumerate() {
        if matches!(item, Parsed::Phrase { .. }) {
            seen += 1;
            if seen == cursor {
                return index + 1;
            }
        }
    }
    content.all.len()
}

fn phrase_value(item: &Parsed) -> &str {
    match item {
        Parsed::Phrase { value, .. } => value,
        other => other.raw(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use banter_types::Conversation;
    use serde_json::json;

    use super::*;
    use crate::prompt::PromptContent;

    struct Recorder {
        sent: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Conversation for Recorder {
        async fn send(&self, content: &str) -> Result<()> {
            self.sent.lock().unwrap().push(content.to_string());
            Ok(())
        }
        async fn await_reply(&self) -> Result<Option<String>> {
            Ok(None)
        }
        fn name(&self) -> &str {
            "recorder"
        }
    }

    fn ctx() -> CommandContext {
        CommandContext::new("user", "channel", Recorder::new())
    }

    fn runner() -> ArgumentRunner {
        ArgumentRunner::new(TypeResolver::new())
    }

    async fn run(raw: &str, args: &[Argument]) -> RunOutcome {
        runner()
            .run_content(&ctx(), raw, args, true, None)
            .await
            .unwrap()
    }

    #[test]
    fn parser_options_collect_the_flag_vocabulary() {
        let args = vec![
            Argument::new("verbose", MatchKind::Flag, "string").with_flags(&["--verbose", "-v"]),
            Argument::new("level", MatchKind::Option, "integer").with_flags(&["--level"]),
        ];
        let options = parser_options_for(&args, true, None);
        assert_eq!(options.tokenizer.flag_words, vec!["--verbose", "-v"]);
        assert_eq!(options.tokenizer.option_flag_words, vec!["--level"]);
    }

    #[tokio::test]
    async fn sequential_phrases_advance_without_overlap() {
        let args = vec![
            Argument::new("first", MatchKind::Phrase, "string"),
            Argument::new("second", MatchKind::Phrase, "string"),
        ];
        let record = run("alpha beta", &args).await.into_record().unwrap();
        assert_eq!(record["first"], "alpha");
        assert_eq!(record["second"], "beta");
    }

    #[tokio::test]
    async fn record_keys_keep_declaration_order() {
        let args = vec![
            Argument::new("zebra", MatchKind::Phrase, "string"),
            Argument::new("apple", MatchKind::Phrase, "string"),
        ];
        let record = run("one two", &args).await.into_record().unwrap();
        let keys: Vec<&String> = record.keys().collect();
        assert_eq!(keys, vec!["zebra", "apple"]);
    }

    #[tokio::test]
    async fn explicit_index_does_not_advance_the_cursor() {
        let args = vec![
            Argument::new("third", MatchKind::Phrase, "string").at_index(2),
            Argument::new("first", MatchKind::Phrase, "string"),
        ];
        let record = run("a b c", &args).await.into_record().unwrap();
        assert_eq!(record["third"], "c");
        assert_eq!(record["first"], "a");
    }

    #[tokio::test]
    async fn unordered_arguments_never_share_an_index() {
        let args = vec![
            Argument::new("x", MatchKind::Phrase, "integer").with_unordered(Unordered::All),
            Argument::new("y", MatchKind::Phrase, "integer").with_unordered(Unordered::All),
        ];
        let record = run("a 5 7", &args).await.into_record().unwrap();
        assert_eq!(record["x"], 5);
        assert_eq!(record["y"], 7);
    }

    #[tokio::test]
    async fn unordered_falls_back_to_empty_phrase() {
        let args = vec![Argument::new("x", MatchKind::Phrase, "integer")
            .with_unordered(Unordered::All)
            .with_default(0)];
        let record = run("a b", &args).await.into_record().unwrap();
        assert_eq!(record["x"], 0);
    }

    #[tokio::test]
    async fn rest_preserves_interior_spacing() {
        let args = vec![Argument::new("rest", MatchKind::Rest, "string")];
        let record = run("a  b   c", &args).await.into_record().unwrap();
        assert_eq!(record["rest"], "a  b   c");
    }

    #[tokio::test]
    async fn rest_starts_after_sequential_phrases() {
        let args = vec![
            Argument::new("first", MatchKind::Phrase, "string"),
            Argument::new("rest", MatchKind::Rest, "string"),
        ];
        let record = run("a b c", &args).await.into_record().unwrap();
        assert_eq!(record["first"], "a");
        assert_eq!(record["rest"], "b c");
    }

    #[tokio::test]
    async fn separate_casts_each_phrase() {
        let args = vec![Argument::new("nums", MatchKind::Separate, "integer")];
        let record = run("1 2 3", &args).await.into_record().unwrap();
        assert_eq!(record["nums"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn flag_presence_and_inversion() {
        let args = vec![
            Argument::new("loud", MatchKind::Flag, "string").with_flags(&["--loud"]),
            Argument::new("quiet", MatchKind::Flag, "string")
                .with_flags(&["--quiet"])
                .with_default(true),
        ];
        let record = run("--loud", &args).await.into_record().unwrap();
        assert_eq!(record["loud"], true);
        // Absent flag with a configured default is inverted.
        assert_eq!(record["quiet"], true);

        let record = run("--quiet", &args).await.into_record().unwrap();
        assert_eq!(record["loud"], false);
        assert_eq!(record["quiet"], false);
    }

    #[tokio::test]
    async fn flag_spellings_are_case_insensitive() {
        let args =
            vec![Argument::new("loud", MatchKind::Flag, "string").with_flags(&["--loud"])];
        let record = run("--LOUD", &args).await.into_record().unwrap();
        assert_eq!(record["loud"], true);
    }

    #[tokio::test]
    async fn flag_spellings_fold_non_ascii_case() {
        let args = vec![
            Argument::new("caffeinated", MatchKind::Flag, "string")
                .with_flags(&["--caf\u{E9}"]),
        ];
        let record = run("--CAF\u{C9}", &args).await.into_record().unwrap();
        assert_eq!(record["caffeinated"], true);
    }

    #[tokio::test]
    async fn option_flag_casts_its_value() {
        let args =
            vec![Argument::new("level", MatchKind::Option, "integer").with_flags(&["--level"])];
        let record = run("--level 3", &args).await.into_record().unwrap();
        assert_eq!(record["level"], 3);
    }

    #[tokio::test]
    async fn multiple_option_flags_collect_in_order() {
        let args = vec![Argument::new("tag", MatchKind::Option, "string")
            .with_flags(&["--tag"])
            .with_multiple_flags()];
        let record = run("--tag a --tag b", &args).await.into_record().unwrap();
        assert_eq!(record["tag"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn text_joins_phrase_spans_only() {
        let args = vec![
            Argument::new("verbose", MatchKind::Flag, "string").with_flags(&["--verbose"]),
            Argument::new("text", MatchKind::Text, "string"),
        ];
        let record = run("a --verbose b", &args).await.into_record().unwrap();
        // Flags are excluded from the text window.
        assert_eq!(record["text"], "a b");
    }

    #[tokio::test]
    async fn content_joins_all_spans() {
        let args = vec![
            Argument::new("verbose", MatchKind::Flag, "string").with_flags(&["--verbose"]),
            Argument::new("content", MatchKind::Content, "string"),
        ];
        let record = run("a --verbose b", &args).await.into_record().unwrap();
        assert_eq!(record["content"], "a --verbose b");
    }

    #[tokio::test]
    async fn content_window_skips_items_before_consumed_phrases() {
        // A flag ahead of the phrases must not shift the content window
        // back over a phrase an earlier argument already claimed.
        let args = vec![
            Argument::new("v", MatchKind::Flag, "string").with_flags(&["--v"]),
            Argument::new("first", MatchKind::Phrase, "string"),
            Argument::new("tail", MatchKind::Content, "string"),
        ];
        let record = run("--v a b", &args).await.into_record().unwrap();
        assert_eq!(record["first"], "a");
        assert_eq!(record["tail"], "b");
    }

    #[tokio::test]
    async fn none_match_casts_an_empty_string() {
        let args = vec![Argument::new("marker", MatchKind::None, "string").with_default("ran")];
        let record = run("anything", &args).await.into_record().unwrap();
        assert_eq!(record["marker"], "ran");
    }

    #[tokio::test]
    async fn a_signal_short_circuits_the_run() {
        let args = vec![
            Argument::new("bad", MatchKind::Phrase, "integer")
                .with_otherwise(PromptContent::text("bad input")),
            Argument::new("after", MatchKind::Phrase, "string"),
        ];
        let outcome = run("oops fine", &args).await;
        assert_eq!(outcome, RunOutcome::Signal(Signal::Cancel));
    }
}

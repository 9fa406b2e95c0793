//! Sequenced argument flows with data-dependent branching.
//!
//! An [`ArgumentFlow`] runs arguments one at a time against shared run
//! state, so later steps can be chosen from values already collected.
//! This replaces ad-hoc conditional argument lists: a [`FlowStep::Branch`]
//! inspects the partial record and either yields the next [`Argument`] or
//! skips itself.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};

use banter_types::CommandContext;

use crate::argument::{ArgOutcome, Argument};
use crate::content::ContentParserResult;
use crate::prompt::PromptOverrides;
use crate::runner::{ArgumentRunner, RunOutcome, RunState};

/// Chooses the next argument from the values collected so far.
pub type BranchFn = dyn Fn(&Map<String, Value>) -> Option<Argument> + Send + Sync;

/// One step of an argument flow.
#[derive(Clone)]
pub enum FlowStep {
    /// A fixed argument, always run.
    Arg(Argument),
    /// A data-dependent argument. Returning `None` skips the step and
    /// leaves the record untouched.
    Branch(Arc<BranchFn>),
}

impl fmt::Debug for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowStep::Arg(arg) => f.debug_tuple("Arg").field(arg).finish(),
            FlowStep::Branch(_) => f.debug_tuple("Branch").field(&"<fn>").finish(),
        }
    }
}

/// An ordered list of flow steps sharing one run's phrase cursor.
#[derive(Debug, Clone, Default)]
pub struct ArgumentFlow {
    steps: Vec<FlowStep>,
}

impl ArgumentFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fixed argument.
    pub fn then(mut self, arg: Argument) -> Self {
        self.steps.push(FlowStep::Arg(arg));
        self
    }

    /// Append a branch chosen from the partial record.
    pub fn branch<F>(mut self, f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Option<Argument> + Send + Sync + 'static,
    {
        self.steps.push(FlowStep::Branch(Arc::new(f)));
        self
    }

    /// Run the flow over parsed content. Signals short-circuit exactly as
    /// in [`ArgumentRunner::run`].
    pub async fn run(
        &self,
        runner: &ArgumentRunner,
        ctx: &CommandContext,
        content: &ContentParserResult,
        command_prompts: Option<&PromptOverrides>,
    ) -> Result<RunOutcome> {
        let mut state = RunState::default();
        let mut record = Map::new();
        for step in &self.steps {
            let arg = match step {
                FlowStep::Arg(arg) => arg.clone(),
                FlowStep::Branch(choose) => match choose(&record) {
                    Some(arg) => arg,
                    None => continue,
                },
            };
            match runner
                .run_one(ctx, content, &arg, command_prompts, &mut state)
                .await?
            {
                ArgOutcome::Value(value) => {
                    record.insert(arg.id.clone(), value);
                }
                ArgOutcome::Signal(signal) => return Ok(RunOutcome::Signal(signal)),
            }
        }
        Ok(RunOutcome::Record(record))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use banter_types::Conversation;
    use serde_json::json;

    use super::*;
    use crate::argument::MatchKind;
    use crate::content::parse_content;
    use crate::runner::parser_options_for;
    use crate::typing::TypeResolver;

    struct Recorder {
        sent: Mutex<Vec<String>>,
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
        CommandContext::new(
            "user",
            "channel",
            Arc::new(Recorder {
                sent: Mutex::new(Vec::new()),
            }),
        )
    }

    #[tokio::test]
    async fn branches_see_earlier_values() {
        let flow = ArgumentFlow::new()
            .then(Argument::new("mode", MatchKind::Phrase, "string"))
            .branch(|record| match record.get("mode").and_then(Value::as_str) {
                Some("count") => Some(Argument::new("n", MatchKind::Phrase, "integer")),
                _ => Some(Argument::new("name", MatchKind::Phrase, "string")),
            });

        let runner = ArgumentRunner::new(TypeResolver::new());
        let options = parser_options_for(&[], true, None);

        let content = parse_content("count 4", &options);
        let record = flow
            .run(&runner, &ctx(), &content, None)
            .await
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(record["mode"], "count");
        assert_eq!(record["n"], 4);

        let content = parse_content("greet alice", &options);
        let record = flow
            .run(&runner, &ctx(), &content, None)
            .await
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(record["mode"], "greet");
        assert_eq!(record["name"], "alice");
    }

    #[tokio::test]
    async fn skipped_branches_leave_the_cursor_alone() {
        let flow = ArgumentFlow::new()
            .then(Argument::new("first", MatchKind::Phrase, "string"))
            .branch(|_| None)
            .then(Argument::new("second", MatchKind::Phrase, "string"));

        let runner = ArgumentRunner::new(TypeResolver::new());
        let options = parser_options_for(&[], true, None);
        let content = parse_content("a b", &options);
        let record = flow
            .run(&runner, &ctx(), &content, None)
            .await
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(record, json!({"first": "a", "second": "b"}).as_object().cloned().unwrap());
    }

    #[tokio::test]
    async fn branch_values_merge_into_one_record() {
        let flow = ArgumentFlow::new()
            .then(Argument::new("base", MatchKind::Phrase, "string"))
            .branch(|record| {
                record
                    .get("base")
                    .map(|_| Argument::new("extra", MatchKind::Phrase, "string").with_default("none"))
            });

        let runner = ArgumentRunner::new(TypeResolver::new());
        let options = parser_options_for(&[], true, None);
        let content = parse_content("only", &options);
        let record = flow
            .run(&runner, &ctx(), &content, None)
            .await
            .unwrap()
            .into_record()
            .unwrap();
        assert_eq!(record["base"], "only");
        assert_eq!(record["extra"], "none");
    }
}

//! The conversation collaborator trait and per-message context.
//!
//! A [`Conversation`] is the entire surface the argument pipeline needs
//! from a chat backend: send a message, await the next reply from the
//! triggering user in the originating channel, and a few optional hooks.
//! Backends (Discord, Telegram, a test harness) implement this trait; the
//! pipeline never talks to a platform SDK directly.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/// A scoped conversation with the user who triggered a command.
///
/// Implementations are already scoped to one user in one channel; the
/// pipeline does not filter replies itself. The optional methods have
/// default implementations so minimal backends work without changes.
#[async_trait]
pub trait Conversation: Send + Sync {
    /// Send a message into the originating channel.
    async fn send(&self, content: &str) -> Result<()>;

    /// Await the next reply from the triggering user.
    ///
    /// Returns `None` when the conversation has closed and no further
    /// replies can arrive. The caller owns the time bound; implementations
    /// should simply wait.
    async fn await_reply(&self) -> Result<Option<String>>;

    /// Human-readable name for this backend.
    fn name(&self) -> &str;

    /// Whether the given reply content parses as a different valid command
    /// invocation. Used by prompt breakout.
    async fn is_command_invocation(&self, _content: &str) -> bool {
        false
    }

    /// Signal that an interactive prompt is starting for this user and
    /// channel. Backends that keep a prompt registry mark the pair here so
    /// the same user is never prompted twice concurrently.
    fn begin_prompt(&self) {}

    /// Signal that the interactive prompt has finished (collected,
    /// cancelled, or timed out).
    fn end_prompt(&self) {}
}

/// Identity of the triggering message plus a handle to its conversation.
///
/// Passed by reference through every type caster and prompt stage.
#[derive(Clone)]
pub struct CommandContext {
    /// Platform identifier of the triggering user.
    pub author: String,
    /// Platform identifier of the originating channel.
    pub channel: String,
    /// The conversation handle for prompts and replies.
    pub conversation: Arc<dyn Conversation>,
}

impl CommandContext {
    /// Create a context for one triggering message.
    pub fn new(
        author: impl Into<String>,
        channel: impl Into<String>,
        conversation: Arc<dyn Conversation>,
    ) -> Self {
        Self {
            author: author.into(),
            channel: channel.into(),
            conversation,
        }
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("author", &self.author)
            .field("channel", &self.channel)
            .field("conversation", &self.conversation.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal Conversation implementation with only required methods.
    struct MinimalConversation;

    #[async_trait]
    impl Conversation for MinimalConversation {
        async fn send(&self, _content: &str) -> Result<()> {
            Ok(())
        }
        async fn await_reply(&self) -> Result<Option<String>> {
            Ok(None)
        }
        fn name(&self) -> &str {
            "minimal"
        }
    }

    #[tokio::test]
    async fn default_lookahead_is_false() {
        let conv = MinimalConversation;
        assert!(!conv.is_command_invocation("!ping").await);
    }

    #[test]
    fn default_prompt_hooks_are_noops() {
        let conv = MinimalConversation;
        conv.begin_prompt();
        conv.end_prompt();
    }

    #[test]
    fn context_debug_uses_backend_name() {
        let ctx = CommandContext::new("user-1", "chan-1", Arc::new(MinimalConversation));
        let repr = format!("{ctx:?}");
        assert!(repr.contains("minimal"));
        assert!(repr.contains("user-1"));
    }
}

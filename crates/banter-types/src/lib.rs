//! Shared types for the banter command framework.
//!
//! This crate carries the pieces that both the argument pipeline and its
//! embedders need to agree on:
//!
//! - [`Signal`] -- control-flow outcomes (cancel, retry, fail, continue)
//!   threaded through casting and running as ordinary values
//! - [`Conversation`] -- the collaborator trait for sending prompts and
//!   awaiting a single user reply
//! - [`CommandContext`] -- identity of the triggering message plus a handle
//!   to its conversation
//! - [`BanterError`] -- programmer errors raised loudly at command-load time

pub mod conversation;
pub mod error;
pub mod signal;

pub use conversation::{CommandContext, Conversation};
pub use error::BanterError;
pub use signal::Signal;

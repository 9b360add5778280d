//! Core conversation components
//!
//! This module contains the store that owns the conversation log and runs the
//! optimistic submit protocol against the answer service.

mod store;

pub use store::{ConversationStore, FailurePolicy, StoreOptions, SubmitOutcome};

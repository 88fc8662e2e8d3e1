//! Feedback state: the cache of received values and the conditions evaluated on it

pub mod cache;
pub mod compare;
pub mod query;

pub use cache::FeedbackCache;
pub use compare::{evaluate, evaluate_sequence, Comparison, SequenceOutcome};
pub use query::FeedbackQuery;

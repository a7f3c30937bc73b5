//! Model-backed helpers

pub mod summarizer;

pub use summarizer::{CommandSummarizer, OpenRouterSummarizer, SummarizeError, Summarizer};

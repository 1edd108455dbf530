//! LLM provider implementations for AgroCert.
//!
//! The conversation engine talks to the [`agrocert_core::Provider`] trait;
//! this crate supplies the Anthropic Messages API implementation used in
//! production. Tests elsewhere in the workspace use hand-rolled mock
//! providers instead of anything here.

pub mod anthropic;

pub use anthropic::AnthropicProvider;

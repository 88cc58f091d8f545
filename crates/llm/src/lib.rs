//! ETER completion provider adapter.
//!
//! Implements the [`pipeline::CompletionProvider`] trait for any service that
//! speaks the OpenAI chat completions dialect (OpenRouter, AI gateways,
//! self-hosted routers). Additional dialects are added as new modules in this
//! crate without any changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing
//! and error classification live here. The [`pipeline`] crate sees only
//! [`pipeline::CompletionProvider`].

mod chat;

pub use chat::{ChatCompletionsProvider, ChatSettings, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};

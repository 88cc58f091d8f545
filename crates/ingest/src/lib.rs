//! ETER document ingestion adapter.
//!
//! Implements the [`pipeline::DocumentIngestor`] trait over an analysis
//! webhook (an n8n-style workflow): the uploaded report is posted as a
//! multipart `file` part and the webhook answers with an initial analysis that
//! becomes the first stage's context.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Multipart framing, transport and defensive response
//! parsing live here. The [`pipeline`] crate sees only
//! [`pipeline::DocumentIngestor`].
//!
//! ## Response shapes
//!
//! Webhooks in the wild answer in several shapes. [`extract_analysis`] accepts:
//!
//! - a JSON string;
//! - an object with an `output` or `text` string field;
//! - a single-element array wrapping either of the above;
//! - any other JSON value, used stringified;
//! - a non-JSON body, used verbatim.

mod webhook;

pub use webhook::{extract_analysis, WebhookIngestor, DEFAULT_INGEST_TIMEOUT};

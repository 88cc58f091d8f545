//! ETER run persistence adapters.
//!
//! Implements the [`pipeline::RunStore`] trait twice:
//!
//! - [`MemoryRunStore`]: a shared in-process map, for tests and demos.
//! - [`FileRunStore`]: one JSON document per run under a root directory,
//!   partitioned by tenant.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Storage layout and serialisation live here. The
//! [`pipeline`] crate sees only [`pipeline::RunStore`].

mod file;
mod memory;

pub use file::FileRunStore;
pub use memory::MemoryRunStore;

use pipeline::RunSummary;

/// Orders summaries newest first; ties fall back to id so listings are stable.
pub(crate) fn sort_most_recent_first(summaries: &mut [RunSummary]) {
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}

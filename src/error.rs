//! Top-level failure modes a resolve can end in (spec.md §7).
//!
//! Per-edge id-resolution failures are recorded on the edge itself as
//! [`crate::selector::IdResolveFailure`] and do not abort the traversal; a [`ResolveError`] is
//! only ever produced once, at the point a resolve gives up entirely.

use thiserror::Error;

use crate::module::ModuleId;
use crate::version::Version;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to resolve selector for {module}")]
    IdResolveFailure {
        module: ModuleId,
        #[source]
        source: anyhow::Error,
    },

    #[error("{module}:{version} was selected but later rejected by {by}")]
    RejectedSelectionFailure {
        module: ModuleId,
        version: Version,
        by: ModuleId,
    },

    #[error("conflict resolver failed for module {module}")]
    ConflictResolverFailure {
        module: ModuleId,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to resolve metadata for {component}")]
    MetadataResolveFailure {
        component: String,
        #[source]
        source: anyhow::Error,
    },
}

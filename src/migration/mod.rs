// ============================================================================
// Application Migrations
// ============================================================================
//
// Versioned data-transformation steps, the registry that builds them for a
// run, and the transfer cache handed from the pre-schema hook to the steps.
//
// ============================================================================

pub mod cache;
pub mod registry;
pub mod step;

pub use cache::TransferCache;
pub use registry::{MigrationRegistry, sort_and_validate};
pub use step::{MigrationStep, StepContext};

pub mod error;
pub mod version;

pub use error::{MigrationError, Result};
pub use version::SemanticVersion;

pub mod build;
pub mod config;
pub mod dev;
pub mod discovery;
pub mod error;
pub mod settings;
pub mod site;
pub mod validation;

// Re-export main types
pub use build::*;
pub use config::*;
pub use dev::*;
pub use error::*;
pub use settings::*;
pub use site::SiteConfig;

// Re-export discovery and validation
pub use discovery::{ConfigDiscovery, discover, discover_with_profile};
pub use validation::{ConfigValidator, FsValidator, SchemaValidator, validate_fs, validate_schema};

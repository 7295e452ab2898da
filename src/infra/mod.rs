//! Infrastructure adapters and runtime bootstrap.

pub mod assets;
pub mod error;
pub mod files;
pub mod http;
pub(crate) mod lock;
pub mod process;
pub mod range_cache;
pub mod resources;
pub mod telemetry;

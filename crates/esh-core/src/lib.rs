//! esh-core: stable foundation for the energy system harmonizer.
//!
//! Contains:
//! - ids (compact stable IDs for nodes and flows)
//! - numeric (Real + tolerances + float helpers)
//! - units (uom quantities + declared unit convention)
//! - config (immutable configuration threaded through every call)
//! - error (shared error types)

pub mod config;
pub mod error;
pub mod ids;
pub mod numeric;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use config::{AliasTable, ComparisonTolerance, HarmonyConfig};
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use units::*;

//! FINE target.

mod adapter;
pub mod native;

pub use adapter::{COST_SCALE, EMISSION_UNIT, FineAdapter};
pub use native::FineModel;

//! oemof target.

mod adapter;
pub mod native;

pub use adapter::OemofAdapter;
pub use native::OemofEnergySystem;

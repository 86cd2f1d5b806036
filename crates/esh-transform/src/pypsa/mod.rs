//! PyPSA target.

mod adapter;
pub mod native;

pub use adapter::PypsaAdapter;
pub use native::PypsaNetwork;

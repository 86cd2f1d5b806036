//! Calliope target.

mod adapter;
pub mod native;

pub use adapter::CalliopeAdapter;
pub use native::CalliopeModel;

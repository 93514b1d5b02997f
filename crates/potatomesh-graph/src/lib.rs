//! Graph views over one refresh cycle: who hears whom, and which paths
//! traceroutes took.

pub mod neighbors;
pub mod roles;
pub mod trace;

pub use neighbors::*;
pub use roles::*;
pub use trace::*;

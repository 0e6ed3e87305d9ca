pub mod bootstrap;
pub mod store;
pub mod support;

pub use bootstrap::*;
pub use store::*;
pub use support::*;

pub mod config;
pub mod error;
pub mod geometry;
pub mod message;
pub mod node;
pub mod patch;
pub mod relation;
pub mod topology;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use geometry::*;
pub use message::*;
pub use node::*;
pub use patch::*;
pub use relation::*;
pub use topology::*;
pub use traits::*;
pub use types::*;

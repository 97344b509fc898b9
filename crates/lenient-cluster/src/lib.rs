pub mod error;
pub mod memory;

pub use error::*;
pub use memory::*;

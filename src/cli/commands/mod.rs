pub mod demo;
pub mod sort;

pub use demo::*;
pub use sort::*;

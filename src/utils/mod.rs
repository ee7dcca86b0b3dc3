// Utility functions

pub mod logger;
pub mod random;

pub use logger::*;
pub use random::*;

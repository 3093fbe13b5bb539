pub mod backends;
pub mod fixtures;
pub mod testing;

pub use backends::*;
pub use fixtures::*;
pub use testing::*;

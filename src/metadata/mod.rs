pub mod accessor;
pub mod member;
pub mod registry;

pub use accessor::*;
pub use member::*;
pub use registry::*;

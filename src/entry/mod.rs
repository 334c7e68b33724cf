pub mod entity;
pub mod member;
pub mod navigation;
pub mod property;
pub mod validation;

pub use entity::*;
pub use member::*;
pub use navigation::*;
pub use property::*;
pub use validation::*;

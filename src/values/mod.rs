pub mod property_values;
pub mod record;

pub use property_values::*;
pub use record::*;

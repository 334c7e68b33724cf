pub mod manager;
pub mod record;
pub mod state;

pub use manager::*;
pub use record::*;
pub use state::*;

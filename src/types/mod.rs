mod listing;
mod models;
mod quantity;
mod role;

pub use listing::*;
pub use models::*;
pub use quantity::{Fixed, Micros, Millis};
pub use role::{Authorize, Capability, Role};

pub mod health;
pub mod diagnostics;
pub mod events;

pub use health::*;
pub use diagnostics::*;
pub use events::*;

pub mod recolor;
pub mod outline;

pub use recolor::*;
pub use outline::*;

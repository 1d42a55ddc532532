pub mod history;
pub mod identity;
pub mod outcome;

pub use history::*;
pub use identity::*;
pub use outcome::*;

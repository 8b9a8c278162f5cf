//! Authentication domain: token models, the step-graph DSL, its executor, and login methods.

pub mod executor;
pub mod method;
pub mod steps;
pub mod token;

pub use executor::*;
pub use method::*;
pub use steps::*;
pub use token::*;

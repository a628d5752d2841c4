//! Core types, constants, errors and injected seams.

mod constants;
mod error;
mod task;
mod traits;
mod types;

pub use constants::*;
pub use error::*;
pub use task::TaskHandle;
pub use traits::*;
pub use types::*;

//! Core constants, errors, status codes and collaborator traits.

mod constants;
mod error;
mod status;
mod traits;

pub use constants::*;
pub use error::*;
pub use status::*;
pub use traits::*;

mod config;
mod constants;
mod data;
mod error;
mod failure;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use error::*;
pub use failure::*;

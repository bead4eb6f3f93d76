#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod error;
pub mod normalize;
pub mod retry;
pub mod traits;
pub mod types;

pub use error::{Error, Result};

pub mod buffer;
pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod transform;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::{BufferError, TransformError};

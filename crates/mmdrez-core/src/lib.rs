pub mod config;
pub mod error;

pub use config::MmdrezConfig;
pub use error::{ErrorKind, MmdrezError, MmdrezResult};

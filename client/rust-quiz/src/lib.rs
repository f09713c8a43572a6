pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{ErrorKind, QuizError, Result};
pub use services::QuizContext;

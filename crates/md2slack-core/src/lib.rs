pub mod cast;
pub mod config;
pub mod error;
pub mod gitdiff;
pub mod hints;
pub mod io;
pub mod paths;
pub mod render;
pub mod settings;
pub mod slack;
pub mod storage;
pub mod task;

pub use error::{Md2SlackError, Result};

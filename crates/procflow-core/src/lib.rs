pub mod capability;
pub mod compare;
pub mod config;
pub mod document;
pub mod efficiency;
pub mod error;
pub mod gaps;
pub mod io;
pub mod mapper;
pub mod parser;
pub mod prioritize;
pub mod types;

pub use error::{ErrorKind, ProcflowError, Result};

//! Core plan logic: types, codec, references, execution.

pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod eventlog;
pub mod executor;
pub mod parser;
pub mod resolver;
pub mod types;

//! Protocol definitions for the Neato serial console.
//!
//! This module contains:
//! - Command validation and line encoding
//! - Response parsing into records and error codes

pub mod command;
pub mod parser;

pub use command::{CLEAN, Command, Query, WAKE_PROBE, encode_line};
pub use parser::{error_line, parse_error, parse_error_line, parse_record};

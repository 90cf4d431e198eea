//! # Battle Operator Tools
//!
//! Command-line tools for running matches offline:
//! - Rules file validation
//! - Replay recording and verification

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod replay;
pub mod validate;

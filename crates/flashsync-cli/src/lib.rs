//! # Flashsync CLI
//!
//! Drives dataset sessions from the command line: pull remote ratings into
//! local state, rate rows, move the view position, change view settings and
//! dump what is stored.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod commands;
pub mod settings;

pub use commands::{execute, Action};
pub use settings::{load_config, Overrides};

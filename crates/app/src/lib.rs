#![deny(unsafe_code)]

/// Command-line surface: argument parsing and wiring of the generation stack.
pub mod cli;
/// Layered configuration and its persistence.
pub mod settings;
/// Creator features built on the generation client and history.
pub mod workflows;

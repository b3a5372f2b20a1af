//! Command-line front end for running programs on a pty

pub mod cli;
pub mod relay;
pub mod terminal_guard;

//! Small shared helpers.

pub mod command;
pub mod path;
pub mod thread;

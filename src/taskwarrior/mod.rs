//! Job execution and task reads against the `task` command-line task manager

pub mod commands;
pub mod executor;
pub mod export;

pub use commands::{TaskCommand, operation_commands};
pub use executor::TaskCli;
pub use export::{Task, TaskReader, sort_by_priority};

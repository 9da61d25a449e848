//! Z-Machine interpreter core
//!
//! Loads a story file (versions 1 to 8), executes it instruction by
//! instruction and drives an abstract display through [`ZMachineDisplay`].
//! Input is event based: when the story asks for a line or a key and none is
//! available the interpreter hands control back to its host, which resumes it
//! later with [`Interpreter::run`].
//!
//! [`ZMachineDisplay`]: display_trait::ZMachineDisplay
//! [`Interpreter::run`]: interpreter::Interpreter::run

#[macro_use]
extern crate lazy_static;

pub mod config;
pub mod dictionary;
pub mod display_headless;
pub mod display_terminal;
pub mod display_trait;
pub mod error;
pub mod game;
pub mod header;
pub mod instruction;
pub mod interpreter;
pub mod opcode_tables;
pub mod opcodes_display;
pub mod opcodes_io;
pub mod opcodes_math;
pub mod opcodes_memory;
pub mod opcodes_object;
pub mod opcodes_stack;
pub mod opcodes_state;
pub mod quetzal;
pub mod screen;
pub mod snapshot;
pub mod text;
pub mod vm;
pub mod zobject;
pub mod zrand;

#[cfg(test)]
mod test_utils;

pub use config::InterpreterConfig;
pub use error::VmError;
pub use game::Game;
pub use interpreter::{InputStatus, Interpreter, RunOutcome, StepResult};

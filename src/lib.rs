//! Gas-metered stack machine library.
//!
//! Provides a bytecode virtual machine over 256-bit words, an assembler for
//! its instruction set, and shared utilities.

pub mod utils;
pub mod virtual_machine;

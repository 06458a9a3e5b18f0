//! Stack-based bytecode virtual machine over 256-bit words.
//!
//! The VM runs a fetch-decode-execute loop over raw bytecode. Each step
//! fetches one opcode byte, charges its gas, then runs its handler against an
//! operand stack of [`word::Word`]s.
//!
//! # Architecture
//!
//! - **Words**: unsigned 256-bit integers, arithmetic wraps modulo 2^256
//! - **Operand stack**: LIFO, unbounded unless a depth limit is configured
//! - **Gas metering**: every instruction is charged before it runs; running
//!   out aborts without applying the instruction
//! - **Instructions**: STOP, ADD, MUL, SUB, DIV, PUSH1 from a static table,
//!   plus the generic PUSH2..PUSH32 family decoded from the opcode byte
//! - **Failures**: returned as [`errors::VMError`] values; the machine keeps
//!   its state at the faulting instruction for inspection
//!
//! # Modules
//!
//! - [`assembler`]: Assembly parsing, bytecode generation and disassembly
//! - [`errors`]: Assembly and execution error types
//! - [`isa`]: Instruction set definition and opcode classification
//! - [`vm`]: Execution loop, operand stack and gas metering
//! - [`word`]: 256-bit machine word

pub mod assembler;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod vm;
pub mod word;

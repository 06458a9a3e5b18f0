//! Core virtual machine implementation.
//!
//! The VM runs a fetch-decode-execute loop over raw bytecode with an operand
//! stack of 256-bit [`Word`]s. Every instruction is charged its gas before it
//! runs; a failed charge aborts without touching the stack.

mod gas;
mod stack;

pub use gas::{DEFAULT_GAS_LIMIT, GasCategory, GasMeter, GasProfile};
pub use stack::{EVM_STACK_LIMIT, Stack};

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, Opcode, PUSH_GAS};
use crate::virtual_machine::word::Word;
use std::collections::HashMap;

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident ( $( $field:ident : $kind:ident ),* $(,)? ) ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    $( let $field = exec_vm!(@read $vm, $kind)?; )*
                    $vm.$handler($( $field ),*)
                }
            ),*
        }
    }};

    // Decode a single immediate byte
    (@read $vm:ident, ImmU8) => {{
        Ok::<u8, VMError>($vm.read_exact(1)?[0])
    }};
}

/// Why a run ended successfully.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HaltReason {
    /// A STOP instruction was executed.
    Stop,
    /// The program counter reached the end of the bytecode.
    EndOfCode,
}

/// Record of one executed instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StepInfo {
    /// Offset of the opcode byte.
    pub offset: usize,
    pub opcode: Opcode,
    /// Gas charged for this instruction.
    pub gas: u64,
    /// Stack depth after the instruction.
    pub stack_depth: usize,
}

/// Result of a single [`VM::step`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    Continue(StepInfo),
    Halt(HaltReason),
}

/// Final state of a run, successful or not.
///
/// On failure the stack, gas and program counter are the values at the
/// faulting instruction; earlier instructions are not rolled back.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecOutcome {
    pub status: Result<HaltReason, VMError>,
    /// Bottom-to-top stack contents.
    pub stack: Vec<Word>,
    pub gas_remaining: u64,
    pub gas_used: u64,
    pub gas_profile: GasProfile,
    pub pc: usize,
}

impl ExecOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }
}

/// Stack-based bytecode virtual machine.
///
/// Owns its bytecode, operand stack and gas meter for a single run. Hosts
/// that evaluate several programs in parallel build one `VM` per program.
pub struct VM {
    /// Bytecode to execute.
    data: Vec<u8>,
    /// Instruction pointer (index of the next byte to fetch).
    ip: usize,
    stack: Stack,
    gas: GasMeter,
    gas_profile: GasProfile,
    /// Reserved byte memory. No instruction reads or writes it yet.
    memory: Vec<u8>,
    /// Reserved persistent storage. No instruction reads or writes it yet.
    storage: HashMap<u64, Word>,
    /// Set once the machine halts successfully.
    halted: Option<HaltReason>,
    /// Set once the machine faults.
    fault: Option<VMError>,
}

impl VM {
    /// Creates a VM for `bytecode` with `gas_limit` units of gas.
    pub fn new(bytecode: impl Into<Vec<u8>>, gas_limit: u64) -> Self {
        Self {
            data: bytecode.into(),
            ip: 0,
            stack: Stack::new(),
            gas: GasMeter::new(gas_limit),
            gas_profile: GasProfile::new(),
            memory: Vec::new(),
            storage: HashMap::new(),
            halted: None,
            fault: None,
        }
    }

    /// Bounds the operand stack depth. Pushing past it fails with
    /// [`VMError::StackOverflow`].
    pub fn with_stack_limit(mut self, limit: usize) -> Self {
        self.stack.set_limit(Some(limit));
        self
    }

    /// Seeds the operand stack, bottom first.
    pub fn with_stack(mut self, words: impl IntoIterator<Item = Word>) -> Result<Self, VMError> {
        for word in words {
            self.stack.push(word)?;
        }
        Ok(self)
    }

    /// Executes instructions until the machine halts or faults.
    pub fn run(&mut self) -> Result<HaltReason, VMError> {
        loop {
            if let Step::Halt(reason) = self.step()? {
                return Ok(reason);
            }
        }
    }

    /// Runs to completion and returns the final state.
    pub fn execute(mut self) -> ExecOutcome {
        let status = self.run();
        ExecOutcome {
            status,
            gas_remaining: self.gas.remaining(),
            gas_used: self.gas.used(),
            gas_profile: self.gas_profile,
            pc: self.ip,
            stack: self.stack.into_vec(),
        }
    }

    /// Executes exactly one instruction.
    ///
    /// Once the machine has halted or faulted, every further call returns
    /// the same halt reason or error without doing any work.
    pub fn step(&mut self) -> Result<Step, VMError> {
        if let Some(err) = &self.fault {
            return Err(err.clone());
        }
        if let Some(reason) = self.halted {
            return Ok(Step::Halt(reason));
        }

        match self.fetch_and_exec() {
            Ok(Step::Halt(reason)) => {
                self.halted = Some(reason);
                Ok(Step::Halt(reason))
            }
            Ok(step) => Ok(step),
            Err(err) => {
                self.fault = Some(err.clone());
                Err(err)
            }
        }
    }

    fn fetch_and_exec(&mut self) -> Result<Step, VMError> {
        let Some(&byte) = self.data.get(self.ip) else {
            return Ok(Step::Halt(HaltReason::EndOfCode));
        };
        let offset = self.ip;
        self.ip += 1;

        let opcode = Opcode::decode(byte);
        let halt = match opcode {
            Opcode::Table(instr) => {
                self.charge_gas(instr.base_gas(), instr.category())?;
                self.exec(instr)?
            }
            Opcode::Push(width) => {
                self.charge_gas(PUSH_GAS, GasCategory::Push)?;
                self.op_push_n(width)?
            }
            Opcode::Invalid(_) => {
                return Err(VMError::InvalidOpcode {
                    opcode: byte,
                    offset,
                });
            }
        };

        if halt {
            return Ok(Step::Halt(HaltReason::Stop));
        }
        Ok(Step::Continue(StepInfo {
            offset,
            opcode,
            gas: opcode.gas().unwrap_or_default(),
            stack_depth: self.stack.len(),
        }))
    }

    /// Charges gas and records it in the profile.
    fn charge_gas(&mut self, amount: u64, category: GasCategory) -> Result<(), VMError> {
        self.gas.consume(amount)?;
        self.gas_profile.add(category, amount);
        Ok(())
    }

    /// Reads exactly `count` bytes from the bytecode at the current IP.
    ///
    /// Advances the instruction pointer by `count` bytes.
    fn read_exact(&mut self, count: usize) -> Result<&[u8], VMError> {
        let start = self.ip;
        let available = self.data.len().saturating_sub(start);
        let slice = start
            .checked_add(count)
            .and_then(|end| self.data.get(start..end))
            .ok_or(VMError::UnexpectedEndOfBytecode {
                ip: start,
                requested: count,
                available,
            })?;

        self.ip = start + count;
        Ok(slice)
    }

    /// Executes a single table instruction, returning whether to halt.
    fn exec(&mut self, instruction: Instruction) -> Result<bool, VMError> {
        exec_vm! {
            vm = self,
            instr = instruction,
            {
                Stop => op_stop(),
                Add => op_add(),
                Mul => op_mul(),
                Sub => op_sub(),
                Div => op_div(),
                Push1 => op_push1(value: ImmU8),
            }
        }
    }

    fn op_stop(&mut self) -> Result<bool, VMError> {
        Ok(true)
    }

    fn op_add(&mut self) -> Result<bool, VMError> {
        let (a, b) = self.stack.pop_two()?;
        self.stack.push(a.wrapping_add(b))?;
        Ok(false)
    }

    fn op_mul(&mut self) -> Result<bool, VMError> {
        let (a, b) = self.stack.pop_two()?;
        self.stack.push(a.wrapping_mul(b))?;
        Ok(false)
    }

    /// Pushes `second - top`: the earlier operand is the left-hand side.
    fn op_sub(&mut self) -> Result<bool, VMError> {
        let (top, second) = self.stack.pop_two()?;
        self.stack.push(second.wrapping_sub(top))?;
        Ok(false)
    }

    /// Pushes `second / top`, or zero when `top` is zero.
    fn op_div(&mut self) -> Result<bool, VMError> {
        let (top, second) = self.stack.pop_two()?;
        self.stack.push(second.div_or_zero(top))?;
        Ok(false)
    }

    fn op_push1(&mut self, value: u8) -> Result<bool, VMError> {
        self.stack.push(Word::from(value))?;
        Ok(false)
    }

    /// PUSH2..PUSH32: reads `width` big-endian immediate bytes.
    fn op_push_n(&mut self, width: usize) -> Result<bool, VMError> {
        let word = self
            .read_exact(width)?
            .iter()
            .fold(Word::ZERO, |acc, &b| {
                acc.wrapping_mul(Word::from(256u64))
                    .wrapping_add(Word::from(b))
            });
        self.stack.push(word)?;
        Ok(false)
    }

    /// Bottom-to-top view of the operand stack.
    pub fn stack(&self) -> &[Word] {
        self.stack.as_slice()
    }

    /// Index of the next byte to fetch.
    pub fn pc(&self) -> usize {
        self.ip
    }

    pub fn bytecode(&self) -> &[u8] {
        &self.data
    }

    pub fn gas_remaining(&self) -> u64 {
        self.gas.remaining()
    }

    pub fn gas_used(&self) -> u64 {
        self.gas.used()
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas.limit()
    }

    /// Gas spent so far, broken down by category.
    pub fn gas_profile(&self) -> &GasProfile {
        &self.gas_profile
    }

    /// Reserved byte memory.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Reserved key-value storage.
    pub fn storage(&self) -> &HashMap<u64, Word> {
        &self.storage
    }
}

//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical table of explicit instructions and invokes a callback macro for
//! code generation, so the VM, the assembler and the ISA fingerprint test all
//! derive from one list.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<u8>` for decoding opcodes
//! - Per-instruction mnemonic, gas cost, immediate width and gas category
//!
//! Opcodes `0x61..=0x7F` (PUSH2..PUSH32) are not table entries. They are
//! classified by [`Opcode::decode`] and share the [`PUSH_GAS`] cost.
//!
//! # Bytecode Format
//!
//! - Opcode: 1 byte
//! - PUSHn immediate: `n` bytes, big-endian, directly after the opcode

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::vm::GasCategory;
use std::fmt;

/// Gas charged for the generic PUSH2..PUSH32 path, matching PUSH1.
pub const PUSH_GAS: u64 = 3;
/// First opcode of the PUSH family (PUSH1).
pub const PUSH_FIRST: u8 = 0x60;
/// Last opcode of the PUSH family (PUSH32).
pub const PUSH_LAST: u8 = 0x7F;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry reads `Name = opcode, "MNEMONIC" => [immediates], gas, category`.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Control
            // =========================
            /// STOP ; halt execution
            Stop = 0x00, "STOP" => [], 0, Control,
            // =========================
            // Arithmetic (mod 2^256)
            // =========================
            /// ADD ; a, b -> a + b
            Add = 0x01, "ADD" => [], 3, Arithmetic,
            /// MUL ; a, b -> a * b
            Mul = 0x02, "MUL" => [], 5, Arithmetic,
            /// SUB ; a, b -> a - b (b is the top of the stack)
            Sub = 0x03, "SUB" => [], 3, Arithmetic,
            /// DIV ; a, b -> a / b, or 0 when b == 0 (b is the top of the stack)
            Div = 0x04, "DIV" => [], 5, Arithmetic,
            // =========================
            // Push
            // =========================
            /// PUSH1 imm8 ; -> imm8
            Push1 = 0x60, "PUSH1" => [value: ImmU8], 3, Push,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $gas:expr, $category:ident
        ),* $(,)?
    ) => {
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::InvalidOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Returns the static gas cost for this instruction.
            pub const fn base_gas(&self) -> u64 {
                match self {
                    $( Instruction::$name => $gas, )*
                }
            }

            /// Number of immediate bytes following the opcode.
            pub const fn immediate_len(&self) -> usize {
                match self {
                    $( Instruction::$name => 0usize $( + define_instructions!(@size $kind) )*, )*
                }
            }

            /// Gas profile bucket this instruction is charged to.
            pub const fn category(&self) -> GasCategory {
                match self {
                    $( Instruction::$name => GasCategory::$category, )*
                }
            }
        }
    };

    // ---------- types ----------
    (@ty ImmU8) => { u8 };

    // ---------- sizes ----------
    (@size ImmU8) => { 1usize };

    // ---------- encoding ----------
    (@emit $out:ident, ImmU8, $v:ident) => {
        $out.push(*$v);
    };
}

for_each_instruction!(define_instructions);

/// Decoded meaning of a single opcode byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Opcode {
    /// Explicit instruction with its own handler and cost.
    Table(Instruction),
    /// PUSH2..PUSH32, carrying the immediate width in bytes.
    Push(usize),
    /// Unassigned byte.
    Invalid(u8),
}

impl Opcode {
    /// Classifies a byte: explicit table first, then the PUSH range.
    pub fn decode(byte: u8) -> Opcode {
        if let Ok(instr) = Instruction::try_from(byte) {
            return Opcode::Table(instr);
        }
        if (PUSH_FIRST..=PUSH_LAST).contains(&byte) {
            return Opcode::Push((byte - PUSH_FIRST + 1) as usize);
        }
        Opcode::Invalid(byte)
    }

    /// Gas charged before the instruction runs, `None` for invalid bytes.
    pub const fn gas(&self) -> Option<u64> {
        match self {
            Opcode::Table(instr) => Some(instr.base_gas()),
            Opcode::Push(_) => Some(PUSH_GAS),
            Opcode::Invalid(_) => None,
        }
    }

    /// Number of immediate bytes following the opcode.
    pub const fn immediate_len(&self) -> usize {
        match self {
            Opcode::Table(instr) => instr.immediate_len(),
            Opcode::Push(width) => *width,
            Opcode::Invalid(_) => 0,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Table(instr) => f.write_str(instr.mnemonic()),
            Opcode::Push(width) => write!(f, "PUSH{width}"),
            Opcode::Invalid(byte) => write!(f, "INVALID(0x{byte:02x})"),
        }
    }
}

/// Returns the opcode byte for `PUSH<width>`, if `width` is in `1..=32`.
pub const fn push_opcode(width: usize) -> Option<u8> {
    if width >= 1 && width <= 32 {
        Some(PUSH_FIRST + (width as u8) - 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_try_from_invalid() {
        assert!(matches!(
            Instruction::try_from(0x50),
            Err(VMError::InvalidOpcode { opcode: 0x50, .. })
        ));
        assert!(Instruction::try_from(0x61).is_err());
    }

    #[test]
    fn instruction_costs() {
        assert_eq!(Instruction::Stop.base_gas(), 0);
        assert_eq!(Instruction::Add.base_gas(), 3);
        assert_eq!(Instruction::Mul.base_gas(), 5);
        assert_eq!(Instruction::Sub.base_gas(), 3);
        assert_eq!(Instruction::Div.base_gas(), 5);
        assert_eq!(Instruction::Push1.base_gas(), 3);
    }

    #[test]
    fn push1_has_one_immediate_byte() {
        assert_eq!(Instruction::Push1.immediate_len(), 1);
        assert_eq!(Instruction::Add.immediate_len(), 0);
    }

    #[test]
    fn decode_prefers_table_over_push_range() {
        assert_eq!(Opcode::decode(0x60), Opcode::Table(Instruction::Push1));
        assert_eq!(Opcode::decode(0x61), Opcode::Push(2));
        assert_eq!(Opcode::decode(0x7F), Opcode::Push(32));
        assert_eq!(Opcode::decode(0x80), Opcode::Invalid(0x80));
        assert_eq!(Opcode::decode(0x5F), Opcode::Invalid(0x5F));
    }

    #[test]
    fn generic_push_is_charged() {
        assert_eq!(Opcode::Push(2).gas(), Some(PUSH_GAS));
        assert_eq!(Opcode::Push(32).gas(), Some(PUSH_GAS));
        assert_eq!(Opcode::Invalid(0x50).gas(), None);
    }

    #[test]
    fn opcode_display() {
        assert_eq!(Opcode::decode(0x02).to_string(), "MUL");
        assert_eq!(Opcode::decode(0x7F).to_string(), "PUSH32");
        assert_eq!(Opcode::decode(0xFE).to_string(), "INVALID(0xfe)");
    }

    #[test]
    fn push_opcode_bounds() {
        assert_eq!(push_opcode(1), Some(0x60));
        assert_eq!(push_opcode(2), Some(0x61));
        assert_eq!(push_opcode(32), Some(0x7F));
        assert_eq!(push_opcode(0), None);
        assert_eq!(push_opcode(33), None);
    }
}

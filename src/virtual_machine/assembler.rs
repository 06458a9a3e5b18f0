//! Assembly language parser and bytecode compiler.
//!
//! Converts human-readable assembly into raw bytecode, and back again for
//! inspection. Uses [`for_each_instruction!`](crate::for_each_instruction) to
//! generate the table-instruction parser, so new instructions only need to be
//! added to the ISA list.
//!
//! # Syntax
//!
//! ```text
//! INSTRUCTION [immediate]  # optional comment
//! ```
//!
//! - Mnemonics are case-insensitive (`PUSH1`, `add`)
//! - `PUSH1`..`PUSH32` take one immediate that must fit in the push width
//! - Immediates are decimal (`258`) or hex (`0x0102`)
//! - Comments start with `#`

use crate::define_instructions;
use crate::error;
use crate::for_each_instruction;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, Opcode, push_opcode};
use crate::virtual_machine::word::{WORD_BYTES, Word};
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const PUSH_PREFIX: &str = "PUSH";

/// Return the line/column/message triple for assembly-related errors.
fn assembly_error_location(err: &VMError) -> Option<(usize, usize, String)> {
    match err {
        VMError::AssemblyError {
            line,
            offset,
            source,
        } => Some((*line, *offset, source.clone())),
        VMError::ParseError {
            line,
            offset,
            message,
        } => Some((*line, *offset, message.to_string())),
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for assembly failures.
fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    offset: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Logs a diagnostic for assembly errors.
fn log_assembly_error(file: &str, source: &str, err: &VMError) {
    match assembly_error_location(err) {
        Some((line, offset, message)) => {
            error!(
                "{}",
                render_assembly_diagnostic(file, source, line, offset, &message)
            );
        }
        None => error!("{err}"),
    }
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `#` starts a comment
/// - commas are ignored
/// - whitespace-separated tokens
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, VMError> {
    let code = line.split(COMMENT_CHAR).next().unwrap_or_default();
    let mut out = Vec::with_capacity(2);
    let mut start: Option<usize> = None;

    for (i, c) in code.char_indices() {
        let separator = c == ',' || c.is_whitespace();
        match (start, separator) {
            (None, false) => start = Some(i),
            (Some(s), true) => {
                out.push(Token {
                    text: &code[s..i],
                    offset: s + 1,
                });
                start = None;
            }
            _ => {}
        }
        if !separator && !c.is_ascii() {
            return Err(VMError::ParseError {
                line: line_no,
                offset: i + 1,
                message: "non-ASCII character in source",
            });
        }
    }

    if let Some(s) = start {
        out.push(Token {
            text: &code[s..],
            offset: s + 1,
        });
    }

    Ok(out)
}

/// Parses an immediate that must fit in `width` bytes, returned big-endian
/// and left-padded to exactly `width` bytes.
fn parse_immediate(tok: &str, width: usize) -> Result<Vec<u8>, VMError> {
    let invalid = || VMError::InvalidImmediate {
        token: tok.to_string(),
        width,
    };
    let word = Word::parse(tok).ok_or_else(invalid)?;
    if word.to_be_bytes_trimmed().len() > width {
        return Err(invalid());
    }
    Ok(word.to_be_bytes()[WORD_BYTES - width..].to_vec())
}

/// Parses a one-byte immediate.
fn parse_u8(tok: &str) -> Result<u8, VMError> {
    Ok(parse_immediate(tok, 1)?[0])
}

/// Extracts `n` from a `PUSHn` mnemonic outside the instruction table.
fn generic_push_width(name: &str) -> Option<usize> {
    let width = name.strip_prefix(PUSH_PREFIX)?.parse::<usize>().ok()?;
    match push_opcode(width).map(Opcode::decode) {
        Some(Opcode::Push(w)) => Some(w),
        _ => None,
    }
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $gas:expr, $category:ident
        ),* $(,)?
    ) => {
        // =========================
        // Assembler IR
        // =========================
        #[derive(Debug, Clone)]
        enum AsmInstr {
            $(
                $name {
                    $( $field: define_instructions!(@ty $kind) ),*
                },
            )*
            /// PUSH2..PUSH32 with an already padded big-endian immediate.
            PushN { opcode: u8, bytes: Vec<u8> },
        }

        impl AsmInstr {
            /// Encodes the assembly instruction into bytecode
            fn assemble(&self, out: &mut Vec<u8>) {
                match self {
                    $(
                        AsmInstr::$name { $( $field ),* } => {
                            out.push($opcode);
                            $(
                                define_instructions!(@emit out, $kind, $field);
                            )*
                        }
                    ),*
                    AsmInstr::PushN { opcode, bytes } => {
                        out.push(*opcode);
                        out.extend_from_slice(bytes);
                    }
                }
            }
        }

        fn instruction_from_str(name: &str) -> Option<Instruction> {
            match name {
                $( $mnemonic => Some(Instruction::$name), )*
                _ => None,
            }
        }

        /// Parse one instruction from tokens into [`AsmInstr`].
        fn parse_instruction(tokens: &[Token]) -> Result<AsmInstr, VMError> {
            let name = tokens[0].text.to_ascii_uppercase();

            if let Some(instr) = instruction_from_str(&name) {
                return match instr {
                    $(
                        Instruction::$name => {
                            const EXPECTED: usize = 1 + define_parse_instruction!(@count $( $field ),*);
                            check_arity(&name, EXPECTED - 1, tokens.len() - 1)?;
                            define_parse_instruction!(@construct tokens; $name $( $field : $kind ),*)
                        }
                    ),*
                };
            }

            let width = generic_push_width(&name)
                .ok_or(VMError::InvalidInstructionName { name: name.clone() })?;
            check_arity(&name, 1, tokens.len() - 1)?;
            let opcode = push_opcode(width).ok_or(VMError::InvalidInstructionName { name })?;
            Ok(AsmInstr::PushN {
                opcode,
                bytes: parse_immediate(tokens[1].text, width)?,
            })
        }
    };

    // ---------- counting ----------
    (@count $( $x:ident ),* ) => {
        <[()]>::len(&[ $( define_parse_instruction!(@unit $x) ),* ])
    };

    (@unit $x:ident) => { () };

    // ---------- parsing ----------
    (@construct $tokens:ident; $name:ident) => {
        Ok(AsmInstr::$name { })
    };

    (@construct $tokens:ident; $name:ident $( $field:ident : $kind:ident ),+ ) => {{
        let mut it = $tokens.iter().skip(1);
        Ok(AsmInstr::$name {
            $(
                $field: define_parse_instruction!(@parse_operand $kind, it.next())?,
            )*
        })
    }};

    (@parse_operand ImmU8, $tok:expr) => {
        $tok.map_or(Err(VMError::ParseError { line: 0, offset: 0, message: "missing operand" }), |t| parse_u8(t.text))
    };
}

for_each_instruction!(define_parse_instruction);

fn check_arity(name: &str, expected: usize, actual: usize) -> Result<(), VMError> {
    if expected != actual {
        return Err(VMError::ArityMismatch {
            instruction: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Attaches a source position to an instruction-level error.
fn at_line(err: VMError, line: usize, offset: usize) -> VMError {
    match err {
        VMError::ParseError { .. } | VMError::AssemblyError { .. } => err,
        other => VMError::AssemblyError {
            line,
            offset,
            source: other.to_string(),
        },
    }
}

fn assemble_lines(source: &str) -> Result<Vec<u8>, VMError> {
    let mut bytecode = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let tokens = tokenize(line_no, line)?;
        if tokens.is_empty() {
            continue;
        }
        let instr = parse_instruction(&tokens).map_err(|e| at_line(e, line_no, tokens[0].offset))?;
        instr.assemble(&mut bytecode);
    }

    Ok(bytecode)
}

/// Assemble a full source string into bytecode.
pub fn assemble_source(source: impl AsRef<str>) -> Result<Vec<u8>, VMError> {
    assemble_source_with_name(source.as_ref(), "<source>")
}

/// Assembles source with an associated filename for error diagnostics.
fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Vec<u8>, VMError> {
    let result = assemble_lines(source);
    if let Err(err) = &result {
        log_assembly_error(source_name, source, err);
    }
    result
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| VMError::IoError {
        path: path_ref.display().to_string(),
        source: e.to_string(),
    })?;
    assemble_source_with_name(&source, &path_ref.display().to_string())
}

/// Renders bytecode as one instruction per line.
///
/// Never fails: unknown bytes print as `INVALID(0x..)` and an immediate cut
/// short by the end of the bytecode is marked `(truncated)`.
pub fn disassemble(bytecode: &[u8]) -> String {
    let mut out = String::new();
    let mut pc = 0;

    while pc < bytecode.len() {
        let opcode = Opcode::decode(bytecode[pc]);
        let _ = write!(out, "{pc:04x}: {opcode}");

        let len = opcode.immediate_len();
        let start = pc + 1;
        let end = (start + len).min(bytecode.len());
        if len > 0 {
            let _ = write!(out, " 0x{}", to_hex(&bytecode[start..end]));
            if end - start < len {
                out.push_str(" (truncated)");
            }
        }
        out.push('\n');
        pc = start + len;
    }

    out
}

/// Lowercase hex encoding without prefix.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Parses hex bytecode, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, VMError> {
    let compact: String = text.split_whitespace().collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    let invalid = || VMError::InvalidHex {
        token: text.trim().to_string(),
    };

    if !digits.len().is_multiple_of(2) || !digits.is_ascii() {
        return Err(invalid());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_empty_source() {
        assert!(assemble_source("").unwrap().is_empty());
    }

    #[test]
    fn assemble_comments_and_blank_lines() {
        let source = format!(
            r#"
            {COMMENT_CHAR} this is a comment

            {COMMENT_CHAR} another comment
        "#
        );
        assert!(assemble_source(source).unwrap().is_empty());
    }

    #[test]
    fn assemble_inline_comment() {
        let source = format!("PUSH1 0x05 {COMMENT_CHAR} load value");
        assert_eq!(assemble_source(source).unwrap(), vec![0x60, 0x05]);
    }

    #[test]
    fn assemble_multiply_program() {
        let program = assemble_source(
            r#"
            PUSH1 0x05
            PUSH1 5
            MUL
            STOP
        "#,
        )
        .unwrap();
        assert_eq!(program, vec![0x60, 0x05, 0x60, 0x05, 0x02, 0x00]);
    }

    #[test]
    fn assemble_is_case_insensitive() {
        assert_eq!(
            assemble_source("push1 1\nadd\nSub\ndiv").unwrap(),
            vec![0x60, 0x01, 0x01, 0x03, 0x04]
        );
    }

    #[test]
    fn assemble_generic_push_pads_to_width() {
        assert_eq!(
            assemble_source("PUSH2 258").unwrap(),
            vec![0x61, 0x01, 0x02]
        );
        assert_eq!(
            assemble_source("PUSH4 0x01").unwrap(),
            vec![0x63, 0x00, 0x00, 0x00, 0x01]
        );
        let push32 = assemble_source(format!("PUSH32 0x{}", "ff".repeat(32))).unwrap();
        assert_eq!(push32.len(), 33);
        assert_eq!(push32[0], 0x7F);
    }

    #[test]
    fn assemble_immediate_too_wide() {
        let err = assemble_source("PUSH1 256").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 1, .. }));
        let err = assemble_source("PUSH2 0x010203").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 1, .. }));
    }

    #[test]
    fn assemble_invalid_instruction() {
        let err = assemble_source("ADD\nJUMP 4").unwrap_err();
        match err {
            VMError::AssemblyError { line, offset, source } => {
                assert_eq!(line, 2);
                assert_eq!(offset, 1);
                assert!(source.contains("JUMP"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn assemble_rejects_push_widths_outside_family() {
        assert!(assemble_source("PUSH0 1").is_err());
        assert!(assemble_source("PUSH33 1").is_err());
    }

    #[test]
    fn assemble_arity_mismatch() {
        assert!(assemble_source("ADD 1").is_err());
        assert!(assemble_source("PUSH1").is_err());
        assert!(assemble_source("PUSH3 1 2").is_err());
    }

    #[test]
    fn tokenize_columns() {
        let tokens = tokenize(1, "  PUSH1, 0x05 # comment").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "PUSH1");
        assert_eq!(tokens[0].offset, 3);
        assert_eq!(tokens[1].text, "0x05");
        assert_eq!(tokens[1].offset, 10);
    }

    #[test]
    fn tokenize_rejects_non_ascii() {
        assert!(matches!(
            tokenize(4, "PUSH1 ５"),
            Err(VMError::ParseError { line: 4, .. })
        ));
    }

    #[test]
    fn diagnostic_points_at_column() {
        let diag = render_assembly_diagnostic("prog.asm", "ADD\n  BAD", 2, 3, "invalid");
        assert!(diag.contains("error: invalid"));
        assert!(diag.contains("prog.asm:2:3"));
        assert!(diag.contains("   2 |   BAD"));
        assert!(diag.contains("  |   ^"));
    }

    #[test]
    fn assemble_file_reads_source() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("mul.asm");
        fs::write(&path, "PUSH1 5\nPUSH1 5\nMUL\nSTOP\n").unwrap();
        assert_eq!(
            assemble_file(&path).unwrap(),
            vec![0x60, 0x05, 0x60, 0x05, 0x02, 0x00]
        );
    }

    #[test]
    fn assemble_file_missing() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let err = assemble_file(dir.path().join("missing.asm")).unwrap_err();
        assert!(matches!(err, VMError::IoError { .. }));
    }

    #[test]
    fn disassemble_round_trips_listing() {
        let listing = disassemble(&[0x60, 0x05, 0x61, 0x01, 0x02, 0x02, 0x00]);
        assert_eq!(
            listing,
            "0000: PUSH1 0x05\n0002: PUSH2 0x0102\n0005: MUL\n0006: STOP\n"
        );
    }

    #[test]
    fn disassemble_marks_invalid_and_truncated() {
        let listing = disassemble(&[0x50, 0x62, 0xAA]);
        assert_eq!(listing, "0000: INVALID(0x50)\n0001: PUSH3 0xaa (truncated)\n");
    }

    #[test]
    fn parse_hex_accepts_prefix_and_whitespace() {
        assert_eq!(
            parse_hex("0x6005 6005\n0200").unwrap(),
            vec![0x60, 0x05, 0x60, 0x05, 0x02, 0x00]
        );
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn parse_hex_rejects_bad_input() {
        assert!(matches!(parse_hex("600"), Err(VMError::InvalidHex { .. })));
        assert!(matches!(parse_hex("60zz"), Err(VMError::InvalidHex { .. })));
    }

    #[test]
    fn to_hex_is_lowercase() {
        assert_eq!(to_hex(&[0x60, 0xAB]), "60ab");
        assert_eq!(to_hex(&[]), "");
    }
}

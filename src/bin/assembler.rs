//! Assembly to bytecode compiler CLI.
//!
//! Reads an assembly source file and writes the bytecode it compiles to.
//!
//! # Usage
//! ```text
//! assembler <input.asm> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input.asm`: Assembly source file to compile
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.bin`, or
//!   `<input>.hex` with `--hex`)
//! - `-x, --hex`: Write hex text instead of raw bytes
//!
//! # Examples
//! ```text
//! assembler program.asm
//! assembler program.asm -o output.bin
//! assembler program.asm -x
//! ```

use evm::virtual_machine::assembler::{assemble_file, disassemble, to_hex};
use evm::{error, info, trace};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut hex = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            "--hex" | "-x" => {
                hex = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    let output_path = output_path.unwrap_or_else(|| {
        let p = Path::new(input_path);
        let stem = p.file_stem().unwrap_or_default().to_string_lossy();
        let parent = p.parent().unwrap_or(Path::new("."));
        let ext = if hex { "hex" } else { "bin" };
        parent
            .join(format!("{}.{}", stem, ext))
            .to_string_lossy()
            .into_owned()
    });

    if let Some(parent) = Path::new(&output_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }

    let bytecode = match assemble_file(input_path) {
        Ok(code) => code,
        Err(e) => {
            error!("Assembly failed: {}", e);
            process::exit(1);
        }
    };

    for line in disassemble(&bytecode).lines() {
        trace!("{line}");
    }

    let contents = if hex {
        let mut text = to_hex(&bytecode).into_bytes();
        text.push(b'\n');
        text
    } else {
        bytecode.clone()
    };

    if let Err(e) = fs::write(&output_path, contents) {
        error!("Failed to write output file: {}", e);
        process::exit(1);
    }

    info!(
        "Compiled {} -> {} ({} bytes)",
        input_path,
        output_path,
        bytecode.len()
    );
}

const USAGE: &str = "\
Assembly Compiler

USAGE:
    {program} <input.asm> [OPTIONS]

ARGS:
    <input.asm>    Assembly source file to compile

OPTIONS:
    -o, --output <file>     Output file path (defaults to <input>.bin or <input>.hex)
    -x, --hex               Write hex text instead of raw bytes
    -h, --help              Print this help message

ENVIRONMENT:
    EVM_LOG=trace           Also log a disassembly of the output

EXAMPLES:
    # Compile to default output name
    {program} program.asm

    # Compile with explicit output
    {program} program.asm -o output.bin

    # Compile to hex text, ready for the runner
    {program} program.asm -x
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}

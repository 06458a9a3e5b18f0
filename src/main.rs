//! Bytecode runner.
//!
//! Executes a program on a fresh VM and prints the final stack and gas.
//!
//! # Usage
//! ```text
//! evm <hex|file> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `hex|file`: Bytecode as a hex string, or a path to a file holding hex
//!   text or raw bytes. With `--asm` the file is assembly source.
//!
//! # Options
//! - `-g, --gas <n>`: Gas limit (defaults to 1,000)
//! - `-a, --asm`: Assemble the input file before running it
//! - `-t, --trace`: Log every executed instruction
//! - `-p, --profile`: Print the gas profile after the run
//! - `-l, --stack-limit <n>`: Bound the operand stack depth
//!
//! # Examples
//! ```text
//! evm 6005600502
//! evm program.asm --asm --trace
//! evm program.bin -g 50 -p
//! ```

use evm::utils::log::{self, Level};
use evm::virtual_machine::assembler::{assemble_file, parse_hex};
use evm::virtual_machine::errors::VMError;
use evm::virtual_machine::vm::{DEFAULT_GAS_LIMIT, ExecOutcome, GasProfile, Step, VM};
use evm::{error, info, trace};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

struct Options {
    input: String,
    gas: u64,
    asm: bool,
    trace: bool,
    profile: bool,
    stack_limit: Option<usize>,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let options = parse_args(&args);

    let bytecode = match load_bytecode(&options) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let mut vm = VM::new(bytecode, options.gas);
    if let Some(limit) = options.stack_limit {
        vm = vm.with_stack_limit(limit);
    }

    if options.trace {
        log::set_level(Level::Trace);
        trace_run(&mut vm);
    }

    let outcome = vm.execute();
    report(&outcome);

    if options.profile {
        print_profile(&outcome.gas_profile);
    }

    if !outcome.is_success() {
        process::exit(2);
    }
}

fn parse_args(args: &[String]) -> Options {
    let mut options = Options {
        input: args[1].clone(),
        gas: DEFAULT_GAS_LIMIT,
        asm: false,
        trace: false,
        profile: false,
        stack_limit: None,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--gas" | "-g") => {
                i += 1;
                options.gas = parse_number(k, args.get(i));
                i += 1;
            }
            k @ ("--stack-limit" | "-l") => {
                i += 1;
                options.stack_limit = Some(parse_number::<usize>(k, args.get(i)));
                i += 1;
            }
            "--asm" | "-a" => {
                options.asm = true;
                i += 1;
            }
            "--trace" | "-t" => {
                options.trace = true;
                i += 1;
            }
            "--profile" | "-p" => {
                options.profile = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    options
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> T {
    let Some(value) = value else {
        error!("{flag} requires an argument");
        process::exit(1);
    };
    value.replace('_', "").parse::<T>().unwrap_or_else(|_| {
        error!("Invalid value for {flag}: '{value}' is not a valid number");
        process::exit(1);
    })
}

/// Resolves the input argument to bytecode.
///
/// A path that exists is read from disk. Its contents are taken as hex text
/// when they parse as such and as raw bytes otherwise. Anything else must be
/// a hex string.
fn load_bytecode(options: &Options) -> Result<Vec<u8>, VMError> {
    let path = Path::new(&options.input);

    if options.asm {
        return assemble_file(path);
    }

    if !path.is_file() {
        return parse_hex(&options.input);
    }

    let raw = fs::read(path).map_err(|e| VMError::IoError {
        path: path.display().to_string(),
        source: e.to_string(),
    })?;
    match std::str::from_utf8(&raw).ok().map(parse_hex) {
        Some(Ok(code)) => Ok(code),
        _ => Ok(raw),
    }
}

/// Steps the machine to completion, logging each instruction.
fn trace_run(vm: &mut VM) {
    loop {
        match vm.step() {
            Ok(Step::Continue(info)) => trace!(
                "{:04x}: {:<8} gas={:<3} remaining={:<6} depth={}",
                info.offset,
                info.opcode.to_string(),
                info.gas,
                vm.gas_remaining(),
                info.stack_depth
            ),
            Ok(Step::Halt(reason)) => {
                trace!("halted at {:04x}: {:?}", vm.pc(), reason);
                return;
            }
            Err(e) => {
                trace!("faulted at {:04x}: {}", vm.pc(), e);
                return;
            }
        }
    }
}

fn report(outcome: &ExecOutcome) {
    match &outcome.status {
        Ok(reason) => info!("Halted ({:?}) at pc {}", reason, outcome.pc),
        Err(e) => error!("Execution failed at pc {}: {}", outcome.pc, e),
    }

    if outcome.stack.is_empty() {
        println!("Stack: <empty>");
    } else {
        println!("Stack (top first):");
        for (depth, word) in outcome.stack.iter().rev().enumerate() {
            println!("  [{depth}] {word} (0x{word:x})");
        }
    }
    println!(
        "Gas: {} used, {} remaining",
        format_with_commas(outcome.gas_used),
        format_with_commas(outcome.gas_remaining)
    );
}

fn print_profile(profile: &GasProfile) {
    let total_u = profile.total();
    let total = total_u as f64;

    let cat_w = 2 + profile
        .iter()
        .map(|(c, _)| c.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max("total".chars().count());

    let amt_w = profile
        .iter()
        .map(|(_, a)| format_with_commas(a).chars().count())
        .max()
        .unwrap_or(0)
        .max(format_with_commas(total_u).chars().count());

    let dash_w = cat_w + 1 + amt_w + 2 + "( 100.0%)".len();

    println!("Gas Profile:");
    println!("{}", "-".repeat(dash_w));

    for (category, amount) in profile.iter() {
        if amount == 0 {
            continue;
        }

        let percent = if total > 0.0 {
            (amount as f64 / total) * 100.0
        } else {
            0.0
        };

        println!(
            "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
            category.as_str(),
            format_with_commas(amount),
            percent,
        );
    }

    println!("{}", "-".repeat(dash_w));
    println!(
        "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
        "total",
        format_with_commas(total_u),
        100.0,
    );
}

fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

const USAGE: &str = "\
Bytecode Runner

USAGE:
    {program} <hex|file> [OPTIONS]

ARGS:
    <hex|file>    Bytecode as hex, or a file with hex text or raw bytes

OPTIONS:
    -g, --gas <n>           Gas limit (defaults to 1,000)
    -a, --asm               Treat the input file as assembly source
    -t, --trace             Log every executed instruction
    -p, --profile           Print the gas profile after the run
    -l, --stack-limit <n>   Bound the operand stack depth
    -h, --help              Print this help message

ENVIRONMENT:
    EVM_LOG                 Minimum log level: trace, info, warn, error

EXAMPLES:
    # Run 5 * 5
    {program} 6005600502

    # Assemble and trace a program
    {program} program.asm --asm --trace

    # Run with 50 gas and show where it went
    {program} program.bin -g 50 -p
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}

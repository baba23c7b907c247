//! `c++filt`-style filter over Itanium C++ mangled names.
//!
//! Demangles the symbols given as operands, or each whitespace-separated
//! token read from stdin when no operands are given. Tokens that do not
//! demangle are echoed unchanged, so the tool can be dropped into a
//! pipeline over linker maps, backtraces or `nm` output.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

const HELP: &str = "OVERVIEW: Itanium C++ symbol demangler

USAGE: demangle [options] [symbol ...]

With no symbols, reads whitespace-separated tokens from stdin.

OPTIONS:
  -h, --help      Print usage information
  -s, --strict    Exit with an error if any symbol fails to demangle";

fn main() -> ExitCode {
    let mut strict = false;
    let mut symbols = Vec::new();

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{HELP}");
                return ExitCode::SUCCESS;
            }
            "-s" | "--strict" => strict = true,
            other if other.starts_with('-') => {
                eprintln!("unknown option '{other}'\n\n{HELP}");
                return ExitCode::FAILURE;
            }
            other => symbols.push(other.to_string()),
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut all_ok = true;

    if symbols.is_empty() {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            for token in line.split_whitespace() {
                all_ok &= emit(&mut out, token);
            }
        }
    } else {
        for symbol in &symbols {
            all_ok &= emit(&mut out, symbol);
        }
    }

    if strict && !all_ok {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Print the demangled form, or the token itself when it does not parse.
fn emit(out: &mut impl Write, token: &str) -> bool {
    match itanium_demangler::demangle(token) {
        Ok(text) => {
            let _ = writeln!(out, "{text}");
            true
        }
        Err(_) => {
            let _ = writeln!(out, "{token}");
            false
        }
    }
}

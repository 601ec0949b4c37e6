//! `chtl` binary entry point.

use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    process::exit(chtl_compiler_cli::main_entry::main_fn(args));
}

//! CLI entry: argument parsing and dispatch to `perform_compile`. Multiple
//! inputs compile in parallel; each compilation unit owns its own context.

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use rayon::prelude::*;

use chtl_compiler::CompilerOptions;

use crate::perform_compile::{perform_compilation, CompileRequest, EXIT_USAGE_OR_IO};

pub fn build_command() -> Command {
    Command::new("chtl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("CHTL compiler: .chtl source to HTML/CSS/JS")
        .arg(
            Arg::new("input")
                .value_name("input.chtl [output.html]")
                .num_args(1..)
                .required(true)
                .help("Input source file(s); a trailing non-.chtl path is the output"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Verbose diagnostics"),
        )
        .arg(
            Arg::new("minify")
                .short('m')
                .long("minify")
                .action(ArgAction::SetTrue)
                .help("Disable pretty-print"),
        )
        .arg(
            Arg::new("fragment")
                .short('f')
                .long("fragment")
                .action(ArgAction::SetTrue)
                .help("SPA mode (no html/head/body shell)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("file")
                .help("Explicit output path (\"-\" = stdout)"),
        )
        .arg(
            Arg::new("module-dir")
                .long("module-dir")
                .value_name("dir")
                .action(ArgAction::Append)
                .help("Extra module search directory"),
        )
}

pub fn main_fn(args: Vec<String>) -> i32 {
    let matches = match build_command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(err) => {
            // clap renders help/version through the same path.
            let _ = err.print();
            return if err.use_stderr() { EXIT_USAGE_OR_IO } else { 0 };
        }
    };

    let debug = matches.get_flag("debug");
    init_logging(debug);

    let mut options = CompilerOptions {
        debug,
        minify: matches.get_flag("minify"),
        fragment: matches.get_flag("fragment"),
        ..CompilerOptions::default()
    };
    if let Some(dirs) = matches.get_many::<String>("module-dir") {
        options.module_dirs = dirs.map(PathBuf::from).collect();
    }

    let mut inputs: Vec<PathBuf> = matches
        .get_many::<String>("input")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default();
    let mut output = matches.get_one::<String>("output").map(PathBuf::from);

    // `chtl input.chtl output.html`: a trailing non-.chtl positional is the
    // output path.
    if output.is_none() && inputs.len() >= 2 {
        let trailing_is_output = inputs
            .last()
            .map(|p| p.extension().and_then(|e| e.to_str()) != Some("chtl"))
            .unwrap_or(false);
        if trailing_is_output {
            output = inputs.pop();
        }
    }

    if inputs.len() > 1 && output.is_some() {
        eprintln!("chtl: --output cannot be combined with multiple inputs");
        return EXIT_USAGE_OR_IO;
    }

    let requests: Vec<CompileRequest> = inputs
        .into_iter()
        .map(|input| CompileRequest {
            input,
            output: output.clone(),
            options: options.clone(),
        })
        .collect();

    // Units are independent: each owns its scanner table, symbol map and
    // module registry, so they may run in parallel.
    let exit_codes: Vec<i32> = if requests.len() > 1 {
        requests.par_iter().map(|r| perform_compilation(r).exit_code).collect()
    } else {
        requests.iter().map(|r| perform_compilation(r).exit_code).collect()
    };

    exit_codes.into_iter().max().unwrap_or(0)
}

fn init_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let matches = build_command()
            .try_get_matches_from(["chtl", "-d", "-m", "in.chtl"])
            .unwrap();
        assert!(matches.get_flag("debug"));
        assert!(matches.get_flag("minify"));
        assert!(!matches.get_flag("fragment"));
    }

    #[test]
    fn requires_an_input() {
        assert!(build_command().try_get_matches_from(["chtl"]).is_err());
    }

    #[test]
    fn collects_module_dirs() {
        let matches = build_command()
            .try_get_matches_from(["chtl", "--module-dir", "a", "--module-dir", "b", "in.chtl"])
            .unwrap();
        let dirs: Vec<&String> = matches.get_many::<String>("module-dir").unwrap().collect();
        assert_eq!(dirs.len(), 2);
    }
}

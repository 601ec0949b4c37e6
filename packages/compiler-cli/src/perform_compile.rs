//! Drive one compilation: read the source, run the pipeline, write the
//! output, report diagnostics.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use chtl_compiler::diagnostics::Diagnostic;
use chtl_compiler::{Compiler, CompilerOptions};

/// Exit codes: 0 success, 1 usage or I/O error, 2 compilation failure.
pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE_OR_IO: i32 = 1;
pub const EXIT_COMPILE_FAILED: i32 = 2;

#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub input: PathBuf,
    /// `None` derives `<input>.html`; `-` writes to stdout.
    pub output: Option<PathBuf>,
    pub options: CompilerOptions,
}

#[derive(Debug)]
pub struct PerformCompileResult {
    pub exit_code: i32,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn perform_compilation(request: &CompileRequest) -> PerformCompileResult {
    match try_compile(request) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("chtl: {:#}", err);
            PerformCompileResult { exit_code: EXIT_USAGE_OR_IO, diagnostics: Vec::new() }
        }
    }
}

fn try_compile(request: &CompileRequest) -> Result<PerformCompileResult> {
    let source = fs::read_to_string(&request.input)
        .with_context(|| format!("cannot read '{}'", request.input.display()))?;
    let file_name = request.input.to_string_lossy().to_string();

    let compiler = Compiler::new(request.options.clone());
    let result = compiler.compile(&source, &file_name);

    let formatted = format_diagnostics(&result.diagnostics, request.options.debug);
    if !formatted.is_empty() {
        eprint!("{}", formatted);
        let errors = result
            .diagnostics
            .iter()
            .filter(|d| d.level == chtl_compiler::parse_util::ParseErrorLevel::Error)
            .count();
        eprintln!("{} error(s)", errors);
    }

    let Some(output) = result.output else {
        return Ok(PerformCompileResult {
            exit_code: EXIT_COMPILE_FAILED,
            diagnostics: result.diagnostics,
        });
    };
    if !result.success {
        return Ok(PerformCompileResult {
            exit_code: EXIT_COMPILE_FAILED,
            diagnostics: result.diagnostics,
        });
    }

    write_output(request, &output.document)?;
    Ok(PerformCompileResult { exit_code: EXIT_OK, diagnostics: result.diagnostics })
}

fn write_output(request: &CompileRequest, document: &str) -> Result<()> {
    let target = output_path(request);
    if target == Path::new("-") {
        std::io::stdout()
            .write_all(document.as_bytes())
            .context("cannot write to stdout")?;
        return Ok(());
    }
    fs::write(&target, document)
        .with_context(|| format!("cannot write '{}'", target.display()))?;
    Ok(())
}

pub fn output_path(request: &CompileRequest) -> PathBuf {
    match &request.output {
        Some(path) => path.clone(),
        None => request.input.with_extension("html"),
    }
}

/// `<file>:<line>:<column>: <kind>: <message>`, one per line.
pub fn format_diagnostics(diagnostics: &[Diagnostic], debug: bool) -> String {
    let mut out = String::new();
    for diagnostic in diagnostics {
        out.push_str(&diagnostic.format(debug));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_defaults_to_html_extension() {
        let request = CompileRequest {
            input: PathBuf::from("page.chtl"),
            output: None,
            options: CompilerOptions::default(),
        };
        assert_eq!(output_path(&request), PathBuf::from("page.html"));
    }

    #[test]
    fn explicit_output_wins() {
        let request = CompileRequest {
            input: PathBuf::from("page.chtl"),
            output: Some(PathBuf::from("out/index.html")),
            options: CompilerOptions::default(),
        };
        assert_eq!(output_path(&request), PathBuf::from("out/index.html"));
    }
}

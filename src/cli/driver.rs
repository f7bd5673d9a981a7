//! CLI driver: turns parsed arguments into a compilation and renders the
//! resulting diagnostics.

use crate::cli::args::{CliArgs, Command};
use crate::diagnostics::Severity;
use crate::program::host::RealHost;
use crate::program::{compile, CompilerOptions, DiagnosticLevel, Program};
use anyhow::{bail, Result};
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Exit code for a run whose diagnostics include an error.
pub const EXIT_FAILURE: i32 = 1;

/// Run the CLI. Returns the process exit code: zero on success without
/// error diagnostics, non-zero otherwise.
pub fn run(args: CliArgs) -> Result<i32> {
    match args.command {
        Command::Compile {
            path,
            emit,
            no_emit,
            no_std_lib,
            output_dir,
            options,
            diagnostic_level,
        } => {
            let options = build_options(
                emit,
                no_emit,
                no_std_lib,
                output_dir,
                options,
                diagnostic_level,
            )?;
            let host = Arc::new(RealHost::new());
            let program = compile(host, &path, options);
            print_diagnostics(&program);
            Ok(if program.has_error() { EXIT_FAILURE } else { 0 })
        }
    }
}

fn build_options(
    emit: Vec<String>,
    no_emit: bool,
    no_std_lib: bool,
    output_dir: Option<PathBuf>,
    raw_options: Vec<String>,
    diagnostic_level: Option<String>,
) -> Result<CompilerOptions> {
    let mut misc_options = FxHashMap::default();
    for raw in raw_options {
        match raw.split_once('=') {
            Some((key, value)) => {
                misc_options.insert(key.to_string(), value.to_string());
            }
            None => bail!("invalid --option '{}': expected key=value", raw),
        }
    }
    let diagnostic_level = match diagnostic_level.as_deref() {
        Some("error") => DiagnosticLevel::Error,
        _ => DiagnosticLevel::Warning,
    };
    Ok(CompilerOptions {
        emitters: emit,
        output_dir,
        no_emit,
        no_std_lib,
        diagnostic_level,
        misc_options,
        compiler_path: std::env::current_exe().ok(),
    })
}

fn print_diagnostics(program: &Program) {
    for diagnostic in program.diagnostics().iter() {
        if program.options.diagnostic_level == DiagnosticLevel::Error
            && diagnostic.severity != Severity::Error
        {
            continue;
        }
        let source = diagnostic
            .target
            .file()
            .map(|file| &program.file(file).source);
        eprintln!("{}", diagnostic.format(source));
    }
    let errors = program.diagnostics().error_count();
    if errors > 0 {
        eprintln!(
            "\nCompilation failed with {} error{}.",
            errors,
            if errors == 1 { "" } else { "s" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_options_parses_misc() {
        let options = build_options(
            vec!["openapi".to_string()],
            true,
            false,
            None,
            vec!["output-file=openapi.json".to_string()],
            Some("error".to_string()),
        )
        .unwrap();
        assert_eq!(options.emitters, vec!["openapi"]);
        assert!(options.no_emit);
        assert_eq!(
            options.misc_options.get("output-file").map(String::as_str),
            Some("openapi.json")
        );
        assert_eq!(options.diagnostic_level, DiagnosticLevel::Error);
    }

    #[test]
    fn test_build_options_rejects_bad_option() {
        let result = build_options(vec![], false, false, None, vec!["nope".to_string()], None);
        assert!(result.is_err());
    }
}

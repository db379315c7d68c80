//! Command implementations: one function per subcommand, taking the
//! already-parsed `clap` arguments and doing its own I/O and process exit.

use std::path::{Path, PathBuf};

use scriptlang_compiler::native_db::InMemoryNativeDatabase;
use scriptlang_compiler::session::CompileSession;
use scriptlang_compiler::{DiagnosticsPrinter, Error};
use scriptlang_core::FileId;

use crate::cli::ColorChoice;

fn read_source(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error: couldn't read {}: {e}", path.display());
        std::process::exit(1);
    })
}

pub fn run_build(file: PathBuf, out: Option<PathBuf>, color: ColorChoice) {
    let source = read_source(&file);
    let session = CompileSession::new(FileId::from_raw(0));
    let path_display = file.display().to_string();

    match session.compile(&source) {
        Ok(program) => {
            let out_path = out.unwrap_or_else(|| file.with_extension("bin"));
            if let Err(e) = std::fs::write(&out_path, program.to_bytes()) {
                eprintln!("error: couldn't write {}: {e}", out_path.display());
                std::process::exit(1);
            }
        }
        Err(Error::HasDiagnosticErrors(diagnostics)) => {
            eprint!(
                "{}",
                DiagnosticsPrinter::new(&diagnostics)
                    .source(&source)
                    .path(&path_display)
                    .colored(color.should_colorize())
                    .render()
            );
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

pub fn run_check(file: PathBuf, color: ColorChoice) {
    let source = read_source(&file);
    let mut session = CompileSession::new(FileId::from_raw(0));
    let path_display = file.display().to_string();
    session.check(&source);

    if session.diagnostics.error_count() > 0 {
        eprint!(
            "{}",
            DiagnosticsPrinter::new(&session.diagnostics)
                .source(&source)
                .path(&path_display)
                .colored(color.should_colorize())
                .render()
        );
        std::process::exit(1);
    }
}

pub fn run_disasm(file: PathBuf, natives: Option<PathBuf>) {
    let bytes = std::fs::read(&file).unwrap_or_else(|e| {
        eprintln!("error: couldn't read {}: {e}", file.display());
        std::process::exit(1);
    });

    let program = scriptlang_bytecode::CompiledProgram::from_bytes(&bytes).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });

    let db = match natives {
        Some(path) => {
            let data = read_source(&path);
            InMemoryNativeDatabase::from_json(&data).unwrap_or_else(|e| {
                eprintln!("error: couldn't parse native database {}: {e}", path.display());
                std::process::exit(1);
            })
        }
        None => InMemoryNativeDatabase::new(),
    };

    match scriptlang_compiler::disasm::disassemble(&program, &db) {
        Ok(text) => print!("{text}"),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    pub fn should_colorize(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

#[derive(Parser)]
#[command(name = "scriptlangc", bin_name = "scriptlangc")]
#[command(about = "Compiler for ScriptLang, a SCO/RAGE-style scripting language")]
pub struct Cli {
    /// Increase log verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a source file to a bytecode program
    #[command(after_help = r#"EXAMPLES:
  scriptlangc build script.sc
  scriptlangc build script.sc -o script.bin"#)]
    Build {
        /// Source file to compile
        file: PathBuf,

        /// Output path (defaults to the input path with a `.bin` extension)
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,

        /// Colorize diagnostics (auto-detected by default)
        #[arg(long, default_value = "auto", value_name = "WHEN")]
        color: ColorChoice,
    },

    /// Run the front end without emitting bytecode and report diagnostics
    #[command(after_help = r#"EXAMPLES:
  scriptlangc check script.sc"#)]
    Check {
        /// Source file to check
        file: PathBuf,

        /// Colorize diagnostics (auto-detected by default)
        #[arg(long, default_value = "auto", value_name = "WHEN")]
        color: ColorChoice,
    },

    /// Disassemble a compiled bytecode program
    #[command(after_help = r#"EXAMPLES:
  scriptlangc disasm script.bin
  scriptlangc disasm script.bin --natives natives.json"#)]
    Disasm {
        /// Compiled program to disassemble
        file: PathBuf,

        /// JSON native database (hash -> name/signature) for symbolic native names
        #[arg(long, value_name = "FILE")]
        natives: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_internally_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_parses_output_path_and_verbosity() {
        let cli = Cli::parse_from(["scriptlangc", "-vv", "build", "script.sc", "-o", "out.bin"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Build { file, out, .. } => {
                assert_eq!(file, PathBuf::from("script.sc"));
                assert_eq!(out, Some(PathBuf::from("out.bin")));
            }
            _ => panic!("expected Build"),
        }
    }

    #[test]
    fn disasm_natives_flag_is_optional() {
        let cli = Cli::parse_from(["scriptlangc", "disasm", "script.bin"]);
        match cli.command {
            Command::Disasm { natives, .. } => assert!(natives.is_none()),
            _ => panic!("expected Disasm"),
        }
    }
}

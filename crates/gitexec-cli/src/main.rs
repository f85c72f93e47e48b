//! gitexec - run the bundled git and classify its failures
//!
//! ## Commands
//!
//! - `exec`: Run git and print the captured result as JSON
//! - `parse-error`: Classify git diagnostic text
//! - `env`: Show where git is resolved and the environment it runs with

use std::collections::HashMap;
use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gitexec_core::{
    parse_error, setup_environment, ExecOptions, ExecResult, GitError, GitProcess,
    DEFAULT_MAX_BUFFER,
};
use serde::Serialize;
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "gitexec")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run the bundled git and classify its failures", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run git and print stdout, stderr, exit code and the parsed error as JSON
    Exec {
        /// Working directory for git (default: current directory)
        #[arg(short = 'C', long, default_value = ".")]
        dir: PathBuf,

        /// Text written to git's standard input
        #[arg(long)]
        stdin: Option<String>,

        /// Bound for each captured stream, in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_BUFFER)]
        max_buffer: usize,

        /// Extra environment variable for git (KEY=VALUE, repeatable)
        #[arg(short, long = "env", value_parser = parse_key_val)]
        env: Vec<(String, String)>,

        /// Arguments passed to git
        #[arg(last = true, required = true)]
        args: Vec<OsString>,
    },

    /// Classify git diagnostic text from a file or stdin
    ParseError {
        /// File containing git's stderr (default: read stdin)
        file: Option<PathBuf>,
    },

    /// Show the resolved git location and the variables added for it
    Env,
}

#[derive(Serialize)]
struct ExecOutput<'a> {
    #[serde(flatten)]
    result: &'a ExecResult,
    parsed_error: Option<GitError>,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    gitexec_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Exec {
            dir,
            stdin,
            max_buffer,
            env,
            args,
        } => cmd_exec(&dir, stdin, max_buffer, env, &args).await,
        Commands::ParseError { file } => cmd_parse_error(file.as_ref()),
        Commands::Env => cmd_env(),
    }
}

async fn cmd_exec(
    dir: &PathBuf,
    stdin: Option<String>,
    max_buffer: usize,
    env: Vec<(String, String)>,
    args: &[OsString],
) -> Result<ExitCode> {
    let mut options = ExecOptions::new().with_max_buffer(max_buffer);
    if let Some(input) = stdin {
        options = options.with_stdin(input);
    }
    for (key, value) in env {
        options = options.with_env(key, value);
    }

    let result = match GitProcess::exec(args, dir, options).await {
        Ok(result) => result,
        Err(err) => {
            eprintln!("error[{}]: {}", err.code().unwrap_or("io"), err);
            return Ok(ExitCode::FAILURE);
        }
    };

    let output = ExecOutput {
        result: &result,
        parsed_error: result.parse_error(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    let code = match result.exit_code {
        Some(code) => u8::try_from(code).unwrap_or(1),
        None => 1,
    };
    Ok(ExitCode::from(code))
}

fn cmd_parse_error(file: Option<&PathBuf>) -> Result<ExitCode> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read diagnostics file: {:?}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read diagnostics from stdin")?;
            buf
        }
    };

    match parse_error(&text) {
        Some(error) => {
            println!("{}", error);
            debug!(description = error.description(), "classified");
        }
        None => println!("none"),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_env() -> Result<ExitCode> {
    let resolved =
        setup_environment(&HashMap::new()).context("Failed to resolve the git environment")?;
    let inherited: HashMap<OsString, OsString> = std::env::vars_os().collect();

    println!("git:       {}", resolved.git_location.display());
    println!("exec path: {}", resolved.exec_path.display());
    println!();
    for (key, value) in &resolved.env {
        if inherited.get(key) != Some(value) {
            println!("{}={}", key.to_string_lossy(), value.to_string_lossy());
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("GIT_TRACE=1").unwrap(),
            ("GIT_TRACE".to_string(), "1".to_string())
        );
        assert_eq!(parse_key_val("A=b=c").unwrap(), ("A".to_string(), "b=c".to_string()));
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_cli_parses_exec() {
        let cli = Cli::try_parse_from([
            "gitexec", "exec", "-C", "/tmp", "-e", "GIT_TRACE=1", "--", "status", "--short",
        ])
        .unwrap();
        match cli.command {
            Commands::Exec {
                dir,
                env,
                args,
                max_buffer,
                stdin,
            } => {
                assert_eq!(dir, PathBuf::from("/tmp"));
                assert_eq!(env, vec![("GIT_TRACE".to_string(), "1".to_string())]);
                assert_eq!(args, vec![OsString::from("status"), OsString::from("--short")]);
                assert_eq!(max_buffer, DEFAULT_MAX_BUFFER);
                assert!(stdin.is_none());
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_exec_output_flattens_result() {
        let result = ExecResult {
            stdout: String::new(),
            stderr: "fatal: bad revision 'x'\n".to_string(),
            exit_code: Some(128),
        };
        let output = ExecOutput {
            result: &result,
            parsed_error: result.parse_error(),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["exit_code"], 128);
        assert_eq!(json["parsed_error"], "BadRevision");
    }
}

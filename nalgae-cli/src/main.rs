use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use nalgae_core::runtime::ensure_ascii;
use nalgae_core::{CompileOptions, TargetExecutor, WasmExecutor, compile_wasm, emit_ir};

/// Compile a nalgae program and run it on one input string.
#[derive(Parser, Debug)]
#[command(name = "nalgae", version, about, long_about = None)]
struct Cli {
    /// Source file (`-` reads the program from stdin)
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Input string handed to the program
    #[arg(value_name = "INPUT", default_value = "")]
    input: String,

    #[arg(
        long,
        value_enum,
        value_name = "FORMAT",
        default_value = "wasm",
        help = "Artifact written by --output"
    )]
    emit: EmitFormat,

    #[arg(short, long, value_name = "PATH", help = "Also write the compiled artifact")]
    output: Option<PathBuf>,

    #[arg(
        long,
        value_name = "NAME",
        default_value = "run",
        help = "Name the entry procedure is exported under"
    )]
    entry: String,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum EmitFormat {
    Wasm,
    Ir,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = setup_logging(cli.verbose, cli.quiet) {
        eprintln!("warning: {err:#}");
    }
    match execute(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) -> Result<()> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let formatter = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(formatter)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialise logging: {err}"))
}

fn execute(cli: Cli) -> Result<String> {
    ensure_ascii(&cli.input).context("invalid input")?;

    let source = read_source(&cli.source)?;
    let options = CompileOptions {
        entry_point: cli.entry.clone(),
    };

    let artifact = compile_wasm(&source, &options).context("compilation failed")?;
    tracing::info!(
        bytes = artifact.wasm.len(),
        builtins = artifact.builtins.len(),
        "compiled {}",
        cli.source.display()
    );

    if let Some(path) = &cli.output {
        match cli.emit {
            EmitFormat::Wasm => write_output(path, &artifact.wasm)?,
            EmitFormat::Ir => {
                let ir = emit_ir(&source, &options).context("compilation failed")?;
                write_output(path, ir.as_bytes())?;
            }
        }
    }

    WasmExecutor::new()
        .execute(&artifact, &cli.input)
        .context("execution failed")
}

fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read source from stdin")?;
        return Ok(buffer);
    }
    fs::read_to_string(path)
        .with_context(|| format!("failed to read source file {}", path.display()))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}

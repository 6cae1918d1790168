use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vox_core::{CompileOptions, CoreError, ModuleRegistry, SearchRoot, compile};

/// Compile a Vox program to LLVM IR.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file (reads stdin when omitted).
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[arg(short, long, default_value = "out.ll")]
    output: PathBuf,

    #[arg(long, value_name = "OS", help = "OS key for module lookup (defaults to the host)")]
    os: Option<String>,

    #[arg(
        short = 'D',
        long = "define",
        value_name = "SYMBOL",
        help = "Extra symbol for d_if blocks (repeatable)"
    )]
    defines: Vec<String>,

    #[arg(
        short = 'I',
        long = "search-path",
        value_name = "[OS=]PATH",
        help = "Module search root for import <name> (repeatable, searched in order)"
    )]
    search_paths: Vec<String>,

    #[arg(long, value_name = "DIALECT", default_value = "inteldialect")]
    dialect: String,

    #[arg(long, help = "List importable modules and exit")]
    list_modules: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let code = execute(cli)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

// Silent unless RUST_LOG asks for output.
fn init_tracing() {
    let Ok(filter) = EnvFilter::try_from_default_env() else {
        return;
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn options_from(cli: &Cli) -> CompileOptions {
    let mut options = CompileOptions::default();
    if let Some(os) = &cli.os {
        options.os = os.to_lowercase();
    }
    options.defines.extend(cli.defines.iter().cloned());

    let mut registry = ModuleRegistry::new();
    for root in &cli.search_paths {
        registry.add_root(SearchRoot::parse(root));
    }
    options.registry = registry;
    options.asm_dialect = cli.dialect.clone();

    if let Some(input) = &cli.input {
        if let Some(parent) = input.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            options.working_dir = parent.to_path_buf();
        }
        options.source_name = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
    }
    options
}

/// Returns the process exit code.
fn execute(cli: Cli) -> Result<i32> {
    let options = options_from(&cli);
    tracing::debug!(
        os = %options.os,
        roots = options.registry.roots().len(),
        defines = options.defines.len(),
        "compile options"
    );

    if cli.list_modules {
        for module in options.registry.discover(&options.os) {
            println!("{module}");
        }
        return Ok(0);
    }

    let source = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let artifact = match compile(&source, &options) {
        Ok(artifact) => artifact,
        Err(err @ (CoreError::Fatal(..) | CoreError::Aborted { .. })) => {
            for diag in err.diagnostics() {
                eprintln!("{diag}");
            }
            eprintln!("Aborting due to errors");
            return Ok(err.exit_code());
        }
        Err(err) => return Err(err.into()),
    };

    for line in &artifact.compile_time_output {
        println!("[CTIME_PRINT] {line}");
    }
    write_output(&cli.output, artifact.ir.as_bytes())?;
    println!("Generated LLVM IR at '{}'", cli.output.display());
    if !artifact.link_libraries.is_empty() {
        println!("Link libraries: {}", artifact.link_libraries.join(", "));
    }
    println!("Entry body:\n{}", artifact.entry_body);
    Ok(0)
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

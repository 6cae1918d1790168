use std::fs;
use std::path::{Path, PathBuf};

use crate::dispatch::compile_block;
use crate::emit::emit_module;
use crate::error::CoreError;
use crate::modules::{ModuleRegistry, host_defines, host_os_key};
use crate::preprocess::Preprocessor;
use crate::session::Session;

/// Everything a compiler run needs besides the source text.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Symbols visible to `d_if`, host symbols included.
    pub defines: Vec<String>,
    /// OS key used to pick registry roots.
    pub os: String,
    pub registry: ModuleRegistry,
    /// Base directory for `import "path"`.
    pub working_dir: PathBuf,
    pub asm_dialect: String,
    /// Written as `source_filename` when set.
    pub source_name: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            defines: host_defines(),
            os: host_os_key(),
            registry: ModuleRegistry::new(),
            working_dir: PathBuf::from("."),
            asm_dialect: "inteldialect".to_string(),
            source_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationArtifact {
    /// The complete IR module.
    pub ir: String,
    /// Libraries named by `lib` lines, without directory or extension.
    pub link_libraries: Vec<String>,
    /// Lines produced by `ctime_print`.
    pub compile_time_output: Vec<String>,
    /// Body of the entry function, for diagnostics.
    pub entry_body: String,
}

/// Compile Vox source text to IR.
///
/// Soft errors are collected for the whole run; if any were recorded the
/// result is [`CoreError::Aborted`] and nothing is emitted.
#[tracing::instrument(level = "debug", skip_all, fields(source = options.source_name.as_deref()))]
pub fn compile(source: &str, options: &CompileOptions) -> Result<CompilationArtifact, CoreError> {
    let mut session = Session::new(options.asm_dialect.clone());

    let mut pre = Preprocessor::new(&options.registry, &options.os, &options.working_dir);
    for symbol in &options.defines {
        pre.define(symbol.clone());
    }
    let lines = pre.expand(source, &mut session);
    tracing::debug!(lines = lines.len(), "preprocessed");

    compile_block(&mut session, &lines)?;
    tracing::debug!(
        functions = session.functions().count(),
        errors = session.diagnostics().len(),
        "dispatch finished"
    );

    if session.has_errors() {
        return Err(CoreError::Aborted {
            diagnostics: session.take_diagnostics(),
        });
    }

    let ir = emit_module(&session, options.source_name.as_deref());
    Ok(CompilationArtifact {
        ir,
        link_libraries: std::mem::take(&mut session.link_libraries),
        compile_time_output: std::mem::take(&mut session.ctime_output),
        entry_body: session.entry_body().to_string(),
    })
}

/// Read and compile a file. Quoted imports resolve next to it unless the
/// options name another working directory.
pub fn compile_file(
    path: impl AsRef<Path>,
    options: &CompileOptions,
) -> Result<CompilationArtifact, CoreError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)?;

    let mut options = options.clone();
    if options.working_dir == Path::new(".") {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            options.working_dir = parent.to_path_buf();
        }
    }
    if options.source_name.is_none() {
        options.source_name = path.file_name().map(|name| name.to_string_lossy().into_owned());
    }
    compile(&source, &options)
}

//! Mutable state of one compiler run.
//!
//! A [`Session`] owns the symbol tables, the scope buffers the IR is
//! written into, the label/temporary counters and the diagnostics. Every
//! lowering step takes it by `&mut` reference; nothing lives in globals,
//! so two sessions never share labels or temporaries.

use std::collections::HashMap;

use crate::diagnostic::{Diagnostic, Location};
use crate::error::CoreError;
use crate::types::{IrType, TypeError, TypeTables};

/// Function name reported for top-level code.
pub const TOP_LEVEL_SCOPE: &str = "Vmain";

/// Stable index of a [`Function`] in the session arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(usize);

/// Where emitted instructions go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The implicit `Vmain` entry function.
    TopLevel,
    Function(FunctionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    /// Type as written in the source.
    pub source_type: String,
    /// `None` when the source type did not resolve (already reported).
    pub ty: Option<IrType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: IrType,
    /// Declared with `dyn_import fn`: no body is emitted.
    pub is_foreign: bool,
    pub body: String,
}

impl Function {
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|param| param.name == name)
    }
}

/// A compile-time constant: its literal (or `@global` reference) and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub value: String,
    pub ty: String,
}

/// A name resolved against the symbol tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolRef<'a> {
    Constant(&'a Constant),
    Variable(&'a str),
}

impl SymbolRef<'_> {
    /// Declared Vox type of the symbol.
    pub fn source_type(&self) -> &str {
        match self {
            SymbolRef::Constant(constant) => &constant.ty,
            SymbolRef::Variable(ty) => ty,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    if_blocks: usize,
    temps: usize,
    call_sites: usize,
    strings: usize,
}

#[derive(Debug)]
pub struct Session {
    pub constants: HashMap<String, Constant>,
    pub variables: HashMap<String, String>,
    pub types: TypeTables,
    functions: Vec<Function>,
    function_ids: HashMap<String, FunctionId>,
    preamble: String,
    entry: String,
    /// Relaxes pointer/buffer base-type mismatch checks.
    pub unsafe_mode: bool,
    /// Raw lines become inline assembly.
    pub asm_mode: bool,
    pub asm_dialect: String,
    def_stack: Vec<FunctionId>,
    counters: Counters,
    /// Library names the linker needs, in first-seen order.
    pub link_libraries: Vec<String>,
    /// Output of `ctime_print` lines.
    pub ctime_output: Vec<String>,
    line: usize,
    line_text: String,
    diagnostics: Vec<Diagnostic>,
}

impl Session {
    pub fn new(asm_dialect: impl Into<String>) -> Self {
        Session {
            constants: HashMap::new(),
            variables: HashMap::new(),
            types: TypeTables::default(),
            functions: Vec::new(),
            function_ids: HashMap::new(),
            preamble: String::new(),
            entry: String::new(),
            unsafe_mode: false,
            asm_mode: false,
            asm_dialect: asm_dialect.into(),
            def_stack: Vec::new(),
            counters: Counters::default(),
            link_libraries: Vec::new(),
            ctime_output: Vec::new(),
            line: 0,
            line_text: String::new(),
            diagnostics: Vec::new(),
        }
    }

    // -----------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------

    pub fn set_location(&mut self, line: usize, text: &str) {
        self.line = line;
        self.line_text.clear();
        self.line_text.push_str(text);
    }

    fn location(&self) -> Location {
        Location {
            line: self.line,
            text: self.line_text.clone(),
            function: self.current_function_name().to_string(),
        }
    }

    /// Record a soft error; compilation continues, emission is withheld.
    pub fn error(&mut self, message: impl Into<String>) {
        let diag = Diagnostic::error(message, self.location());
        tracing::debug!(line = diag.location.line, "{}", diag.message);
        self.diagnostics.push(diag);
    }

    /// Record a fatal error and build the error that ends the run.
    pub fn fatal(&mut self, message: impl Into<String>) -> CoreError {
        let diag = Diagnostic::fatal(message, self.location());
        self.diagnostics.push(diag.clone());
        CoreError::Fatal(diag, self.diagnostics.clone())
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    // -----------------------------------------------------------------
    // Types and symbols
    // -----------------------------------------------------------------

    /// Lower a Vox type, reporting a soft error on failure.
    pub fn lower_type(&mut self, text: &str) -> Option<IrType> {
        match self.types.lower(text) {
            Ok(ty) => Some(ty),
            Err(err) => {
                self.report_type_error(err);
                None
            }
        }
    }

    pub fn report_type_error(&mut self, err: TypeError) {
        self.error(err.to_string());
    }

    /// Constants are consulted before variables.
    pub fn symbol(&self, name: &str) -> Option<SymbolRef<'_>> {
        if let Some(constant) = self.constants.get(name) {
            return Some(SymbolRef::Constant(constant));
        }
        self.variables
            .get(name)
            .map(|ty| SymbolRef::Variable(ty.as_str()))
    }

    /// Returns `false` if the constant already exists.
    pub fn define_constant(&mut self, name: &str, value: impl Into<String>, ty: &str) -> bool {
        if self.constants.contains_key(name) {
            return false;
        }
        self.constants.insert(
            name.to_string(),
            Constant {
                value: value.into(),
                ty: ty.to_string(),
            },
        );
        true
    }

    /// Returns `false` if the variable already exists.
    pub fn define_variable(&mut self, name: &str, ty: &str) -> bool {
        if self.variables.contains_key(name) {
            return false;
        }
        self.variables.insert(name.to_string(), ty.to_string());
        true
    }

    // -----------------------------------------------------------------
    // Functions and the definition stack
    // -----------------------------------------------------------------

    /// Add a function to the arena. `None` if the name is taken.
    pub fn register_function(&mut self, function: Function) -> Option<FunctionId> {
        if self.function_ids.contains_key(&function.name) {
            return None;
        }
        let id = FunctionId(self.functions.len());
        self.function_ids.insert(function.name.clone(), id);
        self.functions.push(function);
        Some(id)
    }

    pub fn function_id(&self, name: &str) -> Option<FunctionId> {
        self.function_ids.get(name).copied()
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.0)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.function_id(name).and_then(|id| self.function(id))
    }

    /// Functions in registration order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    /// Push `id` on the definition stack. Only one function may be
    /// compiled at a time.
    pub fn begin_function(&mut self, id: FunctionId) -> Result<(), CoreError> {
        if let Some(active) = self.def_stack.last() {
            let active = self
                .function(*active)
                .map_or("<unknown>", |function| function.name.as_str())
                .to_string();
            return Err(CoreError::Internal(format!(
                "cannot compile a function while '{active}' is being compiled"
            )));
        }
        if self.function(id).is_none() {
            return Err(CoreError::Internal(format!("no function record for {id:?}")));
        }
        self.def_stack.push(id);
        Ok(())
    }

    pub fn end_function(&mut self) {
        self.def_stack.pop();
    }

    pub fn current_function(&self) -> Option<&Function> {
        self.def_stack.last().and_then(|id| self.function(*id))
    }

    pub fn current_scope(&self) -> Scope {
        match self.def_stack.last() {
            Some(id) => Scope::Function(*id),
            None => Scope::TopLevel,
        }
    }

    pub fn current_function_name(&self) -> &str {
        self.current_function()
            .map_or(TOP_LEVEL_SCOPE, |function| function.name.as_str())
    }

    /// A parameter of the function being compiled.
    pub fn current_param(&self, name: &str) -> Option<&Param> {
        self.current_function().and_then(|function| function.param(name))
    }

    // -----------------------------------------------------------------
    // Scope buffers
    // -----------------------------------------------------------------

    pub fn append(&mut self, scope: Scope, code: &str) -> Result<(), CoreError> {
        match scope {
            Scope::TopLevel => self.entry.push_str(code),
            Scope::Function(id) => {
                let function = self.functions.get_mut(id.0).ok_or_else(|| {
                    CoreError::Internal(format!("scope buffer for unknown function {id:?}"))
                })?;
                function.body.push_str(code);
            }
        }
        Ok(())
    }

    /// Append to the scope of the function being compiled.
    pub fn emit(&mut self, code: &str) -> Result<(), CoreError> {
        self.append(self.current_scope(), code)
    }

    /// The active scope buffer ends in `ret` or `br`.
    pub fn scope_is_terminated(&self) -> bool {
        let body = match self.current_function() {
            Some(function) => function.body.as_str(),
            None => self.entry.as_str(),
        };
        is_terminated(body)
    }

    pub fn emit_preamble(&mut self, code: &str) {
        self.preamble.push_str(code);
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn entry_body(&self) -> &str {
        &self.entry
    }

    // -----------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------

    /// Fresh SSA register name.
    pub fn next_temp(&mut self) -> String {
        self.counters.temps += 1;
        format!("%t{}", self.counters.temps)
    }

    /// Fresh id for an if/elif/else construct.
    pub fn next_if_id(&mut self) -> usize {
        let id = self.counters.if_blocks;
        self.counters.if_blocks += 1;
        id
    }

    /// Fresh id for a runtime-initialized call site.
    pub fn next_call_site(&mut self) -> usize {
        self.counters.call_sites += 1;
        self.counters.call_sites
    }

    /// Fresh name for an interned string literal.
    pub fn next_string_global(&mut self) -> String {
        self.counters.strings += 1;
        format!("@.str.{}", self.counters.strings)
    }
}

/// `body` ends in a block terminator.
pub fn is_terminated(body: &str) -> bool {
    body.lines()
        .next_back()
        .map(str::trim_start)
        .is_some_and(|last| last.starts_with("ret ") || last.starts_with("br "))
}

//! Import expansion and conditional compilation.
//!
//! Runs before any code generation. The output is a flat line stream:
//! comments removed, imports inlined and inactive `d_if` branches dropped.
//! Each kept line carries its number in the file it came from.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::line::SourceLine;
use crate::modules::ModuleRegistry;
use crate::session::Session;

pub struct Preprocessor<'a> {
    registry: &'a ModuleRegistry,
    os: &'a str,
    working_dir: &'a Path,
    defines: HashSet<String>,
    /// Files currently being expanded, outermost first.
    stack: Vec<PathBuf>,
    /// Every file inlined so far.
    included: HashSet<PathBuf>,
}

/// State of the one `d_if` block that may be open at a time.
struct CondBlock {
    /// Some branch of this block has already matched.
    matched: bool,
    /// Lines of the current branch are kept.
    keeping: bool,
}

enum Directive<'l> {
    If(&'l str),
    Elif(&'l str),
    Else,
    EndIf,
}

impl<'a> Preprocessor<'a> {
    pub fn new(registry: &'a ModuleRegistry, os: &'a str, working_dir: &'a Path) -> Self {
        Preprocessor {
            registry,
            os,
            working_dir,
            defines: HashSet::new(),
            stack: Vec::new(),
            included: HashSet::new(),
        }
    }

    pub fn define(&mut self, symbol: impl Into<String>) {
        self.defines.insert(symbol.into());
    }

    pub fn is_defined(&self, symbol: &str) -> bool {
        self.defines.contains(symbol)
    }

    /// Expand `source` into text. Problems are recorded on `session` as
    /// soft errors.
    pub fn run(&mut self, source: &str, session: &mut Session) -> String {
        self.expand(source, session)
            .into_iter()
            .map(|line| line.text + "\n")
            .collect()
    }

    /// Like [`Preprocessor::run`], but keeps the source line numbers.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn expand(&mut self, source: &str, session: &mut Session) -> Vec<SourceLine> {
        let mut output = Vec::new();
        let mut block: Option<CondBlock> = None;
        let mut last_line = 0;

        for (index, raw) in source.lines().enumerate() {
            last_line = index + 1;
            session.set_location(last_line, raw);
            let line = strip_comment(raw).trim_end();

            if let Some(directive) = parse_directive(line) {
                self.apply_directive(directive, &mut block, session);
                continue;
            }
            if block.as_ref().is_some_and(|block| !block.keeping) {
                continue;
            }

            match line.trim_start().strip_prefix("import ") {
                Some(target) => output.extend(self.import(target.trim(), session)),
                None => output.push(SourceLine::new(last_line, line)),
            }
        }

        if block.is_some() {
            session.set_location(last_line, "");
            session.error("Unterminated d_if block: missing d_endif");
        }
        output
    }

    fn apply_directive(
        &self,
        directive: Directive<'_>,
        block: &mut Option<CondBlock>,
        session: &mut Session,
    ) {
        match directive {
            Directive::If(_) if block.is_some() => {
                session.error("Nested d_if blocks are not supported");
            }
            Directive::If(symbol) => {
                let keeping = self.is_defined(symbol);
                tracing::debug!(symbol, keeping, "d_if");
                *block = Some(CondBlock {
                    matched: keeping,
                    keeping,
                });
            }
            Directive::Elif(symbol) => match block.as_mut() {
                Some(open) => {
                    open.keeping = !open.matched && self.is_defined(symbol);
                    open.matched |= open.keeping;
                    tracing::debug!(symbol, keeping = open.keeping, "d_elif");
                }
                None => session.error("d_elif without a matching d_if"),
            },
            Directive::Else => match block.as_mut() {
                Some(open) => {
                    open.keeping = !open.matched;
                    open.matched = true;
                }
                None => session.error("d_else without a matching d_if"),
            },
            Directive::EndIf => {
                if block.take().is_none() {
                    session.error("d_endif without a matching d_if");
                }
            }
        }
    }

    fn import(&mut self, target: &str, session: &mut Session) -> Vec<SourceLine> {
        let (shown, found) = if let Some(path) = delimited(target, '"', '"') {
            let full = self.working_dir.join(path);
            let contents = fs::read_to_string(&full).ok();
            (path, contents.map(|contents| (full, contents)))
        } else if let Some(name) = delimited(target, '<', '>') {
            let module = self.registry.resolve(name, self.os);
            (name, module.map(|module| (module.path, module.contents)))
        } else {
            session.error(format!(
                "Malformed import '{target}': expected \"path\" or <name>"
            ));
            return Vec::new();
        };

        let Some((path, contents)) = found else {
            session.error(self.not_found_message(shown));
            return Vec::new();
        };

        let key = fs::canonicalize(&path).unwrap_or(path);
        if self.stack.contains(&key) {
            session.error(format!("Import cycle: '{shown}' is already being imported"));
            return Vec::new();
        }
        if !self.included.insert(key.clone()) {
            tracing::debug!(module = shown, "skipping module that is already inlined");
            return Vec::new();
        }

        tracing::debug!(module = shown, path = %key.display(), "inlining module");
        self.stack.push(key);
        let expanded = self.expand(&contents, session);
        self.stack.pop();
        expanded
    }

    fn not_found_message(&self, name: &str) -> String {
        let available = self.registry.discover(self.os);
        if available.is_empty() {
            format!("Module '{name}' not found")
        } else {
            format!(
                "Module '{name}' not found (available: {})",
                available.join(", ")
            )
        }
    }
}

fn parse_directive(line: &str) -> Option<Directive<'_>> {
    let text = line.trim();
    let (word, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let symbol = rest.trim().trim_end_matches(':').trim();
    match word.trim_end_matches(':') {
        "d_if" => Some(Directive::If(symbol)),
        "d_elif" => Some(Directive::Elif(symbol)),
        "d_else" => Some(Directive::Else),
        "d_endif" => Some(Directive::EndIf),
        _ => None,
    }
}

fn delimited(text: &str, open: char, close: char) -> Option<&str> {
    text.strip_prefix(open)?.strip_suffix(close)
}

/// Drop everything from the first `#` that is not inside a string literal.
pub fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut prev = '\0';
    for (index, ch) in line.char_indices() {
        match ch {
            '"' if prev != '\\' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
        prev = ch;
    }
    line
}

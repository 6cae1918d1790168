//! Core type system for the Vox language.
//!
//! Vox type syntax is textual (`int`, `ptr[char]`, `buff[char;16]`,
//! struct and alias names). This module parses it and lowers it to the
//! scalar and aggregate types of the emitted IR. It does not report
//! diagnostics itself: failures come back as [`TypeError`] and the caller
//! decides how to surface them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

/// Built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Int,
    Int64,
    Uint8,
    Char,
    Uchar,
    Uint16,
    Uint,
    Uint64,
    Float,
    Float64,
    Intptr,
    Bool,
    Void,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Primitive> {
        let prim = match name {
            "int" => Primitive::Int,
            "int64" => Primitive::Int64,
            "uint8" => Primitive::Uint8,
            "char" => Primitive::Char,
            "uchar" => Primitive::Uchar,
            "uint16" => Primitive::Uint16,
            "uint" => Primitive::Uint,
            "uint64" => Primitive::Uint64,
            "float" => Primitive::Float,
            "float64" => Primitive::Float64,
            "intptr" => Primitive::Intptr,
            "bool" => Primitive::Bool,
            "void" => Primitive::Void,
            _ => return None,
        };
        Some(prim)
    }

    pub fn ir(self) -> IrType {
        match self {
            Primitive::Int | Primitive::Uint => IrType::Int(32),
            Primitive::Int64 | Primitive::Uint64 => IrType::Int(64),
            Primitive::Uint8 | Primitive::Char | Primitive::Uchar => IrType::Int(8),
            Primitive::Uint16 => IrType::Int(16),
            Primitive::Float => IrType::Float,
            Primitive::Float64 => IrType::Double,
            Primitive::Intptr => IrType::Int(32).pointer_to(),
            Primitive::Bool => IrType::Int(1),
            Primitive::Void => IrType::Void,
        }
    }

    /// Character bases accept string payloads in buffer declarations.
    pub fn is_char(self) -> bool {
        matches!(self, Primitive::Char | Primitive::Uchar)
    }
}

/// A lowered IR type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    /// `iN`
    Int(u32),
    Float,
    Double,
    Void,
    Pointer(Box<IrType>),
    Array { len: usize, elem: Box<IrType> },
    /// `%Name`
    Struct(String),
}

impl IrType {
    pub fn pointer_to(self) -> IrType {
        IrType::Pointer(Box::new(self))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Pointer(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::Float | IrType::Double)
    }

    /// The literal that zero-initializes a value of this type.
    pub fn zero_literal(&self) -> &'static str {
        match self {
            IrType::Pointer(_) => "null",
            IrType::Float | IrType::Double => "0.0",
            IrType::Array { .. } | IrType::Struct(_) => "zeroinitializer",
            _ => "0",
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Int(bits) => write!(f, "i{bits}"),
            IrType::Float => f.write_str("float"),
            IrType::Double => f.write_str("double"),
            IrType::Void => f.write_str("void"),
            IrType::Pointer(inner) => write!(f, "{inner}*"),
            IrType::Array { len, elem } => write!(f, "[{len} x {elem}]"),
            IrType::Struct(name) => write!(f, "%{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("Unknown type '{0}'")]
    Unknown(String),
    #[error("Invalid buff type (nested buff) '{0}'")]
    NestedBuff(String),
    #[error("Invalid buff type (missing base type) '{0}'")]
    MissingBase(String),
    #[error("Invalid buff type (missing ;SIZE) '{0}'")]
    MissingSize(String),
    #[error("Invalid buff type (unexpected token {token}) '{text}'")]
    UnexpectedToken { token: String, text: String },
    #[error("Invalid buff type (size must be a positive integer) '{0}'")]
    BadSize(String),
    #[error("Malformed pointer type '{0}'")]
    MalformedPointer(String),
    #[error("Type alias cycle while resolving '{0}'")]
    AliasCycle(String),
}

/// Parsed form of `buff[BASE]` / `buff[BASE;SIZE]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuffType {
    pub base: String,
    pub len: Option<usize>,
}

/// `ptr[...]`, with optional space before the bracket.
pub fn is_pointer_syntax(text: &str) -> bool {
    opens_bracket(text, "ptr")
}

/// `buff[...]`, with optional space before the bracket.
pub fn is_buff_syntax(text: &str) -> bool {
    opens_bracket(text, "buff")
}

fn opens_bracket(text: &str, keyword: &str) -> bool {
    text.trim_start()
        .strip_prefix(keyword)
        .is_some_and(|rest| rest.trim_start().starts_with('['))
}

/// Tokenize a buffer type as `buff [ BASE ; SIZE ]`.
///
/// The size is optional here; declarations that need one go through
/// [`parse_sized_buff_type`].
pub fn parse_buff_type(text: &str) -> Result<BuffType, TypeError> {
    let spaced = text
        .replace('[', " [ ")
        .replace(']', " ] ")
        .replace(';', " ; ");
    let tokens: Vec<&str> = spaced.split_whitespace().collect();
    let unexpected = |token: &str| TypeError::UnexpectedToken {
        token: token.to_string(),
        text: text.to_string(),
    };

    if tokens.iter().skip(1).any(|tok| *tok == "buff") {
        return Err(TypeError::NestedBuff(text.to_string()));
    }
    match tokens.first() {
        Some(&"buff") => {}
        Some(other) => return Err(unexpected(*other)),
        None => return Err(TypeError::MissingBase(text.to_string())),
    }
    match tokens.get(1) {
        Some(&"[") => {}
        Some(other) => return Err(unexpected(*other)),
        None => return Err(TypeError::MissingBase(text.to_string())),
    }
    let base = match tokens.get(2) {
        Some(tok) if !matches!(*tok, ";" | "]" | "[") => tok.to_string(),
        _ => return Err(TypeError::MissingBase(text.to_string())),
    };

    let mut rest = tokens[3..].iter();
    let len = match rest.next() {
        Some(&"]") => None,
        Some(&";") => {
            let size = rest
                .next()
                .ok_or_else(|| TypeError::MissingSize(text.to_string()))?;
            let size = size
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| TypeError::BadSize(text.to_string()))?;
            match rest.next() {
                Some(&"]") => {}
                Some(other) => return Err(unexpected(*other)),
                None => return Err(unexpected("<end>")),
            }
            Some(size)
        }
        Some(other) => return Err(unexpected(*other)),
        None => return Err(unexpected("<end>")),
    };
    if let Some(extra) = rest.next() {
        return Err(unexpected(*extra));
    }
    Ok(BuffType { base, len })
}

/// Like [`parse_buff_type`], but the `;SIZE` part is mandatory.
pub fn parse_sized_buff_type(text: &str) -> Result<(String, usize), TypeError> {
    let buff = parse_buff_type(text)?;
    match buff.len {
        Some(len) => Ok((buff.base, len)),
        None => Err(TypeError::MissingSize(text.to_string())),
    }
}

/// A declared struct: ordered, typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    /// `(field name, Vox type)` in declaration order.
    pub fields: Vec<(String, String)>,
}

impl StructDef {
    pub fn field_type(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, ty)| ty.as_str())
    }
}

/// Aliases and structs known to the type system.
#[derive(Debug, Default)]
pub struct TypeTables {
    aliases: HashMap<String, String>,
    structs: HashMap<String, StructDef>,
}

impl TypeTables {
    pub fn define_alias(&mut self, name: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(name.into(), target.into());
    }

    /// Returns `false` if a struct with this name already exists.
    pub fn define_struct(&mut self, def: StructDef) -> bool {
        if self.structs.contains_key(&def.name) {
            return false;
        }
        self.structs.insert(def.name.clone(), def);
        true
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.get(name)
    }

    /// Substitute aliases at the outermost level until a non-alias remains.
    pub fn expand_alias(&self, text: &str) -> Result<String, TypeError> {
        let mut current = text.trim().to_string();
        let mut seen = HashSet::new();
        while let Some(target) = self.aliases.get(&current) {
            if !seen.insert(current.clone()) {
                return Err(TypeError::AliasCycle(text.trim().to_string()));
            }
            current = target.trim().to_string();
        }
        Ok(current)
    }

    /// Lower Vox type syntax to an IR type.
    pub fn lower(&self, text: &str) -> Result<IrType, TypeError> {
        let text = self.expand_alias(text)?;

        if is_pointer_syntax(&text) {
            let inner = text.trim_start()["ptr".len()..]
                .trim_start()
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .ok_or_else(|| TypeError::MalformedPointer(text.clone()))?;
            let inner_expanded = self.expand_alias(inner)?;
            if is_buff_syntax(&inner_expanded) {
                // ptr[buff[T;N]] decays to T*, never [N x T]*.
                let buff = parse_buff_type(&inner_expanded)?;
                return Ok(self.lower(&buff.base)?.pointer_to());
            }
            return Ok(self.lower(inner)?.pointer_to());
        }

        if is_buff_syntax(&text) {
            let buff = parse_buff_type(&text)?;
            let elem = self.lower(&buff.base)?;
            return Ok(match buff.len {
                Some(len) => IrType::Array {
                    len,
                    elem: Box::new(elem),
                },
                None => elem.pointer_to(),
            });
        }

        if let Some(prim) = Primitive::from_name(&text) {
            return Ok(prim.ir());
        }
        if self.structs.contains_key(&text) {
            return Ok(IrType::Struct(text));
        }
        Err(TypeError::Unknown(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(text: &str) -> String {
        TypeTables::default().lower(text).expect("lower").to_string()
    }

    #[test]
    fn lowers_primitives() {
        assert_eq!(lower("int"), "i32");
        assert_eq!(lower("int64"), "i64");
        assert_eq!(lower("char"), "i8");
        assert_eq!(lower("bool"), "i1");
        assert_eq!(lower("float64"), "double");
        assert_eq!(lower("intptr"), "i32*");
        assert_eq!(lower("void"), "void");
    }

    #[test]
    fn lowers_composites() {
        assert_eq!(lower("ptr[int]"), "i32*");
        assert_eq!(lower("ptr[ptr[char]]"), "i8**");
        assert_eq!(lower("buff[char;6]"), "[6 x i8]");
        assert_eq!(lower("buff[int]"), "i32*");
    }

    #[test]
    fn pointer_to_buffer_decays() {
        assert_eq!(lower("ptr[buff[char;16]]"), "i8*");
        assert_eq!(lower("ptr[buff[int]]"), "i32*");
    }

    #[test]
    fn resolves_aliases_and_structs() {
        let mut tables = TypeTables::default();
        tables.define_alias("Handle", "ptr[int]");
        tables.define_alias("Name", "buff[char;8]");
        assert!(tables.define_struct(StructDef {
            name: "Point".to_string(),
            fields: vec![("x".to_string(), "int".to_string())],
        }));
        assert_eq!(tables.lower("Handle").expect("alias").to_string(), "i32*");
        assert_eq!(tables.lower("ptr[Name]").expect("alias").to_string(), "i8*");
        assert_eq!(tables.lower("Point").expect("struct").to_string(), "%Point");
        assert_eq!(tables.lower("ptr[Point]").expect("struct").to_string(), "%Point*");
    }

    #[test]
    fn keyword_prefixed_names_need_a_bracket() {
        assert!(is_pointer_syntax("ptr [int]"));
        assert!(!is_pointer_syntax("ptrdiff"));
        assert!(is_buff_syntax("buff[char;4]"));
        assert!(!is_buff_syntax("buffer_t"));

        let mut tables = TypeTables::default();
        tables.define_alias("ptrdiff", "int64");
        assert!(tables.define_struct(StructDef {
            name: "buffer_t".to_string(),
            fields: Vec::new(),
        }));
        assert_eq!(tables.lower("ptrdiff").expect("alias").to_string(), "i64");
        assert_eq!(tables.lower("buffer_t").expect("struct").to_string(), "%buffer_t");
        assert_eq!(tables.lower("ptr[buffer_t]").expect("ptr").to_string(), "%buffer_t*");
    }

    #[test]
    fn rejects_duplicate_structs() {
        let mut tables = TypeTables::default();
        let def = StructDef {
            name: "P".to_string(),
            fields: Vec::new(),
        };
        assert!(tables.define_struct(def.clone()));
        assert!(!tables.define_struct(def));
    }

    #[test]
    fn detects_alias_cycles() {
        let mut tables = TypeTables::default();
        tables.define_alias("A", "B");
        tables.define_alias("B", "A");
        assert!(matches!(tables.lower("A"), Err(TypeError::AliasCycle(_))));
    }

    #[test]
    fn reports_unknown_types() {
        let err = TypeTables::default().lower("foo").unwrap_err();
        assert_eq!(err, TypeError::Unknown("foo".to_string()));
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn buff_tokenizer_accepts_spacing() {
        let buff = parse_buff_type("buff[ char ; 12 ]").expect("buff");
        assert_eq!(buff.base, "char");
        assert_eq!(buff.len, Some(12));
        assert_eq!(parse_sized_buff_type("buff[int;3]").expect("sized"), ("int".to_string(), 3));
    }

    #[test]
    fn buff_tokenizer_rejects_malformed_types() {
        assert!(matches!(
            parse_buff_type("buff[buff[char;2];2]"),
            Err(TypeError::NestedBuff(_))
        ));
        assert!(matches!(parse_buff_type("buff[;4]"), Err(TypeError::MissingBase(_))));
        assert!(matches!(
            parse_sized_buff_type("buff[char]"),
            Err(TypeError::MissingSize(_))
        ));
        assert!(matches!(parse_buff_type("buff[char;x]"), Err(TypeError::BadSize(_))));
    }
}

//! Line classification and the small text helpers the lowering passes share.
//!
//! Vox is line oriented: the first word(s) of a line decide what it is.
//! [`classify`] turns one line into a [`LineKind`] once, and every caller
//! matches on the variant instead of re-testing prefixes.

/// One line of the preprocessed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// 1-based line number in the file the line came from.
    pub number: usize,
    pub text: String,
}

impl SourceLine {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        SourceLine {
            number,
            text: text.into(),
        }
    }
}

/// Number the lines of `source`, starting at 1.
pub fn number_lines(source: &str) -> Vec<SourceLine> {
    source
        .lines()
        .enumerate()
        .map(|(index, text)| SourceLine::new(index + 1, text))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    /// A raw line inside an `ASM:` block.
    Asm(&'a str),
    AsmBegin,
    AsmEnd,
    Unsafe,
    Safe,
    /// `struct NAME:`
    StructBegin(&'a str),
    StructEnd,
    /// Text after `fn `.
    FnBegin(&'a str),
    FnEnd,
    /// Condition of `if COND:`.
    If(&'a str),
    Elif(&'a str),
    Else,
    EndIf,
    /// Value after `return`, if any.
    Return(Option<&'a str>),
    /// Whole `dyn_import ...` text.
    DynImport(&'a str),
    Using { alias: &'a str, target: &'a str },
    CtimePrint(&'a str),
    Lib { kind: &'a str, target: &'a str },
    Label(&'a str),
    Goto(&'a str),
    /// Text after `const `.
    Const(&'a str),
    /// Text after `var `.
    Var(&'a str),
    /// Text after the leading `*`.
    MemWrite(&'a str),
    Call(&'a str),
    Unknown(&'a str),
}

/// Classify one source line. Inside an `ASM:` block every line except
/// `asmend:` is assembly.
pub fn classify(line: &str, asm_mode: bool) -> LineKind<'_> {
    let text = line.trim();
    if text.is_empty() {
        return LineKind::Blank;
    }
    if asm_mode {
        return if text.starts_with("asmend:") {
            LineKind::AsmEnd
        } else {
            LineKind::Asm(text)
        };
    }

    let (word, rest) = match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    };

    match word {
        "ASM:" => LineKind::AsmBegin,
        "asmend:" => LineKind::AsmEnd,
        "unsafe" if rest.is_empty() => LineKind::Unsafe,
        "safe" if rest.is_empty() => LineKind::Safe,
        "struct" if !rest.is_empty() => LineKind::StructBegin(rest.trim_end_matches(':').trim()),
        "endstruct" => LineKind::StructEnd,
        "fn" if !rest.is_empty() => LineKind::FnBegin(rest),
        "endfn" => LineKind::FnEnd,
        "if" if !rest.is_empty() => LineKind::If(condition_text(rest)),
        "elif" if !rest.is_empty() => LineKind::Elif(condition_text(rest)),
        "else:" | "else" => LineKind::Else,
        "endif" | "endif:" => LineKind::EndIf,
        "return" => LineKind::Return((!rest.is_empty()).then_some(rest)),
        "dyn_import" => LineKind::DynImport(text),
        "using" => match rest.split_once('=') {
            Some((alias, target)) => LineKind::Using {
                alias: alias.trim(),
                target: target.trim(),
            },
            None => LineKind::Unknown(text),
        },
        "ctime_print" => LineKind::CtimePrint(rest),
        "lib" => match rest.split_once(char::is_whitespace) {
            Some((kind, target)) => LineKind::Lib {
                kind,
                target: target.trim(),
            },
            None => LineKind::Unknown(text),
        },
        "lb" if !rest.is_empty() => LineKind::Label(rest),
        "goto" if !rest.is_empty() => LineKind::Goto(rest),
        "const" if !rest.is_empty() => LineKind::Const(rest),
        "var" if !rest.is_empty() => LineKind::Var(rest),
        _ if text.starts_with('*') => LineKind::MemWrite(&text[1..]),
        _ if split_call(text).is_some() => LineKind::Call(text),
        _ => LineKind::Unknown(text),
    }
}

// `if a == b:` -> `a == b`
fn condition_text(rest: &str) -> &str {
    rest.strip_suffix(':').unwrap_or(rest).trim()
}

/// `true` for `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split `NAME(ARGS)` into `(NAME, ARGS)` when the parenthesis opened
/// after the name is the one closing the text.
pub fn split_call(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    let open = text.find('(')?;
    let name = text[..open].trim();
    if !is_identifier(name) || !text.ends_with(')') {
        return None;
    }
    let close = matching_paren(text, open)?;
    (close == text.len() - 1).then(|| (name, &text[open + 1..close]))
}

/// Byte index of the `)` matching the `(` at `open`.
pub fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut prev = '\0';
    for (index, ch) in text.char_indices().skip_while(|(index, _)| *index < open) {
        match ch {
            '"' if prev != '\\' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
        prev = ch;
    }
    None
}

/// Remove parentheses that wrap the whole text, repeatedly.
pub fn strip_outer_parens(text: &str) -> &str {
    let mut text = text.trim();
    while text.starts_with('(') && matching_paren(text, 0) == Some(text.len() - 1) {
        text = text[1..text.len() - 1].trim();
    }
    text
}

/// Byte offsets of `needle` outside brackets and string literals.
pub fn find_top_level(text: &str, needle: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        if byte == b'"' && (index == 0 || bytes[index - 1] != b'\\') {
            in_string = !in_string;
        } else if !in_string {
            match byte {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                _ if depth == 0 && bytes[index..].starts_with(needle.as_bytes()) => {
                    found.push(index);
                    index += needle.len();
                    continue;
                }
                _ => {}
            }
        }
        index += 1;
    }
    found
}

/// Split on `separator` outside brackets and string literals. Pieces are
/// trimmed; an all-blank input yields no pieces.
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for index in find_top_level(text, separator.encode_utf8(&mut [0; 4])) {
        pieces.push(text[start..index].trim());
        start = index + separator.len_utf8();
    }
    pieces.push(text[start..].trim());
    pieces
}

/// Contents of a `"..."` literal, without the quotes.
pub fn string_literal(text: &str) -> Option<&str> {
    let text = text.trim();
    (text.len() >= 2 && text.starts_with('"') && text.ends_with('"')).then(|| &text[1..text.len() - 1])
}

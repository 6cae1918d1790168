//! `struct NAME:` ... `endstruct` definitions.

use crate::line::{SourceLine, is_identifier};
use crate::session::Session;
use crate::types::StructDef;

/// Register a struct and emit its `%NAME = type { ... }` definition.
///
/// `fields` are the lines between the header and `endstruct`, each
/// `FIELD: TYPE` with an optional trailing comma.
pub fn define_struct(session: &mut Session, name: &str, fields: &[SourceLine]) {
    if !is_identifier(name) {
        session.error(format!("Invalid struct name '{name}'"));
        return;
    }
    if session.types.struct_def(name).is_some() {
        session.error(format!("Struct '{name}' is already defined"));
        return;
    }

    let mut def = StructDef {
        name: name.to_string(),
        fields: Vec::with_capacity(fields.len()),
    };
    let mut lowered = Vec::with_capacity(fields.len());
    for line in fields {
        session.set_location(line.number, &line.text);
        let text = line.text.trim().trim_end_matches(',').trim();
        if text.is_empty() {
            continue;
        }
        let Some((field, ty)) = text.split_once(':') else {
            session.error(format!("Struct field needs a type: '{text}'"));
            return;
        };
        let (field, ty) = (field.trim(), ty.trim());
        if def.field_type(field).is_some() {
            session.error(format!("Field '{field}' is declared twice in struct '{name}'"));
            return;
        }
        let Some(ir) = session.lower_type(ty) else {
            return;
        };
        lowered.push(ir.to_string());
        def.fields.push((field.to_string(), ty.to_string()));
    }

    session.emit_preamble(&format!("%{name} = type {{ {} }}\n", lowered.join(", ")));
    session.types.define_struct(def);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(texts: &[&str]) -> Vec<SourceLine> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| SourceLine::new(index + 2, *text))
            .collect()
    }

    #[test]
    fn emits_type_and_registers_fields() {
        let mut session = Session::new("inteldialect");
        define_struct(&mut session, "Point", &lines(&["x: int,", "y: float64"]));
        assert_eq!(session.preamble(), "%Point = type { i32, double }\n");
        let def = session.types.struct_def("Point").expect("struct");
        assert_eq!(def.field_type("y"), Some("float64"));
    }

    #[test]
    fn structs_can_nest_previous_structs() {
        let mut session = Session::new("inteldialect");
        define_struct(&mut session, "Point", &lines(&["x: int", "y: int"]));
        define_struct(&mut session, "Line", &lines(&["a: Point", "b: ptr[Point]"]));
        assert!(session.preamble().ends_with("%Line = type { %Point, %Point* }\n"));
    }

    #[test]
    fn rejects_bad_definitions() {
        let mut session = Session::new("inteldialect");
        define_struct(&mut session, "P", &lines(&["x int"]));
        define_struct(&mut session, "Q", &lines(&["x: int", "x: int"]));
        define_struct(&mut session, "R", &lines(&["x: nope"]));
        assert_eq!(session.diagnostics().len(), 3);
        assert_eq!(session.preamble(), "");
        assert!(session.types.struct_def("Q").is_none());
    }

    #[test]
    fn rejects_redefinition() {
        let mut session = Session::new("inteldialect");
        define_struct(&mut session, "P", &lines(&["x: int"]));
        define_struct(&mut session, "P", &lines(&["y: int"]));
        assert!(session.diagnostics()[0].message.contains("already defined"));
    }
}

// Tests for Rust generation and declaration printing

#[cfg(test)]
mod rust_emitter_tests {
    use pretty_assertions::assert_eq;

    use crate::ast::source_gen::{rust_ident, rust_type, snake_case, EmitError};
    use crate::ast::{ClassDecl, EmitConfig, FieldDecl, Module, RustEmitter, TypeRef, FRAMED_MARKER, RECORD_FIELD};
    use crate::parser::parse_module;
    use crate::transform::ClassTransformer;

    fn generate(source: &str) -> String {
        let module = parse_module(source).unwrap();
        let outcome = ClassTransformer::framing().transform_module(module);
        assert!(outcome.summary.success(), "{:?}", outcome.summary.errors);
        RustEmitter::default().emit_module(&outcome.module, "test.frames").unwrap()
    }

    #[test]
    fn test_counter_record_type() {
        let code = generate("@Framed class Counter { var count: Int = 0 }");
        let start = code.find("#[derive(Debug, Clone, Default)]").unwrap();
        let expected = "#[derive(Debug, Clone, Default)]
pub struct CounterRecord {
    pub count: i64,
}

impl Record for CounterRecord {
    fn create() -> Self {
        CounterRecord::default()
    }

    fn assign(&mut self, other: &Self) {
        self.count = other.count;
    }
}
";
        assert_eq!(&code[start..], expected);
    }

    #[test]
    fn test_counter_host_goes_through_runtime() {
        let code = generate("@Framed class Counter { var count: Int = 0 }");
        assert!(code.starts_with("// Generated by framec from test.frames. Do not edit.\n"));
        assert!(code.contains("use frames_core::runtime::{notify_created, readable, writable"));
        assert!(code.contains("    frame_record: RecordChain<CounterRecord>,\n"));
        assert!(code.contains(
            "            frame_record: RecordChain::new_in(manager, \"Counter\", CounterRecord::default()),\n"
        ));
        assert!(code.contains("        this.frame_record.first_record().write().count = 0;\n        notify_created(&this);\n"));
        assert!(code.contains(
            "    pub fn count(&self) -> i64 {\n        readable(&self.frame_record, self).read().count\n    }\n"
        ));
        assert!(code.contains(
            "    pub fn set_count(&self, value: i64) {\n        writable(&self.frame_record, self).write().count = value;\n    }\n"
        ));
        assert!(code.contains("impl Framed for Counter {\n    type Record = CounterRecord;\n"));
        assert!(code.contains("        &self.frame_record\n"));
        assert!(code.contains("        self.frame_record.prepend(record)\n"));
        assert!(code.contains("impl Default for Counter"));
    }

    #[test]
    fn test_non_copy_fields_are_cloned() {
        let code = generate(r#"@Framed class Label { var text: String = "hi" }"#);
        assert!(code.contains("readable(&self.frame_record, self).read().text.clone()"));
        assert!(code.contains("this.frame_record.first_record().write().text = String::from(\"hi\");"));
        assert!(code.contains("self.text = other.text.clone();"));
    }

    #[test]
    fn test_computed_property_is_plain_getter() {
        let code = generate("@Framed class Temp { var celsius: Int = 0 val twice: Int get() = 2 }");
        assert!(code.contains("    pub fn twice(&self) -> i64 {\n        2\n    }\n"));
        assert!(!code.contains("set_twice"));
        assert!(!code.contains("pub twice"));
    }

    #[test]
    fn test_plain_class_keeps_fields() {
        let code = generate("class Point { var x: Int = 1 }");
        assert!(!code.contains("use frames_core::runtime"));
        assert!(code.contains("pub struct Point {\n    x: i64,\n}\n"));
        assert!(code.contains("            x: 1,\n"));
        assert!(code.contains("    pub fn set_x(&mut self, value: i64) {\n        self.x = value;\n    }\n"));
    }

    #[test]
    fn test_runtime_path_is_configurable() {
        let module = ClassTransformer::framing()
            .transform_module(parse_module("@Framed class Flag { var on: Boolean = false }").unwrap())
            .module;
        let emitter = RustEmitter::new(EmitConfig {
            runtime_path: "crate::frames".into(),
            derive_debug: false,
            ..EmitConfig::default()
        });
        let code = emitter.emit_module(&module, "flag.frames").unwrap();
        assert!(code.contains("use crate::frames::{"));
        assert!(code.contains("#[derive(Clone, Default)]\npub struct FlagRecord"));
        assert!(!code.contains("impl std::fmt::Debug for Flag"));
    }

    #[test]
    fn test_missing_record_type_is_an_error() {
        let mut host = ClassDecl::new("Orphan");
        host.supertypes.push(TypeRef::named(FRAMED_MARKER));
        host.fields.push(FieldDecl {
            name: RECORD_FIELD.into(),
            ty: TypeRef::named("GhostRecord"),
            hidden: true,
        });
        let err = RustEmitter::default()
            .emit_module(&Module::new(vec![host]), "orphan.json")
            .unwrap_err();
        assert_eq!(
            err,
            EmitError::MissingRecordType {
                host: "Orphan".into(),
                record: "GhostRecord".into(),
            }
        );
    }

    #[test]
    fn test_identifier_mapping() {
        assert_eq!(snake_case("firstFrameRecord"), "first_frame_record");
        assert_eq!(snake_case("count"), "count");
        assert_eq!(rust_ident("type"), "r#type");
        assert_eq!(rust_ident("self"), "self_");
        assert_eq!(
            rust_type(&TypeRef::generic("List", vec![TypeRef::named("String")]).nullable()),
            "Option<Vec<String>>"
        );
    }
}

#[cfg(test)]
mod declaration_source_tests {
    use crate::ast::ToSource;
    use crate::parser::parse_module;
    use crate::transform::framing_rules::readable_field;
    use crate::transform::ClassTransformer;
    use crate::ast::TypeRef;

    #[test]
    fn test_readable_expression_source() {
        let expr = readable_field(&TypeRef::named("CounterRecord"), "count");
        assert_eq!(expr.to_source(), "(_readable(this.$record, this) as CounterRecord).count");
    }

    #[test]
    fn test_transformed_class_source() {
        let module = parse_module("@Framed class Counter { var count: Int = 0 }").unwrap();
        let outcome = ClassTransformer::framing().transform_module(module);
        let source = outcome.module.class("Counter").unwrap().to_source();

        assert!(source.starts_with("@Framed\nclass Counter : Framed {\n"));
        assert!(source.contains("  hidden field $record: CounterRecord\n"));
        assert!(source.contains("this.$record = _newChain(CounterRecord())"));
        assert!(source.contains("(_first(this.$record) as CounterRecord).count = 0"));
        assert!(source.contains("_notifyCreated(this)"));
        assert!(source.contains("(_writable(this.$record, this) as CounterRecord).count = value"));
    }
}

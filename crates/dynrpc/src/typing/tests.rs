// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry tests.

use super::*;
use std::fs;
use tempfile::TempDir;

const GEOMETRY: &str = r#"
meta:
  version: 1
  namespace: com.geo
  description: Geometry
struct Point:
  description: A point
  members:
    x: { type: int64 }
    y: { type: int64, default: 0 }
struct Line:
  members:
    from: { type: Point }
    to: { type: com.geo.Point }
struct Pair<K, V>:
  members:
    key: { type: K }
    value: { type: V }
struct Labeled:
  inherits: Point
  members:
    label: { type: string }
type Path:
  type: array<Point>
enum Unit:
  members:
    MM: {}
    INCH: { description: Imperial }
interface Plotter:
  description: Draws things
  members:
    method plot:
      args:
        - { name: line, type: Line }
        - { name: pen, type: uint64, description: Pen number }
      return: { type: bool }
    method reset: {}
    property color: { type: string }
    property serial: { type: string, read-only: true }
    event plotted: { type: Line }
    event idle: {}
"#;

fn geometry() -> Typing {
    let typing = Typing::new();
    typing.load_str(GEOMETRY, "geometry.yaml").expect("load geometry");
    typing
}

fn write(dir: &TempDir, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).expect("write schema");
    path
}

// -----------------------------------------------------------------------------
// Builtins and lookup
// -----------------------------------------------------------------------------

#[test]
fn test_builtins_present() {
    let typing = Typing::new();
    assert_eq!(typing.len(), BUILTIN_TYPES.len());
    assert!(typing.interfaces().next().is_none());

    for (name, vars) in BUILTIN_TYPES {
        let decl = typing.resolve(name).expect("builtin");
        assert!(decl.is_builtin());
        assert_eq!(decl.vars().len(), vars.len());
    }

    assert_eq!(typing.instantiate("array<int64>").expect("array").canonical(), "array<int64>");
    assert_eq!(typing.instantiate("dictionary").expect("dict").canonical(), "dictionary<any>");
    assert!(matches!(typing.instantiate("Nope"), Err(TypingError::NotFound(n)) if n == "Nope"));
    assert!(matches!(typing.instantiate("int64<string>"), Err(TypingError::Malformed { .. })));
}

#[test]
fn test_builtin_cannot_be_redeclared() {
    let typing = Typing::new();
    let err = typing
        .load_str("struct string:\n  members:\n    a: { type: int64 }\n", "bad.yaml")
        .expect_err("builtin redeclared");
    assert!(matches!(
        err,
        TypingError::Conflict { existing: TypeClass::Builtin, new: TypeClass::Struct, .. }
    ));
}

#[test]
fn test_namespace_resolution() {
    let typing = geometry();
    assert!(typing.contains("com.geo.Point"));
    assert!(!typing.contains("Point"));

    let line = typing.instantiate("com.geo.Line").expect("line");
    for member in ["from", "to"] {
        let (decl, owner) = line.lookup_member(member).expect("lookup").expect("member");
        assert_eq!(owner.member_type(&decl).expect("type").canonical(), "com.geo.Point");
    }
    assert!(line.lookup_member("missing").expect("lookup").is_none());

    let point = typing.resolve("com.geo.Point").expect("point");
    assert_eq!(point.description(), Some("A point"));
    assert_eq!(point.namespace(), Some("com.geo"));
    assert_eq!(point.origin(), Some("geometry.yaml"));
    assert_eq!(point.member("y").and_then(|m| m.default()), Some(&crate::Value::from(0i64)));
    assert!(point.typing().is_some());
}

#[test]
fn test_generic_instantiation() {
    let typing = geometry();
    let pair = typing.instantiate("com.geo.Pair<string, array<com.geo.Point>>").expect("pair");
    assert_eq!(pair.canonical(), "com.geo.Pair<string,array<com.geo.Point>>");
    assert_eq!(pair.specializations().len(), 2);

    let (key, owner) = pair.lookup_member("key").expect("lookup").expect("key");
    assert_eq!(owner.member_type(&key).expect("type").canonical(), "string");
    let (value, owner) = pair.lookup_member("value").expect("lookup").expect("value");
    assert_eq!(owner.member_type(&value).expect("type").canonical(), "array<com.geo.Point>");

    let partial = typing.instantiate("com.geo.Pair<int64>").expect("partial");
    assert_eq!(partial.canonical(), "com.geo.Pair<int64,any>");
    assert!(matches!(
        typing.instantiate("com.geo.Pair<int64,int64,int64>"),
        Err(TypingError::Malformed { .. })
    ));
}

#[test]
fn test_inheritance_and_typedefs() {
    let typing = geometry();
    let point = typing.instantiate("com.geo.Point").expect("point");
    let labeled = typing.instantiate("com.geo.Labeled").expect("labeled");

    let names: Vec<String> = labeled
        .all_members()
        .expect("members")
        .into_iter()
        .map(|(m, _)| m.name().to_string())
        .collect();
    assert_eq!(names, ["x", "y", "label"]);
    assert!(point.is_assignable_from(&labeled));
    assert!(!labeled.is_assignable_from(&point));

    let path = typing.instantiate("com.geo.Path").expect("path");
    assert_eq!(path.class(), TypeClass::Typedef);
    assert_eq!(path.unwind().expect("unwind").canonical(), "array<com.geo.Point>");
}

#[test]
fn test_interface_members() {
    let typing = geometry();
    let plotter = typing.resolve("com.geo.Plotter").expect("plotter");
    assert_eq!(plotter.class(), TypeClass::Interface);
    assert_eq!(plotter.description(), Some("Draws things"));

    let MemberRole::Method(plot) = plotter.member("plot").expect("plot").role() else {
        panic!("plot should be a method");
    };
    assert_eq!(plot.args.len(), 2);
    assert_eq!(plot.args[0].name, "line");
    assert_eq!(plot.args[0].ty.to_string(), "Line");
    assert_eq!(plot.args[1].description.as_deref(), Some("Pen number"));
    assert_eq!(plot.result.as_ref().map(ToString::to_string).as_deref(), Some("bool"));

    let MemberRole::Method(reset) = plotter.member("reset").expect("reset").role() else {
        panic!("reset should be a method");
    };
    assert!(reset.args.is_empty() && reset.result.is_none());

    assert!(matches!(
        plotter.member("color").expect("color").role(),
        MemberRole::Property { read_only: false, .. }
    ));
    assert!(matches!(
        plotter.member("serial").expect("serial").role(),
        MemberRole::Property { read_only: true, .. }
    ));
    assert_eq!(
        plotter.member("idle").and_then(|m| m.type_expr()).map(ToString::to_string).as_deref(),
        Some("any")
    );

    let interfaces: Vec<String> = typing.interfaces().map(|d| d.name().to_string()).collect();
    assert_eq!(interfaces, ["com.geo.Plotter"]);
    assert!(typing.types().all(|d| d.class() != TypeClass::Interface));
}

#[test]
fn test_malformed_declarations() {
    let typing = Typing::new();
    let cases = [
        "blob Thing: {}\n",
        "struct Thing:\n  members:\n    a: {}\n",
        "enum Thing:\n  inherits: Other\n",
        "type Thing: {}\n",
        "interface Thing:\n  members:\n    plot: {}\n",
        "interface Thing:\n  members:\n    signal plot: {}\n",
        "struct Thing<T, T>: {}\n",
        "struct Thing:\n  members:\n    a: { type: \"array<\" }\n",
        "struct Thing:\n  members:\n    a: { type: int64, constraints: { positive: {} } }\n",
        "struct Thing:\n  members:\n    a: { type: int64, constraints: { range: { min: low } } }\n",
        "struct Thing:\n  members:\n    a: { type: string, constraints: { min-length: -1 } }\n",
        "struct Thing:\n  members:\n    a: { type: string, constraints: { regex: { pattern: \"(\" } } }\n",
        "enum Thing:\n  members:\n    A: { constraints: { min-length: 1 } }\n",
    ];
    for text in cases {
        let err = typing.load_str(text, "bad.yaml").expect_err(text);
        assert!(matches!(err, TypingError::Malformed { .. }), "{text}: {err}");
    }
    assert!(matches!(
        typing.load_str("struct: [", "broken.yaml"),
        Err(TypingError::Parse { .. })
    ));
    assert_eq!(typing.len(), BUILTIN_TYPES.len());
}

#[test]
fn test_member_constraints_parsed() {
    let typing = Typing::new();
    typing
        .load_str(
            r#"
struct Account:
  members:
    age: { type: int64, constraints: { range: { min: 0, max: 150 } } }
    floor: { type: int64, constraints: { range: { min: -3 } } }
    login:
      type: string
      constraints:
        min-length: 3
        regex: { pattern: "^[a-z]+$" }
"#,
            "account.yaml",
        )
        .expect("load");
    let account = typing.resolve("Account").expect("declaration");

    let age = account.member("age").expect("age");
    assert_eq!(age.constraints(), [Constraint::Range { min: Some(0), max: Some(150) }]);
    let floor = account.member("floor").expect("floor");
    assert_eq!(floor.constraints(), [Constraint::Range { min: Some(-3), max: None }]);

    let login = account.member("login").expect("login");
    let names: Vec<&str> = login.constraints().iter().map(Constraint::name).collect();
    assert_eq!(names, ["min-length", "regex"]);

    // Rendering keeps the constraints.
    let unit = typing.units().into_iter().next().expect("unit");
    let copy = Typing::new();
    copy.load_str(&unit.document.to_yaml_string().expect("render"), "copy.yaml")
        .expect("reload");
    let reloaded = copy.resolve("Account").expect("declaration");
    assert_eq!(reloaded.member("login").expect("login").constraints(), login.constraints());
}

// -----------------------------------------------------------------------------
// Merging
// -----------------------------------------------------------------------------

#[test]
fn test_unit_is_atomic() {
    let typing = Typing::new();
    let text = "struct Good:\n  members:\n    a: { type: int64 }\nstruct Bad:\n  members:\n    b: {}\n";
    assert!(typing.load_str(text, "mixed.yaml").is_err());
    assert!(!typing.contains("Good"));
    assert!(typing.units().is_empty());
}

#[test]
fn test_redefinition() {
    let typing = Typing::new();
    typing
        .load_str("struct A:\n  members:\n    a: { type: int64 }\nstruct B: {}\n", "one.yaml")
        .expect("first");

    // Different kind: rejected, registry untouched.
    let err = typing.load_str("enum A:\n  members:\n    X: {}\n", "two.yaml").expect_err("conflict");
    assert!(matches!(
        err,
        TypingError::Conflict { ref name, existing: TypeClass::Struct, new: TypeClass::Enum } if name == "A"
    ));
    assert!(typing.resolve("A").expect("A").member("a").is_some());

    // Same kind: replaced in place.
    typing
        .load_str("struct A:\n  members:\n    b: { type: string }\n", "three.yaml")
        .expect("replace");
    let a = typing.resolve("A").expect("A");
    assert!(a.member("a").is_none());
    assert!(a.member("b").is_some());
    assert_eq!(a.origin(), Some("three.yaml"));

    let order: Vec<String> = typing
        .types()
        .filter(|d| !d.is_builtin())
        .map(|d| d.name().to_string())
        .collect();
    assert_eq!(order, ["A", "B"]);

    let origins: Vec<String> = typing.units().into_iter().map(|u| u.origin).collect();
    assert_eq!(origins, ["one.yaml", "three.yaml"]);
}

#[test]
fn test_reload_same_origin_replaces_unit() {
    let typing = Typing::new();
    typing.load_str("struct A: {}\n", "a.yaml").expect("load");
    typing.load_str("struct A: {}\nstruct B: {}\n", "a.yaml").expect("reload");
    assert_eq!(typing.units().len(), 1);
    assert!(typing.contains("B"));
}

#[test]
fn test_declarations_iterate_lazily() {
    let typing = Typing::new();
    let mut walk = typing.types().skip(BUILTIN_TYPES.len());
    typing.load_str("struct Late: {}\n", "late.yaml").expect("load");
    assert_eq!(walk.next().map(|d| d.name().to_string()).as_deref(), Some("Late"));
    assert!(walk.next().is_none());
}

#[test]
fn test_check_reports_unresolved() {
    let typing = Typing::new();
    typing
        .load_str("struct A:\n  members:\n    b: { type: array<Missing> }\n", "a.yaml")
        .expect("unresolved refs still load");
    let errors = typing.check();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        TypingError::Unresolved { declaration, reference } if declaration == "A" && reference == "Missing"
    ));

    typing.load_str("struct Missing: {}\n", "missing.yaml").expect("load");
    assert!(typing.check().is_empty());
}

// -----------------------------------------------------------------------------
// Files
// -----------------------------------------------------------------------------

#[test]
fn test_load_batch_reports_per_file() {
    let dir = TempDir::new().expect("tempdir");
    let forward = write(&dir, "a.yaml", "struct A:\n  members:\n    b: { type: B }\n");
    let target = write(&dir, "b.yaml", "struct B:\n  members:\n    n: { type: int64 }\n");
    let broken = write(&dir, "c.yaml", "struct C: [\n");
    let dangling = write(&dir, "d.yaml", "struct D:\n  members:\n    z: { type: Zed }\n");
    let absent = dir.path().join("e.yaml");

    let typing = Typing::new();
    let report = typing.load_batch([&forward, &target, &broken, &dangling, &absent]);

    assert!(!report.is_ok());
    assert_eq!(report.loaded, vec![forward.clone(), target.clone(), dangling.clone()]);
    assert_eq!(report.failures_for(&forward).count(), 0);
    assert!(matches!(
        report.failures_for(&broken).next(),
        Some(TypingError::Parse { .. })
    ));
    assert!(matches!(
        report.failures_for(&dangling).next(),
        Some(TypingError::Unresolved { reference, .. }) if reference == "Zed"
    ));
    assert!(matches!(report.failures_for(&absent).next(), Some(TypingError::Io { .. })));
    assert!(typing.contains("A") && typing.contains("D"));
    assert!(!typing.contains("C"));
}

#[test]
fn test_load_dir() {
    let dir = TempDir::new().expect("tempdir");
    write(&dir, "2-user.yml", "struct User:\n  members:\n    home: { type: Address }\n");
    write(&dir, "1-address.yaml", "struct Address: {}\n");
    write(&dir, "notes.txt", "not a schema");

    let typing = Typing::new();
    let report = typing.load_dir(dir.path()).expect("load dir");
    assert!(report.is_ok(), "{:?}", report.failures);
    assert_eq!(report.loaded.len(), 2);
    assert!(report.loaded[0].ends_with("1-address.yaml"));

    let missing = dir.path().join("nope");
    assert!(matches!(typing.load_dir(&missing), Err(TypingError::Io { .. })));
}

#[test]
fn test_document_round_trip_keeps_order() {
    let typing = geometry();
    let unit = typing.units().into_iter().next().expect("unit");
    let text = unit.document.to_yaml_string().expect("render");

    let copy = Typing::new();
    copy.load_str(&text, "copy.yaml").expect("reload");
    let original: Vec<String> = typing.types().map(|d| d.name().to_string()).collect();
    let reloaded: Vec<String> = copy.types().map(|d| d.name().to_string()).collect();
    assert_eq!(original, reloaded);
}

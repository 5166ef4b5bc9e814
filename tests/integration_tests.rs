//! End-to-end integration tests

use std::io::Write;
use std::path::PathBuf;

use minicc::{
    to_sexp_string, AttrValue, CompileError, ConstValue, DeclTree, FileResult, ParseError,
    Pipeline, PipelineError, Pos, PrimitiveKind, SexpPrinter,
};
use tempfile::{NamedTempFile, TempDir};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Helper to run the whole pipeline on a fixture
fn run_bios(define_debug: bool) -> FileResult {
    let mut builder = Pipeline::builder().with_include(fixture("include"));
    if define_debug {
        builder = builder.with_define("BIOS_DEBUG", None::<String>);
    }
    let mut pipeline = builder.build();
    pipeline.run_file(fixture("bios.c")).unwrap()
}

/// Helper to run the pipeline on a source string
fn run_source(source: &str) -> FileResult {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file.flush().unwrap();
    Pipeline::builder().build().run_file(file.path()).unwrap()
}

fn child_names(tree: &DeclTree, path: &str) -> Vec<String> {
    let id = tree.find(path).unwrap_or_else(|| panic!("node not found: {}", path));
    tree.children(id).iter().map(|&c| tree.name(c).to_string()).collect()
}

fn value(tree: &DeclTree, path: &str) -> Option<ConstValue> {
    let id = tree.find(path).unwrap_or_else(|| panic!("node not found: {}", path));
    match tree.attribute(id, "Value") {
        Some(AttrValue::Const(v)) => Some(*v),
        _ => None,
    }
}

#[test]
fn test_bios_tree_shape() {
    let result = run_bios(false);
    assert!(result.outcome.success(), "{:?}", result.outcome.diagnostics);
    let tree = &result.outcome.tree;

    assert_eq!(
        child_names(tree, "Unit/Body"),
        vec![
            "Variable0",
            "Variable1",
            "Variable2",
            "Variable3",
            "Variable4",
            "Variable5",
            "bios_init",
            "read_sector",
            "Assembly8",
        ]
    );

    // ヘッダは 2 回インクルードしてもガードで 1 回分
    assert_eq!(value(tree, "Unit/Body/Variable0"), Some(ConstValue::Int(512)));
    assert_eq!(value(tree, "Unit/Body/Variable1"), Some(ConstValue::Bool(false)));
    assert_eq!(value(tree, "Unit/Body/Variable2"), Some(ConstValue::Int(0)));
    assert_eq!(value(tree, "Unit/Body/Variable3"), Some(ConstValue::Char(0)));
    assert_eq!(value(tree, "Unit/Body/Variable4"), Some(ConstValue::Float(33.0)));
    assert_eq!(value(tree, "Unit/Body/Variable5"), None);

    let vram = tree.find("Unit/Body/Variable5").unwrap();
    assert_eq!(tree.attribute(vram, "Type"), Some(&AttrValue::Kind(PrimitiveKind::Short)));
    assert_eq!(tree.attribute(vram, "Ptr"), Some(&AttrValue::Flag(true)));
}

#[test]
fn test_bios_functions() {
    let result = run_bios(false);
    let tree = &result.outcome.tree;

    // プロトタイプは定義で完成し、関数表には 1 件だけ残る
    assert_eq!(result.outcome.functions.len(), 2);
    let init = result.outcome.function("bios_init").unwrap();
    assert_eq!(init.ret, None);
    assert!(init.body.is_some());

    assert!(child_names(tree, "Unit/Body/bios_init/Arguments").is_empty());
    assert_eq!(value(tree, "Unit/Body/bios_init/Body/Variable0"), Some(ConstValue::Int(0)));
    assert_eq!(value(tree, "Unit/Body/bios_init/Body/Variable1"), Some(ConstValue::Char(b'R')));

    assert_eq!(
        child_names(tree, "Unit/Body/read_sector/Arguments"),
        vec!["Argument0", "Argument1"]
    );
    let buffer = tree.find("Unit/Body/read_sector/Arguments/Argument1").unwrap();
    assert_eq!(tree.attribute(buffer, "Name"), Some(&AttrValue::Text("buffer".to_string())));
    assert_eq!(tree.attribute(buffer, "Ptr"), Some(&AttrValue::Flag(true)));
    assert_eq!(value(tree, "Unit/Body/read_sector/Body/Variable0"), Some(ConstValue::Int(3)));
}

#[test]
fn test_bios_assembly() {
    let result = run_bios(false);
    let tree = &result.outcome.tree;
    assert_eq!(child_names(tree, "Unit/Body/Assembly8"), vec!["SourceBlock0", "SourceBlock1"]);
    let first = tree.find("Unit/Body/Assembly8/SourceBlock0").unwrap();
    assert_eq!(
        tree.attribute(first, "Source"),
        Some(&AttrValue::Text("mov ax, 0x07C0".to_string()))
    );
}

#[test]
fn test_bios_with_define() {
    let result = run_bios(true);
    assert!(result.outcome.success());
    assert_eq!(
        value(&result.outcome.tree, "Unit/Body/Variable2"),
        Some(ConstValue::Int(3))
    );
}

#[test]
fn test_bios_origin_points_into_header() {
    let result = run_bios(false);
    let first = &result.tokens[0];
    assert_eq!(first.lexeme, "int");
    let origin = result.origin(first.pos).unwrap();
    assert!(origin.ends_with("bios.h:9"), "{}", origin);
}

#[test]
fn test_end_to_end_sexp() {
    let result = run_source("int foo(int x) { int y = 5; }");
    assert!(result.outcome.success());
    assert_eq!(
        to_sexp_string(&result.outcome.tree),
        "(Unit (Body (foo (Arguments (Argument0 (Name \"x\") (Ptr false) (Type int))) \
         (Body (Variable0 (Ptr false) (Type int) (Value 5))))))"
    );
}

#[test]
fn test_pretty_sexp_output() {
    let result = run_source("short s = 2;");
    let mut printer = SexpPrinter::new(Vec::new());
    printer.set_pretty(true);
    printer.print_tree(&result.outcome.tree).unwrap();
    let text = String::from_utf8(printer.into_inner()).unwrap();
    assert!(text.starts_with("(Unit\n  (Body\n"), "{}", text);
    assert!(text.contains("(Value 2)"));
}

#[test]
fn test_json_output() {
    let result = run_source("int foo(int x) { int y = 5; }");
    let json = result.outcome.tree.to_json_value().unwrap();
    assert_eq!(json["name"], "Unit");
    let foo = &json["children"][0]["children"][0];
    assert_eq!(foo["name"], "foo");
    let arg = &foo["children"][0]["children"][0];
    assert_eq!(arg["attributes"]["Name"], "x");
    assert_eq!(arg["attributes"]["Type"], "int");
    let var = &foo["children"][1]["children"][0];
    assert_eq!(var["attributes"]["Value"], 5);
    assert_eq!(var["attributes"]["Ptr"], false);
}

#[test]
fn test_write_tree_json() {
    let dir = TempDir::new().unwrap();
    let result = run_bios(false);
    let path = result.write_tree_json(dir.path(), &fixture("bios.c")).unwrap();
    assert_eq!(path, dir.path().join("bios.tree.json"));

    let text = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json, result.outcome.tree.to_json_value().unwrap());
}

#[test]
fn test_broken_file_diagnostics() {
    let mut pipeline = Pipeline::builder().build();
    let result = pipeline.run_file(fixture("broken.c")).unwrap();
    assert!(!result.outcome.success());

    let found: Vec<(Pos, ParseError)> = result
        .outcome
        .diagnostics
        .iter()
        .map(|e| match e {
            CompileError::Parse { pos, kind } => (*pos, kind.clone()),
            other => panic!("unexpected error: {:?}", other),
        })
        .collect();
    assert_eq!(
        found,
        vec![
            (Pos::new(2, 5), ParseError::DuplicateVariable("ok".to_string())),
            (Pos::new(3, 6), ParseError::IncompleteVariable("nothing".to_string())),
        ]
    );

    // エラーの後の宣言も木に入る
    let tree = &result.outcome.tree;
    assert_eq!(child_names(tree, "Unit/Body"), vec!["Variable0", "Variable1"]);
    assert_eq!(value(tree, "Unit/Body/Variable1"), Some(ConstValue::Int(4)));
}

#[test]
fn test_pipeline_continues_after_failed_file() {
    let dir = TempDir::new().unwrap();
    let bad = dir.path().join("bad.c");
    let good = dir.path().join("good.c");
    std::fs::write(&bad, "#if 1\nint x;\n").unwrap();
    std::fs::write(&good, "#ifdef NOPE\nint x;\n#endif\nint y;\n").unwrap();

    let mut pipeline = Pipeline::builder().build();
    let err = pipeline.run_file(&bad).unwrap_err();
    assert!(matches!(err, PipelineError::Compile(CompileError::Preprocess { .. })));
    let message = pipeline.format_error(&err);
    assert!(message.contains("bad.c"), "{}", message);

    // 前のファイルの条件スタックは持ち越さない
    let result = pipeline.run_file(&good).unwrap();
    assert!(result.outcome.success());
    assert!(result.outcome.tree.find("Unit/Body/Variable0").is_some());
}

#[test]
fn test_missing_input_is_compile_error() {
    let mut pipeline = Pipeline::builder().build();
    let err = pipeline.run_file(fixture("no_such_file.c")).unwrap_err();
    assert!(matches!(err, PipelineError::Compile(_)));
}

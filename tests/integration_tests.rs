use damc::compiler::codegen::CodegenError;
use damc::driver::{self, BuildError};
use damc::manifest::DamConfig;
use damc::{CompileError, DiagnosticSeverity};
use std::fs;
use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════

fn compile(source: &str) -> String {
    damc::compile_to_jasmin(source, "Main", None).expect("compilation failed")
}

/// Instruction and label lines of `main`, without directives.
fn main_body(source: &str) -> Vec<String> {
    let text = compile(source);
    let start = text
        .find("main([Ljava/lang/String;)V")
        .expect("no main method");
    text[start..]
        .lines()
        .skip(1)
        .map(str::trim)
        .take_while(|l| *l != ".end method")
        .filter(|l| !l.starts_with(".limit"))
        .map(str::to_string)
        .collect()
}

fn codegen_error(source: &str) -> CodegenError {
    match damc::check(source) {
        Err(CompileError::Codegen(e)) => e,
        other => panic!("expected a codegen error, got {:?}", other),
    }
}

fn write_source(dir: &std::path::Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, source).unwrap();
    path
}

// ═══════════════════════════════════════════════════════════════
//  End-to-end compilation tests
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_hello_world_class() {
    let text = damc::compile_to_jasmin("print \"Hello, world!\";", "Hello", Some("hello.dam"))
        .unwrap();
    assert!(text.starts_with(".source hello.dam\n.class public Hello\n.super java/lang/Object\n"));
    assert!(text.contains("invokenonvirtual java/lang/Object/<init>()V"));
    assert!(text.contains(".method public static main([Ljava/lang/String;)V"));
    assert!(text.contains("\t.limit stack 2\n\t.limit locals 1\n"));
    assert!(text.contains("\tldc \"Hello, world!\"\n"));
    assert!(text.ends_with("\treturn\n.end method\n"));
}

#[test]
fn test_countdown_loop() {
    let body = main_body(
        "let n = 3;\n\
         while (n > 0) {\n\
         \x20   print n;\n\
         \x20   n = n - 1;\n\
         }\n\
         print \"liftoff\";\n",
    );
    assert_eq!(
        body,
        vec![
            "ldc 3.0",
            "fstore 1",
            "LOOP_START0:",
            "fload 1",
            "ldc 0.0",
            "fcmpl",
            "ifle LOOP_END0",
            "getstatic java/lang/System/out Ljava/io/PrintStream;",
            "fload 1",
            "invokevirtual java/io/PrintStream/println(F)V",
            "fload 1",
            "ldc 1.0",
            "fsub",
            "fstore 1",
            "goto LOOP_START0",
            "LOOP_END0:",
            "getstatic java/lang/System/out Ljava/io/PrintStream;",
            "ldc \"liftoff\"",
            "invokevirtual java/io/PrintStream/println(Ljava/lang/String;)V",
            "return",
        ]
    );
}

#[test]
fn test_greeting_reads_a_line() {
    let body = main_body(
        "let name;\n\
         read name;\n\
         print \"Hello, \" + name;\n",
    );
    assert_eq!(
        body[..9],
        [
            "new java/util/Scanner",
            "dup",
            "getstatic java/lang/System/in Ljava/io/InputStream;",
            "invokespecial java/util/Scanner/<init>(Ljava/io/InputStream;)V",
            "astore 2",
            "ldc \"\"",
            "astore 1",
            "aload 2",
            "invokevirtual java/util/Scanner/nextLine()Ljava/lang/String;",
        ]
    );
    assert!(body.contains(
        &"invokevirtual java/lang/String/concat(Ljava/lang/String;)Ljava/lang/String;".to_string()
    ));
}

#[test]
fn test_consecutive_reads_use_one_scanner() {
    let text = compile("let first; let second; read first; read second; print second;");
    assert_eq!(text.matches("new java/util/Scanner").count(), 1);
    assert_eq!(text.matches("\taload 3\n\tinvokevirtual java/util/Scanner/nextLine").count(), 2);
    assert!(text.contains("\t.limit stack 3\n\t.limit locals 4\n"));
}

#[test]
fn test_frame_limits() {
    let asm = damc::compile_to_assembly(
        "let a = 1; let b = 2; let c = a * (b + a); print c > a and c != 4;",
    )
    .unwrap();
    assert_eq!(asm.max_locals, 4);
    // getstatic + fload + fload/ldc pairs inside the comparison
    assert_eq!(asm.max_stack, 3);
}

#[test]
fn test_nested_if_else_chain_links() {
    let text = compile(
        "let x = 5;\n\
         if (x < 3) print \"small\";\n\
         else if (x < 7) print \"medium\";\n\
         else print \"large\";\n",
    );
    for label in ["ELSE0:", "END0:", "ELSE1:", "END1:"] {
        assert_eq!(text.matches(&format!("\n{}\n", label)).count(), 1, "{}", label);
    }
}

#[test]
fn test_compile_is_deterministic() {
    let source = "let i = 0; while (i < 5 or i == 9) { if (!(i == 2)) print i; i = i + 1; }";
    assert_eq!(compile(source), compile(source));
}

// ═══════════════════════════════════════════════════════════════
//  Semantic errors
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_undefined_variable_reports_line() {
    let err = codegen_error("let a = 1;\nprint b;\n");
    assert_eq!(
        err,
        CodegenError::UndefinedVariable {
            name: "b".into(),
            line: 2
        }
    );
}

#[test]
fn test_check_diagnostics_line_tagged() {
    let diags = damc::check_diagnostics("let s = \"a\";\n\nprint s * 2;\n");
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].line, Some(3));
    assert_eq!(diags[0].severity, DiagnosticSeverity::Error);
    assert!(diags[0].message.contains("type mismatch"), "{}", diags[0].message);

    assert!(damc::check_diagnostics("print 1;").is_empty());
}

#[test]
fn test_parse_errors_are_all_reported() {
    let diags = damc::check_diagnostics("let = 1;\nprint ;\nprint 2;\n");
    assert_eq!(diags.len(), 2);
    assert_eq!(diags[0].line, Some(1));
    assert_eq!(diags[1].line, Some(2));
}

#[test]
fn test_lex_error() {
    let result = damc::check("print 1 # 2;");
    assert!(matches!(result, Err(CompileError::Lex(_))));
}

#[test]
fn test_reserved_keyword_rejected() {
    assert!(matches!(
        damc::check("return 1;"),
        Err(CompileError::Parse(_))
    ));
}

#[test]
fn test_halts_at_first_error() {
    let diags = damc::check_diagnostics("print -true;\nprint !1;\n");
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].line, Some(1));
}

// ═══════════════════════════════════════════════════════════════
//  AST export
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_ast_json_export() {
    let json = damc::source_to_ast_json("let x = 1 + 2;").unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let stmt = &value["stmts"][0]["Let"];
    assert_eq!(stmt["name"], "x");
    assert!(stmt["initializer"]["kind"]["Binary"].is_array());
}

// ═══════════════════════════════════════════════════════════════
//  Driver
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_write_assembly_into_out_dir() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "Greeter.dam", "print \"hi\";");
    let mut config = DamConfig::default();
    config.build.out_dir = Some(PathBuf::from("out"));

    let path = driver::write_assembly(&src, &config).unwrap();
    assert_eq!(path, dir.path().join("out").join("Greeter.j"));
    let text = fs::read_to_string(path).unwrap();
    assert!(text.contains(".class public Greeter"));
    assert!(text.contains(".source Greeter.dam"));
}

#[test]
fn test_write_assembly_reports_compile_error() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "Broken.dam", "print nope;");
    let err = driver::write_assembly(&src, &DamConfig::default()).unwrap_err();
    assert!(matches!(err, BuildError::Compile { .. }));
    assert!(!dir.path().join("Broken.j").exists());
}

#[test]
fn test_missing_assembler_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "Prog.dam", "print 1;");
    let mut config = DamConfig::default();
    config.assembler.program = "damc-test-no-such-assembler".into();

    let err = driver::build(&src, &config).unwrap_err();
    assert!(matches!(err, BuildError::Io { action: "run", .. }), "{}", err);
}

#[cfg(unix)]
#[test]
fn test_build_relocates_class_file() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "Prog.dam", "let x = 2; print x * x;");
    let mut config = DamConfig::default();
    config.build.out_dir = Some(PathBuf::from("build"));
    config.build.keep_assembly = false;
    // Stand-in assembler: `sh -c SCRIPT sh -d <dir> <file.j>`
    config.assembler.program = "sh".into();
    config.assembler.args = vec![
        "-c".into(),
        "touch \"$2/$(basename \"$3\" .j).class\"".into(),
        "sh".into(),
    ];

    let artifacts = driver::build(&src, &config).unwrap();
    assert_eq!(artifacts.class_file, dir.path().join("Prog.class"));
    assert!(artifacts.class_file.is_file());
    assert_eq!(artifacts.assembly, None);
    assert!(!dir.path().join("build").join("Prog.j").exists());
    assert!(!dir.path().join("build").join("Prog.class").exists());
}

#[cfg(unix)]
#[test]
fn test_failing_assembler_surfaces_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_source(dir.path(), "Prog.dam", "print 1;");
    let mut config = DamConfig::default();
    config.assembler.program = "sh".into();
    config.assembler.args = vec!["-c".into(), "echo 'bad directive' >&2; exit 3".into(), "sh".into()];

    match driver::build(&src, &config) {
        Err(BuildError::AssemblerFailed { program, detail }) => {
            assert_eq!(program, "sh");
            assert_eq!(detail, "bad directive");
        }
        other => panic!("expected assembler failure, got {:?}", other),
    }
    // The .j stays for inspection.
    assert!(dir.path().join("Prog.j").is_file());
}

//! Jasmin class-file text.
//!
//! The whole program becomes the body of `public static void main` in a
//! class with a default constructor.

use crate::compiler::codegen::emit::{Assembly, Item};

/// Render `assembly` as a complete Jasmin source file for `class_name`.
///
/// `source_file` adds a `.source` directive so stack traces name the
/// original `.dam` file.
pub fn render_class(class_name: &str, source_file: Option<&str>, assembly: &Assembly) -> String {
    let mut out = String::new();

    if let Some(source) = source_file {
        out.push_str(&format!(".source {}\n", source));
    }
    out.push_str(&format!(".class public {}\n", class_name));
    out.push_str(".super java/lang/Object\n\n");

    out.push_str(".method public <init>()V\n");
    push_op(&mut out, "aload_0");
    push_op(&mut out, "invokenonvirtual java/lang/Object/<init>()V");
    push_op(&mut out, "return");
    out.push_str(".end method\n\n");

    out.push_str(".method public static main([Ljava/lang/String;)V\n");
    push_op(&mut out, &format!(".limit stack {}", assembly.max_stack));
    push_op(&mut out, &format!(".limit locals {}", assembly.max_locals));
    for item in &assembly.items {
        match item {
            Item::Label(_) => {
                out.push_str(&item.to_string());
                out.push('\n');
            }
            Item::Op(ins) => push_op(&mut out, &ins.to_string()),
        }
    }
    push_op(&mut out, "return");
    out.push_str(".end method\n");

    out
}

fn push_op(out: &mut String, line: &str) {
    out.push('\t');
    out.push_str(line);
    out.push('\n');
}

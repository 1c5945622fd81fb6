//! From a `.dam` file to a `.class` file.
//!
//! Compiles the source, writes `Name.j`, runs the external Jasmin
//! assembler on it and moves the resulting `Name.class` next to the
//! source file.

use crate::manifest::{ConfigError, DamConfig};
use crate::CompileError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot {action} '{}': {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{}:\n{source}", .path.display())]
    Compile {
        path: PathBuf,
        #[source]
        source: CompileError,
    },
    #[error("'{0}' is not a valid JVM class name")]
    InvalidClassName(String),
    #[error("assembler '{program}' failed: {detail}")]
    AssemblerFailed { program: String, detail: String },
}

impl BuildError {
    fn io<'a>(
        action: &'static str,
        path: &'a Path,
    ) -> impl FnOnce(io::Error) -> BuildError + 'a {
        move |source| BuildError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifacts {
    /// The `.j` file, unless it was removed after assembling.
    pub assembly: Option<PathBuf>,
    pub class_file: PathBuf,
}

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally",
    "float", "for", "goto", "if", "implements", "import", "instanceof", "int", "interface",
    "long", "native", "new", "package", "private", "protected", "public", "return", "short",
    "static", "strictfp", "super", "switch", "synchronized", "this", "throw", "throws",
    "transient", "try", "void", "volatile", "while", "true", "false", "null",
];

/// The class name a source file compiles to: its file stem, which must be
/// a Java identifier.
pub fn class_name_for(path: &Path) -> Result<String, BuildError> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut chars = stem.chars();
    let valid_start = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_' || c == '$');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if !valid_start || !valid_rest || JAVA_KEYWORDS.contains(&stem.as_str()) {
        return Err(BuildError::InvalidClassName(stem));
    }
    Ok(stem)
}

fn source_dir(source_path: &Path) -> PathBuf {
    match source_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn output_dir(source_path: &Path, config: &DamConfig) -> PathBuf {
    let base = source_dir(source_path);
    match &config.build.out_dir {
        Some(dir) => base.join(dir),
        None => base,
    }
}

/// Compile `source_path` and write `Name.j` into the output directory.
pub fn write_assembly(source_path: &Path, config: &DamConfig) -> Result<PathBuf, BuildError> {
    let class_name = class_name_for(source_path)?;
    let source = fs::read_to_string(source_path).map_err(BuildError::io("read", source_path))?;

    let file_name = source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let text = crate::compile_to_jasmin(&source, &class_name, file_name.as_deref()).map_err(
        |source| BuildError::Compile {
            path: source_path.to_path_buf(),
            source,
        },
    )?;

    let out_dir = output_dir(source_path, config);
    fs::create_dir_all(&out_dir).map_err(BuildError::io("create", &out_dir))?;
    let assembly_path = out_dir.join(format!("{}.j", class_name));
    fs::write(&assembly_path, text).map_err(BuildError::io("write", &assembly_path))?;

    tracing::info!(path = %assembly_path.display(), "wrote assembly");
    Ok(assembly_path)
}

/// Full build: compile, assemble, relocate the class file next to the
/// source, and drop the `.j` unless the config keeps it.
pub fn build(source_path: &Path, config: &DamConfig) -> Result<BuildArtifacts, BuildError> {
    let class_name = class_name_for(source_path)?;
    let assembly_path = write_assembly(source_path, config)?;
    let out_dir = output_dir(source_path, config);

    let assembler = &config.assembler;
    tracing::debug!(program = %assembler.program, args = ?assembler.args, "running assembler");
    let output = Command::new(&assembler.program)
        .args(&assembler.args)
        .arg("-d")
        .arg(&out_dir)
        .arg(&assembly_path)
        .output()
        .map_err(BuildError::io("run", Path::new(&assembler.program)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let detail = if stderr.is_empty() {
            output.status.to_string()
        } else {
            stderr
        };
        return Err(BuildError::AssemblerFailed {
            program: assembler.program.clone(),
            detail,
        });
    }

    let file_name = format!("{}.class", class_name);
    let produced = out_dir.join(&file_name);
    if !produced.is_file() {
        return Err(BuildError::AssemblerFailed {
            program: assembler.program.clone(),
            detail: format!("no {} in {}", file_name, out_dir.display()),
        });
    }

    let class_file = source_dir(source_path).join(&file_name);
    if produced != class_file {
        relocate(&produced, &class_file)?;
    }

    let assembly = if config.build.keep_assembly {
        Some(assembly_path)
    } else {
        fs::remove_file(&assembly_path).map_err(BuildError::io("remove", &assembly_path))?;
        None
    };

    tracing::info!(class = %class_file.display(), "build finished");
    Ok(BuildArtifacts {
        assembly,
        class_file,
    })
}

fn relocate(from: &Path, to: &Path) -> Result<(), BuildError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Different filesystems: fall back to copy + remove.
    tracing::warn!(from = %from.display(), to = %to.display(), "rename failed, copying");
    fs::copy(from, to).map_err(BuildError::io("copy", from))?;
    fs::remove_file(from).map_err(BuildError::io("remove", from))?;
    Ok(())
}

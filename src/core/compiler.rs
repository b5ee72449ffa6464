//! # Compiler
//!
//! Turns script source into a `ScriptUnit`: the parsed, platform-independent form
//! that the interpreter evaluates and the cache stores. Double-quoted strings are
//! split here into literal and interpolated components so that evaluation never
//! has to re-scan text.

use crate::{
    constants::{STDIN_CLASS_NAME, STDIN_SOURCE_NAME},
    core::{cache::CacheError, lexer, parser},
    models::{ExprKind, Literal, ScriptUnit, TemplateComponent},
};
use lazy_static::lazy_static;
use regex::Regex;
use std::{fs, path::Path};
use thiserror::Error;

lazy_static! {
    // Captures `${...}` tokens, with an optional escape character `\`.
    static ref TOKEN_RE: Regex = Regex::new(r"\\?\$\{([^}]*)\}").unwrap();
}

/// Leading bytes of every cache artifact.
const ARTIFACT_MAGIC: &[u8; 4] = b"GNTC";
/// Bumped whenever the serialized AST layout changes.
const ARTIFACT_FORMAT_VERSION: u8 = 1;

/// Represents errors that can occur while compiling a script.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The source is not a well-formed script.
    #[error("{source_name}, line {line}: {message}")]
    Syntax {
        /// Where the source came from (file path or "standard input").
        source_name: String,
        /// The 1-based line of the offending token.
        line: u32,
        /// What the parser expected or found.
        message: String,
    },
    /// A `${...}` token inside a double-quoted string is malformed.
    #[error("invalid interpolation '{0}'")]
    InvalidTemplate(String),
}

// --- PUBLIC COMPILER API ---

/// Compiles script source into a `ScriptUnit`.
///
/// # Arguments
///
/// * `source` - The script text.
/// * `source_name` - The name used in diagnostics.
/// * `class_name` - The identifier under which the unit is cached.
pub fn compile_source(
    source: &str,
    source_name: &str,
    class_name: &str,
) -> Result<ScriptUnit, CompileError> {
    log::debug!("Compiling '{}' as class '{}'", source_name, class_name);
    let statements = parser::parse_script(source).map_err(|e| CompileError::Syntax {
        source_name: source_name.to_string(),
        line: e.line,
        message: e.message,
    })?;
    Ok(ScriptUnit {
        class_name: class_name.to_string(),
        source_name: source_name.to_string(),
        statements,
    })
}

/// Derives the class name of a script from its file name: every character that is
/// not valid in an identifier becomes `_`, and a leading digit is prefixed with `_`.
///
/// `None` stands for standard input.
pub fn derive_class_name(path: Option<&Path>) -> String {
    let Some(file_name) = path.and_then(Path::file_name) else {
        return STDIN_CLASS_NAME.to_string();
    };
    let mut class_name: String = file_name
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if class_name.starts_with(|c: char| c.is_ascii_digit()) {
        class_name.insert(0, '_');
    }
    class_name
}

/// The name used in diagnostics for a script read from `path` (or standard input).
pub fn source_name_for(path: Option<&Path>) -> String {
    path.map_or_else(
        || STDIN_SOURCE_NAME.to_string(),
        |p| p.display().to_string(),
    )
}

/// Tokenizes the raw body of a double-quoted string into a vector of `TemplateComponent`s.
///
/// Backslash escapes in the literal parts are resolved here; `\${...}` yields the
/// text `${...}` literally.
pub fn tokenize_string(text: &str) -> Result<Vec<TemplateComponent>, CompileError> {
    let mut components = Vec::with_capacity(text.len() / 20 + 1);

    // Helper to push literals and handle merging.
    let push_literal = |components: &mut Vec<TemplateComponent>, s: &str| {
        if s.is_empty() {
            return;
        }
        if let Some(TemplateComponent::Literal(last)) = components.last_mut() {
            last.push_str(s);
        } else {
            components.push(TemplateComponent::Literal(s.to_string()));
        }
    };

    let mut last_index = 0;
    for caps in TOKEN_RE.captures_iter(text) {
        let Some(full_match) = caps.get(0) else {
            continue;
        };
        let before = text.get(last_index..full_match.start()).unwrap_or_default();
        push_literal(&mut components, &unescape(before));

        if let Some(escaped) = full_match.as_str().strip_prefix('\\') {
            push_literal(&mut components, escaped);
        } else {
            let content = caps.get(1).map_or("", |m| m.as_str());
            components.push(parse_token_content(content, full_match.as_str())?);
        }
        last_index = full_match.end();
    }

    push_literal(
        &mut components,
        &unescape(text.get(last_index..).unwrap_or_default()),
    );
    Ok(components)
}

/// Builds the expression for a tokenized string: a plain literal when nothing is
/// interpolated, a template otherwise.
pub fn template_expr_kind(mut components: Vec<TemplateComponent>) -> ExprKind {
    match components.as_slice() {
        [] => ExprKind::Literal(Literal::String(String::new())),
        [TemplateComponent::Literal(_)] => match components.pop() {
            Some(TemplateComponent::Literal(s)) => ExprKind::Literal(Literal::String(s)),
            _ => ExprKind::Template(components),
        },
        _ => ExprKind::Template(components),
    }
}

/// Parses the inner content of a `${...}` token into a dotted lookup path.
fn parse_token_content(content: &str, full_match: &str) -> Result<TemplateComponent, CompileError> {
    let segments: Vec<String> = content
        .trim()
        .split('.')
        .map(|s| s.trim().to_string())
        .collect();
    let valid = segments.iter().all(|s| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    if valid {
        Ok(TemplateComponent::Path(segments))
    } else {
        Err(CompileError::InvalidTemplate(full_match.to_string()))
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(esc) = chars.next() {
                out.push(lexer::unescape_char(esc));
            }
        } else {
            out.push(c);
        }
    }
    out
}

// --- CACHE I/O ---

/// Reads and deserializes a `ScriptUnit` from a compressed cache artifact.
/// This function is on the hot path for "cache hit" scenarios.
pub fn read_cached_unit(path: &Path) -> Result<ScriptUnit, CacheError> {
    // 1. Read the bytes from disk.
    let bytes = fs::read(path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.is_empty() {
        return Err(CacheError::Empty);
    }

    // 2. Check the header.
    let payload = bytes
        .strip_prefix(ARTIFACT_MAGIC.as_slice())
        .ok_or(CacheError::BadHeader)?;
    let (&version, compressed_bytes) = payload.split_first().ok_or(CacheError::BadHeader)?;
    if version != ARTIFACT_FORMAT_VERSION {
        return Err(CacheError::IncompatibleVersion(version));
    }

    // 3. Decompress the data using LZ4.
    log::trace!(
        "Decompressing cached unit from {} bytes.",
        compressed_bytes.len()
    );
    let decompressed_bytes = lz4_flex::decompress_size_prepended(compressed_bytes)
        .map_err(|e| CacheError::Decompress(e.to_string()))?;
    log::trace!("Decompressed to {} bytes.", decompressed_bytes.len());

    // 4. Deserialize the raw bytes using bincode.
    let (unit, _): (ScriptUnit, usize) =
        bincode::serde::decode_from_slice(&decompressed_bytes, bincode::config::standard())
            .map_err(|e| CacheError::Decode(e.to_string()))?;

    Ok(unit)
}

/// Serializes and writes a `ScriptUnit` to a compressed cache artifact.
/// This function is on the "cold path" (cache miss).
///
/// The bytes go to a temporary file in the same directory which is then renamed
/// over `path`, so readers never see a partial artifact.
pub fn write_cached_unit(path: &Path, unit: &ScriptUnit) -> Result<(), CacheError> {
    let io_err = |source: std::io::Error| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };

    // 1. Ensure the parent directory exists.
    let parent_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent_dir).map_err(io_err)?;

    // 2. Serialize the AST to raw bytes using bincode.
    let decompressed_bytes = bincode::serde::encode_to_vec(unit, bincode::config::standard())
        .map_err(|e| CacheError::Encode(e.to_string()))?;
    log::trace!(
        "Serialized unit '{}' to {} bytes.",
        unit.class_name,
        decompressed_bytes.len()
    );

    // 3. Compress the raw bytes using LZ4.
    let compressed_bytes = lz4_flex::compress_prepend_size(&decompressed_bytes);
    log::trace!("Compressed unit to {} bytes.", compressed_bytes.len());

    // 4. Write header and payload through a temporary file, then rename into place.
    let mut artifact = Vec::with_capacity(ARTIFACT_MAGIC.len() + 1 + compressed_bytes.len());
    artifact.extend_from_slice(ARTIFACT_MAGIC);
    artifact.push(ARTIFACT_FORMAT_VERSION);
    artifact.extend_from_slice(&compressed_bytes);

    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir).map_err(io_err)?;
    std::io::Write::write_all(&mut temp_file, &artifact).map_err(io_err)?;
    temp_file
        .persist(path)
        .map_err(|e| io_err(e.error))?;

    Ok(())
}

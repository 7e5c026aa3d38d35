//! Command Template Resolver
//!
//! Turns a registry entry's command template into a shell command line by
//! substituting `{name}` placeholders. Only `{identifier}` forms are
//! placeholders; any other brace (an awk program, a jq filter) is copied
//! through untouched. `{{` and `}}` produce literal braces.
//!
//! Every substituted value is single-quoted for `sh`. Targets are
//! operator-supplied domain names: quoting keeps ordinary hostnames and
//! paths intact, but it is not a defence against a hostile target string.

use std::collections::BTreeMap;
use std::path::Path;

use recon_core::CoreError;
use thiserror::Error;

use crate::models::ToolSpec;

/// Placeholder always supplied by the resolver: the scan target.
pub const TARGET: &str = "target";
/// Placeholder always supplied by the resolver: the run output directory.
pub const OUTDIR: &str = "outdir";
/// Worker thread count handed to the tool.
pub const THREADS: &str = "threads";
/// The tool's own artifact path.
pub const OUTPUT: &str = "output";
/// Merged candidates of the previous phase.
pub const INPUT: &str = "input";

/// Placeholders the orchestrator knows how to fill.
pub const BUILTIN_PLACEHOLDERS: [&str; 5] = [TARGET, OUTDIR, THREADS, OUTPUT, INPUT];

/// Extra placeholder values, keyed by placeholder name.
pub type TemplateParams = BTreeMap<String, String>;

/// Errors raised while resolving a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("placeholder '{{{0}}}' has no value")]
    MissingPlaceholder(String),
    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),
}

impl From<TemplateError> for CoreError {
    fn from(err: TemplateError) -> Self {
        CoreError::template(err.to_string())
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Brace(char),
    Placeholder(&'a str),
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let bytes = template.as_bytes();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                segments.push(Segment::Literal(&template[literal_start..i]));
                segments.push(Segment::Brace(bytes[i] as char));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let rest = &template[i + 1..];
                let ident_len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
                if ident_len > 0 && rest[ident_len..].starts_with('}') {
                    segments.push(Segment::Literal(&template[literal_start..i]));
                    segments.push(Segment::Placeholder(&rest[..ident_len]));
                    i += ident_len + 2;
                    literal_start = i;
                } else if ident_len > 0 && ident_len == rest.len() {
                    return Err(TemplateError::Unterminated(i));
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    segments.push(Segment::Literal(&template[literal_start..]));
    Ok(segments)
}

/// Names of every placeholder referenced by a template, in order of
/// first appearance.
pub fn placeholders(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut names: Vec<String> = Vec::new();
    for segment in parse(template)? {
        if let Segment::Placeholder(name) = segment {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Whether the template references the given placeholder.
pub fn references(template: &str, name: &str) -> bool {
    placeholders(template)
        .map(|names| names.iter().any(|n| n == name))
        .unwrap_or(false)
}

/// Quote a value for `sh`. Plain hostname/path text is returned unchanged.
pub fn shell_quote(raw: &str) -> String {
    if !raw.is_empty()
        && raw
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || b"/._-=+:,@".contains(&byte))
    {
        return raw.to_owned();
    }
    let escaped = raw.replace('\'', "'\"'\"'");
    format!("'{escaped}'")
}

/// Resolve a tool's command template for one target.
///
/// `{target}` and `{outdir}` come from the arguments; every other
/// placeholder must be present in `extra`.
pub fn resolve(
    tool: &ToolSpec,
    target: &str,
    out_dir: &Path,
    extra: &TemplateParams,
) -> Result<String, TemplateError> {
    let out_dir = out_dir.to_string_lossy();
    let mut command = String::with_capacity(tool.command_template.len() + 64);

    for segment in parse(&tool.command_template)? {
        match segment {
            Segment::Literal(text) => command.push_str(text),
            Segment::Brace(c) => command.push(c),
            Segment::Placeholder(name) => {
                let value = match name {
                    TARGET => target,
                    OUTDIR => out_dir.as_ref(),
                    other => extra
                        .get(other)
                        .map(String::as_str)
                        .ok_or_else(|| TemplateError::MissingPlaceholder(other.to_string()))?,
                };
                command.push_str(&shell_quote(value));
            }
        }
    }

    Ok(command)
}

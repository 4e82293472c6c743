//! `$placeholder` substitution into script templates.
//!
//! Used for the worker bootstrap and remote-launch scripts written by the
//! dispatcher, and for per-job run scripts. Substitution is "safe": a
//! placeholder with no value is left untouched instead of being an error,
//! so shell variables such as `$1` or `$PATH` survive rendering.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Error type for template rendering.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read template: {0}")]
    Io(#[from] std::io::Error),
}

/// Render `template_path` into `output_path`, replacing every known
/// `$NAME` / `${NAME}` with its value from `substitutions`.
///
/// # Errors
///
/// Returns [`TemplateError::NotFound`] when the template does not exist, so
/// callers can tell a missing template apart from other I/O failures.
pub fn render(
    template_path: &Path,
    output_path: &Path,
    substitutions: &HashMap<String, String>,
) -> Result<(), TemplateError> {
    let source = match fs::read_to_string(template_path) {
        Ok(source) => source,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(TemplateError::NotFound(template_path.to_path_buf()))
        }
        Err(e) => return Err(TemplateError::Io(e)),
    };

    let rendered = render_str(&source, substitutions);
    fs::write(output_path, rendered).map_err(|source| TemplateError::Write {
        path: output_path.to_path_buf(),
        source,
    })?;

    tracing::debug!(
        template = %template_path.display(),
        output = %output_path.display(),
        "Rendered template"
    );
    Ok(())
}

/// Substitute placeholders in an in-memory template.
pub fn render_str(template: &str, substitutions: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                if is_identifier(name) {
                    match substitutions.get(name) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[pos..pos + end + 3]),
                    }
                    rest = &braced[end + 1..];
                    continue;
                }
            }
            out.push('$');
            rest = after;
            continue;
        }

        let name_len = identifier_prefix_len(after);
        if name_len == 0 {
            out.push('$');
            rest = after;
            continue;
        }

        let name = &after[..name_len];
        match substitutions.get(name) {
            Some(value) => out.push_str(value),
            None => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[name_len..];
    }

    out.push_str(rest);
    out
}

fn identifier_prefix_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(*c == '_' || c.is_ascii_alphanumeric()))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && identifier_prefix_len(s) == s.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn replaces_plain_and_braced_placeholders() {
        let s = subs(&[("PORT", "5000"), ("HOST", "master")]);
        assert_eq!(
            render_str("connect $HOST:${PORT}/x", &s),
            "connect master:5000/x"
        );
    }

    #[test]
    fn leaves_unknown_placeholders_alone() {
        let s = subs(&[("PORT", "5000")]);
        assert_eq!(render_str("$PATH ${HOME} $PORT", &s), "$PATH ${HOME} 5000");
    }

    #[test]
    fn positional_and_escaped_dollars_are_literal() {
        let s = subs(&[("NODE", "n1")]);
        assert_eq!(render_str("ssh $1 cost $$5 $", &s), "ssh $1 cost $5 $");
        assert_eq!(render_str("${not closed", &s), "${not closed");
    }

    #[test]
    fn identifier_stops_at_non_word_characters() {
        let s = subs(&[("WORK_DIR", "/scratch")]);
        assert_eq!(render_str("cd $WORK_DIR/run-1", &s), "cd /scratch/run-1");
        assert_eq!(render_str("$WORK_DIRX", &s), "$WORK_DIRX");
    }

    #[test]
    fn render_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("in.sh");
        let output = dir.path().join("out.sh");
        fs::write(&template, "echo $GREETING\n").unwrap();

        render(&template, &output, &subs(&[("GREETING", "hello")])).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "echo hello\n");
    }

    #[test]
    fn render_reports_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.sh");
        let result = render(&missing, &dir.path().join("out.sh"), &HashMap::new());
        assert!(matches!(result, Err(TemplateError::NotFound(p)) if p == missing));
    }
}

//! HTML template resolution.
//!
//! Templates are plain HTML files with positional `%s` placeholders, filled
//! in declaration order. `%%` renders a literal percent sign, so stylesheets
//! inside a template write `width: 100%%`. Every email is rendered from its
//! own template and then wrapped in `layout.html`, whose single `%s` receives
//! the rendered fragment.

mod cache;

pub use cache::TemplateCache;

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Kinds of template known to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Layout,
    Welcome,
    Verification,
    Reset,
    /// Reserved; no template file is mapped to it yet.
    Reminder,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Layout => "email:layout",
            TemplateKind::Welcome => "email:welcome",
            TemplateKind::Verification => "email:verification",
            TemplateKind::Reset => "email:reset",
            TemplateKind::Reminder => "email:reminder",
        }
    }

    /// File name under the template directory, if one is mapped.
    pub fn file_name(&self) -> Option<&'static str> {
        match self {
            TemplateKind::Layout => Some("layout.html"),
            TemplateKind::Welcome => Some("welcome.html"),
            TemplateKind::Verification => Some("verification.html"),
            TemplateKind::Reset => Some("reset.html"),
            TemplateKind::Reminder => None,
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("no template found for {kind}")]
    NotFound { kind: TemplateKind, path: Option<PathBuf> },

    #[error("template expects {expected} value(s) but {supplied} were supplied")]
    PlaceholderMismatch { expected: usize, supplied: usize },

    #[error("template {path} is not valid UTF-8")]
    InvalidEncoding { path: String },

    #[error("failed to load templates from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Count the `%s` placeholders in `template`, skipping `%%` escapes.
pub fn count_placeholders(template: &str) -> usize {
    let mut count = 0;
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.next() {
                Some('s') => count += 1,
                Some(_) | None => {}
            }
        }
    }
    count
}

/// Substitute `args` into the `%s` placeholders of `template`.
///
/// The number of values must match the number of placeholders exactly.
/// Values are inserted verbatim; a `%` inside a value is never reinterpreted.
pub fn fill(template: &str, args: &[&str]) -> Result<String, TemplateError> {
    let expected = count_placeholders(template);
    if expected != args.len() {
        return Err(TemplateError::PlaceholderMismatch {
            expected,
            supplied: args.len(),
        });
    }

    let mut out = String::with_capacity(template.len() + args.iter().map(|a| a.len()).sum::<usize>());
    let mut values = args.iter();
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => {
                if let Some(value) = values.next() {
                    out.push_str(value);
                }
            }
            Some('%') => out.push('%'),
            // Any other sequence is not a directive and is kept as written.
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    Ok(out)
}

use std::path::{Path, PathBuf};

use thiserror::Error;

pub const PACKAGE_NAME_PLACEHOLDER: &str = "$packageName";
pub const CLASS_NAME_PLACEHOLDER: &str = "$className";
pub const EXPRESSION_PLACEHOLDER: &str = "$expression";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template `{}` not found", path.display())]
    Missing { path: PathBuf },
    #[error("template `{}` could not be read: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source text with `$packageName`, `$className` and `$expression`
/// placeholders. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::new(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(TemplateError::Missing {
                path: path.to_owned(),
            }),
            Err(source) => Err(TemplateError::Unreadable {
                path: path.to_owned(),
                source,
            }),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Substitutes every recognized placeholder. The fragment is inserted
    /// last and verbatim, placeholder-like text inside it is not expanded.
    /// Unrecognized placeholders stay as they are.
    pub fn render(&self, package_name: &str, class_name: &str, expression: &str) -> String {
        self.text
            .replace(PACKAGE_NAME_PLACEHOLDER, package_name)
            .replace(CLASS_NAME_PLACEHOLDER, class_name)
            .replace(EXPRESSION_PLACEHOLDER, expression)
    }
}

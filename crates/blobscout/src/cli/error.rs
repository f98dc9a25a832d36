//! Helpful error types for CLI commands
//!
//! Every error says what went wrong and, where there is one, what to try
//! next.

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    pub fn file_not_found(path: &Path) -> Self {
        Self::new(format!("File not found: {}", path.display()))
            .with_context("The specified file does not exist")
            .with_suggestions([format!("TRY: Check if the file exists: ls -la {}", path.display())])
    }

    pub fn catalog_not_found(path: &Path) -> Self {
        Self::new(format!("Catalog not found: {}", path.display()))
            .with_context("No scan has written to this catalog yet")
            .with_suggestions([
                "TRY: Run a scan first: blobscout scan --config <file>".to_string(),
                "TRY: Point at another catalog with --db or BLOBSCOUT_DB".to_string(),
            ])
    }

    pub fn record_not_found(id: i64) -> Self {
        Self::new(format!("Discovery record {} not found", id))
            .with_suggestions(["TRY: List records: blobscout catalog list".to_string()])
    }

    pub fn unrecognized_locator(locator: &str) -> Self {
        Self::new(format!("Unrecognized storage locator: '{}'", locator)).with_suggestions([
            "TRY: abfss://<filesystem>@<account>.dfs.core.windows.net/<path>",
            "TRY: https://<account>.blob.core.windows.net/<container>/<path>",
            "TRY: <account>/<container>/<path>",
        ])
    }

    pub fn no_container_dir(path: &Path) -> Self {
        Self::new(format!("Cannot inspect {}", path.display()))
            .with_context("The file must sit inside a directory that acts as its container")
            .with_suggestions(["TRY: Move the file into a sub-directory".to_string()])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_suggestions() {
        let display = HelpfulError::unrecognized_locator("ftp://x").to_string();
        assert!(display.starts_with("ERROR: Unrecognized storage locator: 'ftp://x'"));
        assert_eq!(display.matches("TRY:").count(), 3);
    }

    #[test]
    fn test_context_line() {
        let display = HelpfulError::catalog_not_found(Path::new("/tmp/none.db")).to_string();
        assert!(display.contains("CONTEXT: No scan has written"));
    }
}

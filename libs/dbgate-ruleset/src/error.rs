//! Ruleset Engine Error Types

use thiserror::Error;

/// Result type for ruleset operations
pub type Result<T> = std::result::Result<T, RulesetError>;

/// Ruleset engine errors
///
/// Persistence-path failures are atomic: a `Parse` or `Io` error means no
/// partial ruleset was produced and any previously active ruleset is
/// untouched. Evaluation-path problems never surface here; they degrade to
/// a not-matched or not-evaluable outcome so admission control stays
/// available (see `matcher` and `evaluator`).
#[derive(Debug, Error)]
pub enum RulesetError {
    /// Malformed persisted ruleset. The message names the offending
    /// directive, field or token.
    #[error("{file}:{line}: {message}")]
    Parse {
        /// Source file (or pseudo-file) being parsed
        file: String,
        /// 1-based line number of the offending line
        line: usize,
        /// What went wrong, including the field/token at fault
        message: String,
    },

    /// File could not be read or written
    #[error("I/O error on {file}: {source}")]
    Io {
        /// Path of the file involved
        file: String,
        #[source]
        source: std::io::Error,
    },
}

impl RulesetError {
    /// Build a parse error for `file:line`
    pub fn parse(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        RulesetError::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

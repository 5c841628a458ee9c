//! Typing Error Module
//!
//! Closed set of domain failures raised by the genotyping core. Everything
//! here is fatal: callers propagate with `?` and the run stops. Missing hits
//! are never errors, they are reported as `-` or `NA` in the results.

use thiserror::Error;

/// Fatal errors raised while parsing alignments or classifying hits.
#[derive(Error, Debug)]
pub enum TypingError {
    /// A PAF line had fewer than the 11 fields the hit model needs.
    #[error("malformed alignment line: expected at least 11 tab-separated fields, found {fields}")]
    MalformedAlignment { fields: usize },

    /// A numeric PAF column could not be parsed.
    #[error("invalid {field} in alignment line: '{value}'")]
    InvalidField { field: &'static str, value: String },

    /// A classification produced a column that is not in the declared header set.
    #[error("result column '{column}' is not a declared header")]
    UnknownResultColumn { column: String },

    /// The external aligner could not be located.
    #[error("{name} not found in PATH; install it or add it to your PATH")]
    MissingExecutable { name: String },

    /// A mutation scan saw a reference sequence it does not know how to interpret.
    #[error("unexpected query '{query}' in {scan} scan")]
    UnexpectedQuery { scan: &'static str, query: String },

    /// A hit's query sequence has no entry in the resistance class table.
    #[error("reference '{name}' is missing from the class table")]
    UnknownReference { name: String },

    /// A class table or profile table line could not be interpreted.
    #[error("malformed table line {line}: {reason}")]
    MalformedTable { line: usize, reason: String },

    /// A threshold option is outside its permitted range.
    #[error("{option} must be within {range}, got {value}")]
    InvalidThreshold {
        option: &'static str,
        range: &'static str,
        value: f64,
    },

    /// A typing module ran before one of the modules it depends on.
    #[error("module '{module}' requires '{prerequisite}' to run first")]
    MissingPrerequisite { module: String, prerequisite: String },
}

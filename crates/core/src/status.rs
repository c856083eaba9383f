//! Run status accumulation
//!
//! Failures are accumulated as a set of named categories and only turned
//! into a number at the reporting boundary. The numeric values are the
//! historical exit codes of the indexer.

use std::collections::BTreeSet;
use std::fmt;

/// A class of failure encountered during a run
///
/// Variants are ordered by severity; [`StatusSet::code`] reports the most
/// severe one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCategory {
    /// Bulk submission reported failed documents
    OperationError,
    /// Tarball missing on disk
    FileNotFound,
    /// Index templates could not be created or updated
    TemplateCreationError,
    /// Anything else
    GenericError,
}

impl ErrorCategory {
    /// Numeric code used at the reporting boundary
    pub fn code(self) -> i32 {
        match self {
            ErrorCategory::OperationError => 1,
            ErrorCategory::FileNotFound => 6,
            ErrorCategory::TemplateCreationError => 9,
            ErrorCategory::GenericError => 12,
        }
    }

    /// Human readable description
    pub fn description(self) -> &'static str {
        match self {
            ErrorCategory::OperationError => "operational error while indexing",
            ErrorCategory::FileNotFound => "tarball file not found",
            ErrorCategory::TemplateCreationError => "index template creation failed",
            ErrorCategory::GenericError => "unexpected error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Accumulated failure categories for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSet(BTreeSet<ErrorCategory>);

impl StatusSet {
    /// A clean status
    pub fn ok() -> Self {
        Self::default()
    }

    /// A status holding a single category
    pub fn of(category: ErrorCategory) -> Self {
        let mut set = Self::default();
        set.record(category);
        set
    }

    /// Add a category
    pub fn record(&mut self, category: ErrorCategory) {
        self.0.insert(category);
    }

    /// Fold another status into this one
    pub fn absorb(&mut self, other: &StatusSet) {
        self.0.extend(other.0.iter().copied());
    }

    /// True if nothing was recorded
    pub fn is_ok(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `category` was recorded
    pub fn contains(&self, category: ErrorCategory) -> bool {
        self.0.contains(&category)
    }

    /// Most severe category recorded
    pub fn worst(&self) -> Option<ErrorCategory> {
        self.0.iter().next_back().copied()
    }

    /// Numeric boundary code: 0 when clean, else the worst category's code
    pub fn code(&self) -> i32 {
        self.worst().map_or(0, ErrorCategory::code)
    }

    /// Recorded categories, least severe first
    pub fn categories(&self) -> impl Iterator<Item = ErrorCategory> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return f.write_str("ok");
        }
        let names: Vec<_> = self.0.iter().map(|c| c.description()).collect();
        write!(f, "{} (code {})", names.join(", "), self.code())
    }
}

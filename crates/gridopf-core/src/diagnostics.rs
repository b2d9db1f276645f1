//! Findings of an optimization run.
//!
//! Nothing in the pipeline aborts on a suspicious value. Each finding is
//! logged where it is detected and also recorded here, so callers can act on
//! it after the run.
//!
//! ```
//! use gridopf_core::{DiagnosticIssue, Diagnostics, Severity};
//!
//! let mut report = Diagnostics::new();
//! report.add(
//!     DiagnosticIssue::new(Severity::Warning, "bounds", "variable outside its bounds")
//!         .with_entity("bus_v[B1]")
//!         .with_value(1.12, 1.1),
//! );
//! assert_eq!(report.count(Severity::Warning), 1);
//! assert_eq!(report.summary(), "1 warning");
//! ```

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Suspicious, the solution is still usable
    Warning,
    /// The solution should not be trusted as-is
    Error,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// `solver`, `bounds` or `constraint`
    pub category: String,
    pub message: String,
    /// Variable or constraint name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
            value: None,
            limit: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Attach the offending value and the limit it was checked against.
    pub fn with_value(mut self, value: f64, limit: f64) -> Self {
        self.value = Some(value);
        self.limit = Some(limit);
        self
    }
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.severity.label(), self.category, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, ": {}", entity)?;
        }
        if let (Some(value), Some(limit)) = (self.value, self.limit) {
            write!(f, " ({:.6} vs {:.6})", value, limit)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    /// e.g. `"3 warnings, 1 error"`
    pub fn summary(&self) -> String {
        let part = |n: usize, word: &str| match n {
            1 => format!("1 {}", word),
            n => format!("{} {}s", n, word),
        };
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "clean".to_string(),
            (w, 0) => part(w, "warning"),
            (0, e) => part(e, "error"),
            (w, e) => format!("{}, {}", part(w, "warning"), part(e, "error")),
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "- {}", issue)?;
        }
        Ok(())
    }
}

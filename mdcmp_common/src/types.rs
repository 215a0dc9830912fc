use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single line of a comparison report. `indent` is the number of leading
/// spaces when rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLine {
    pub indent: usize,
    pub text: String,
}

/// Ordered textual comparison report, grouped by area in the order the
/// comparison visited them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub lines: Vec<ReportLine>,
}

impl Report {
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    pub fn push(&mut self, indent: usize, text: impl Into<String>) {
        self.lines.push(ReportLine {
            indent,
            text: text.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{:indent$}{}", "", line.text, indent = line.indent)?;
        }
        Ok(())
    }
}

/// Developer-signature lookup table used by authorship attribution: maps a
/// signature marker found in module text to a developer name. Read-only,
/// passed explicitly into the comparison.
pub type DeveloperSignatures = BTreeMap<String, String>;

/// Options for a configuration comparison.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Descend into procedure/function bodies when a module checksum differs.
    pub diff_module_bodies: bool,
    /// Attribute changed units to developers via signature-marker counts.
    pub attribute_authors: bool,
    /// Signature marker table; empty disables attribution regardless of
    /// `attribute_authors`.
    pub signatures: DeveloperSignatures,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_renders_with_indentation() {
        let mut report = Report::new();
        report.push(0, "Global module");
        report.push(4, "Функция Расчет()");
        report.push(7, "Added parameter \"X\"");

        let text = report.to_string();
        assert_eq!(
            text,
            "Global module\n    Функция Расчет()\n       Added parameter \"X\"\n"
        );
    }

    #[test]
    fn empty_report() {
        assert!(Report::new().is_empty());
    }
}

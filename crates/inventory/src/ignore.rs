use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Denylist of display SKUs excluded from every reconciliation output.
///
/// Entries are compared exactly (case-sensitive) against the SKU that would be displayed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IgnoreList(BTreeSet<String>);

impl IgnoreList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the newline-delimited form used in run configuration.
    ///
    /// Lines are trimmed; blank lines are skipped.
    pub fn parse(text: &str) -> Self {
        Self(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, sku: &str) -> bool {
        self.0.contains(sku)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for IgnoreList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

/// The five dimensions of the emissions cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Country,
    Category,
    Entity,
    SourceScenario,
    Time,
}

impl Axis {
    pub const ALL: [Axis; 5] = [
        Axis::Country,
        Axis::Category,
        Axis::Entity,
        Axis::SourceScenario,
        Axis::Time,
    ];

    /// Order in which dropdowns cascade: each axis is narrowed by the ones before it.
    pub const CASCADE: [Axis; 4] = [
        Axis::Country,
        Axis::Category,
        Axis::Entity,
        Axis::SourceScenario,
    ];

    pub fn index(&self) -> usize {
        match self {
            Axis::Country => 0,
            Axis::Category => 1,
            Axis::Entity => 2,
            Axis::SourceScenario => 3,
            Axis::Time => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Country => "country",
            Axis::Category => "category",
            Axis::Entity => "entity",
            Axis::SourceScenario => "source-scenario",
            Axis::Time => "time",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (data provenance, scenario) pair identifying one time series family.
///
/// Ordering is case-insensitive on source, then scenario, with the exact
/// strings as a final tie-break so that `Ord` agrees with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceScenario {
    source: String,
    scenario: String,
}

impl SourceScenario {
    pub fn new(source: impl Into<String>, scenario: impl Into<String>) -> Self {
        Self {
            source: source.into().trim().to_string(),
            scenario: scenario.into().trim().to_string(),
        }
    }

    /// Parse the `"source, scenario"` form. A label without a comma is a
    /// source with an empty scenario (e.g. `EDGAR`). A comma or backslash
    /// inside the source is written as `\,` or `\\`.
    pub fn parse(label: &str) -> Self {
        let mut source = String::new();
        let mut chars = label.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => source.push(escaped),
                    None => source.push('\\'),
                },
                ',' => return Self::new(source, &label[i + 1..]),
                _ => source.push(c),
            }
        }
        Self::new(source, "")
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Key used in the plotting config and in filters. Distinct pairs always
    /// have distinct keys.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SourceScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.source.chars() {
            if c == ',' || c == '\\' {
                f.write_char('\\')?;
            }
            f.write_char(c)?;
        }
        if !self.scenario.is_empty() {
            write!(f, ", {}", self.scenario)?;
        }
        Ok(())
    }
}

impl Ord for SourceScenario {
    fn cmp(&self, other: &Self) -> Ordering {
        self.source
            .to_lowercase()
            .cmp(&other.source.to_lowercase())
            .then_with(|| self.scenario.to_lowercase().cmp(&other.scenario.to_lowercase()))
            .then_with(|| self.source.cmp(&other.source))
            .then_with(|| self.scenario.cmp(&other.scenario))
    }
}

impl PartialOrd for SourceScenario {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-axis label restrictions. An axis without an entry is unrestricted.
///
/// Source-scenario labels use the `"source, scenario"` form and time labels
/// are years. A year range can be given in addition to explicit year labels;
/// both apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceFilter {
    labels: BTreeMap<Axis, BTreeSet<String>>,
    years: Option<(Option<i32>, Option<i32>)>,
}

impl SliceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, axis: Axis, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(axis, labels);
        self
    }

    pub fn with_label(self, axis: Axis, label: impl Into<String>) -> Self {
        self.with(axis, [label.into()])
    }

    /// Inclusive year bounds; `None` leaves that end open.
    pub fn with_years(mut self, from: Option<i32>, to: Option<i32>) -> Self {
        self.years = if from.is_none() && to.is_none() { None } else { Some((from, to)) };
        self
    }

    pub fn set<I, S>(&mut self, axis: Axis, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels
            .insert(axis, labels.into_iter().map(Into::into).collect());
    }

    pub fn get(&self, axis: Axis) -> Option<&BTreeSet<String>> {
        self.labels.get(&axis)
    }

    pub fn years(&self) -> Option<(Option<i32>, Option<i32>)> {
        self.years
    }

    /// Same filter with the restriction on `axis` lifted.
    pub fn without(&self, axis: Axis) -> Self {
        let mut out = self.clone();
        out.labels.remove(&axis);
        if axis == Axis::Time {
            out.years = None;
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.years.is_none()
    }

    pub fn axes(&self) -> impl Iterator<Item = (Axis, &BTreeSet<String>)> {
        self.labels.iter().map(|(axis, labels)| (*axis, labels))
    }
}

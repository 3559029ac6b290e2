//! Source-scenario inference and "Other" bucketing.
//!
//! The pure steps are `infer`, `classify_significance` and `group`;
//! `group_slice` runs all three and logs a summary.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::{DataCube, SourceScenario};
use crate::logging::{self, obj, v_num, Domain};

/// Key of the synthetic group, in the plotting config as well.
pub const OTHER_KEY: &str = "Other";

/// Number of source-scenarios drawn individually before the rest fold into "Other".
pub const DEFAULT_TOP_K: usize = 10;

/// Significance rule.
///
/// Pairs are ranked by coverage (number of non-missing cells in the slice),
/// then by magnitude (sum of absolute values), both descending, then by pair
/// order. The first `top_k` are significant; with `top_k` or fewer pairs all
/// are. If `min_share` is above zero, a pair whose magnitude is below that
/// share of the slice total is negligible even inside the top `top_k`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceRule {
    pub top_k: usize,
    pub min_share: f64,
}

impl Default for SignificanceRule {
    fn default() -> Self {
        Self { top_k: DEFAULT_TOP_K, min_share: 0.0 }
    }
}

impl SignificanceRule {
    pub fn top_k(top_k: usize) -> Self {
        Self { top_k, ..Self::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PairStats {
    pub coverage: usize,
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceScenarioGroup {
    Single(SourceScenario),
    /// Non-significant pairs, sorted. Never empty.
    Other(Vec<SourceScenario>),
}

impl SourceScenarioGroup {
    /// Key into the plotting config.
    pub fn key(&self) -> String {
        match self {
            SourceScenarioGroup::Single(pair) => pair.key(),
            SourceScenarioGroup::Other(_) => OTHER_KEY.to_string(),
        }
    }

    pub fn members(&self) -> &[SourceScenario] {
        match self {
            SourceScenarioGroup::Single(pair) => std::slice::from_ref(pair),
            SourceScenarioGroup::Other(members) => members,
        }
    }

    pub fn is_other(&self) -> bool {
        matches!(self, SourceScenarioGroup::Other(_))
    }
}

/// Pairs with at least one non-missing value in the slice, sorted.
/// All-missing pairs are dropped.
pub fn infer(slice: &DataCube) -> Vec<SourceScenario> {
    slice.source_scenarios_with_data()
}

pub fn pair_stats(slice: &DataCube, pairs: &[SourceScenario]) -> BTreeMap<SourceScenario, PairStats> {
    let mut stats: BTreeMap<SourceScenario, PairStats> =
        pairs.iter().map(|p| (p.clone(), PairStats::default())).collect();
    for cell in slice.cells() {
        if let Some(s) = stats.get_mut(cell.source_scenario) {
            s.coverage += 1;
            s.magnitude += cell.value.abs();
        }
    }
    stats
}

pub fn classify_significance(
    slice: &DataCube,
    pairs: &[SourceScenario],
    rule: &SignificanceRule,
) -> BTreeMap<SourceScenario, bool> {
    let stats = pair_stats(slice, pairs);
    let mut ranked: Vec<(&SourceScenario, &PairStats)> = stats.iter().collect();
    ranked.sort_by(|(pa, a), (pb, b)| {
        b.coverage
            .cmp(&a.coverage)
            .then_with(|| b.magnitude.partial_cmp(&a.magnitude).unwrap_or(Ordering::Equal))
            .then_with(|| pa.cmp(pb))
    });

    let total: f64 = stats.values().map(|s| s.magnitude).sum();
    let everyone_fits = ranked.len() <= rule.top_k;

    ranked
        .iter()
        .enumerate()
        .map(|(rank, (pair, s))| {
            let in_top = everyone_fits || rank < rule.top_k;
            let negligible = rule.min_share > 0.0 && total > 0.0 && s.magnitude / total < rule.min_share;
            ((*pair).clone(), s.coverage > 0 && in_top && !negligible)
        })
        .collect()
}

/// Significant pairs as singletons in pair order, then one "Other" holding
/// the rest. A pair absent from `significance` counts as not significant.
pub fn group(pairs: &[SourceScenario], significance: &BTreeMap<SourceScenario, bool>) -> Vec<SourceScenarioGroup> {
    let mut sorted = pairs.to_vec();
    sorted.sort();
    sorted.dedup();

    let (significant, rest): (Vec<SourceScenario>, Vec<SourceScenario>) = sorted
        .into_iter()
        .partition(|p| significance.get(p).copied().unwrap_or(false));

    let mut groups: Vec<SourceScenarioGroup> =
        significant.into_iter().map(SourceScenarioGroup::Single).collect();
    if !rest.is_empty() {
        groups.push(SourceScenarioGroup::Other(rest));
    }
    groups
}

/// `infer` → `classify_significance` → `group` over one slice.
pub fn group_slice(slice: &DataCube, rule: &SignificanceRule) -> Vec<SourceScenarioGroup> {
    let pairs = infer(slice);
    let significance = classify_significance(slice, &pairs, rule);
    let groups = group(&pairs, &significance);

    let other = groups
        .iter()
        .find(|g| g.is_other())
        .map(|g| g.members().len())
        .unwrap_or(0);
    logging::debug(
        Domain::Grouping,
        "grouped",
        obj(&[
            ("pairs", v_num(pairs.len() as f64)),
            ("singles", v_num((groups.len() - usize::from(other > 0)) as f64)),
            ("other_members", v_num(other as f64)),
            ("top_k", v_num(rule.top_k as f64)),
        ]),
    );
    groups
}

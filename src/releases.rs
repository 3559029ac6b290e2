//! Release-aware layout of the source-scenarios in a dataset.
//!
//! A PRIMAP-hist dataset carries two releases of PRIMAP-hist itself, each in
//! a country-reported and a third-party variant, next to any number of other
//! sources. Other sources that share a stem (`EDGAR 2022, History` and
//! `EDGAR 2023, History`) are successive releases of the same thing and are
//! grouped into a family ordered from oldest to newest.

use std::collections::BTreeMap;

use semver::Version;

use crate::data::SourceScenario;
use crate::error::{EngineError, EngineResult};
use crate::logging::{self, obj, v_list, v_str, Domain};

pub const PRIMAP_PREFIX: &str = "PRIMAP-hist";

/// Scenario of the country-reported PRIMAP-hist variant.
pub const COUNTRY_REPORTED: &str = "HISTCR";

/// Scenario of the third-party PRIMAP-hist variant.
pub const THIRD_PARTY: &str = "HISTTP";

const EXPECTED_PRIMAP_RELEASES: usize = 2;

/// The two PRIMAP-hist sources in a dataset, e.g. `PRIMAP-hist_v2.5_final_nr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimapReleases {
    pub older: String,
    pub newer: String,
}

impl PrimapReleases {
    /// Sources from newest to oldest.
    pub fn newest_first(&self) -> [&str; 2] {
        [&self.newer, &self.older]
    }

    /// Country-reported then third-party, newest release first.
    pub fn variants(&self) -> Vec<SourceScenario> {
        self.newest_first()
            .into_iter()
            .flat_map(|source| {
                [
                    SourceScenario::new(source, COUNTRY_REPORTED),
                    SourceScenario::new(source, THIRD_PARTY),
                ]
            })
            .collect()
    }
}

/// Successive releases of one non-PRIMAP source, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFamily {
    pub stem: String,
    pub members: Vec<SourceScenario>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceScenarioDefinition {
    pub primap: PrimapReleases,
    /// Every non-PRIMAP pair, sorted by key.
    pub others: Vec<SourceScenario>,
}

impl SourceScenarioDefinition {
    pub fn families(&self) -> Vec<SourceFamily> {
        group_families(&self.others)
    }
}

/// Read a release version such as `v2.5`, `2023`, `1.4` or `v3.0-alpha`.
/// Missing minor and patch numbers count as zero. Anything else is `None`.
pub fn parse_release(raw: &str) -> Option<Version> {
    let raw = raw.strip_prefix('v').or_else(|| raw.strip_prefix('V')).unwrap_or(raw);
    let (release, pre) = match raw.split_once('-') {
        Some((release, pre)) => (release, Some(pre)),
        None => (raw, None),
    };

    let mut numbers = [0u64; 3];
    for (i, piece) in release.split('.').enumerate() {
        if i >= numbers.len() || !piece.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        numbers[i] = piece.parse().ok()?;
    }
    let mut text = format!("{}.{}.{}", numbers[0], numbers[1], numbers[2]);
    if let Some(pre) = pre {
        text.push('-');
        text.push_str(pre);
    }
    Version::parse(&text).ok()
}

fn is_primap(pair: &SourceScenario) -> bool {
    pair.source().starts_with(PRIMAP_PREFIX)
}

/// The version of a PRIMAP-hist source sits between the first two underscores.
fn primap_release(source: &str) -> Option<Version> {
    source.split('_').nth(1).and_then(parse_release)
}

/// Split `pairs` into the two PRIMAP-hist releases and everything else.
///
/// Fails unless there are exactly two PRIMAP-hist sources, both with a
/// readable version, and each has both variants.
pub fn infer_definition(pairs: &[SourceScenario]) -> EngineResult<SourceScenarioDefinition> {
    let mut others: Vec<SourceScenario> = pairs.iter().filter(|p| !is_primap(p)).cloned().collect();
    others.sort_by_key(|p| p.key());
    others.dedup();

    let mut sources: Vec<&str> = pairs.iter().filter(|p| is_primap(p)).map(|p| p.source()).collect();
    sources.sort_unstable();
    sources.dedup();
    if sources.len() != EXPECTED_PRIMAP_RELEASES {
        return Err(EngineError::source_layout(format!(
            "expected {} {} sources, found {:?}",
            EXPECTED_PRIMAP_RELEASES, PRIMAP_PREFIX, sources
        )));
    }

    let mut releases = Vec::with_capacity(sources.len());
    for source in sources {
        let version = primap_release(source)
            .ok_or_else(|| EngineError::source_layout(format!("no release version in {:?}", source)))?;
        releases.push((version, source));
    }
    releases.sort();
    let primap = PrimapReleases {
        older: releases[0].1.to_string(),
        newer: releases[1].1.to_string(),
    };

    let missing: Vec<String> = primap
        .variants()
        .into_iter()
        .filter(|v| !pairs.contains(v))
        .map(|v| v.key())
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::source_layout(format!(
            "missing {} variants {:?}",
            PRIMAP_PREFIX, missing
        )));
    }

    logging::debug(
        Domain::Grouping,
        "primap_releases",
        obj(&[
            ("older", v_str(&primap.older)),
            ("newer", v_str(&primap.newer)),
            ("others", logging::v_num(others.len() as f64)),
        ]),
    );
    Ok(SourceScenarioDefinition { primap, others })
}

/// Everything up to the first space of the key.
fn stem(key: &str) -> &str {
    key.split(' ').next().unwrap_or(key)
}

/// Group pairs by stem, stems in byte order. A family of one keeps its single
/// member; larger families are ordered by the version after the stem.
pub fn group_families(pairs: &[SourceScenario]) -> Vec<SourceFamily> {
    let mut by_stem: BTreeMap<String, Vec<SourceScenario>> = BTreeMap::new();
    for pair in pairs {
        let key = pair.key();
        by_stem.entry(stem(&key).to_string()).or_default().push(pair.clone());
    }
    by_stem
        .into_iter()
        .map(|(stem, members)| {
            let members = if members.len() == 1 { members } else { order_releases(members) };
            SourceFamily { stem, members }
        })
        .collect()
}

/// Oldest first by the version in the second word of each key. If any member
/// has no readable version the family is sorted by key instead.
pub fn order_releases(mut members: Vec<SourceScenario>) -> Vec<SourceScenario> {
    members.sort_by_key(|m| m.key());
    let versions: Option<Vec<Version>> = members
        .iter()
        .map(|m| {
            let key = m.key();
            key.split(' ').nth(1).and_then(|word| parse_release(word.trim_matches(',')))
        })
        .collect();

    let Some(versions) = versions else {
        let keys: Vec<String> = members.iter().map(SourceScenario::key).collect();
        logging::warn(
            Domain::Grouping,
            "release_order_unknown",
            obj(&[("members", v_list(&keys))]),
        );
        return members;
    };

    let mut paired: Vec<(Version, SourceScenario)> = versions.into_iter().zip(members).collect();
    paired.sort_by(|a, b| a.0.cmp(&b.0));
    paired.into_iter().map(|(_, m)| m).collect()
}

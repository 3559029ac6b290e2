//! Dropdown options and defaults with cascading filters.
//!
//! Each axis offers only the labels that still have data under the choices
//! already made on the other axes. Defaults prefer a configured value when it
//! is on offer and otherwise take the first option.

use serde::{Deserialize, Serialize};

use crate::countries;
use crate::data::{Axis, DataCube, SliceFilter};
use crate::error::{EngineError, EngineResult};
use crate::logging::{self, obj, v_num, v_str, Domain};

/// Gas baskets in display order. Entities match on the name before any
/// `" (GWP)"` suffix.
const ENTITY_ORDER: [&str; 9] = [
    "KYOTOGHG", "CO2", "CH4", "N2O", "FGASES", "HFCS", "PFCS", "SF6", "NF3",
];

/// Preferred starting values. A preference only applies if it is among the
/// options; otherwise the first option is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDefaults {
    pub country: Option<String>,
    pub category: Option<String>,
    pub entity: Option<String>,
    pub source_scenario: Option<String>,
    /// Countries listed here sort ahead of the rest, in this order.
    pub country_priority: Vec<String>,
}

impl Default for OptionDefaults {
    fn default() -> Self {
        Self {
            country: Some("EARTH".to_string()),
            category: Some("M.0.EL".to_string()),
            entity: Some("KYOTOGHG (AR6GWP100)".to_string()),
            source_scenario: Some("PRIMAP-hist_v2.5_final_nr, HISTCR".to_string()),
            country_priority: vec!["EARTH".to_string()],
        }
    }
}

impl OptionDefaults {
    /// Plain lexical ordering and first-option defaults everywhere.
    pub fn none() -> Self {
        Self {
            country: None,
            category: None,
            entity: None,
            source_scenario: None,
            country_priority: Vec::new(),
        }
    }

    fn preferred(&self, axis: Axis) -> Option<&str> {
        match axis {
            Axis::Country => self.country.as_deref(),
            Axis::Category => self.category.as_deref(),
            Axis::Entity => self.entity.as_deref(),
            Axis::SourceScenario => self.source_scenario.as_deref(),
            Axis::Time => None,
        }
    }
}

/// What the user currently has selected. Any field may be absent or stale.
/// The country may be given as a code or as its display name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub country: Option<String>,
    pub category: Option<String>,
    pub entity: Option<String>,
    pub source_scenario: Option<String>,
    pub from_year: Option<i32>,
    pub to_year: Option<i32>,
}

impl Selection {
    fn requested(&self, axis: Axis) -> Option<&str> {
        match axis {
            Axis::Country => self.country.as_deref().map(countries::name_to_iso3),
            Axis::Category => self.category.as_deref(),
            Axis::Entity => self.entity.as_deref(),
            Axis::SourceScenario => self.source_scenario.as_deref(),
            Axis::Time => None,
        }
    }
}

/// A selection in which every dropdown holds a valid value, with the option
/// list each dropdown should show.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSelection {
    pub country: String,
    pub country_name: String,
    pub category: String,
    pub entity: String,
    pub source_scenario: String,
    pub country_options: Vec<String>,
    /// Display names for `country_options`, position for position.
    pub country_names: Vec<String>,
    pub category_options: Vec<String>,
    pub entity_options: Vec<String>,
    pub source_scenario_options: Vec<String>,
    /// Years with data for the fully resolved selection.
    pub years: Vec<i32>,
    pub from_year: Option<i32>,
    pub to_year: Option<i32>,
}

impl ResolvedSelection {
    /// Filter for the plotted slice: country, category and entity fixed, every
    /// source-scenario kept so that they can be grouped.
    pub fn plot_filter(&self) -> SliceFilter {
        SliceFilter::new()
            .with_label(Axis::Country, self.country.clone())
            .with_label(Axis::Category, self.category.clone())
            .with_label(Axis::Entity, self.entity.clone())
            .with_years(self.from_year, self.to_year)
    }
}

pub struct OptionInference<'a> {
    cube: &'a DataCube,
    defaults: OptionDefaults,
}

impl<'a> OptionInference<'a> {
    pub fn new(cube: &'a DataCube) -> Self {
        Self::with_defaults(cube, OptionDefaults::default())
    }

    pub fn with_defaults(cube: &'a DataCube, defaults: OptionDefaults) -> Self {
        Self { cube, defaults }
    }

    /// Labels on `axis` with at least one value under the other axes' constraints
    /// in `given`. The constraint `given` places on `axis` itself is ignored.
    pub fn options_for(&self, axis: Axis, given: &SliceFilter) -> EngineResult<Vec<String>> {
        let view = self.cube.slice(&given.without(axis))?;
        let mut labels = view.labels_with_data(axis);
        match axis {
            Axis::Country => labels = prioritise(labels, &self.defaults.country_priority),
            Axis::Entity => sort_entity_options(&mut labels),
            // Category is lexical, source-scenario and time come back in axis order.
            _ => {}
        }
        if labels.is_empty() {
            logging::debug(
                Domain::Options,
                "empty_options",
                obj(&[("axis", v_str(axis.as_str())), ("constraints", v_num(given.axes().count() as f64))]),
            );
            return Err(EngineError::EmptyOptions { axis });
        }
        Ok(labels)
    }

    /// The configured preference if it is on offer, the most recent year for
    /// the time axis, otherwise the first option.
    pub fn default_for(&self, axis: Axis, given: &SliceFilter) -> EngineResult<String> {
        let options = self.options_for(axis, given)?;
        Ok(self.pick_default(axis, &options))
    }

    fn pick_default(&self, axis: Axis, options: &[String]) -> String {
        if axis == Axis::Time {
            return options.last().cloned().unwrap_or_default();
        }
        if let Some(preferred) = self.defaults.preferred(axis) {
            if options.iter().any(|o| o == preferred) {
                return preferred.to_string();
            }
        }
        options.first().cloned().unwrap_or_default()
    }

    /// Walk country → category → entity → source-scenario, keeping each
    /// requested value that is still valid and defaulting the rest.
    pub fn resolve(&self, selection: &Selection) -> EngineResult<ResolvedSelection> {
        let mut filter = SliceFilter::new().with_years(selection.from_year, selection.to_year);
        let mut chosen: Vec<String> = Vec::with_capacity(Axis::CASCADE.len());
        let mut option_lists: Vec<Vec<String>> = Vec::with_capacity(Axis::CASCADE.len());

        for axis in Axis::CASCADE {
            let options = self.options_for(axis, &filter)?;
            let value = match selection.requested(axis) {
                Some(requested) if options.iter().any(|o| o == requested) => requested.to_string(),
                Some(requested) => {
                    let fallback = self.pick_default(axis, &options);
                    logging::debug(
                        Domain::Options,
                        "selection_fallback",
                        obj(&[
                            ("axis", v_str(axis.as_str())),
                            ("requested", v_str(requested)),
                            ("chosen", v_str(&fallback)),
                        ]),
                    );
                    fallback
                }
                None => self.pick_default(axis, &options),
            };
            filter.set(axis, [value.clone()]);
            chosen.push(value);
            option_lists.push(options);
        }

        let years = self.cube.slice(&filter)?.years_with_data();
        let mut chosen = chosen.into_iter();
        let mut option_lists = option_lists.into_iter();
        let mut next = || (chosen.next().unwrap_or_default(), option_lists.next().unwrap_or_default());
        let (country, country_options) = next();
        let (category, category_options) = next();
        let (entity, entity_options) = next();
        let (source_scenario, source_scenario_options) = next();

        let country_name = countries::iso3_to_name(&country).to_string();
        let country_names = country_options
            .iter()
            .map(|c| countries::iso3_to_name(c).to_string())
            .collect();

        Ok(ResolvedSelection {
            country,
            country_name,
            category,
            entity,
            source_scenario,
            country_options,
            country_names,
            category_options,
            entity_options,
            source_scenario_options,
            years,
            from_year: selection.from_year,
            to_year: selection.to_year,
        })
    }
}

fn prioritise(labels: Vec<String>, priority: &[String]) -> Vec<String> {
    let mut out: Vec<String> = priority
        .iter()
        .filter(|p| labels.contains(p))
        .cloned()
        .collect();
    out.extend(labels.into_iter().filter(|l| !priority.contains(l)));
    out
}

pub fn resolve_selection(
    cube: &DataCube,
    selection: &Selection,
    defaults: &OptionDefaults,
) -> EngineResult<ResolvedSelection> {
    OptionInference::with_defaults(cube, defaults.clone()).resolve(selection)
}

/// Order entities by gas basket, then by full name. Unknown entities go last.
pub fn sort_entity_options(entities: &mut [String]) {
    entities.sort_by(|a, b| {
        entity_rank(a)
            .cmp(&entity_rank(b))
            .then_with(|| a.cmp(b))
    });
}

fn entity_rank(entity: &str) -> usize {
    let basket = entity.split(" (").next().unwrap_or(entity).trim();
    ENTITY_ORDER
        .iter()
        .position(|e| *e == basket)
        .unwrap_or(ENTITY_ORDER.len())
}

/// Move `n_steps` through `options` from `current`, wrapping at both ends.
/// An unknown `current` counts as the first option.
pub fn step_option(options: &[String], current: &str, n_steps: i64) -> Option<String> {
    if options.is_empty() {
        return None;
    }
    let len = options.len() as i64;
    let start = options.iter().position(|o| o == current).unwrap_or(0) as i64;
    let idx = (start + n_steps.rem_euclid(len)) % len;
    options.get(idx as usize).cloned()
}

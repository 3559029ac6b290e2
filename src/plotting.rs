//! Plotting style configuration: one line style per source-scenario group.
//!
//! The document lives next to the dataset and is meant to be edited by hand.
//! Reconciliation only ever appends entries for groups it has not seen
//! before. Existing entries, including ones for groups that are no longer in
//! the data, are carried through untouched.
//!
//! ```json
//! {
//!   "source_scenario_settings": {
//!     "PRIMAP-hist_v2.5_final_nr, HISTCR": {"color": "rgb(0, 0, 255)", "dash": "solid", "width": 3},
//!     "Other": {"color": "rgb(50, 200, 255)", "dash": "solid", "width": 3}
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

use crate::data::SourceScenario;
use crate::error::{EngineError, EngineResult};
use crate::grouping::SourceScenarioGroup;
use crate::logging::{self, obj, v_list, v_num, v_str, Domain};
use crate::releases::{SourceScenarioDefinition, COUNTRY_REPORTED, THIRD_PARTY};
use crate::reliability::atomic::write_atomic;
use crate::reliability::locks::with_path_lock;

const SETTINGS_SECTION: &str = "source_scenario_settings";

/// Colours handed out to new groups, cycled by position.
pub const DEFAULT_PALETTE: [&str; 13] = [
    "rgb(0, 0, 255)",
    "rgb(50, 200, 255)",
    "rgb(0, 0, 255)",
    "rgb(60, 179, 113)",
    "rgb(238, 130, 238)",
    "rgb(255, 165, 0)",
    "rgb(106, 90, 205)",
    "rgb(50, 0, 255)",
    "rgb(100, 0, 255)",
    "rgb(150, 0, 255)",
    "rgb(200, 0, 255)",
    "rgb(50, 50, 255)",
    "rgb(255, 0, 0)",
];

pub const DEFAULT_DASH: DashStyle = DashStyle::Solid;

pub const DEFAULT_WIDTH: u32 = 3;

pub const PRIMAP_CR_COLOR: &str = "rgb(0, 0, 0)";

pub const PRIMAP_TP_COLOR: &str = "rgb(166, 166, 166)";

/// Dashes for releases older than the newest, cycled.
pub const OLDER_DASHES: [DashStyle; 5] = [
    DashStyle::Dot,
    DashStyle::Dash,
    DashStyle::Longdash,
    DashStyle::Dashdot,
    DashStyle::Longdashdot,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashStyle {
    Solid,
    Dot,
    Dash,
    Longdash,
    Dashdot,
    Longdashdot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    pub color: String,
    pub dash: DashStyle,
    pub width: f64,
}

impl LineStyle {
    fn validate(&self) -> Result<(), String> {
        if self.color.trim().is_empty() {
            return Err("color is empty".to_string());
        }
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err(format!("width must be positive, got {}", self.width));
        }
        Ok(())
    }

    /// Whole widths are written as integers, matching hand-written files.
    fn to_value(&self) -> Value {
        let width = if self.width.fract() == 0.0 && self.width < u32::MAX as f64 {
            json!(self.width as u64)
        } else {
            json!(self.width)
        };
        json!({ "color": self.color, "dash": self.dash, "width": width })
    }
}

/// Palette colour for a position; the palette cycles.
pub fn palette_color(position: usize) -> &'static str {
    DEFAULT_PALETTE[position % DEFAULT_PALETTE.len()]
}

/// Default style for the entry at `position`. If that palette colour matches
/// the colour of the entry before it, the next palette colour is used.
pub fn default_style(position: usize, previous_color: Option<&str>) -> LineStyle {
    let mut color = palette_color(position);
    if previous_color == Some(color) {
        color = palette_color(position + 1);
    }
    LineStyle {
        color: color.to_string(),
        dash: DEFAULT_DASH,
        width: DEFAULT_WIDTH as f64,
    }
}

/// Dash for a release `age` steps older than the newest one.
pub fn release_dash(age: usize) -> DashStyle {
    match age {
        0 => DEFAULT_DASH,
        n => OLDER_DASHES[(n - 1) % OLDER_DASHES.len()],
    }
}

/// Starting document for a dataset whose layout is known: the PRIMAP-hist
/// variants first, black for country-reported and grey for third-party, then
/// one palette colour per source family. Within a release line the newest is
/// solid and older ones are dashed.
pub fn default_document(definition: &SourceScenarioDefinition) -> PlottingConfigDocument {
    let mut document = PlottingConfigDocument::new();
    let width = DEFAULT_WIDTH as f64;

    for (age, source) in definition.primap.newest_first().into_iter().enumerate() {
        for (scenario, color) in [(COUNTRY_REPORTED, PRIMAP_CR_COLOR), (THIRD_PARTY, PRIMAP_TP_COLOR)] {
            let style = LineStyle { color: color.to_string(), dash: release_dash(age), width };
            document.set_style(&SourceScenario::new(source, scenario).key(), &style);
        }
    }

    for (i, family) in definition.families().iter().enumerate() {
        let color = palette_color(i);
        for (age, member) in family.members.iter().rev().enumerate() {
            let style = LineStyle { color: color.to_string(), dash: release_dash(age), width };
            document.set_style(&member.key(), &style);
        }
    }
    document
}

/// Ordered map from group key to style entry.
///
/// Entries are kept as the JSON values they were read as, so fields a user
/// added by hand survive a rewrite. Other top-level keys keep their place
/// before or after the settings section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlottingConfigDocument {
    settings: Map<String, Value>,
    leading: Map<String, Value>,
    trailing: Map<String, Value>,
}

impl PlottingConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate. `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path) -> EngineResult<Self> {
        let root: Value = serde_json::from_str(text).map_err(|e| EngineError::config_parse(path, e))?;
        let Value::Object(root) = root else {
            return Err(EngineError::config_parse(path, "top level must be an object"));
        };
        let mut settings = None;
        let mut leading = Map::new();
        let mut trailing = Map::new();
        for (key, value) in root {
            if key == SETTINGS_SECTION {
                match value {
                    Value::Object(section) => settings = Some(section),
                    _ => {
                        return Err(EngineError::config_parse(
                            path,
                            format!("`{}` must be an object", SETTINGS_SECTION),
                        ))
                    }
                }
            } else if settings.is_none() {
                leading.insert(key, value);
            } else {
                trailing.insert(key, value);
            }
        }
        let Some(settings) = settings else {
            return Err(EngineError::config_parse(
                path,
                format!("missing `{}` section", SETTINGS_SECTION),
            ));
        };
        for (key, entry) in &settings {
            let style: LineStyle = serde_json::from_value(entry.clone())
                .map_err(|e| EngineError::config_parse(path, format!("entry {:?}: {}", key, e)))?;
            style
                .validate()
                .map_err(|e| EngineError::config_parse(path, format!("entry {:?}: {}", key, e)))?;
        }
        Ok(Self { settings, leading, trailing })
    }

    pub fn to_json_string(&self) -> String {
        let mut root = self.leading.clone();
        root.insert(SETTINGS_SECTION.to_string(), Value::Object(self.settings.clone()));
        for (k, v) in &self.trailing {
            root.insert(k.clone(), v.clone());
        }
        let mut text = serde_json::to_string_pretty(&Value::Object(root)).unwrap_or_else(|_| "{}".to_string());
        text.push('\n');
        text
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.settings.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.settings.keys().map(String::as_str)
    }

    pub fn style(&self, key: &str) -> Option<LineStyle> {
        self.settings
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set an entry, as a user edit would. Existing keys keep their position.
    pub fn set_style(&mut self, key: &str, style: &LineStyle) {
        self.settings.insert(key.to_string(), style.to_value());
    }

    fn last_color(&self) -> Option<String> {
        let (_, last) = self.settings.iter().last()?;
        last.get("color").and_then(Value::as_str).map(str::to_string)
    }

    fn push_default(&mut self, key: &str) {
        let style = default_style(self.settings.len(), self.last_color().as_deref());
        self.settings.insert(key.to_string(), style.to_value());
    }
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub document: PlottingConfigDocument,
    /// Keys appended in this pass, in group order.
    pub added: Vec<String>,
}

impl Reconciled {
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Append a default entry for every group key the document lacks. The palette
/// position continues from the number of entries already present.
pub fn reconcile(mut document: PlottingConfigDocument, groups: &[SourceScenarioGroup]) -> Reconciled {
    let mut added = Vec::new();
    for group in groups {
        let key = group.key();
        if document.contains(&key) {
            continue;
        }
        document.push_default(&key);
        added.push(key);
    }
    Reconciled { document, added }
}

/// Styles for `groups`, in group order. A group missing from the document
/// gets the default it would receive on reconciliation.
pub fn style_mapping(document: &PlottingConfigDocument, groups: &[SourceScenarioGroup]) -> Vec<(String, LineStyle)> {
    let mut scratch = document.clone();
    groups
        .iter()
        .map(|g| {
            let key = g.key();
            if !scratch.contains(&key) {
                scratch.push_default(&key);
            }
            let style = scratch
                .style(&key)
                .unwrap_or_else(|| default_style(0, None));
            (key, style)
        })
        .collect()
}

/// Load the document at `path`, or create it from `groups` if there is none,
/// and reconcile it. The file is written only when new keys were added.
pub fn load_or_create(path: &Path, groups: &[SourceScenarioGroup]) -> EngineResult<PlottingConfigDocument> {
    load_or_seed(path, PlottingConfigDocument::new(), groups)
}

/// As `load_or_create`, but a missing file starts from `seed` rather than an
/// empty document. An existing file is never compared against `seed`.
pub fn load_or_seed(
    path: &Path,
    seed: PlottingConfigDocument,
    groups: &[SourceScenarioGroup],
) -> EngineResult<PlottingConfigDocument> {
    with_path_lock(path, || {
        if !path.exists() {
            let reconciled = reconcile(seed, groups);
            write_unlocked(path, &reconciled.document)?;
            logging::info(
                Domain::Config,
                "plotting_config_created",
                obj(&[
                    ("path", v_str(&path.display().to_string())),
                    ("entries", v_num(reconciled.document.len() as f64)),
                ]),
            );
            return Ok(reconciled.document);
        }

        let text = fs::read_to_string(path).map_err(|e| EngineError::store_read(path, e))?;
        let document = PlottingConfigDocument::parse(&text, path)?;
        let reconciled = reconcile(document, groups);
        if reconciled.changed() {
            write_unlocked(path, &reconciled.document)?;
            logging::info(
                Domain::Config,
                "plotting_config_reconciled",
                obj(&[
                    ("path", v_str(&path.display().to_string())),
                    ("added", v_list(&reconciled.added)),
                ]),
            );
        } else {
            logging::debug(
                Domain::Config,
                "plotting_config_unchanged",
                obj(&[("path", v_str(&path.display().to_string()))]),
            );
        }
        Ok(reconciled.document)
    })
}

/// Throw away whatever is at `path` and write a fresh default document.
/// For callers that prefer starting over to aborting on a malformed file.
pub fn regenerate(path: &Path, groups: &[SourceScenarioGroup]) -> EngineResult<PlottingConfigDocument> {
    regenerate_from(path, PlottingConfigDocument::new(), groups)
}

/// As `regenerate`, starting from `seed`.
pub fn regenerate_from(
    path: &Path,
    seed: PlottingConfigDocument,
    groups: &[SourceScenarioGroup],
) -> EngineResult<PlottingConfigDocument> {
    with_path_lock(path, || {
        let document = reconcile(seed, groups).document;
        write_unlocked(path, &document)?;
        logging::warn(
            Domain::Config,
            "plotting_config_regenerated",
            obj(&[
                ("path", v_str(&path.display().to_string())),
                ("entries", v_num(document.len() as f64)),
            ]),
        );
        Ok(document)
    })
}

/// Persist `document` to `path`, for example after a user edit.
pub fn write_document(path: &Path, document: &PlottingConfigDocument) -> EngineResult<()> {
    with_path_lock(path, || write_unlocked(path, document))
}

fn write_unlocked(path: &Path, document: &PlottingConfigDocument) -> EngineResult<()> {
    write_atomic(path, document.to_json_string().as_bytes()).map_err(|e| EngineError::store_write(path, e))
}

//! The loaded emissions dataset and its filtered views.
//!
//! A [`DataCube`] is a sparse labelled array over country, category, entity,
//! source-scenario and year. Only non-missing cells are stored; the axis label
//! sets still include labels whose every value is missing. The storage is
//! shared behind an `Arc` and never mutated after load, so slicing is cheap
//! and views can be handed to any number of readers.

mod axis;

pub use axis::{Axis, SliceFilter, SourceScenario};

use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::logging::{self, obj, v_num, v_str, Domain};

/// Header aliases accepted by the CSV loader, matched case-insensitively.
const COUNTRY_COLUMNS: &[&str] = &["country", "area", "area (iso3)"];
const CATEGORY_COLUMNS: &[&str] = &["category", "category (ipcc2006_primap)"];
const ENTITY_COLUMNS: &[&str] = &["entity"];
const SOURCE_COLUMNS: &[&str] = &["source"];
const SCENARIO_COLUMNS: &[&str] = &["scenario", "scenario (primap-hist)"];
const SOURCE_SCENARIO_COLUMNS: &[&str] = &["source_scenario", "sourcescen"];
const TIME_COLUMNS: &[&str] = &["time", "year"];
const VALUE_COLUMNS: &[&str] = &["value"];

const MISSING_MARKERS: &[&str] = &["", "nan", "na", "n/a", "null"];

/// One row of input, before interning.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub country: String,
    pub category: String,
    pub entity: String,
    pub source_scenario: SourceScenario,
    pub year: i32,
    pub value: Option<f64>,
}

/// Borrowed view of one non-missing cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRef<'a> {
    pub country: &'a str,
    pub category: &'a str,
    pub entity: &'a str,
    pub source_scenario: &'a SourceScenario,
    pub year: i32,
    pub value: f64,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    coords: [u32; 5],
    value: f64,
}

#[derive(Debug)]
struct CubeStore {
    path: PathBuf,
    fingerprint: String,
    countries: Vec<String>,
    categories: Vec<String>,
    entities: Vec<String>,
    source_scenarios: Vec<SourceScenario>,
    years: Vec<i32>,
    cells: Vec<Cell>,
}

impl CubeStore {
    fn axis_len(&self, axis: Axis) -> usize {
        match axis {
            Axis::Country => self.countries.len(),
            Axis::Category => self.categories.len(),
            Axis::Entity => self.entities.len(),
            Axis::SourceScenario => self.source_scenarios.len(),
            Axis::Time => self.years.len(),
        }
    }

    fn label(&self, axis: Axis, idx: usize) -> String {
        match axis {
            Axis::Country => self.countries[idx].clone(),
            Axis::Category => self.categories[idx].clone(),
            Axis::Entity => self.entities[idx].clone(),
            Axis::SourceScenario => self.source_scenarios[idx].key(),
            Axis::Time => self.years[idx].to_string(),
        }
    }

    /// Axis vectors are sorted at load. Source-scenarios match on their key
    /// string, since sources may themselves contain commas.
    fn position(&self, axis: Axis, label: &str) -> Option<usize> {
        match axis {
            Axis::Country => self.countries.binary_search_by(|l| l.as_str().cmp(label)).ok(),
            Axis::Category => self.categories.binary_search_by(|l| l.as_str().cmp(label)).ok(),
            Axis::Entity => self.entities.binary_search_by(|l| l.as_str().cmp(label)).ok(),
            Axis::SourceScenario => {
                let label = label.trim();
                self.source_scenarios.iter().position(|s| s.key() == label)
            }
            Axis::Time => {
                let year: i32 = label.trim().parse().ok()?;
                self.years.binary_search(&year).ok()
            }
        }
    }
}

/// Immutable view over the loaded dataset.
#[derive(Debug, Clone)]
pub struct DataCube {
    store: Arc<CubeStore>,
    masks: Arc<Vec<Vec<bool>>>,
    rows: Arc<Vec<u32>>,
}

impl DataCube {
    /// Load a long-format CSV dataset.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let fingerprint = file_sha256(path).map_err(|e| EngineError::load(path, e))?;
        let records = read_records(path).map_err(|e| EngineError::load(path, e))?;
        if records.is_empty() {
            return Err(EngineError::load(path, "dataset contains no rows"));
        }
        let cube = Self::build(path.to_path_buf(), fingerprint, records);

        logging::info(
            Domain::Data,
            "dataset_loaded",
            obj(&[
                ("path", v_str(&path.display().to_string())),
                ("sha256", v_str(&cube.store.fingerprint)),
                ("countries", v_num(cube.store.countries.len() as f64)),
                ("categories", v_num(cube.store.categories.len() as f64)),
                ("entities", v_num(cube.store.entities.len() as f64)),
                ("source_scenarios", v_num(cube.store.source_scenarios.len() as f64)),
                ("years", v_num(cube.store.years.len() as f64)),
                ("cells", v_num(cube.len() as f64)),
            ]),
        );
        Ok(cube)
    }

    /// Build a cube from in-memory records. Labels of records with a missing
    /// value still land on their axes.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self::build(PathBuf::new(), String::new(), records)
    }

    fn build(path: PathBuf, fingerprint: String, records: Vec<Record>) -> Self {
        let countries = sorted_unique(records.iter().map(|r| r.country.clone()));
        let categories = sorted_unique(records.iter().map(|r| r.category.clone()));
        let entities = sorted_unique(records.iter().map(|r| r.entity.clone()));
        let source_scenarios = sorted_unique(records.iter().map(|r| r.source_scenario.clone()));
        let years = sorted_unique(records.iter().map(|r| r.year));

        let country_idx = index_of(&countries);
        let category_idx = index_of(&categories);
        let entity_idx = index_of(&entities);
        let ss_idx: HashMap<SourceScenario, u32> = source_scenarios
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32))
            .collect();
        let year_idx: HashMap<i32, u32> =
            years.iter().enumerate().map(|(i, y)| (*y, i as u32)).collect();

        let mut cells: Vec<Cell> = Vec::new();
        let mut seen: HashMap<[u32; 5], usize> = HashMap::new();
        let mut duplicates = 0u64;
        for r in &records {
            let coords = [
                country_idx[&r.country],
                category_idx[&r.category],
                entity_idx[&r.entity],
                ss_idx[&r.source_scenario],
                year_idx[&r.year],
            ];
            let value = r.value.filter(|v| !v.is_nan());
            match (seen.get(&coords).copied(), value) {
                (Some(i), Some(value)) => {
                    duplicates += 1;
                    cells[i].value = value;
                }
                (Some(i), None) => {
                    duplicates += 1;
                    cells[i].value = f64::NAN;
                }
                (None, Some(value)) => {
                    seen.insert(coords, cells.len());
                    cells.push(Cell { coords, value });
                }
                (None, None) => {}
            }
        }
        // A later missing value overrides an earlier number.
        cells.retain(|c| !c.value.is_nan());

        if duplicates > 0 {
            logging::warn(
                Domain::Data,
                "duplicate_coordinates",
                obj(&[
                    ("path", v_str(&path.display().to_string())),
                    ("count", v_num(duplicates as f64)),
                    ("msg", v_str("later rows override earlier ones")),
                ]),
            );
        }

        let store = CubeStore {
            path,
            fingerprint,
            countries,
            categories,
            entities,
            source_scenarios,
            years,
            cells,
        };
        let masks = Axis::ALL.iter().map(|a| vec![true; store.axis_len(*a)]).collect();
        let rows = (0..store.cells.len() as u32).collect();
        Self {
            store: Arc::new(store),
            masks: Arc::new(masks),
            rows: Arc::new(rows),
        }
    }

    /// New view restricted by `filter`, intersected with this view's own
    /// restrictions. Unknown labels are rejected, never clamped.
    pub fn slice(&self, filter: &SliceFilter) -> EngineResult<Self> {
        if filter.is_empty() {
            return Ok(self.clone());
        }
        let mut masks: Vec<Vec<bool>> = self.masks.as_ref().clone();
        for (axis, labels) in filter.axes() {
            let current = &self.masks[axis.index()];
            let mut next = vec![false; current.len()];
            for label in labels {
                let pos = self.store.position(axis, label).ok_or_else(|| {
                    logging::debug(
                        Domain::Data,
                        "invalid_filter",
                        obj(&[("axis", v_str(axis.as_str())), ("label", v_str(label))]),
                    );
                    EngineError::InvalidFilter { axis, label: label.clone() }
                })?;
                next[pos] = current[pos];
            }
            masks[axis.index()] = next;
        }
        if let Some((from, to)) = filter.years() {
            let time = &mut masks[Axis::Time.index()];
            for (i, year) in self.store.years.iter().enumerate() {
                let below = from.map_or(false, |f| *year < f);
                let above = to.map_or(false, |t| *year > t);
                if below || above {
                    time[i] = false;
                }
            }
        }

        let rows = self
            .rows
            .iter()
            .copied()
            .filter(|r| {
                let cell = &self.store.cells[*r as usize];
                cell.coords
                    .iter()
                    .enumerate()
                    .all(|(axis, idx)| masks[axis][*idx as usize])
            })
            .collect();

        Ok(Self {
            store: Arc::clone(&self.store),
            masks: Arc::new(masks),
            rows: Arc::new(rows),
        })
    }

    /// Whether `label` exists on `axis` in the loaded dataset.
    pub fn has_label(&self, axis: Axis, label: &str) -> bool {
        self.store.position(axis, label).is_some()
    }

    /// Labels selected on `axis` in this view, in axis order, with or without data.
    pub fn labels(&self, axis: Axis) -> Vec<String> {
        self.masks[axis.index()]
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(i, _)| self.store.label(axis, i))
            .collect()
    }

    /// Labels on `axis` that carry at least one non-missing value in this view.
    pub fn labels_with_data(&self, axis: Axis) -> Vec<String> {
        self.indices_with_data(axis)
            .into_iter()
            .map(|i| self.store.label(axis, i))
            .collect()
    }

    pub fn source_scenarios_with_data(&self) -> Vec<SourceScenario> {
        self.indices_with_data(Axis::SourceScenario)
            .into_iter()
            .map(|i| self.store.source_scenarios[i].clone())
            .collect()
    }

    pub fn years_with_data(&self) -> Vec<i32> {
        self.indices_with_data(Axis::Time)
            .into_iter()
            .map(|i| self.store.years[i])
            .collect()
    }

    fn indices_with_data(&self, axis: Axis) -> Vec<usize> {
        let set: BTreeSet<usize> = self
            .rows
            .iter()
            .map(|r| self.store.cells[*r as usize].coords[axis.index()] as usize)
            .collect();
        set.into_iter().collect()
    }

    /// Non-missing cells in this view.
    pub fn cells(&self) -> impl Iterator<Item = CellRef<'_>> + '_ {
        self.rows.iter().map(move |r| {
            let cell = &self.store.cells[*r as usize];
            let [country, category, entity, ss, time] = cell.coords;
            CellRef {
                country: &self.store.countries[country as usize],
                category: &self.store.categories[category as usize],
                entity: &self.store.entities[entity as usize],
                source_scenario: &self.store.source_scenarios[ss as usize],
                year: self.store.years[time as usize],
                value: cell.value,
            }
        })
    }

    /// Number of non-missing cells in this view.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.store.path
    }

    /// SHA-256 of the dataset file; empty for cubes built in memory.
    pub fn fingerprint(&self) -> &str {
        &self.store.fingerprint
    }
}

fn index_of(labels: &[String]) -> HashMap<String, u32> {
    labels.iter().enumerate().map(|(i, l)| (l.clone(), i as u32)).collect()
}

fn sorted_unique<T: Ord>(items: impl Iterator<Item = T>) -> Vec<T> {
    items.collect::<BTreeSet<T>>().into_iter().collect()
}

// =============================================================================
// CSV loading
// =============================================================================

enum SourceColumns {
    Split { source: usize, scenario: usize },
    Combined(usize),
}

struct Columns {
    country: usize,
    category: usize,
    entity: usize,
    source: SourceColumns,
    time: usize,
    value: usize,
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

fn resolve_columns(headers: &csv::StringRecord) -> Result<Columns, String> {
    let require = |names: &[&str]| {
        find_column(headers, names).ok_or_else(|| format!("missing required column `{}`", names[0]))
    };
    let source = match (
        find_column(headers, SOURCE_COLUMNS),
        find_column(headers, SCENARIO_COLUMNS),
        find_column(headers, SOURCE_SCENARIO_COLUMNS),
    ) {
        (Some(source), Some(scenario), _) => SourceColumns::Split { source, scenario },
        (_, _, Some(combined)) => SourceColumns::Combined(combined),
        _ => return Err("missing `source`/`scenario` or `source_scenario` column".to_string()),
    };
    Ok(Columns {
        country: require(COUNTRY_COLUMNS)?,
        category: require(CATEGORY_COLUMNS)?,
        entity: require(ENTITY_COLUMNS)?,
        source,
        time: require(TIME_COLUMNS)?,
        value: require(VALUE_COLUMNS)?,
    })
}

/// Leading digits of the time field, so `2001` and `2001-01-01` both mean 2001.
fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

fn parse_value(raw: &str) -> Result<Option<f64>, String> {
    let raw = raw.trim();
    if MISSING_MARKERS.iter().any(|m| raw.eq_ignore_ascii_case(m)) {
        return Ok(None);
    }
    let v: f64 = raw.parse().map_err(|e| format!("bad value {:?}: {}", raw, e))?;
    Ok(if v.is_nan() { None } else { Some(v) })
}

fn read_records(path: &Path) -> Result<Vec<Record>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| e.to_string())?;
    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let cols = resolve_columns(&headers)?;

    let mut out = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| e.to_string())?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let field = |i: usize| row.get(i).unwrap_or("").to_string();

        let source_scenario = match cols.source {
            SourceColumns::Split { source, scenario } => {
                SourceScenario::new(field(source), field(scenario))
            }
            SourceColumns::Combined(i) => SourceScenario::parse(&field(i)),
        };
        let time = field(cols.time);
        let year = parse_year(&time).ok_or_else(|| format!("line {}: bad time {:?}", line, time))?;
        let value = parse_value(&field(cols.value)).map_err(|e| format!("line {}: {}", line, e))?;

        out.push(Record {
            country: field(cols.country),
            category: field(cols.category),
            entity: field(cols.entity),
            source_scenario,
            year,
            value,
        });
    }
    Ok(out)
}

pub fn file_sha256(path: &Path) -> Result<String, String> {
    let mut file = File::open(path).map_err(|e| e.to_string())?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| e.to_string())?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// =============================================================================
// Side-file locations
// =============================================================================

/// `<dataset-stem>.db` next to the dataset.
pub fn default_notes_path(dataset_path: &Path) -> PathBuf {
    dataset_path.with_extension("db")
}

/// `<dataset-stem>_plotting-config.json` next to the dataset.
pub fn default_plotting_config_path(dataset_path: &Path) -> PathBuf {
    let stem = dataset_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset");
    dataset_path.with_file_name(format!("{}_plotting-config.json", stem))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn rec(country: &str, category: &str, entity: &str, ss: (&str, &str), year: i32, value: Option<f64>) -> Record {
        Record {
            country: country.to_string(),
            category: category.to_string(),
            entity: entity.to_string(),
            source_scenario: SourceScenario::new(ss.0, ss.1),
            year,
            value,
        }
    }
}

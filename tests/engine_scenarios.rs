use emissions_explorer::data::{Axis, DataCube, SliceFilter, SourceScenario};
use emissions_explorer::error::EngineError;
use emissions_explorer::grouping::{group_slice, infer, SignificanceRule, SourceScenarioGroup, OTHER_KEY};
use emissions_explorer::options::{resolve_selection, OptionDefaults, OptionInference, Selection};
use emissions_explorer::releases::infer_definition;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HEADER: &str = "source,scenario,area (ISO3),entity,unit,category (IPCC2006_PRIMAP),time,value";

fn write_csv(path: &Path, header: &str, rows: &[&str]) {
    let mut out = String::new();
    out.push_str(header);
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    fs::write(path, out).unwrap();
}

fn two_country_dataset(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("two_country.csv");
    write_csv(
        &path,
        HEADER,
        &[
            "s1,sc1,A,E1,Gg,X,2000,1.5",
            "s1,sc1,B,E1,Gg,X,2000,2.5",
            "s2,sc2,A,E1,Gg,X,2000,3.0",
            "s2,sc2,B,E1,Gg,X,2000,",
            "s1,sc1,A,E1,Gg,X,2001,1.0",
        ],
    );
    path
}

fn ss(source: &str, scenario: &str) -> SourceScenario {
    SourceScenario::new(source, scenario)
}

#[test]
fn defaults_scenario_drops_pair_without_data() {
    let dir = TempDir::new().unwrap();
    let cube = DataCube::load(two_country_dataset(&dir)).unwrap();

    let selected = SliceFilter::new()
        .with_label(Axis::Country, "B")
        .with_label(Axis::Category, "X")
        .with_label(Axis::Entity, "E1");
    let slice = cube.slice(&selected).unwrap();
    assert_eq!(infer(&slice), vec![ss("s1", "sc1")]);

    let inference = OptionInference::new(&cube);
    let options = inference.options_for(Axis::SourceScenario, &selected).unwrap();
    assert_eq!(options, vec!["s1, sc1".to_string()]);
}

#[test]
fn resolve_selection_walks_the_cascade() {
    let dir = TempDir::new().unwrap();
    let cube = DataCube::load(two_country_dataset(&dir)).unwrap();

    let selection = Selection {
        country: Some("B".to_string()),
        ..Default::default()
    };
    let resolved = resolve_selection(&cube, &selection, &OptionDefaults::default()).unwrap();
    assert_eq!(resolved.country, "B");
    assert_eq!(resolved.category, "X");
    assert_eq!(resolved.entity, "E1");
    assert_eq!(resolved.source_scenario, "s1, sc1");
    assert_eq!(resolved.years, vec![2000]);

    let plotted = cube.slice(&resolved.plot_filter()).unwrap();
    let groups = group_slice(&plotted, &SignificanceRule::default());
    assert_eq!(groups, vec![SourceScenarioGroup::Single(ss("s1", "sc1"))]);
}

#[test]
fn time_range_narrows_the_resolved_years() {
    let dir = TempDir::new().unwrap();
    let cube = DataCube::load(two_country_dataset(&dir)).unwrap();
    let selection = Selection {
        country: Some("A".to_string()),
        from_year: Some(2001),
        ..Default::default()
    };
    let resolved = resolve_selection(&cube, &selection, &OptionDefaults::none()).unwrap();
    assert_eq!(resolved.years, vec![2001]);
    // s2 only has data in 2000.
    assert_eq!(resolved.source_scenario_options, vec!["s1, sc1".to_string()]);
}

#[test]
fn other_bucket_scenario() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("six_pairs.csv");
    // Coverage: gamma 6, alpha 5, epsilon 4, beta 3, delta 2, Zulu 1.
    let coverage = [("gamma", 6), ("alpha", 5), ("epsilon", 4), ("beta", 3), ("delta", 2), ("Zulu", 1)];
    let mut rows = Vec::new();
    for (source, years) in coverage {
        for i in 0..years {
            rows.push(format!("{},HIST,DEU,CO2,Gg,0,{},1.0", source, 2000 + i));
        }
    }
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    write_csv(&path, HEADER, &rows);

    let cube = DataCube::load(&path).unwrap();
    let groups = group_slice(&cube, &SignificanceRule::top_k(3));
    assert_eq!(
        groups,
        vec![
            SourceScenarioGroup::Single(ss("alpha", "HIST")),
            SourceScenarioGroup::Single(ss("epsilon", "HIST")),
            SourceScenarioGroup::Single(ss("gamma", "HIST")),
            SourceScenarioGroup::Other(vec![ss("beta", "HIST"), ss("delta", "HIST"), ss("Zulu", "HIST")]),
        ]
    );
    assert_eq!(groups.last().unwrap().key(), OTHER_KEY);
}

#[test]
fn options_never_fabricate_and_always_have_data() {
    let dir = TempDir::new().unwrap();
    let cube = DataCube::load(two_country_dataset(&dir)).unwrap();
    let inference = OptionInference::new(&cube);

    let constraints = [
        SliceFilter::new(),
        SliceFilter::new().with_label(Axis::Country, "A"),
        SliceFilter::new().with_label(Axis::Country, "B"),
        SliceFilter::new()
            .with_label(Axis::Country, "B")
            .with_label(Axis::Entity, "E1"),
    ];
    for given in &constraints {
        for axis in Axis::CASCADE {
            let options = inference.options_for(axis, given).unwrap();
            for label in &options {
                assert!(cube.has_label(axis, label), "{} is not a {} label", label, axis);
                let applied = given.without(axis).with_label(axis, label.clone());
                let slice = cube.slice(&applied).unwrap();
                assert!(!slice.is_empty(), "{}={} gives an empty slice", axis, label);
            }
        }
    }
}

#[test]
fn combined_source_scenario_column_is_accepted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("combined.csv");
    write_csv(
        &path,
        "area,category,entity,SourceScen,year,value",
        &[
            "EARTH,M.0.EL,KYOTOGHG (AR6GWP100),\"PRIMAP-hist_v2.5_final_nr, HISTCR\",2022,50.0",
            "EARTH,M.0.EL,CO2,\"PRIMAP-hist_v2.5_final_nr, HISTCR\",2022,35.0",
        ],
    );
    let cube = DataCube::load(&path).unwrap();
    let resolved = OptionInference::new(&cube).resolve(&Selection::default()).unwrap();
    assert_eq!(resolved.country, "EARTH");
    assert_eq!(resolved.category, "M.0.EL");
    assert_eq!(resolved.entity, "KYOTOGHG (AR6GWP100)");
    assert_eq!(resolved.source_scenario, "PRIMAP-hist_v2.5_final_nr, HISTCR");
    assert_eq!(resolved.entity_options[0], "KYOTOGHG (AR6GWP100)");
}

#[test]
fn missing_value_column_is_a_load_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("no_value.csv");
    write_csv(&path, "source,scenario,area,entity,category,time", &["s,h,DEU,CO2,0,2000"]);
    let err = DataCube::load(&path).unwrap_err();
    assert!(matches!(err, EngineError::Load { .. }));
    assert!(!err.is_recoverable());
}

#[test]
fn unreadable_dataset_is_a_load_error() {
    let dir = TempDir::new().unwrap();
    let err = DataCube::load(dir.path().join("absent.csv")).unwrap_err();
    assert!(matches!(err, EngineError::Load { .. }));
}

#[test]
fn unknown_label_is_never_clamped() {
    let dir = TempDir::new().unwrap();
    let cube = DataCube::load(two_country_dataset(&dir)).unwrap();
    let err = cube
        .slice(&SliceFilter::new().with_label(Axis::Country, "ZZZ"))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidFilter { axis: Axis::Country, .. }));
}

#[test]
fn fingerprint_tracks_file_contents() {
    let dir = TempDir::new().unwrap();
    let path = two_country_dataset(&dir);
    let first = DataCube::load(&path).unwrap().fingerprint().to_string();
    assert_eq!(first.len(), 64);
    assert_eq!(DataCube::load(&path).unwrap().fingerprint(), first);

    let mut text = fs::read_to_string(&path).unwrap();
    text.push_str("s1,sc1,B,E1,Gg,X,2001,9.0\n");
    fs::write(&path, text).unwrap();
    assert_ne!(DataCube::load(&path).unwrap().fingerprint(), first);
}

#[test]
fn primap_dataset_layout_and_country_names() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("primap.csv");
    write_csv(
        &path,
        HEADER,
        &[
            "PRIMAP-hist_v2.5_final_nr,HISTCR,DEU,CO2,Gg,M.0.EL,2020,10",
            "PRIMAP-hist_v2.5_final_nr,HISTTP,DEU,CO2,Gg,M.0.EL,2020,11",
            "PRIMAP-hist_v2.6_final_nr,HISTCR,DEU,CO2,Gg,M.0.EL,2020,12",
            "PRIMAP-hist_v2.6_final_nr,HISTTP,DEU,CO2,Gg,M.0.EL,2020,13",
            "PRIMAP-hist_v2.6_final_nr,HISTCR,EARTH,CO2,Gg,M.0.EL,2020,100",
            "EDGAR 2023,History,DEU,CO2,Gg,M.0.EL,2020,9",
            "EDGAR 2022,History,DEU,CO2,Gg,M.0.EL,2020,8",
        ],
    );
    let cube = DataCube::load(&path).unwrap();

    let definition = infer_definition(&infer(&cube)).unwrap();
    assert_eq!(definition.primap.newer, "PRIMAP-hist_v2.6_final_nr");
    assert_eq!(definition.primap.older, "PRIMAP-hist_v2.5_final_nr");
    let families = definition.families();
    assert_eq!(families.len(), 1);
    assert_eq!(families[0].members, vec![ss("EDGAR 2022", "History"), ss("EDGAR 2023", "History")]);

    let selection = Selection { country: Some("Germany".to_string()), ..Default::default() };
    let resolved = resolve_selection(&cube, &selection, &OptionDefaults::default()).unwrap();
    assert_eq!(resolved.country, "DEU");
    assert_eq!(resolved.country_names, vec!["EARTH".to_string(), "Germany".to_string()]);
}

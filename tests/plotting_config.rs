use emissions_explorer::data::SourceScenario;
use emissions_explorer::error::EngineError;
use emissions_explorer::grouping::SourceScenarioGroup;
use emissions_explorer::plotting::{
    default_document, load_or_create, load_or_seed, reconcile, regenerate, regenerate_from,
    style_mapping, write_document, DashStyle, LineStyle, PlottingConfigDocument, DEFAULT_PALETTE,
    PRIMAP_CR_COLOR, PRIMAP_TP_COLOR,
};
use emissions_explorer::releases::infer_definition;
use std::fs;
use tempfile::TempDir;

fn single(source: &str, scenario: &str) -> SourceScenarioGroup {
    SourceScenarioGroup::Single(SourceScenario::new(source, scenario))
}

fn other(members: &[(&str, &str)]) -> SourceScenarioGroup {
    SourceScenarioGroup::Other(members.iter().map(|(s, c)| SourceScenario::new(*s, *c)).collect())
}

#[test]
fn reconciliation_scenario() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data_plotting-config.json");
    fs::write(
        &path,
        r#"{
  "source_scenario_settings": {
    "s1, sc1": {"color": "rgb(0, 0, 255)", "dash": "dot", "width": 2}
  }
}
"#,
    )
    .unwrap();

    let groups = vec![single("s1", "sc1"), single("s2", "sc2")];
    let document = load_or_create(&path, &groups).unwrap();
    let keys: Vec<&str> = document.keys().collect();
    assert_eq!(keys, vec!["s1, sc1", "s2, sc2"]);

    let s1 = document.style("s1, sc1").unwrap();
    assert_eq!(s1, LineStyle { color: "rgb(0, 0, 255)".to_string(), dash: DashStyle::Dot, width: 2.0 });
    let s2 = document.style("s2, sc2").unwrap();
    assert_ne!(s2.color, s1.color);
    assert_eq!(s2.dash, DashStyle::Solid);
    assert_eq!(s2.width, 3.0);
}

#[test]
fn second_pass_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.json");
    let groups = vec![single("a", "1"), single("b", "2"), other(&[("c", "3")])];

    load_or_create(&path, &groups).unwrap();
    let first = fs::read(&path).unwrap();
    let first_modified = fs::metadata(&path).unwrap().modified().unwrap();

    let again = load_or_create(&path, &groups).unwrap();
    assert_eq!(fs::read(&path).unwrap(), first);
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), first_modified);
    assert_eq!(again.to_json_string().as_bytes(), first.as_slice());

    let doc = PlottingConfigDocument::parse(&String::from_utf8(first).unwrap(), &path).unwrap();
    assert!(!reconcile(doc, &groups).changed());
}

#[test]
fn user_edits_survive_any_number_of_passes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.json");
    let mut document = load_or_create(&path, &[single("a", "1"), single("b", "2")]).unwrap();

    let edited = LineStyle { color: "#112233".to_string(), dash: DashStyle::Longdashdot, width: 1.5 };
    document.set_style("a, 1", &edited);
    write_document(&path, &document).unwrap();

    let group_sets = [
        vec![single("a", "1")],
        vec![single("z", "9"), single("a", "1")],
        vec![single("b", "2"), other(&[("q", "1"), ("r", "2")])],
        vec![],
    ];
    for groups in &group_sets {
        let document = load_or_create(&path, groups).unwrap();
        assert_eq!(document.style("a, 1").unwrap(), edited);
    }
    // Stale keys are never pruned.
    let final_doc = load_or_create(&path, &[]).unwrap();
    assert!(final_doc.contains("b, 2"));
    assert!(final_doc.contains("z, 9"));
    assert!(final_doc.contains("Other"));
}

#[test]
fn unknown_fields_are_kept_on_rewrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.json");
    fs::write(
        &path,
        r#"{
  "source_scenario_settings": {
    "a, 1": {"color": "red", "dash": "solid", "width": 3, "legend": "mine"}
  },
  "title": "my plots"
}
"#,
    )
    .unwrap();
    load_or_create(&path, &[single("a", "1"), single("b", "2")]).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"legend\": \"mine\""));
    assert!(text.contains("\"title\": \"my plots\""));
    assert!(text.contains("\"b, 2\""));
}

#[test]
fn malformed_documents_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.json");
    let bad = [
        "not json",
        "[]",
        "{}",
        r#"{"source_scenario_settings": {"a, 1": {"color": "red", "dash": "wavy", "width": 3}}}"#,
        r#"{"source_scenario_settings": {"a, 1": {"color": "", "dash": "solid", "width": 3}}}"#,
        r#"{"source_scenario_settings": {"a, 1": {"color": "red", "dash": "solid", "width": 0}}}"#,
    ];
    for text in bad {
        fs::write(&path, text).unwrap();
        let err = load_or_create(&path, &[single("a", "1")]).unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse { .. }), "accepted {:?}", text);
        // The malformed file is left for the user to fix.
        assert_eq!(fs::read_to_string(&path).unwrap(), text);
    }
}

#[test]
fn regenerate_replaces_a_malformed_document() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.json");
    fs::write(&path, "{ broken").unwrap();
    let groups = vec![single("a", "1"), other(&[("b", "2")])];
    let document = regenerate(&path, &groups).unwrap();
    assert_eq!(document.len(), 2);
    assert_eq!(document.style("a, 1").unwrap().color, DEFAULT_PALETTE[0]);
    assert_eq!(load_or_create(&path, &groups).unwrap(), document);
}

#[test]
fn style_mapping_is_in_group_order() {
    let document = reconcile(PlottingConfigDocument::new(), &[single("b", "2"), single("a", "1")]).document;
    let groups = vec![single("a", "1"), single("b", "2"), other(&[("c", "3")])];
    let mapped = style_mapping(&document, &groups);
    let keys: Vec<&str> = mapped.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["a, 1", "b, 2", "Other"]);
    assert_eq!(mapped[0].1, document.style("a, 1").unwrap());
    assert_eq!(mapped[1].1, document.style("b, 2").unwrap());
}

#[test]
fn no_temp_files_left_behind() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.json");
    load_or_create(&path, &[single("a", "1")]).unwrap();
    load_or_create(&path, &[single("a", "1"), single("b", "2")]).unwrap();
    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["cfg.json".to_string()]);
}

#[test]
fn write_into_missing_directory_is_surfaced() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nope").join("cfg.json");
    let err = load_or_create(&path, &[single("a", "1")]).unwrap_err();
    assert!(matches!(err, EngineError::StoreWrite { .. }));
}

fn release_seed() -> PlottingConfigDocument {
    let pairs: Vec<SourceScenario> = [
        "PRIMAP-hist_v2.4_final_nr, HISTCR",
        "PRIMAP-hist_v2.4_final_nr, HISTTP",
        "PRIMAP-hist_v2.5_final_nr, HISTCR",
        "PRIMAP-hist_v2.5_final_nr, HISTTP",
        "EDGAR 2022, History",
        "EDGAR 2023, History",
    ]
    .iter()
    .map(|l| SourceScenario::parse(l))
    .collect();
    default_document(&infer_definition(&pairs).unwrap())
}

#[test]
fn missing_file_starts_from_release_layout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.json");
    let groups = vec![single("PRIMAP-hist_v2.5_final_nr", "HISTCR"), other(&[("EDGAR 2023", "History")])];

    let document = load_or_seed(&path, release_seed(), &groups).unwrap();
    let keys: Vec<&str> = document.keys().collect();
    assert_eq!(
        keys,
        vec![
            "PRIMAP-hist_v2.5_final_nr, HISTCR",
            "PRIMAP-hist_v2.5_final_nr, HISTTP",
            "PRIMAP-hist_v2.4_final_nr, HISTCR",
            "PRIMAP-hist_v2.4_final_nr, HISTTP",
            "EDGAR 2023, History",
            "EDGAR 2022, History",
            "Other",
        ]
    );
    let old_tp = document.style("PRIMAP-hist_v2.4_final_nr, HISTTP").unwrap();
    assert_eq!((old_tp.color.as_str(), old_tp.dash), (PRIMAP_TP_COLOR, DashStyle::Dot));
    assert_eq!(document.style("EDGAR 2022, History").unwrap().color, DEFAULT_PALETTE[0]);
    assert_eq!(load_or_create(&path, &groups).unwrap(), document);
}

#[test]
fn existing_file_ignores_seed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.json");
    let groups = vec![single("PRIMAP-hist_v2.5_final_nr", "HISTCR")];
    let plain = load_or_create(&path, &groups).unwrap();

    let document = load_or_seed(&path, release_seed(), &groups).unwrap();
    assert_eq!(document, plain);
    assert_eq!(document.len(), 1);
    assert_eq!(document.style("PRIMAP-hist_v2.5_final_nr, HISTCR").unwrap().color, DEFAULT_PALETTE[0]);
}

#[test]
fn regenerate_from_seed_replaces_edits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cfg.json");
    let groups = vec![single("PRIMAP-hist_v2.5_final_nr", "HISTCR")];
    fs::write(&path, "{ broken").unwrap();

    let document = regenerate_from(&path, release_seed(), &groups).unwrap();
    assert_eq!(document.style("PRIMAP-hist_v2.5_final_nr, HISTCR").unwrap().color, PRIMAP_CR_COLOR);
    assert_eq!(document.len(), 6);
    assert_eq!(load_or_create(&path, &groups).unwrap(), document);
}

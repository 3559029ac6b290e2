use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use serde_json::{json, Value};
use std::env;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use emissions_explorer::config::EngineConfig;
use emissions_explorer::data::{Axis, DataCube};
use emissions_explorer::grouping::{group_slice, infer};
use emissions_explorer::logging::{self, obj, v_str, Domain};
use emissions_explorer::options::{OptionInference, Selection};
use emissions_explorer::plotting::{self, style_mapping, PlottingConfigDocument};
use emissions_explorer::releases::infer_definition;
use emissions_explorer::storage::{save_confirmation, NotesStore};

const USAGE: &str = "usage:
  emissions_explorer summary [dataset]
  emissions_explorer options [dataset] [country=..] [category=..] [entity=..] [source_scenario=..] [from=..] [to=..] [--reset-config]
  emissions_explorer note-get <dataset> <country>
  emissions_explorer note-put <dataset> <country> <text...>
  emissions_explorer notes-export <dataset> [out.csv]

country= takes an ISO3 code or a country name.
DATASET_PATH is used when no dataset is given.";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let cfg = EngineConfig::from_env();

    match command.as_str() {
        "summary" => summary(cfg, rest),
        "options" => options(cfg, rest),
        "note-get" => note_get(cfg, rest),
        "note-put" => note_put(cfg, rest),
        "notes-export" => notes_export(cfg, rest),
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("unknown command: {}\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

/// Split positional arguments from `key=value` pairs and `--flags`.
fn split_args(rest: &[String]) -> (Vec<&str>, Vec<(&str, &str)>, Vec<&str>) {
    let mut positional = Vec::new();
    let mut pairs = Vec::new();
    let mut flags = Vec::new();
    for arg in rest {
        if arg.starts_with("--") {
            flags.push(arg.as_str());
        } else if let Some((k, v)) = arg.split_once('=') {
            pairs.push((k, v));
        } else {
            positional.push(arg.as_str());
        }
    }
    (positional, pairs, flags)
}

fn with_dataset(cfg: EngineConfig, given: Option<&str>) -> Result<EngineConfig> {
    let mut cfg = match given {
        Some(path) => cfg.with_dataset(path),
        None if cfg.dataset_path.is_some() => cfg,
        None => bail!("no dataset given and DATASET_PATH is not set\n{}", USAGE),
    };
    cfg.resolve_paths();
    Ok(cfg)
}

fn dataset_path(cfg: &EngineConfig) -> Result<&Path> {
    cfg.dataset_path.as_deref().ok_or_else(|| anyhow!("dataset path unresolved"))
}

fn load_cube(cfg: &EngineConfig) -> Result<DataCube> {
    let path = dataset_path(cfg)?;
    DataCube::load(path).with_context(|| format!("loading dataset {}", path.display()))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn summary(cfg: EngineConfig, rest: &[String]) -> Result<()> {
    let (positional, _, _) = split_args(rest);
    let cfg = with_dataset(cfg, positional.first().copied())?;
    let cube = load_cube(&cfg)?;
    let years = cube.years_with_data();

    let mut axes = serde_json::Map::new();
    for axis in Axis::CASCADE {
        axes.insert(
            axis.as_str().to_string(),
            json!({
                "labels": cube.labels(axis).len(),
                "with_data": cube.labels_with_data(axis).len(),
            }),
        );
    }
    print_json(&json!({
        "path": cube.path().display().to_string(),
        "fingerprint": cube.fingerprint(),
        "cells": cube.len(),
        "axes": axes,
        "years": { "first": years.first(), "last": years.last() },
    }))
}

fn parse_year(key: &str, raw: &str) -> Result<i32> {
    raw.trim()
        .parse()
        .with_context(|| format!("{} must be a year, got {:?}", key, raw))
}

fn options(cfg: EngineConfig, rest: &[String]) -> Result<()> {
    let (positional, pairs, flags) = split_args(rest);
    let reset_config = flags.contains(&"--reset-config");
    if let Some(flag) = flags.iter().find(|f| **f != "--reset-config") {
        bail!("unknown flag {}\n{}", flag, USAGE);
    }
    let cfg = with_dataset(cfg, positional.first().copied())?;

    let mut selection = Selection::default();
    for (key, value) in pairs {
        let value = value.trim().to_string();
        match key {
            "country" => selection.country = Some(value),
            "category" => selection.category = Some(value),
            "entity" => selection.entity = Some(value),
            "source_scenario" => selection.source_scenario = Some(value),
            "from" => selection.from_year = Some(parse_year(key, &value)?),
            "to" => selection.to_year = Some(parse_year(key, &value)?),
            other => bail!("unknown selection key {:?}\n{}", other, USAGE),
        }
    }

    let cube = load_cube(&cfg)?;
    let inference = OptionInference::with_defaults(&cube, cfg.defaults.clone());
    let resolved = inference.resolve(&selection).context("resolving selection")?;
    let plotted = cube.slice(&resolved.plot_filter()).context("slicing plotted data")?;
    let groups = group_slice(&plotted, &cfg.significance);

    let config_path = cfg
        .plotting_config_path
        .clone()
        .ok_or_else(|| anyhow!("plotting config path unresolved"))?;
    let document = if reset_config {
        plotting::regenerate_from(&config_path, seed_document(&cube), &groups)
    } else if config_path.exists() {
        plotting::load_or_create(&config_path, &groups)
    } else {
        plotting::load_or_seed(&config_path, seed_document(&cube), &groups)
    }
    .with_context(|| format!("reconciling plotting config {}", config_path.display()))?;

    let styled: Vec<Value> = style_mapping(&document, &groups)
        .into_iter()
        .zip(&groups)
        .map(|((key, style), group)| {
            let members: Vec<String> = group.members().iter().map(|m| m.key()).collect();
            json!({ "key": key, "members": members, "style": style })
        })
        .collect();

    print_json(&json!({
        "selection": resolved,
        "groups": styled,
        "plotting_config": config_path.display().to_string(),
    }))
}

/// Release-aware starting styles for the whole dataset, or an empty document
/// when its source-scenarios do not follow the PRIMAP-hist layout.
fn seed_document(cube: &DataCube) -> PlottingConfigDocument {
    match infer_definition(&infer(cube)) {
        Ok(definition) => plotting::default_document(&definition),
        Err(e) => {
            logging::warn(
                Domain::Config,
                "release_layout_unavailable",
                obj(&[("reason", v_str(&e.to_string()))]),
            );
            PlottingConfigDocument::new()
        }
    }
}

fn open_notes(cfg: &EngineConfig) -> Result<(NotesStore, PathBuf)> {
    let path = cfg
        .notes_path
        .clone()
        .ok_or_else(|| anyhow!("notes path unresolved"))?;
    let store = NotesStore::open(&path).with_context(|| format!("opening notes {}", path.display()))?;
    Ok((store, path))
}

fn note_get(cfg: EngineConfig, rest: &[String]) -> Result<()> {
    let [dataset, country] = rest else {
        bail!("note-get takes <dataset> <country>\n{}", USAGE);
    };
    let cfg = with_dataset(cfg, Some(dataset.as_str()))?;
    let (store, _) = open_notes(&cfg)?;
    match store.get(country)? {
        Some(text) => println!("{}", text),
        None => eprintln!("no notes for {}", country),
    }
    Ok(())
}

fn note_put(cfg: EngineConfig, rest: &[String]) -> Result<()> {
    let [dataset, country, text @ ..] = rest else {
        bail!("note-put takes <dataset> <country> <text...>\n{}", USAGE);
    };
    let cfg = with_dataset(cfg, Some(dataset.as_str()))?;
    let (store, path) = open_notes(&cfg)?;
    store.put(country, &text.join(" "))?;
    println!("{}", save_confirmation(country, &path, Local::now()));
    Ok(())
}

fn notes_export(cfg: EngineConfig, rest: &[String]) -> Result<()> {
    let (dataset, out) = match rest {
        [dataset] => (dataset, None),
        [dataset, out] => (dataset, Some(out)),
        _ => bail!("notes-export takes <dataset> [out.csv]\n{}", USAGE),
    };
    let cfg = with_dataset(cfg, Some(dataset.as_str()))?;
    let (store, _) = open_notes(&cfg)?;
    let written = match out {
        Some(out) => {
            let file = File::create(out).with_context(|| format!("creating {}", out))?;
            store.export_csv(file)?
        }
        None => store.export_csv(io::stdout().lock())?,
    };
    logging::info(
        Domain::Notes,
        "notes_exported",
        obj(&[
            ("count", logging::v_num(written as f64)),
            ("to", v_str(out.map(String::as_str).unwrap_or("-"))),
        ]),
    );
    Ok(())
}

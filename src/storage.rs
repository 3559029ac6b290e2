use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::logging::{self, obj, v_num, v_str, Domain};
use crate::reliability::locks::with_path_lock;

/// One free-text note per country, in a small SQLite file next to the dataset.
///
/// Every call opens its own connection and drops it before returning, so no
/// handle outlives the operation that needed it.
#[derive(Debug, Clone)]
pub struct NotesStore {
    path: PathBuf,
}

impl NotesStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let store = Self { path: path.into() };
        with_path_lock(&store.path, || {
            let conn = store.connect_for_write()?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS country_notes (
                    country_iso3 TEXT PRIMARY KEY,
                    notes TEXT NOT NULL
                );",
            )
            .map_err(|e| EngineError::store_write(&store.path, e))
        })?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect_for_write(&self) -> EngineResult<Connection> {
        Connection::open(&self.path).map_err(|e| EngineError::store_write(&self.path, e))
    }

    fn connect_for_read(&self) -> EngineResult<Connection> {
        Connection::open(&self.path).map_err(|e| EngineError::store_read(&self.path, e))
    }

    pub fn get(&self, country: &str) -> EngineResult<Option<String>> {
        let conn = self.connect_for_read()?;
        conn.query_row(
            "SELECT notes FROM country_notes WHERE country_iso3 = ?1",
            params![country],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| EngineError::store_read(&self.path, e))
    }

    /// Insert or overwrite the note for `country`.
    pub fn put(&self, country: &str, text: &str) -> EngineResult<()> {
        with_path_lock(&self.path, || {
            let mut conn = self.connect_for_write()?;
            let tx = conn
                .transaction()
                .map_err(|e| EngineError::store_write(&self.path, e))?;
            tx.execute(
                "INSERT INTO country_notes (country_iso3, notes)
                 VALUES (?1, ?2)
                 ON CONFLICT(country_iso3) DO UPDATE SET notes = excluded.notes",
                params![country, text],
            )
            .map_err(|e| EngineError::store_write(&self.path, e))?;
            tx.commit().map_err(|e| EngineError::store_write(&self.path, e))
        })?;

        logging::info(
            Domain::Notes,
            "note_saved",
            obj(&[
                ("country", v_str(country)),
                ("path", v_str(&self.path.display().to_string())),
                ("chars", v_num(text.chars().count() as f64)),
            ]),
        );
        Ok(())
    }

    /// Every note, ordered by country.
    pub fn export_all(&self) -> EngineResult<Vec<(String, String)>> {
        let conn = self.connect_for_read()?;
        let mut stmt = conn
            .prepare("SELECT country_iso3, notes FROM country_notes ORDER BY country_iso3")
            .map_err(|e| EngineError::store_read(&self.path, e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| EngineError::store_read(&self.path, e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| EngineError::store_read(&self.path, e))
    }

    /// Write `country_iso3,notes` rows in country order.
    pub fn export_csv<W: Write>(&self, out: W) -> EngineResult<usize> {
        let notes = self.export_all()?;
        let mut writer = csv::Writer::from_writer(out);
        let to_err = |e: csv::Error| EngineError::store_write("<export>", e);
        writer.write_record(["country_iso3", "notes"]).map_err(to_err)?;
        for (country, text) in &notes {
            writer.write_record([country.as_str(), text.as_str()]).map_err(to_err)?;
        }
        writer
            .flush()
            .map_err(|e| EngineError::store_write("<export>", e))?;
        Ok(notes.len())
    }
}

/// Message shown to the user after a successful save.
pub fn save_confirmation(country: &str, path: &Path, at: DateTime<Local>) -> String {
    format!(
        "Notes for {} saved at {} in {}",
        country,
        at.format("%Y-%m-%d-%H-%M-%S"),
        path.display()
    )
}

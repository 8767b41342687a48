//! SQLite-backed result store: one table per material signature.
//!
//! Schema per signature: `(key, white, white_to_move, dtz, dtm, bishop_light)`
//! with the composite primary key `(key, white, white_to_move)` — one row per
//! distinct position per color assignment per side to move — and secondary
//! indexes on both distance columns. Inserts go through `INSERT OR IGNORE`
//! inside a single transaction per batch, so loading overlapping checkpoints
//! is safe and a write failure rolls back that batch only.

use std::path::Path;

use rusqlite::{params, params_from_iter, types::Value, Connection};

use crate::{errors::StoreError, material::Signature, probe::ProbeRow};

/// Optional conjunctive filters over the stored columns.
///
/// Each `Some` field is translated mechanically into one `AND` clause. A DTZ
/// filter matches both members of its even/odd pair, since both plies of a
/// winning pair describe the same mate distance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub white: Option<bool>,
    pub white_to_move: Option<bool>,
    pub dtz: Option<u32>,
    pub dtm: Option<u32>,
    pub bishop_light: Option<bool>,
}

/// A handle on the relational store. The connection path is the only
/// configuration; schema is created lazily per signature.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

fn table(signature: &Signature) -> String {
    // Signature names are validated to [PNBRQK] and 'v', safe as identifiers.
    format!("\"{}\"", signature.name())
}

impl Store {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Errors when the file cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Store, StoreError> {
        Ok(Store { conn: Connection::open(path)? })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Store, StoreError> {
        Ok(Store { conn: Connection::open_in_memory()? })
    }

    pub fn create_table(&self, signature: &Signature) -> Result<(), StoreError> {
        let t = table(signature);
        let name = signature.name();
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                key TEXT NOT NULL,
                white INTEGER NOT NULL,
                white_to_move INTEGER NOT NULL,
                dtz INTEGER NOT NULL,
                dtm INTEGER,
                bishop_light INTEGER,
                PRIMARY KEY (key, white, white_to_move)
            );
            CREATE INDEX IF NOT EXISTS idx_dtz_{name} ON {t} (dtz);
            CREATE INDEX IF NOT EXISTS idx_dtm_{name} ON {t} (dtm);"
        ))?;
        Ok(())
    }

    /// Idempotent truncate; creates the table when missing.
    pub fn clear_table(&self, signature: &Signature) -> Result<(), StoreError> {
        self.create_table(signature)?;
        self.conn.execute(&format!("DELETE FROM {}", table(signature)), [])?;
        Ok(())
    }

    /// Bulk upsert of one batch in a single transaction, ignoring rows whose
    /// primary key is already present.
    pub fn insert_batch(
        &mut self,
        signature: &Signature,
        rows: &[ProbeRow],
    ) -> Result<(), StoreError> {
        self.create_table(signature)?;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {} VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                table(signature)
            ))?;
            for row in rows {
                stmt.execute(params![
                    row.key,
                    row.white,
                    row.white_to_move,
                    row.dtz,
                    row.dtm,
                    row.bishop_light,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All rows matching the given conjunctive criteria.
    pub fn find_positions(
        &self,
        signature: &Signature,
        criteria: &FilterCriteria,
    ) -> Result<Vec<ProbeRow>, StoreError> {
        if self.count_rows(signature)? == 0 {
            return Ok(Vec::new());
        }
        let mut sql = format!(
            "SELECT key, white, white_to_move, dtz, dtm, bishop_light FROM {} WHERE TRUE",
            table(signature)
        );
        let mut values: Vec<Value> = Vec::new();
        if let Some(dtz) = criteria.dtz {
            sql.push_str(" AND dtz IN (?, ?)");
            let even = dtz - dtz % 2;
            values.push(Value::from(even));
            values.push(Value::from(even + 1));
        }
        if let Some(dtm) = criteria.dtm {
            sql.push_str(" AND dtm = ?");
            values.push(Value::from(dtm));
        }
        if let Some(white) = criteria.white {
            sql.push_str(" AND white = ?");
            values.push(Value::from(white));
        }
        if let Some(white_to_move) = criteria.white_to_move {
            sql.push_str(" AND white_to_move = ?");
            values.push(Value::from(white_to_move));
        }
        if let Some(bishop_light) = criteria.bishop_light {
            sql.push_str(" AND bishop_light = ?");
            values.push(Value::from(bishop_light));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(ProbeRow {
                    key: row.get(0)?,
                    white: row.get(1)?,
                    white_to_move: row.get(2)?,
                    dtz: row.get(3)?,
                    dtm: row.get(4)?,
                    bishop_light: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Signatures whose tables contain at least one row.
    pub fn list_available_signatures(&self) -> Result<Vec<Signature>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut signatures = Vec::new();
        for name in names {
            let Ok(signature) = name.parse::<Signature>() else {
                continue;
            };
            if self.count_rows(&signature)? > 0 {
                signatures.push(signature);
            }
        }
        Ok(signatures)
    }

    /// Number of stored rows for a signature (0 when the table is missing).
    pub fn count_rows(&self, signature: &Signature) -> Result<u64, StoreError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            [signature.name()],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(0);
        }
        Ok(self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table(signature)),
            [],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(name: &str) -> Signature {
        name.parse().expect("valid signature")
    }

    fn row(key: &str, white: bool, white_to_move: bool, dtz: u32) -> ProbeRow {
        ProbeRow {
            key: key.to_owned(),
            white,
            white_to_move,
            dtz,
            dtm: Some(dtz + 1),
            bishop_light: None,
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let mut store = Store::open_in_memory().expect("open");
        let signature = sig("KRvK");
        store.create_table(&signature).expect("create");
        let rows = vec![row("0,1,63", true, true, 10), row("0,1,63", false, true, 4)];
        store.insert_batch(&signature, &rows).expect("insert");
        store.insert_batch(&signature, &rows).expect("reinsert");
        assert_eq!(store.count_rows(&signature).expect("count"), 2);
    }

    #[test]
    fn clear_table_is_idempotent_and_lazy() {
        let mut store = Store::open_in_memory().expect("open");
        let signature = sig("KQvK");
        // Clearing before any create must not fail.
        store.clear_table(&signature).expect("clear missing");
        store
            .insert_batch(&signature, &[row("0,1,63", true, true, 2)])
            .expect("insert");
        store.clear_table(&signature).expect("clear");
        store.clear_table(&signature).expect("clear again");
        assert_eq!(store.count_rows(&signature).expect("count"), 0);
    }

    #[test]
    fn dtz_filter_matches_its_even_odd_pair() {
        let mut store = Store::open_in_memory().expect("open");
        let signature = sig("KRvK");
        store
            .insert_batch(
                &signature,
                &[
                    row("0,1,63", true, true, 12),
                    row("0,2,63", true, true, 13),
                    row("0,3,63", true, true, 14),
                ],
            )
            .expect("insert");

        for dtz in [12, 13] {
            let found = store
                .find_positions(&signature, &FilterCriteria { dtz: Some(dtz), ..Default::default() })
                .expect("query");
            assert_eq!(found.len(), 2, "dtz {dtz} matches the 12/13 pair");
        }
        let found = store
            .find_positions(&signature, &FilterCriteria { dtz: Some(14), ..Default::default() })
            .expect("query");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn conjunctive_filters() {
        let mut store = Store::open_in_memory().expect("open");
        let signature = sig("KBvK");
        store
            .insert_batch(
                &signature,
                &[
                    ProbeRow { bishop_light: Some(true), ..row("0,9,63", true, true, 6) },
                    ProbeRow { bishop_light: Some(false), ..row("0,10,63", true, false, 6) },
                ],
            )
            .expect("insert");

        let criteria = FilterCriteria {
            white: Some(true),
            white_to_move: Some(true),
            bishop_light: Some(true),
            dtm: Some(7),
            ..Default::default()
        };
        let found = store.find_positions(&signature, &criteria).expect("query");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "0,9,63");

        let none = store
            .find_positions(
                &signature,
                &FilterCriteria { dtm: Some(99), ..Default::default() },
            )
            .expect("query");
        assert!(none.is_empty());
    }

    #[test]
    fn lists_only_non_empty_signature_tables() {
        let mut store = Store::open_in_memory().expect("open");
        store.create_table(&sig("KRvK")).expect("create");
        store
            .conn
            .execute_batch("CREATE TABLE not_a_signature (x INTEGER)")
            .expect("create");
        assert!(store.list_available_signatures().expect("list").is_empty());

        store
            .insert_batch(&sig("KQvK"), &[row("0,1,63", true, true, 2)])
            .expect("insert");
        let available = store.list_available_signatures().expect("list");
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].name(), "KQvK");
    }
}

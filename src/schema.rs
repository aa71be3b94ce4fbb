//! Column metadata and SQLite type affinity.
//!
//! Column metadata is read live from `PRAGMA table_info(<table>)` on every
//! call; nothing is cached between operations.

use std::collections::HashMap;

use log::debug;
use rusqlite::Connection;
use serde::Serialize;

use crate::{value::Value, Error, Result};

/// Affinity class of a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeClass {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

/// Derive the type class of a declared column type.
///
/// Checks are case-sensitive substring matches applied in a fixed order, so
/// `"POINT"` is `Integer` and `"varchar"` falls through to `Numeric`.
pub fn classify_type(declared_type: &str) -> TypeClass {
    let contains_any = |needles: &[&str]| needles.iter().any(|n| declared_type.contains(n));

    if declared_type.contains("INT") {
        TypeClass::Integer
    } else if contains_any(&["CHAR", "TEXT", "CLOB"]) {
        TypeClass::Text
    } else if declared_type.contains("BLOB") {
        TypeClass::Blob
    } else if contains_any(&["REAL", "FLOA", "DOUB"]) {
        TypeClass::Real
    } else {
        TypeClass::Numeric
    }
}

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default_value: Value,
    /// 1-based position within the primary key, 0 when not part of it.
    pub primary_key: i64,
}

impl ColumnInfo {
    pub fn type_class(&self) -> TypeClass {
        classify_type(&self.declared_type)
    }
}

/// Read column metadata for `table`, keyed by column name.
///
/// An unknown table yields an empty map.
pub fn table_columns(conn: &Connection, table: &str) -> Result<HashMap<String, ColumnInfo>> {
    let statement = format!("PRAGMA table_info({table})");
    let introspection = |source: rusqlite::Error| Error::Introspection {
        table: table.to_string(),
        source,
    };

    let mut stmt = conn.prepare(&statement).map_err(introspection)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                cid: row.get("cid")?,
                name: row.get("name")?,
                declared_type: row.get("type")?,
                not_null: row.get::<_, i64>("notnull")? != 0,
                default_value: Value::from(row.get_ref("dflt_value")?),
                primary_key: row.get("pk")?,
            })
        })
        .map_err(introspection)?;

    let mut columns = HashMap::new();
    for column in rows {
        let column = column.map_err(introspection)?;
        columns.insert(column.name.clone(), column);
    }
    debug!("table {table} has {} columns", columns.len());
    Ok(columns)
}

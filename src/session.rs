//! Sequential state threading over one database handle.
//!
//! A [`Session`] runs operations one at a time, replacing its [`Cursor`] with
//! each result. When an operation fails the connection is closed before the
//! error is returned, so a chain such as
//!
//! ```no_run
//! # use rust_sqlite_crud::{Session, SqliteConfig, Value};
//! # async fn demo() -> rust_sqlite_crud::Result<()> {
//! let mut session = Session::open(SqliteConfig::new("chinook.db")).await?;
//! session
//!     .create("artists", &["Name"], &[Value::from("Tool")])
//!     .await?
//!     .bind_last_id("tool");
//! let tool = session.binding("tool").cloned().unwrap_or(Value::Null);
//! let found = session.exists("artists", "ArtistId", &tool).await?.cursor().exists();
//! session.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! never leaves the connection open behind an error.

use std::collections::HashMap;

use log::info;

use crate::{
    sqlite::{Crud, SqliteConfig, SqliteDatabase},
    value::{Row, Value, WriteSummary},
    Result,
};

/// Result of the most recent operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cursor {
    #[default]
    Empty,
    Rows(Vec<Row>),
    Write(WriteSummary),
    Exists(bool),
    Mapped(Vec<Value>),
}

impl Cursor {
    /// Rows of a read; empty for any other result.
    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Rows(rows) => rows,
            _ => &[],
        }
    }

    pub fn last_id(&self) -> Option<i64> {
        match self {
            Self::Write(summary) => Some(summary.last_insert_id),
            _ => None,
        }
    }

    pub fn changes(&self) -> Option<usize> {
        match self {
            Self::Write(summary) => Some(summary.changes),
            _ => None,
        }
    }

    /// True only for a positive existence check.
    pub fn exists(&self) -> bool {
        matches!(self, Self::Exists(true))
    }

    pub fn mapped(&self) -> &[Value] {
        match self {
            Self::Mapped(values) => values,
            _ => &[],
        }
    }
}

pub struct Session {
    db: SqliteDatabase,
    cursor: Cursor,
    bindings: HashMap<String, Value>,
}

impl Session {
    pub fn new(db: SqliteDatabase) -> Self {
        Self {
            db,
            cursor: Cursor::Empty,
            bindings: HashMap::new(),
        }
    }

    pub async fn open(config: SqliteConfig) -> Result<Self> {
        Ok(Self::new(SqliteDatabase::open(config).await?))
    }

    pub fn database(&self) -> &SqliteDatabase {
        &self.db
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn into_cursor(self) -> Cursor {
        self.cursor
    }

    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Store a value derived from the cursor under `name`.
    pub fn bind(&mut self, name: &str, f: impl FnOnce(&Cursor) -> Value) -> &mut Self {
        let value = f(&self.cursor);
        self.bindings.insert(name.to_string(), value);
        self
    }

    /// Store the last inserted rowid under `name`, or null after a non-write.
    pub fn bind_last_id(&mut self, name: &str) -> &mut Self {
        self.bind(name, |cursor| Value::from(cursor.last_id()))
    }

    /// Observe the cursor without changing it.
    pub fn inspect(&mut self, f: impl FnOnce(&Cursor)) -> &mut Self {
        f(&self.cursor);
        self
    }

    async fn step(&mut self, result: Result<Cursor>) -> Result<&mut Self> {
        match result {
            Ok(cursor) => {
                self.cursor = cursor;
                Ok(self)
            }
            Err(err) => {
                self.db.fail().await;
                Err(err)
            }
        }
    }

    pub async fn create(
        &mut self,
        table: &str,
        columns: &[&str],
        values: &[Value],
    ) -> Result<&mut Self> {
        let result = self.db.create(table, columns, values).await.map(Cursor::Write);
        self.step(result).await
    }

    pub async fn create_many(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<Value>],
    ) -> Result<&mut Self> {
        let result = self.db.create_many(table, columns, rows).await.map(Cursor::Write);
        self.step(result).await
    }

    pub async fn read(
        &mut self,
        table: &str,
        columns: &[&str],
        criteria: &str,
    ) -> Result<&mut Self> {
        let result = self.db.read(table, columns, criteria).await.map(Cursor::Rows);
        self.step(result).await
    }

    pub async fn get_row(&mut self, table: &str, column: &str, value: &Value) -> Result<&mut Self> {
        let result = self.db.get_row(table, column, value).await.map(Cursor::Rows);
        self.step(result).await
    }

    pub async fn get_rows(&mut self, table: &str, columns: &[&str]) -> Result<&mut Self> {
        let result = self.db.get_rows(table, columns).await.map(Cursor::Rows);
        self.step(result).await
    }

    pub async fn exists(&mut self, table: &str, column: &str, value: &Value) -> Result<&mut Self> {
        let result = self.db.exists(table, column, value).await.map(Cursor::Exists);
        self.step(result).await
    }

    pub async fn update(
        &mut self,
        table: &str,
        columns: &[&str],
        values: &[Value],
        criteria: &str,
    ) -> Result<&mut Self> {
        let result = self
            .db
            .update(table, columns, values, criteria)
            .await
            .map(Cursor::Write);
        self.step(result).await
    }

    pub async fn update_row(
        &mut self,
        table: &str,
        columns: &[&str],
        values: &[Value],
        criteria_column: &str,
        criteria_value: &Value,
    ) -> Result<&mut Self> {
        let result = self
            .db
            .update_row(table, columns, values, criteria_column, criteria_value)
            .await
            .map(Cursor::Write);
        self.step(result).await
    }

    pub async fn delete(&mut self, table: &str, criteria: &str) -> Result<&mut Self> {
        let result = self.db.delete(table, criteria).await.map(Cursor::Write);
        self.step(result).await
    }

    pub async fn delete_row(&mut self, table: &str, column: &str, value: &Value) -> Result<&mut Self> {
        let result = self.db.delete_row(table, column, value).await.map(Cursor::Write);
        self.step(result).await
    }

    pub async fn delete_rows(&mut self, table: &str) -> Result<&mut Self> {
        let result = self.db.delete_rows(table).await.map(Cursor::Write);
        self.step(result).await
    }

    pub async fn query(&mut self, statement: &str) -> Result<&mut Self> {
        let result = self.db.query(statement).await.map(Cursor::Write);
        self.step(result).await
    }

    pub async fn query_rows(&mut self, statement: &str) -> Result<&mut Self> {
        let result = self.db.query_rows(statement).await.map(Cursor::Rows);
        self.step(result).await
    }

    /// Apply `f` to every row of `statement`; the cursor holds the results.
    pub async fn map<F>(&mut self, statement: &str, f: F) -> Result<&mut Self>
    where
        F: FnMut(Row) -> anyhow::Result<Value> + Send,
    {
        let result = self.db.map(statement, f).await.map(Cursor::Mapped);
        self.step(result).await
    }

    /// Close the connection, keeping the cursor of the last operation.
    pub async fn close(&mut self) -> Result<&mut Self> {
        let result = self.db.close().await;
        if result.is_ok() {
            info!("session closed");
        }
        result.map(|()| self)
    }
}

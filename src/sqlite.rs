use std::{
    collections::HashMap,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use futures::lock::Mutex;
use log::{error, info, trace, warn};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::{
    sanitize::{self, SanitizeMode},
    schema::{self, ColumnInfo},
    statement::CrudOperation,
    value::{Row, Value, WriteSummary},
    Error, Result,
};

/// Path that always opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// How the database file is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
    #[default]
    ReadWriteCreate,
    InMemory,
}

impl OpenMode {
    fn flags(self) -> OpenFlags {
        let base = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match self {
            Self::ReadOnly => base | OpenFlags::SQLITE_OPEN_READ_ONLY,
            Self::ReadWrite => base | OpenFlags::SQLITE_OPEN_READ_WRITE,
            Self::ReadWriteCreate | Self::InMemory => {
                base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        }
    }
}

/// SQLite connection configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, in-memory when absent
    pub db_path: Option<PathBuf>,
    pub mode: OpenMode,
    pub sanitize_mode: SanitizeMode,
}

impl SqliteConfig {
    /// Create a config for a file-backed database
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(db_path.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self {
            mode: OpenMode::InMemory,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_sanitize_mode(mut self, sanitize_mode: SanitizeMode) -> Self {
        self.sanitize_mode = sanitize_mode;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.mode == OpenMode::InMemory
            || self
                .db_path
                .as_deref()
                .map_or(true, |path| path == Path::new(MEMORY_PATH))
    }

    fn path(&self) -> &Path {
        match &self.db_path {
            Some(path) if !self.is_in_memory() => path.as_path(),
            _ => Path::new(MEMORY_PATH),
        }
    }

    fn open_connection(&self) -> Result<Connection> {
        let path = self.path();
        info!("opening sqlite database at {} ({:?})", path.display(), self.mode);
        let connection = if self.is_in_memory() {
            Connection::open_in_memory_with_flags(self.mode.flags())
        } else {
            Connection::open_with_flags(path, self.mode.flags())
        };
        connection.map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Run `statement`, loading every result row into memory.
pub(crate) fn all(conn: &Connection, statement: &str) -> Result<Vec<Row>> {
    trace!("all: {statement}");
    let execution = |source: rusqlite::Error| Error::execution(statement, source);

    let mut stmt = conn.prepare(statement).map_err(execution)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt
        .query_map([], |row| Row::from_sqlite(&names, row))
        .map_err(execution)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(execution)
}

/// Run `statement` for its side effect.
pub(crate) fn run(conn: &Connection, statement: &str) -> Result<WriteSummary> {
    trace!("run: {statement}");
    let changes = conn
        .execute(statement, [])
        .map_err(|source| Error::execution(statement, source))?;
    Ok(WriteSummary {
        last_insert_id: conn.last_insert_rowid(),
        changes,
    })
}

/// Run `statement`, handing rows to `f` one at a time as the engine yields them.
pub(crate) fn each<T>(
    conn: &Connection,
    statement: &str,
    mut f: impl FnMut(Row) -> anyhow::Result<T>,
) -> Result<Vec<T>> {
    trace!("each: {statement}");
    let execution = |source: rusqlite::Error| Error::execution(statement, source);

    let mut stmt = conn.prepare(statement).map_err(execution)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([]).map_err(execution)?;

    let mut results = Vec::new();
    while let Some(row) = rows.next().map_err(execution)? {
        let row = Row::from_sqlite(&names, row).map_err(execution)?;
        results.push(f(row).map_err(Error::RowHandler)?);
    }
    Ok(results)
}

fn close_connection(connection: Connection) -> Result<()> {
    connection
        .close()
        .map_err(|(_, source)| Error::Close(source))?;
    info!("closed sqlite database");
    Ok(())
}

/// The fixed set of operations offered on an open database.
///
/// Values are coerced against the live column metadata of `table` before they
/// are written into the statement; criteria expressions and raw statements are
/// used verbatim.
#[async_trait]
pub trait Crud {
    /// `INSERT` one row.
    async fn create(&self, table: &str, columns: &[&str], values: &[Value])
        -> Result<WriteSummary>;

    /// `INSERT` several rows with a single multi-row `VALUES` clause.
    async fn create_many(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<Value>],
    ) -> Result<WriteSummary>;

    async fn read(&self, table: &str, columns: &[&str], criteria: &str) -> Result<Vec<Row>>;

    /// At most one full row whose `column` equals `value`.
    async fn get_row(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>>;

    /// The given columns of every row in `table`.
    async fn get_rows(&self, table: &str, columns: &[&str]) -> Result<Vec<Row>>;

    /// True iff [`Crud::get_row`] returns exactly one row.
    async fn exists(&self, table: &str, column: &str, value: &Value) -> Result<bool>;

    async fn update(
        &self,
        table: &str,
        columns: &[&str],
        values: &[Value],
        criteria: &str,
    ) -> Result<WriteSummary>;

    async fn update_row(
        &self,
        table: &str,
        columns: &[&str],
        values: &[Value],
        criteria_column: &str,
        criteria_value: &Value,
    ) -> Result<WriteSummary>;

    async fn delete(&self, table: &str, criteria: &str) -> Result<WriteSummary>;

    async fn delete_row(&self, table: &str, column: &str, value: &Value) -> Result<WriteSummary>;

    async fn delete_rows(&self, table: &str) -> Result<WriteSummary>;

    /// Run a statement that returns no rows.
    async fn query(&self, statement: &str) -> Result<WriteSummary>;

    async fn query_rows(&self, statement: &str) -> Result<Vec<Row>>;

    /// Apply `f` to every row of `statement`, collecting the results.
    async fn map<T, F>(&self, statement: &str, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: FnMut(Row) -> anyhow::Result<T> + Send;

    /// Close the connection. Every later operation fails with [`Error::Closed`].
    async fn close(&self) -> Result<()>;
}

/// Handle to one SQLite connection.
///
/// Clones share the connection. Operations lock it for their whole duration,
/// so they run strictly one after another.
#[derive(Clone)]
pub struct SqliteDatabase {
    config: Arc<SqliteConfig>,
    connection: Arc<Mutex<Option<Connection>>>,
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteDatabase {
    pub async fn open(config: SqliteConfig) -> Result<Self> {
        let connection = config.open_connection()?;
        Ok(Self {
            config: Arc::new(config),
            connection: Arc::new(Mutex::new(Some(connection))),
        })
    }

    /// Open a database, hand it to `f`, and close it on every exit path.
    ///
    /// When `f` fails the connection is closed before its error is returned;
    /// a close failure at that point is logged and the original error wins.
    pub async fn scoped<T, E, F, Fut>(config: SqliteConfig, f: F) -> Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let db = Self::open(config).await?;
        match f(db.clone()).await {
            Ok(value) => {
                db.close_if_open().await?;
                Ok(value)
            }
            Err(err) => {
                db.fail().await;
                Err(err)
            }
        }
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    pub async fn is_open(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.connection.lock().await;
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        f(conn)
    }

    /// Run `statement` and return all rows.
    pub async fn all(&self, statement: &str) -> Result<Vec<Row>> {
        self.with_connection(|conn| all(conn, statement)).await
    }

    /// Run `statement` for its side effect.
    pub async fn run(&self, statement: &str) -> Result<WriteSummary> {
        self.with_connection(|conn| run(conn, statement)).await
    }

    /// Run `statement`, calling `f` once per row without buffering the result set.
    pub async fn each<T, F>(&self, statement: &str, f: F) -> Result<Vec<T>>
    where
        F: FnMut(Row) -> anyhow::Result<T>,
    {
        self.with_connection(|conn| each(conn, statement, f)).await
    }

    /// Column metadata of `table` keyed by column name.
    pub async fn columns(&self, table: &str) -> Result<HashMap<String, ColumnInfo>> {
        self.with_connection(|conn| schema::table_columns(conn, table))
            .await
    }

    /// Sanitize `values` against the current column metadata of `table`.
    pub async fn sanitize_values(
        &self,
        table: &str,
        columns: &[&str],
        values: &[Value],
    ) -> Result<Vec<String>> {
        let mode = self.config.sanitize_mode;
        self.with_connection(|conn| {
            let metadata = schema::table_columns(conn, table)?;
            sanitize::sanitize_values(&metadata, table, columns, values, mode)
        })
        .await
    }

    /// Sanitize against the live schema, build a statement from the fragments and run it.
    async fn write<F>(
        &self,
        table: &str,
        columns: &[&str],
        values: &[Value],
        build: F,
    ) -> Result<WriteSummary>
    where
        F: FnOnce(Vec<String>) -> CrudOperation + Send,
    {
        let mode = self.config.sanitize_mode;
        self.with_connection(|conn| {
            let metadata = schema::table_columns(conn, table)?;
            let fragments = sanitize::sanitize_values(&metadata, table, columns, values, mode)?;
            run(conn, &build(fragments).to_sql())
        })
        .await
    }

    /// Sanitize a single key value against `column` of `table`.
    fn sanitize_key(
        &self,
        conn: &Connection,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<String> {
        let metadata = schema::table_columns(conn, table)?;
        let mut fragments = sanitize::sanitize_values(
            &metadata,
            table,
            &[column],
            std::slice::from_ref(value),
            self.config.sanitize_mode,
        )?;
        Ok(fragments.remove(0))
    }

    /// Close the connection if still open. Used on failure paths.
    pub(crate) async fn fail(&self) {
        match self.close_if_open().await {
            Ok(true) => warn!("closed sqlite database after failed operation"),
            Ok(false) => {}
            Err(err) => error!("failed to close sqlite database after failed operation: {err}"),
        }
    }

    /// Returns whether a connection was open and is now closed.
    pub(crate) async fn close_if_open(&self) -> Result<bool> {
        let connection = self.connection.lock().await.take();
        match connection {
            Some(connection) => close_connection(connection).map(|()| true),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl Crud for SqliteDatabase {
    async fn create(
        &self,
        table: &str,
        columns: &[&str],
        values: &[Value],
    ) -> Result<WriteSummary> {
        self.write(table, columns, values, |fragments| {
            CrudOperation::create(table, columns, fragments)
        })
        .await
    }

    async fn create_many(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<Value>],
    ) -> Result<WriteSummary> {
        let mode = self.config.sanitize_mode;
        self.with_connection(|conn| {
            let metadata = schema::table_columns(conn, table)?;
            let rows = rows
                .iter()
                .map(|values| sanitize::sanitize_values(&metadata, table, columns, values, mode))
                .collect::<Result<Vec<_>>>()?;
            run(conn, &CrudOperation::create_many(table, columns, rows).to_sql())
        })
        .await
    }

    async fn read(&self, table: &str, columns: &[&str], criteria: &str) -> Result<Vec<Row>> {
        self.all(&CrudOperation::read(table, columns, criteria).to_sql())
            .await
    }

    async fn get_row(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>> {
        self.with_connection(|conn| {
            let key = self.sanitize_key(conn, table, column, value)?;
            all(conn, &CrudOperation::get_row(table, column, &key).to_sql())
        })
        .await
    }

    async fn get_rows(&self, table: &str, columns: &[&str]) -> Result<Vec<Row>> {
        self.all(&CrudOperation::get_rows(table, columns).to_sql())
            .await
    }

    async fn exists(&self, table: &str, column: &str, value: &Value) -> Result<bool> {
        Ok(self.get_row(table, column, value).await?.len() == 1)
    }

    async fn update(
        &self,
        table: &str,
        columns: &[&str],
        values: &[Value],
        criteria: &str,
    ) -> Result<WriteSummary> {
        self.write(table, columns, values, |fragments| {
            CrudOperation::update(table, columns, fragments, criteria)
        })
        .await
    }

    async fn update_row(
        &self,
        table: &str,
        columns: &[&str],
        values: &[Value],
        criteria_column: &str,
        criteria_value: &Value,
    ) -> Result<WriteSummary> {
        let mode = self.config.sanitize_mode;
        self.with_connection(|conn| {
            let metadata = schema::table_columns(conn, table)?;
            let fragments = sanitize::sanitize_values(&metadata, table, columns, values, mode)?;
            let key = self.sanitize_key(conn, table, criteria_column, criteria_value)?;
            let op = CrudOperation::update_row(table, columns, fragments, criteria_column, &key);
            run(conn, &op.to_sql())
        })
        .await
    }

    async fn delete(&self, table: &str, criteria: &str) -> Result<WriteSummary> {
        self.run(&CrudOperation::delete(table, criteria).to_sql())
            .await
    }

    async fn delete_row(&self, table: &str, column: &str, value: &Value) -> Result<WriteSummary> {
        self.with_connection(|conn| {
            let key = self.sanitize_key(conn, table, column, value)?;
            run(conn, &CrudOperation::delete_row(table, column, &key).to_sql())
        })
        .await
    }

    async fn delete_rows(&self, table: &str) -> Result<WriteSummary> {
        self.run(&CrudOperation::delete_rows(table).to_sql()).await
    }

    async fn query(&self, statement: &str) -> Result<WriteSummary> {
        self.run(statement).await
    }

    async fn query_rows(&self, statement: &str) -> Result<Vec<Row>> {
        self.all(statement).await
    }

    async fn map<T, F>(&self, statement: &str, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: FnMut(Row) -> anyhow::Result<T> + Send,
    {
        self.each(statement, f).await
    }

    async fn close(&self) -> Result<()> {
        let connection = self.connection.lock().await.take().ok_or(Error::Closed)?;
        close_connection(connection)
    }
}

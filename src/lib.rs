//! Chained CRUD operations over SQLite.
//!
//! # Intention
//!
//! - Offer a small, closed set of create/read/update/delete operations on a
//!   single SQLite connection.
//! - Build every statement as literal SQL text, coercing each value according
//!   to the declared type of the column it is written to.
//! - Guarantee the connection is closed exactly once, including when an
//!   operation fails.
//!
//! # Architectural Boundaries
//!
//! - The SQLite engine does all parsing, execution and file I/O; this crate
//!   only assembles statements and threads results.
//! - No migrations, no connection pool, no transaction management.
//!
//! ```no_run
//! use rust_sqlite_crud::{Crud, SqliteConfig, SqliteDatabase, Value};
//!
//! # async fn demo() -> rust_sqlite_crud::Result<()> {
//! let db = SqliteDatabase::open(SqliteConfig::new("chinook.db")).await?;
//! let summary = db
//!     .create("artists", &["Name"], &[Value::from("Nine Inch Nails")])
//!     .await?;
//! let rows = db
//!     .get_row("artists", "ArtistId", &Value::from(summary.last_insert_id))
//!     .await?;
//! assert_eq!(rows.len(), 1);
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod sanitize;
pub mod schema;
pub mod session;
pub mod sqlite;
pub mod statement;
pub mod value;

pub use error::{Error, Result};
pub use sanitize::{sanitize, sanitize_values, SanitizeMode};
pub use schema::{classify_type, ColumnInfo, TypeClass};
pub use session::{Cursor, Session};
pub use sqlite::{Crud, OpenMode, SqliteConfig, SqliteDatabase};
pub use statement::CrudOperation;
pub use value::{Row, Value, WriteSummary};

use anyhow::Result;
use pretty_assertions::assert_eq;
use rust_sqlite_crud::{
    Crud, Error, OpenMode, SanitizeMode, SqliteConfig, SqliteDatabase, Value,
};
use tempfile::NamedTempFile;

const SCHEMA: [&str; 3] = [
    r#"CREATE TABLE artists (
        ArtistId INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        Name NVARCHAR(120)
    )"#,
    r#"CREATE TABLE albums (
        AlbumId INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        Title NVARCHAR(160) NOT NULL,
        ArtistId INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE tracks (
        TrackId INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        Name NVARCHAR(200) NOT NULL,
        Milliseconds INTEGER NOT NULL,
        UnitPrice NUMERIC(10,2) NOT NULL,
        Rating REAL,
        Cover BLOB
    )"#,
];

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Helper function to create an in-memory database for testing
async fn create_test_db() -> Result<SqliteDatabase> {
    create_test_db_with(SanitizeMode::Compatible).await
}

async fn create_test_db_with(sanitize_mode: SanitizeMode) -> Result<SqliteDatabase> {
    init_logging();
    let config = SqliteConfig::in_memory().with_sanitize_mode(sanitize_mode);
    let db = SqliteDatabase::open(config).await?;
    initialize_schema(&db).await?;
    Ok(db)
}

// Helper function to create a temporary file-based database
async fn create_temp_db() -> Result<(SqliteDatabase, NamedTempFile)> {
    init_logging();
    let temp_file = NamedTempFile::new()?;
    let db = SqliteDatabase::open(SqliteConfig::new(temp_file.path())).await?;
    initialize_schema(&db).await?;
    Ok((db, temp_file))
}

// Create the tables and seed three artists (ids 1..=3)
async fn initialize_schema(db: &SqliteDatabase) -> Result<()> {
    for statement in SCHEMA {
        db.query(statement).await?;
    }
    db.create_many(
        "artists",
        &["Name"],
        &[
            vec![Value::from("AC/DC")],
            vec![Value::from("Accept")],
            vec![Value::from("Aerosmith")],
        ],
    )
    .await?;
    Ok(())
}

fn name_of(row: &rust_sqlite_crud::Row) -> Option<&str> {
    row.get("Name").and_then(Value::as_str)
}

#[tokio::test]
async fn create_then_get_row_by_last_insert_id() -> Result<()> {
    let db = create_test_db().await?;

    let summary = db
        .create("artists", &["Name"], &[Value::from("Rage Against The Machine")])
        .await?;
    assert_eq!(summary.changes, 1);
    assert_eq!(summary.last_insert_id, 4);

    let rows = db
        .get_row("artists", "ArtistId", &Value::from(summary.last_insert_id))
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(name_of(&rows[0]), Some("Rage Against The Machine"));
    assert_eq!(rows[0].get("ArtistId"), Some(&Value::Integer(4)));
    Ok(())
}

#[tokio::test]
async fn delete_row_then_exists_is_false() -> Result<()> {
    let db = create_test_db().await?;
    let nin = db
        .create("artists", &["Name"], &[Value::from("Nine Inch Nails")])
        .await?
        .last_insert_id;
    let key = Value::from(nin);

    assert!(db.exists("artists", "ArtistId", &key).await?);
    let summary = db.delete_row("artists", "ArtistId", &key).await?;
    assert_eq!(summary.changes, 1);
    assert!(!db.exists("artists", "ArtistId", &key).await?);
    Ok(())
}

#[tokio::test]
async fn delete_rows_then_get_rows_is_empty() -> Result<()> {
    let db = create_test_db().await?;

    let summary = db.delete_rows("artists").await?;
    assert_eq!(summary.changes, 3);
    assert!(db.get_rows("artists", &["ArtistId", "Name"]).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn key_values_are_coerced_to_the_column_type() -> Result<()> {
    let db = create_test_db().await?;

    // "2" is parsed as an integer for the INTEGER key column.
    let rows = db.get_row("artists", "ArtistId", &Value::from("2")).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(name_of(&rows[0]), Some("Accept"));
    Ok(())
}

#[tokio::test]
async fn read_uses_criteria_verbatim() -> Result<()> {
    let db = create_test_db().await?;

    let rows = db
        .read("artists", &["Name", "ArtistId"], "ArtistId > 1 ORDER BY ArtistId")
        .await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].column_names().collect::<Vec<_>>(), ["Name", "ArtistId"]);
    assert_eq!(name_of(&rows[1]), Some("Aerosmith"));

    assert!(db
        .read("artists", &["ArtistId"], "ArtistID > 100")
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn update_and_update_row() -> Result<()> {
    let db = create_test_db().await?;

    let summary = db
        .update("artists", &["Name"], &[Value::from("Renamed")], "ArtistId > 1")
        .await?;
    assert_eq!(summary.changes, 2);

    let summary = db
        .update_row(
            "artists",
            &["Name"],
            &[Value::from("Not AC/DC")],
            "ArtistId",
            &Value::from(1),
        )
        .await?;
    assert_eq!(summary.changes, 1);

    let names = db
        .query_rows("SELECT Name FROM artists ORDER BY ArtistId")
        .await?
        .iter()
        .map(|row| name_of(row).unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, ["Not AC/DC", "Renamed", "Renamed"]);
    Ok(())
}

#[tokio::test]
async fn delete_with_criteria() -> Result<()> {
    let db = create_test_db().await?;

    let summary = db.delete("artists", "Name LIKE 'A%'").await?;
    assert_eq!(summary.changes, 3);
    Ok(())
}

#[tokio::test]
async fn create_many_inserts_every_row() -> Result<()> {
    let db = create_test_db().await?;

    let summary = db
        .create_many(
            "albums",
            &["Title", "ArtistId"],
            &[
                vec![Value::from("Back in Black"), Value::from(1)],
                vec![Value::from("Balls to the Wall"), Value::from("2")],
            ],
        )
        .await?;
    assert_eq!(summary.changes, 2);
    assert_eq!(summary.last_insert_id, 2);

    let rows = db.get_rows("albums", &["ArtistId"]).await?;
    let ids = rows
        .iter()
        .map(|row| row.get("ArtistId").and_then(Value::as_i64))
        .collect::<Vec<_>>();
    assert_eq!(ids, [Some(1), Some(2)]);
    Ok(())
}

#[tokio::test]
async fn every_type_class_round_trips() -> Result<()> {
    let db = create_test_db().await?;

    let columns = db.columns("tracks").await?;
    assert_eq!(columns["UnitPrice"].declared_type, "NUMERIC(10,2)");

    let id = db
        .create(
            "tracks",
            &["Name", "Milliseconds", "UnitPrice", "Rating", "Cover"],
            &[
                Value::from("Bulls on Parade"),
                Value::from("231000ms"),
                Value::from("0.99"),
                Value::from(4.5),
                Value::from(vec![0xCA_u8, 0xFE]),
            ],
        )
        .await?
        .last_insert_id;

    let rows = db.get_row("tracks", "TrackId", &Value::from(id)).await?;
    let row = &rows[0];
    assert_eq!(row.get("Milliseconds"), Some(&Value::Integer(231_000)));
    assert_eq!(row.get("UnitPrice"), Some(&Value::Real(0.99)));
    assert_eq!(row.get("Rating"), Some(&Value::Real(4.5)));
    assert_eq!(row.get("Cover"), Some(&Value::Blob(vec![0xCA, 0xFE])));
    Ok(())
}

#[tokio::test]
async fn missing_column_fails_without_writing() -> Result<()> {
    let db = create_test_db().await?;

    let err = db
        .create("artists", &["Genre"], &[Value::from("Metal")])
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::MissingColumn { ref column, .. } if column == "Genre"),
        "{err:?}"
    );
    assert_eq!(db.get_rows("artists", &["Name"]).await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn non_numeric_integer_is_rejected_by_the_engine() -> Result<()> {
    let db = create_test_db().await?;

    let err = db
        .create("albums", &["Title", "ArtistId"], &[Value::from("X"), Value::from("abc")])
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Execution { ref statement, .. } if statement.ends_with("(\"X\", NaN)")),
        "{err:?}"
    );
    Ok(())
}

#[tokio::test]
async fn compatible_mode_keeps_unescaped_double_quotes() -> Result<()> {
    let db = create_test_db().await?;

    db.create("artists", &["Name"], &[Value::from("O'Reilly")]).await?;
    assert!(db.exists("artists", "Name", &Value::from("O'Reilly")).await?);

    let err = db
        .create("artists", &["Name"], &[Value::from(r#"Say "Hi""#)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Execution { .. }), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn strict_mode_escapes_text_and_rejects_bad_numbers() -> Result<()> {
    let db = create_test_db_with(SanitizeMode::Strict).await?;

    for name in ["O'Reilly", r#"Say "Hi""#] {
        let id = db
            .create("artists", &["Name"], &[Value::from(name)])
            .await?
            .last_insert_id;
        let rows = db.get_row("artists", "ArtistId", &Value::from(id)).await?;
        assert_eq!(name_of(&rows[0]), Some(name));
    }

    let err = db
        .create("albums", &["Title", "ArtistId"], &[Value::from("X"), Value::from("abc")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidNumber { ref column, .. } if column == "ArtistId"));
    Ok(())
}

#[tokio::test]
async fn raw_query_and_map() -> Result<()> {
    let db = create_test_db().await?;

    let summary = db.query("INSERT INTO artists (Name) VALUES ('Tool')").await?;
    assert_eq!(summary.last_insert_id, 4);

    let rows = db.query_rows("SELECT COUNT(*) AS n FROM artists").await?;
    assert_eq!(rows[0].get("n"), Some(&Value::Integer(4)));

    let upper = db
        .map("SELECT Name FROM artists ORDER BY ArtistId", |row| {
            Ok(name_of(&row).unwrap_or_default().to_uppercase())
        })
        .await?;
    assert_eq!(upper, ["AC/DC", "ACCEPT", "AEROSMITH", "TOOL"]);

    let err = db
        .map("SELECT Name FROM artists", |_row| {
            Err::<(), _>(anyhow::anyhow!("row rejected"))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RowHandler(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn malformed_statement_is_an_execution_error() -> Result<()> {
    let db = create_test_db().await?;

    let err = db.query_rows("SELEC nothing").await.unwrap_err();
    assert!(matches!(err, Error::Execution { .. }), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn empty_column_list_is_rejected() -> Result<()> {
    let db = create_test_db().await?;

    let err = db.get_rows("artists", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Execution { .. }), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn close_is_final() -> Result<()> {
    let db = create_test_db().await?;
    let clone = db.clone();

    db.close().await?;
    assert!(!clone.is_open().await);
    assert!(matches!(
        clone.get_rows("artists", &["Name"]).await,
        Err(Error::Closed)
    ));
    assert!(matches!(db.close().await, Err(Error::Closed)));
    Ok(())
}

#[tokio::test]
async fn file_database_persists_and_honours_read_only() -> Result<()> {
    let (db, temp_file) = create_temp_db().await?;
    db.create("artists", &["Name"], &[Value::from("Metallica")]).await?;
    db.close().await?;

    let config = SqliteConfig::new(temp_file.path()).with_mode(OpenMode::ReadOnly);
    let db = SqliteDatabase::open(config).await?;
    assert_eq!(db.get_rows("artists", &["Name"]).await?.len(), 4);

    let err = db
        .create("artists", &["Name"], &[Value::from("Megadeth")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Execution { .. }), "{err:?}");
    db.close().await?;
    Ok(())
}

#[tokio::test]
async fn in_memory_database_honours_read_only() -> Result<()> {
    init_logging();
    let db = SqliteDatabase::open(SqliteConfig::in_memory().with_mode(OpenMode::ReadOnly)).await?;

    let err = db.query("CREATE TABLE artists (Name TEXT)").await.unwrap_err();
    assert!(matches!(err, Error::Execution { .. }), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn open_without_create_fails_for_missing_file() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let config = SqliteConfig::new(dir.path().join("missing.db")).with_mode(OpenMode::ReadWrite);

    let err = SqliteDatabase::open(config).await.unwrap_err();
    assert!(matches!(err, Error::Open { .. }), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn scoped_closes_on_success() -> Result<()> {
    init_logging();
    let db = SqliteDatabase::scoped(SqliteConfig::in_memory(), |db| async move {
        db.query("CREATE TABLE artists (ArtistId INTEGER PRIMARY KEY, Name TEXT)")
            .await?;
        db.create("artists", &["Name"], &[Value::from("Slayer")]).await?;
        Ok::<_, anyhow::Error>(db)
    })
    .await?;

    assert!(!db.is_open().await);
    Ok(())
}

#[tokio::test]
async fn scoped_closes_before_returning_error() -> Result<()> {
    init_logging();
    let mut escaped = None;
    let result = SqliteDatabase::scoped(SqliteConfig::in_memory(), |db| {
        escaped = Some(db.clone());
        async move {
            db.query("NOT SQL").await?;
            Ok::<(), Error>(())
        }
    })
    .await;

    assert!(matches!(result, Err(Error::Execution { .. })));
    let db = escaped.expect("closure ran");
    assert!(!db.is_open().await);
    Ok(())
}

//! Statement assembly from already-sanitized fragments.
//!
//! Table names, column names and criteria expressions are embedded verbatim.

/// Insert of one or more rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOperation {
    pub table: String,
    /// Selected columns, joined verbatim.
    pub fields: Vec<String>,
    pub criteria: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    pub table: String,
    pub updates: Vec<(String, String)>,
    pub criteria: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    pub table: String,
    pub criteria: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudOperation {
    Create(CreateOperation),
    Read(ReadOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

/// `<column> = <value>` equality criteria.
pub fn equals(column: &str, value: &str) -> String {
    format!("{column} = {value}")
}

impl CrudOperation {
    pub fn create(table: &str, columns: &[&str], values: Vec<String>) -> Self {
        Self::create_many(table, columns, vec![values])
    }

    pub fn create_many(table: &str, columns: &[&str], rows: Vec<Vec<String>>) -> Self {
        Self::Create(CreateOperation {
            table: table.to_string(),
            columns: owned(columns),
            rows,
        })
    }

    pub fn read(table: &str, columns: &[&str], criteria: &str) -> Self {
        Self::Read(ReadOperation {
            table: table.to_string(),
            fields: owned(columns),
            criteria: Some(criteria.to_string()),
            limit: None,
        })
    }

    /// First row whose `column` equals the sanitized `value`.
    pub fn get_row(table: &str, column: &str, value: &str) -> Self {
        Self::Read(ReadOperation {
            table: table.to_string(),
            fields: vec!["*".to_string()],
            criteria: Some(equals(column, value)),
            limit: Some(1),
        })
    }

    pub fn get_rows(table: &str, columns: &[&str]) -> Self {
        Self::Read(ReadOperation {
            table: table.to_string(),
            fields: owned(columns),
            criteria: None,
            limit: None,
        })
    }

    pub fn update(table: &str, columns: &[&str], values: Vec<String>, criteria: &str) -> Self {
        Self::Update(UpdateOperation {
            table: table.to_string(),
            updates: owned(columns).into_iter().zip(values).collect(),
            criteria: criteria.to_string(),
        })
    }

    pub fn update_row(
        table: &str,
        columns: &[&str],
        values: Vec<String>,
        criteria_column: &str,
        criteria_value: &str,
    ) -> Self {
        Self::update(table, columns, values, &equals(criteria_column, criteria_value))
    }

    pub fn delete(table: &str, criteria: &str) -> Self {
        Self::Delete(DeleteOperation {
            table: table.to_string(),
            criteria: Some(criteria.to_string()),
        })
    }

    pub fn delete_row(table: &str, column: &str, value: &str) -> Self {
        Self::delete(table, &equals(column, value))
    }

    pub fn delete_rows(table: &str) -> Self {
        Self::Delete(DeleteOperation {
            table: table.to_string(),
            criteria: None,
        })
    }

    pub fn table(&self) -> &str {
        match self {
            Self::Create(op) => &op.table,
            Self::Read(op) => &op.table,
            Self::Update(op) => &op.table,
            Self::Delete(op) => &op.table,
        }
    }

    /// Render the literal SQL text.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Create(op) => {
                let rows = op
                    .rows
                    .iter()
                    .map(|row| format!("({})", row.join(", ")))
                    .collect::<Vec<_>>();
                format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    op.table,
                    op.columns.join(", "),
                    rows.join(", ")
                )
            }
            Self::Read(op) => {
                let mut sql = format!("SELECT {} FROM {}", op.fields.join(", "), op.table);
                if let Some(criteria) = &op.criteria {
                    sql.push_str(" WHERE ");
                    sql.push_str(criteria);
                }
                if let Some(limit) = op.limit {
                    sql.push_str(&format!(" LIMIT {limit}"));
                }
                sql
            }
            Self::Update(op) => {
                let updates = op
                    .updates
                    .iter()
                    .map(|(column, value)| equals(column, value))
                    .collect::<Vec<_>>();
                format!(
                    "UPDATE {} SET {} WHERE {}",
                    op.table,
                    updates.join(", "),
                    op.criteria
                )
            }
            Self::Delete(op) => match &op.criteria {
                Some(criteria) => format!("DELETE FROM {} WHERE {criteria}", op.table),
                None => format!("DELETE FROM {}", op.table),
            },
        }
    }
}

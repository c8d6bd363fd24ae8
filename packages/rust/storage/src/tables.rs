//! SQL for the per-scheme tables, generated from the schema registry.

use govdata_schema::{STATE_CODE_MAX_LEN, SchemeSchema, YEAR_RANGE};

/// `CREATE TABLE IF NOT EXISTS` for one scheme.
///
/// `(state_code, year)` is unique per table; the table itself stands for the
/// kind, so together they form the record key.
pub(crate) fn create_table_sql(schema: &SchemeSchema) -> String {
    let mut columns = vec![
        "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        format!(
            "state_code TEXT NOT NULL CHECK (length(state_code) BETWEEN 1 AND {STATE_CODE_MAX_LEN})"
        ),
        "state_name TEXT NOT NULL".to_string(),
        format!(
            "year INTEGER NOT NULL CHECK (year BETWEEN {} AND {})",
            YEAR_RANGE.start(),
            YEAR_RANGE.end()
        ),
    ];
    columns.extend(
        schema
            .fields
            .iter()
            .map(|f| format!("{} {}", f.name, f.ty.sql_type())),
    );
    columns.extend(schema.derived.iter().map(|name| format!("{name} REAL")));
    columns.push("created_at TEXT NOT NULL".into());
    columns.push("updated_at TEXT NOT NULL".into());
    columns.push("UNIQUE(state_code, year)".into());

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        schema.table(),
        columns.join(",\n    ")
    )
}

/// Atomic insert-or-overwrite keyed on `(state_code, year)`.
///
/// Parameters, in order: `state_code`, `state_name`, `year`, every scheme
/// column from [`SchemeSchema::columns`], `created_at`, `updated_at`.
/// On conflict every scheme column is replaced, so a value missing from the
/// incoming record clears the stored one; `created_at` is kept.
pub(crate) fn upsert_sql(schema: &SchemeSchema) -> String {
    let scheme_columns: Vec<&str> = schema.columns().collect();

    let mut insert_columns = vec!["state_code", "state_name", "year"];
    insert_columns.extend(&scheme_columns);
    insert_columns.extend(["created_at", "updated_at"]);

    let placeholders: Vec<String> = (1..=insert_columns.len()).map(|i| format!("?{i}")).collect();

    let mut updates = vec!["state_name = excluded.state_name".to_string()];
    updates.extend(scheme_columns.iter().map(|c| format!("{c} = excluded.{c}")));
    updates.push("updated_at = excluded.updated_at".into());

    format!(
        "INSERT INTO {table} ({columns}) VALUES ({values})
         ON CONFLICT(state_code, year) DO UPDATE SET {updates}",
        table = schema.table(),
        columns = insert_columns.join(", "),
        values = placeholders.join(", "),
        updates = updates.join(", "),
    )
}

/// Column list for reading a full row back.
pub(crate) fn select_columns(schema: &SchemeSchema) -> String {
    let mut columns = vec!["state_code", "state_name", "year"];
    columns.extend(schema.columns());
    columns.extend(["created_at", "updated_at"]);
    columns.join(", ")
}

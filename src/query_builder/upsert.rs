use crate::constants::MAX_BIND_PARAMETERS;
use crate::database::SqlValue;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryBuilderError {
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Upsert into {table} has no columns")]
    NoColumns { table: String },

    #[error("Upsert into {table} has no conflict keys")]
    NoConflictKeys { table: String },

    #[error("Conflict key {key} is not one of the inserted columns of {table}")]
    UnknownConflictKey { table: String, key: String },

    #[error("Column {column} of {table} cannot be both a conflict key and updateable")]
    UpdateOverlapsKey { table: String, column: String },

    #[error("Updateable column {column} is not one of the inserted columns of {table}")]
    UnknownUpdateColumn { table: String, column: String },

    #[error("Row {row} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Upsert into {table} needs {needed} bind parameters, limit is {MAX_BIND_PARAMETERS}")]
    TooManyParameters { table: String, needed: usize },

    #[error("Upsert into {table} has no rows")]
    NoRows { table: String },
}

/// Largest number of rows one statement can carry for `column_count` columns
pub fn max_rows_per_statement(column_count: usize) -> usize {
    if column_count == 0 {
        return 0;
    }
    MAX_BIND_PARAMETERS / column_count
}

fn validate_identifier(name: &str) -> Result<(), QueryBuilderError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(QueryBuilderError::InvalidIdentifier(name.to_string()))
    }
}

/// Quote a possibly schema-qualified identifier (`schema.table`)
pub fn quote_identifier(name: &str) -> Result<String, QueryBuilderError> {
    name.split('.')
        .map(|part| {
            validate_identifier(part)?;
            Ok(format!("\"{part}\""))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|parts| parts.join("."))
}

/// Multi-row `INSERT ... ON CONFLICT` statement with positional binds
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub conflict_keys: Vec<String>,
    pub updateable: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    pub sql: String,
}

impl UpsertStatement {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn bind_count(&self) -> usize {
        self.rows.len() * self.columns.len()
    }

    /// Bind values in placeholder order
    pub fn binds(&self) -> impl Iterator<Item = &SqlValue> {
        self.rows.iter().flatten()
    }

    /// Position of `column` within each row
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

/// Builder for [`UpsertStatement`]
///
/// Without an explicit update list every non-key column is updated on conflict.
#[derive(Debug, Clone, Default)]
pub struct UpsertBuilder {
    table: String,
    columns: Vec<String>,
    conflict_keys: Vec<String>,
    update_columns: Option<Vec<String>>,
    rows: Vec<Vec<SqlValue>>,
}

impl UpsertBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Default::default()
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn conflict_keys(mut self, keys: &[&str]) -> Self {
        self.conflict_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Columns overwritten from `EXCLUDED`; empty means `DO NOTHING`
    pub fn update_columns(mut self, columns: &[&str]) -> Self {
        self.update_columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn rows(mut self, rows: impl IntoIterator<Item = Vec<SqlValue>>) -> Self {
        self.rows.extend(rows);
        self
    }

    fn validate(&self) -> Result<Vec<String>, QueryBuilderError> {
        let table = self.table.clone();
        if self.columns.is_empty() {
            return Err(QueryBuilderError::NoColumns { table });
        }
        if self.conflict_keys.is_empty() {
            return Err(QueryBuilderError::NoConflictKeys { table });
        }
        if self.rows.is_empty() {
            return Err(QueryBuilderError::NoRows { table });
        }

        let known: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        for key in &self.conflict_keys {
            if !known.contains(key.as_str()) {
                return Err(QueryBuilderError::UnknownConflictKey {
                    table,
                    key: key.clone(),
                });
            }
        }

        let keys: HashSet<&str> = self.conflict_keys.iter().map(String::as_str).collect();
        let updateable = match &self.update_columns {
            Some(columns) => {
                for column in columns {
                    if keys.contains(column.as_str()) {
                        return Err(QueryBuilderError::UpdateOverlapsKey {
                            table,
                            column: column.clone(),
                        });
                    }
                    if !known.contains(column.as_str()) {
                        return Err(QueryBuilderError::UnknownUpdateColumn {
                            table,
                            column: column.clone(),
                        });
                    }
                }
                columns.clone()
            }
            None => self
                .columns
                .iter()
                .filter(|c| !keys.contains(c.as_str()))
                .cloned()
                .collect(),
        };

        for (index, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(QueryBuilderError::RowWidth {
                    row: index,
                    expected: self.columns.len(),
                    found: row.len(),
                });
            }
        }

        let needed = self.rows.len() * self.columns.len();
        if needed > MAX_BIND_PARAMETERS {
            return Err(QueryBuilderError::TooManyParameters { table, needed });
        }

        Ok(updateable)
    }

    pub fn build(self) -> Result<UpsertStatement, QueryBuilderError> {
        let updateable = self.validate()?;

        let table_sql = quote_identifier(&self.table)?;
        let column_sql = self
            .columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Result<Vec<_>, _>>()?;
        let key_sql = self
            .conflict_keys
            .iter()
            .map(|k| quote_identifier(k))
            .collect::<Result<Vec<_>, _>>()?;

        let width = self.columns.len();
        let values_sql = (0..self.rows.len())
            .map(|row| {
                let placeholders = (1..=width)
                    .map(|col| format!("${}", row * width + col))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({placeholders})")
            })
            .collect::<Vec<_>>()
            .join(", ");

        let action = if updateable.is_empty() {
            "DO NOTHING".to_string()
        } else {
            let assignments = updateable
                .iter()
                .map(|c| quote_identifier(c).map(|q| format!("{q} = EXCLUDED.{q}")))
                .collect::<Result<Vec<_>, _>>()?;
            format!("DO UPDATE SET {}", assignments.join(", "))
        };

        let sql = format!(
            "INSERT INTO {table_sql} ({}) VALUES {values_sql} ON CONFLICT ({}) {action}",
            column_sql.join(", "),
            key_sql.join(", "),
        );

        Ok(UpsertStatement {
            table: self.table,
            columns: self.columns,
            conflict_keys: self.conflict_keys,
            updateable,
            rows: self.rows,
            sql,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals_builder() -> UpsertBuilder {
        UpsertBuilder::new("totals")
            .columns(&["epoch_no", "treasury", "reserves"])
            .conflict_keys(&["epoch_no"])
    }

    #[test]
    fn test_multi_row_upsert_sql() {
        let statement = totals_builder()
            .row(vec![10_i64.into(), "1".into(), "2".into()])
            .row(vec![11_i64.into(), "3".into(), "4".into()])
            .build()
            .unwrap();

        assert_eq!(
            statement.sql,
            "INSERT INTO \"totals\" (\"epoch_no\", \"treasury\", \"reserves\") \
             VALUES ($1, $2, $3), ($4, $5, $6) \
             ON CONFLICT (\"epoch_no\") \
             DO UPDATE SET \"treasury\" = EXCLUDED.\"treasury\", \"reserves\" = EXCLUDED.\"reserves\""
        );
        assert_eq!(statement.bind_count(), 6);
        assert_eq!(statement.updateable, vec!["treasury", "reserves"]);
    }

    #[test]
    fn test_no_updateable_columns_does_nothing() {
        let statement = UpsertBuilder::new("governance.dreps")
            .columns(&["drep_id"])
            .conflict_keys(&["drep_id"])
            .row(vec!["drep1".into()])
            .build()
            .unwrap();
        assert!(statement.sql.starts_with("INSERT INTO \"governance\".\"dreps\""));
        assert!(statement.sql.ends_with("ON CONFLICT (\"drep_id\") DO NOTHING"));
    }

    #[test]
    fn test_explicit_update_list_must_not_overlap_keys() {
        let err = totals_builder()
            .update_columns(&["epoch_no"])
            .row(vec![1_i64.into(), "1".into(), "1".into()])
            .build()
            .unwrap_err();
        assert!(matches!(err, QueryBuilderError::UpdateOverlapsKey { .. }));
    }

    #[test]
    fn test_conflict_key_must_be_a_column() {
        let err = UpsertBuilder::new("totals")
            .columns(&["treasury"])
            .conflict_keys(&["epoch_no"])
            .row(vec!["1".into()])
            .build()
            .unwrap_err();
        assert!(matches!(err, QueryBuilderError::UnknownConflictKey { .. }));
    }

    #[test]
    fn test_row_width_is_checked() {
        let err = totals_builder().row(vec![1_i64.into()]).build().unwrap_err();
        assert_eq!(
            err,
            QueryBuilderError::RowWidth {
                row: 0,
                expected: 3,
                found: 1
            }
        );
    }

    #[test]
    fn test_bind_parameter_limit() {
        let rows = (0..(MAX_BIND_PARAMETERS / 3 + 1) as i64).map(|i| vec![i.into(), "1".into(), "1".into()]);
        let err = totals_builder().rows(rows).build().unwrap_err();
        assert!(matches!(err, QueryBuilderError::TooManyParameters { .. }));
        assert_eq!(max_rows_per_statement(3), 21_845);
    }

    #[test]
    fn test_identifiers_are_validated() {
        assert!(quote_identifier("proposal_votes").is_ok());
        assert!(quote_identifier("bad\"name").is_err());
        assert!(quote_identifier("1abc").is_err());
        assert!(quote_identifier("").is_err());
    }
}

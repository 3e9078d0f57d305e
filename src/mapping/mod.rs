//! Record metadata.
//!
//! A record type declares its table, its columns and which field is the
//! primary key through [`Record::declaration`] (usually generated by
//! [`impl_record!`](crate::impl_record)). [`describe`] validates the
//! declaration and turns it into [`TableMetadata`], which the statement
//! builder and the ORM work from.

pub mod coerce;
#[macro_use]
pub mod macros;

use crate::error::{DbError, DbResult};
use crate::models::{FieldPair, Value};
use crate::sql::identifier;
use coerce::FieldType;
use serde::Serialize;
use std::collections::HashSet;

/// A type that maps onto one table.
///
/// `Default` is the factory used when rows are turned into records.
pub trait Record: Default + Send + Sync + 'static {
    /// Static mapping table for this type.
    fn declaration() -> RecordDeclaration;

    /// Read a field by its Rust name.
    fn field_value(&self, field: &str) -> DbResult<Value>;

    /// Assign a field by its Rust name.
    fn set_field_value(&mut self, field: &str, value: Value) -> DbResult<()>;
}

/// Error for a field name the record does not declare.
pub fn unknown_field(type_name: &str, field: &str) -> DbError {
    DbError::metadata(type_name, format!("no field named '{}'", field))
}

/// Unvalidated mapping table of a record type.
#[derive(Debug, Clone)]
pub struct RecordDeclaration {
    type_name: String,
    table: String,
    fields: Vec<ColumnMetadata>,
}

impl RecordDeclaration {
    pub fn new(type_name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table: table.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field; declaration order is column order.
    pub fn field(mut self, column: ColumnMetadata) -> Self {
        self.fields.push(column);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[ColumnMetadata] {
        &self.fields
    }
}

/// One field-to-column mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMetadata {
    field: String,
    column: String,
    field_type: FieldType,
    primary_key: bool,
    unique: bool,
}

impl ColumnMetadata {
    pub fn new(field: impl Into<String>, column: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field: field.into(),
            column: column.into(),
            field_type,
            primary_key: false,
            unique: false,
        }
    }

    /// Mark as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as carrying a unique constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    fn matches(&self, column: &str) -> bool {
        self.column.eq_ignore_ascii_case(column)
    }
}

/// Validated table information for a record type.
#[derive(Debug, Clone, Serialize)]
pub struct TableMetadata {
    type_name: String,
    table: String,
    columns: Vec<ColumnMetadata>,
    #[serde(skip)]
    primary_key: usize,
}

impl TableMetadata {
    /// Validate a declaration.
    pub fn from_declaration(declaration: RecordDeclaration) -> DbResult<Self> {
        let RecordDeclaration {
            type_name,
            table,
            fields,
        } = declaration;
        let fail = |message: String| DbError::metadata(type_name.as_str(), message);

        if table.trim().is_empty() {
            return Err(fail("table name is empty".to_string()));
        }
        if !identifier::is_qualified(&table) {
            return Err(fail(format!("table name '{}' is not a plain identifier", table)));
        }
        if fields.is_empty() {
            return Err(fail("no fields are declared".to_string()));
        }

        let mut seen_fields = HashSet::new();
        let mut seen_columns = HashSet::new();
        for column in &fields {
            if column.column.trim().is_empty() {
                return Err(fail(format!("field '{}' has an empty column name", column.field)));
            }
            if !identifier::is_plain(&column.column) {
                return Err(fail(format!(
                    "column '{}' of field '{}' is not a plain identifier",
                    column.column, column.field
                )));
            }
            if !seen_fields.insert(column.field.as_str()) {
                return Err(fail(format!("field '{}' is declared twice", column.field)));
            }
            if !seen_columns.insert(column.column.to_ascii_lowercase()) {
                return Err(fail(format!(
                    "column '{}' is mapped by more than one field",
                    column.column
                )));
            }
        }

        let keys: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect();
        let primary_key = match keys.as_slice() {
            [single] => *single,
            [] => return Err(fail("no field is marked primary key".to_string())),
            _ => {
                return Err(fail(format!(
                    "{} fields are marked primary key, expected exactly one",
                    keys.len()
                )));
            }
        };

        Ok(Self {
            type_name,
            table,
            columns: fields,
            primary_key,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// All columns in declaration order.
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn primary_key(&self) -> &ColumnMetadata {
        &self.columns[self.primary_key]
    }

    /// Look up a column by name, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.matches(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Like [`column`](Self::column) but fails for undeclared names.
    pub fn require_column(&self, name: &str) -> DbResult<&ColumnMetadata> {
        self.column(name).ok_or_else(|| {
            DbError::invalid_input(format!(
                "column '{}' is not declared on table '{}'",
                name, self.table
            ))
        })
    }

    /// True when a field maps to `column` and is the primary key or unique.
    pub fn is_unique_column(&self, column: &str) -> bool {
        self.column(column)
            .is_some_and(|c| c.primary_key || c.unique)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column.as_str()).collect()
    }

    /// One pair per declared field, in declaration order.
    pub fn field_pairs<T: Record>(&self, record: &T) -> DbResult<Vec<FieldPair>> {
        self.columns
            .iter()
            .map(|c| {
                Ok(FieldPair {
                    name: c.column.clone(),
                    value: record.field_value(&c.field)?,
                    primary_key: c.primary_key,
                })
            })
            .collect()
    }

    /// The primary-key pair of a record.
    pub fn key_pair<T: Record>(&self, record: &T) -> DbResult<FieldPair> {
        let key = self.primary_key();
        Ok(FieldPair::key(key.column.clone(), record.field_value(&key.field)?))
    }
}

/// Validate and return the table information of `T`.
pub fn describe<T: Record>() -> DbResult<TableMetadata> {
    TableMetadata::from_declaration(T::declaration())
}

/// Field pairs of a record instance.
pub fn extract_field_pairs<T: Record>(record: &T) -> DbResult<Vec<FieldPair>> {
    describe::<T>()?.field_pairs(record)
}

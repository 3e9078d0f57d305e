//! Record-level operations.
//!
//! [`Orm`] binds one record type to a connection source. It builds statements
//! from the type's [`TableMetadata`], runs them on a leased connection (or on
//! the transaction's held connection) and turns result rows back into records.
//!
//! Argument problems are reported before any connection is acquired. While a
//! transaction is active every write records whether it touched exactly one
//! row, including writes rejected for bad arguments.

use crate::db::{ConnectionSource, ExecuteResult, TextRow, TransactionInfo, TransactionTracker};
use crate::error::{DbError, DbResult};
use crate::mapping::coerce::{ToValue, from_store_text, to_store_value};
use crate::mapping::{Record, TableMetadata, describe};
use crate::models::{DatabaseType, FieldPair, Value};
use crate::sql::identifier;
use crate::sql::{
    Combinator, IntoOption, Join, JoinKind, KeyValue, OrderBy, SortOrder, Statement,
    StatementBuilder,
};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default limit for a single store call.
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;

/// Per-instance tuning.
#[derive(Debug, Clone, Copy)]
pub struct OrmOptions {
    /// Applied to every statement, including transaction control
    pub statement_timeout: Duration,
}

impl Default for OrmOptions {
    fn default() -> Self {
        Self {
            statement_timeout: Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS),
        }
    }
}

/// Mapping between one record type and its table.
pub struct Orm<T: Record> {
    source: ConnectionSource,
    builder: StatementBuilder,
    meta: Arc<TableMetadata>,
    tracker: TransactionTracker,
    options: OrmOptions,
    _record: PhantomData<T>,
}

impl<T: Record> Orm<T> {
    /// Validate `T`'s declaration and bind it to `source`.
    pub fn new(source: ConnectionSource) -> DbResult<Self> {
        Self::with_options(source, OrmOptions::default())
    }

    pub fn with_options(source: ConnectionSource, options: OrmOptions) -> DbResult<Self> {
        let meta = describe::<T>()?;
        debug!(
            record = meta.type_name(),
            table = meta.table(),
            columns = meta.columns().len(),
            "Mapped record type"
        );
        Ok(Self {
            builder: StatementBuilder::new(source.db_type()),
            source,
            meta: Arc::new(meta),
            tracker: TransactionTracker::new(),
            options,
            _record: PhantomData,
        })
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.meta
    }

    pub fn source(&self) -> &ConnectionSource {
        &self.source
    }

    pub fn db_type(&self) -> DatabaseType {
        self.builder.dialect()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert a record. An unset key (zero or null) is left to the store.
    pub async fn insert(&mut self, record: &T) -> DbResult<bool> {
        let statement = self
            .insert_pairs(record)
            .map(|pairs| self.builder.insert(self.meta.table(), &pairs));
        self.write(statement).await
    }

    /// Insert a record and report its key.
    ///
    /// Returns the generated key coerced to the key field's type, the supplied
    /// key when one was set, or `None` when no row was written.
    pub async fn insert_returning_key(&mut self, record: &T) -> DbResult<Option<Value>> {
        let key = self.meta.primary_key().clone();
        let prepared = self.meta.key_pair(record).and_then(|key_pair| {
            let pairs = self.insert_pairs(record)?;
            let supplied = (!key_pair.value.is_unset_key()).then_some(key_pair.value);
            let statement = self
                .builder
                .insert_returning(self.meta.table(), &pairs, key.column());
            Ok((statement, supplied))
        });
        let (statement, supplied) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.tracker.record(false);
                return Err(e);
            }
        };

        if self.db_type() == DatabaseType::PostgreSQL {
            let rows = self.fetch(&statement).await;
            self.tracker
                .record(rows.as_ref().is_ok_and(|rows| rows.len() == 1));
            let Some(row) = rows?.into_iter().next() else {
                return Ok(None);
            };
            return match row.values().first().cloned().flatten() {
                Some(text) => Ok(Some(from_store_text(&text, key.field_type())?)),
                None => Ok(supplied),
            };
        }

        let result = self.execute(&statement).await;
        self.tracker
            .record(result.as_ref().is_ok_and(|r| r.rows_affected == 1));
        let result = result?;
        if result.rows_affected != 1 {
            return Ok(None);
        }
        if supplied.is_some() {
            return Ok(supplied);
        }
        result
            .last_insert_id
            .map(|id| from_store_text(&id.to_string(), key.field_type()))
            .transpose()
    }

    /// Insert into any table, naming the columns.
    pub async fn insert_into(&mut self, table: &str, pairs: &[FieldPair]) -> DbResult<bool> {
        let statement = identifier::table(table)
            .and_then(|table| {
                check_pair_names(pairs)?;
                Ok(self.builder.insert(table, pairs))
            });
        self.write(statement).await
    }

    /// Insert into any table by position, key first.
    pub async fn insert_into_with_key(
        &mut self,
        table: &str,
        pairs: &[FieldPair],
        key: KeyValue,
    ) -> DbResult<bool> {
        let statement = identifier::table(table)
            .map(|table| self.builder.insert_positional(table, &key, pairs));
        self.write(statement).await
    }

    /// Set one column on the row whose `id_column` equals `id_value`.
    pub async fn update_column(
        &mut self,
        column: &str,
        id_column: &str,
        id_value: impl ToValue,
        new_value: impl ToValue,
    ) -> DbResult<bool> {
        let statement = self
            .pair(column, &new_value)
            .and_then(|set| {
                let filter = self.pair(id_column, &id_value)?;
                Ok(self.builder.update(self.meta.table(), &[set], &filter))
            });
        self.write(statement).await
    }

    /// Set several columns on the row matching `filter`.
    pub async fn update_fields(&mut self, pairs: &[FieldPair], filter: &FieldPair) -> DbResult<bool> {
        let statement = self.own_pairs(pairs).and_then(|set| {
            if set.is_empty() {
                return Err(DbError::invalid_input("No columns to update"));
            }
            let filter = self.own_pair(filter)?;
            Ok(self.builder.update(self.meta.table(), &set, &filter))
        });
        self.write(statement).await
    }

    /// Write every non-key field of `record`, matched by its key.
    pub async fn update(&mut self, record: &T) -> DbResult<bool> {
        let statement = self.meta.field_pairs(record).and_then(|pairs| {
            let (keys, set): (Vec<FieldPair>, Vec<FieldPair>) =
                pairs.into_iter().partition(|p| p.primary_key);
            if set.is_empty() {
                return Err(DbError::invalid_input(format!(
                    "{} has no columns besides its key",
                    self.meta.type_name()
                )));
            }
            let filter = keys.into_iter().next().ok_or_else(|| {
                DbError::metadata(self.meta.type_name(), "no field is marked primary key")
            })?;
            Ok(self.builder.update(self.meta.table(), &set, &filter))
        });
        self.write(statement).await
    }

    /// Delete the row whose `id_column` equals `id_value`.
    pub async fn delete_by(&mut self, id_column: &str, id_value: impl ToValue) -> DbResult<bool> {
        let statement = self
            .pair(id_column, &id_value)
            .map(|filter| self.builder.delete(self.meta.table(), &filter));
        self.write(statement).await
    }

    /// Delete the row holding `record`'s key.
    pub async fn delete(&mut self, record: &T) -> DbResult<bool> {
        let statement = self
            .meta
            .key_pair(record)
            .map(|filter| self.builder.delete(self.meta.table(), &filter));
        self.write(statement).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch the record whose unique column equals `value`.
    pub async fn get(&mut self, unique_column: &str, value: impl ToValue) -> DbResult<Option<T>> {
        let filter = self.unique_pair(unique_column, &value)?;
        let statement = self.builder.select(
            self.meta.table(),
            &[],
            &[filter],
            Combinator::Single,
            None,
        );
        let rows = self.fetch(&statement).await?;
        rows.first().map(|row| self.to_record(row)).transpose()
    }

    /// Fetch selected columns of the row whose unique column equals `value`.
    ///
    /// An empty column list returns every column. No match gives an empty list.
    pub async fn get_columns(
        &mut self,
        unique_column: &str,
        value: impl ToValue,
        columns: &[&str],
    ) -> DbResult<Vec<Option<String>>> {
        let filter = self.unique_pair(unique_column, &value)?;
        let columns = self.own_columns(columns)?;
        let statement = self.builder.select(
            self.meta.table(),
            &columns,
            &[filter],
            Combinator::Single,
            None,
        );
        let rows = self.fetch(&statement).await?;
        Ok(rows
            .into_iter()
            .next()
            .map(TextRow::into_values)
            .unwrap_or_default())
    }

    pub async fn get_all(&mut self) -> DbResult<Vec<T>> {
        let statement = self
            .builder
            .select(self.meta.table(), &[], &[], Combinator::And, None);
        self.fetch_records(&statement).await
    }

    pub async fn get_all_in_order(
        &mut self,
        order_column: &str,
        order: impl IntoOption<SortOrder>,
    ) -> DbResult<Vec<T>> {
        let order = order.into_option()?;
        let column = self.meta.require_column(order_column)?.column();
        let statement = self.builder.select(
            self.meta.table(),
            &[],
            &[],
            Combinator::And,
            Some(OrderBy { column, order }),
        );
        self.fetch_records(&statement).await
    }

    /// Selected columns of the rows matching one equality filter, ordered.
    pub async fn get_records_in_order(
        &mut self,
        columns: &[&str],
        filter_column: &str,
        filter_value: impl ToValue,
        order_column: &str,
        order: impl IntoOption<SortOrder>,
    ) -> DbResult<Vec<Vec<Option<String>>>> {
        let order = order.into_option()?;
        let columns = self.own_columns(columns)?;
        let filter = self.pair(filter_column, &filter_value)?;
        let column = self.meta.require_column(order_column)?.column();
        let statement = self.builder.select(
            self.meta.table(),
            &columns,
            &[filter],
            Combinator::Single,
            Some(OrderBy { column, order }),
        );
        self.fetch_values(&statement).await
    }

    /// Records matching all (`and`) or any (`or`) of the pairs.
    ///
    /// `single` accepts exactly one pair.
    pub async fn get_with_criterion(
        &mut self,
        pairs: &[FieldPair],
        combinator: impl IntoOption<Combinator>,
    ) -> DbResult<Vec<T>> {
        let combinator = combinator.into_option()?;
        match (combinator, pairs.len()) {
            (_, 0) => return Err(DbError::invalid_input("Criterion needs at least one pair")),
            (Combinator::Single, n) if n != 1 => {
                return Err(DbError::invalid_input(format!(
                    "Criterion 'single' takes exactly one pair, got {}",
                    n
                )));
            }
            _ => {}
        }
        let filter = self.own_pairs(pairs)?;
        let statement = self
            .builder
            .select(self.meta.table(), &[], &filter, combinator, None);
        self.fetch_records(&statement).await
    }

    /// Join this table with `right_table` and project `columns`.
    pub async fn get_joint(
        &mut self,
        kind: impl IntoOption<JoinKind>,
        left_key: &str,
        right_table: &str,
        right_key: &str,
        columns: &[&str],
    ) -> DbResult<Vec<Vec<Option<String>>>> {
        let kind = kind.into_option()?;
        let join = joint(kind, left_key, right_table, right_key, columns)?;
        let statement = self
            .builder
            .select_join(self.meta.table(), join, columns, None);
        self.fetch_values(&statement).await
    }

    /// Like [`get_joint`](Self::get_joint), keeping rows where `filter_column`
    /// equals `filter_value`.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_joint_where(
        &mut self,
        kind: impl IntoOption<JoinKind>,
        left_key: &str,
        right_table: &str,
        right_key: &str,
        columns: &[&str],
        filter_column: &str,
        filter_value: impl ToValue,
    ) -> DbResult<Vec<Vec<Option<String>>>> {
        let kind = kind.into_option()?;
        let join = joint(kind, left_key, right_table, right_key, columns)?;
        let filter = FieldPair::new(
            identifier::reference(filter_column)?,
            to_store_value(&filter_value)?,
        );
        let statement = self
            .builder
            .select_join(self.meta.table(), join, columns, Some(&filter));
        self.fetch_values(&statement).await
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Start a transaction on a dedicated connection.
    pub async fn begin(&mut self) -> DbResult<String> {
        self.tracker
            .begin(&self.source, self.options.statement_timeout)
            .await
    }

    /// Commit when every write since `begin` touched exactly one row.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.tracker.commit(self.options.statement_timeout).await
    }

    pub async fn rollback(&mut self) -> DbResult<()> {
        self.tracker.rollback(self.options.statement_timeout).await
    }

    /// Leave transaction mode, rolling back anything uncommitted.
    pub async fn close(&mut self) {
        self.tracker.close(self.options.statement_timeout).await
    }

    pub fn in_transaction(&self) -> bool {
        self.tracker.is_active()
    }

    pub fn transaction_info(&self) -> Option<TransactionInfo> {
        self.tracker.info()
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Run a write and record its outcome.
    async fn write(&mut self, statement: DbResult<Statement>) -> DbResult<bool> {
        let result = match statement {
            Ok(statement) => self
                .execute(&statement)
                .await
                .map(|r| r.rows_affected == 1),
            Err(e) => Err(e),
        };
        self.tracker.record(matches!(result, Ok(true)));
        result
    }

    async fn execute(&mut self, statement: &Statement) -> DbResult<ExecuteResult> {
        let limit = self.options.statement_timeout;
        if let Some(conn) = self.tracker.connection() {
            return conn.execute(statement, limit).await;
        }
        let mut lease = self.source.lease().await?;
        let result = lease.execute(statement, limit).await;
        lease.finish().await;
        result
    }

    async fn fetch(&mut self, statement: &Statement) -> DbResult<Vec<TextRow>> {
        let limit = self.options.statement_timeout;
        if let Some(conn) = self.tracker.connection() {
            return conn.fetch(statement, limit).await;
        }
        let mut lease = self.source.lease().await?;
        let result = lease.fetch(statement, limit).await;
        lease.finish().await;
        result
    }

    async fn fetch_records(&mut self, statement: &Statement) -> DbResult<Vec<T>> {
        let rows = self.fetch(statement).await?;
        rows.iter().map(|row| self.to_record(row)).collect()
    }

    async fn fetch_values(&mut self, statement: &Statement) -> DbResult<Vec<Vec<Option<String>>>> {
        let rows = self.fetch(statement).await?;
        Ok(rows.into_iter().map(TextRow::into_values).collect())
    }

    /// Build a record from a `SELECT *` row. NULL columns keep their default.
    fn to_record(&self, row: &TextRow) -> DbResult<T> {
        let mut record = T::default();
        for column in self.meta.columns() {
            let text = row.get(column.column()).ok_or_else(|| {
                DbError::schema(
                    format!("Column '{}' is missing from the result", column.column()),
                    self.meta.table(),
                )
            })?;
            if let Some(text) = text {
                let value = from_store_text(text, column.field_type())?;
                record.set_field_value(column.field(), value)?;
            }
        }
        Ok(record)
    }

    // =========================================================================
    // Argument checks
    // =========================================================================

    fn insert_pairs(&self, record: &T) -> DbResult<Vec<FieldPair>> {
        let mut pairs = self.meta.field_pairs(record)?;
        pairs.retain(|p| !(p.primary_key && p.value.is_unset_key()));
        Ok(pairs)
    }

    /// A pair on a declared column, named as declared.
    fn pair(&self, column: &str, value: &impl ToValue) -> DbResult<FieldPair> {
        let column = self.meta.require_column(column)?;
        Ok(FieldPair {
            name: column.column().to_string(),
            value: to_store_value(value)?,
            primary_key: column.is_primary_key(),
        })
    }

    fn own_pair(&self, pair: &FieldPair) -> DbResult<FieldPair> {
        let column = self.meta.require_column(&pair.name)?;
        Ok(FieldPair {
            name: column.column().to_string(),
            value: pair.value.clone(),
            primary_key: column.is_primary_key(),
        })
    }

    fn own_pairs(&self, pairs: &[FieldPair]) -> DbResult<Vec<FieldPair>> {
        pairs.iter().map(|p| self.own_pair(p)).collect()
    }

    fn own_columns<'a>(&'a self, columns: &[&str]) -> DbResult<Vec<&'a str>> {
        columns
            .iter()
            .map(|c| self.meta.require_column(c).map(|c| c.column()))
            .collect()
    }

    fn unique_pair(&self, column: &str, value: &impl ToValue) -> DbResult<FieldPair> {
        if !self.meta.is_unique_column(column) {
            return Err(DbError::invalid_input(format!(
                "Column '{}' is neither the primary key nor unique on '{}'",
                column,
                self.meta.table()
            )));
        }
        self.pair(column, value)
    }
}

fn check_pair_names(pairs: &[FieldPair]) -> DbResult<()> {
    for pair in pairs {
        if !identifier::is_plain(&pair.name) {
            return Err(DbError::invalid_input(format!(
                "'{}' is not a valid column name",
                pair.name
            )));
        }
    }
    Ok(())
}

/// Validate join identifiers and the projection.
fn joint<'a>(
    kind: JoinKind,
    left_key: &'a str,
    right_table: &'a str,
    right_key: &'a str,
    columns: &[&str],
) -> DbResult<Join<'a>> {
    if columns.is_empty() {
        return Err(DbError::invalid_input("Join needs at least one column to project"));
    }
    for column in columns {
        identifier::reference(column)?;
    }
    Ok(Join {
        kind,
        left_key: identifier::reference(left_key)?,
        right_table: identifier::table(right_table)?,
        right_key: identifier::reference(right_key)?,
    })
}

//! Statement text generation.
//!
//! The builder is pure: it turns table/column names and field pairs into
//! parameterized SQL for one dialect. Callers validate identifiers first
//! (declared columns via [`TableMetadata`](crate::mapping::TableMetadata),
//! anything else via [`identifier`](super::identifier)).
//!
//! Values always travel as parameters. The only literal ever written is
//! `NULL`, since an untyped NULL parameter cannot be bound portably.

use super::options::{Combinator, JoinKind, SortOrder};
use crate::models::{DatabaseType, FieldPair, Value};
use std::fmt::Write as _;

/// SQL text plus its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Key value for positional inserts.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// Let the store generate the key
    Default,
    Value(Value),
}

impl KeyValue {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

/// Ordering clause of a select.
#[derive(Debug, Clone, Copy)]
pub struct OrderBy<'a> {
    pub column: &'a str,
    pub order: SortOrder,
}

/// Join clause of a select.
#[derive(Debug, Clone, Copy)]
pub struct Join<'a> {
    pub kind: JoinKind,
    pub left_key: &'a str,
    pub right_table: &'a str,
    pub right_key: &'a str,
}

/// Parameter list that hands out dialect placeholders.
struct Params {
    dialect: DatabaseType,
    values: Vec<Value>,
}

impl Params {
    fn new(dialect: DatabaseType) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    /// Register a value and return the text that stands for it.
    fn push(&mut self, value: &Value) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.values.push(value.clone());
        match self.dialect {
            DatabaseType::PostgreSQL => {
                let n = self.values.len();
                if matches!(value, Value::Decimal(_)) {
                    format!("${}::numeric", n)
                } else {
                    format!("${}", n)
                }
            }
            DatabaseType::MySQL | DatabaseType::SQLite => "?".to_string(),
        }
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.values,
        }
    }
}

/// Builds statements for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct StatementBuilder {
    dialect: DatabaseType,
}

impl StatementBuilder {
    pub fn new(dialect: DatabaseType) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    /// Keyword that asks the store to generate a key.
    pub fn default_key_keyword(&self) -> &'static str {
        match self.dialect {
            DatabaseType::PostgreSQL | DatabaseType::MySQL => "DEFAULT",
            // SQLite has no DEFAULT in VALUES; NULL fills INTEGER PRIMARY KEY
            DatabaseType::SQLite => "NULL",
        }
    }

    /// `INSERT INTO table (c1, c2) VALUES (p1, p2)`
    pub fn insert(&self, table: &str, pairs: &[FieldPair]) -> Statement {
        let mut params = Params::new(self.dialect);
        if pairs.is_empty() {
            let sql = match self.dialect {
                DatabaseType::MySQL => format!("INSERT INTO {} () VALUES ()", table),
                _ => format!("INSERT INTO {} DEFAULT VALUES", table),
            };
            return params.finish(sql);
        }

        let columns = join_names(pairs);
        let placeholders: Vec<String> = pairs.iter().map(|p| params.push(&p.value)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns,
            placeholders.join(", ")
        );
        params.finish(sql)
    }

    /// Insert that reports the generated key; only PostgreSQL needs a clause.
    pub fn insert_returning(&self, table: &str, pairs: &[FieldPair], key_column: &str) -> Statement {
        let mut statement = self.insert(table, pairs);
        if self.dialect == DatabaseType::PostgreSQL {
            let _ = write!(statement.sql, " RETURNING {}", key_column);
        }
        statement
    }

    /// `INSERT INTO table VALUES (key, p1, p2)`, matching columns by position.
    pub fn insert_positional(&self, table: &str, key: &KeyValue, pairs: &[FieldPair]) -> Statement {
        let mut params = Params::new(self.dialect);
        let mut values = Vec::with_capacity(pairs.len() + 1);
        values.push(match key {
            KeyValue::Default => self.default_key_keyword().to_string(),
            KeyValue::Value(value) => params.push(value),
        });
        values.extend(pairs.iter().map(|p| params.push(&p.value)));

        let sql = format!("INSERT INTO {} VALUES ({})", table, values.join(", "));
        params.finish(sql)
    }

    /// `UPDATE table SET c1 = p1, c2 = p2 WHERE key = pk`
    pub fn update(&self, table: &str, set: &[FieldPair], filter: &FieldPair) -> Statement {
        let mut params = Params::new(self.dialect);
        let assignments: Vec<String> = set
            .iter()
            .map(|p| format!("{} = {}", p.name, params.push(&p.value)))
            .collect();
        let condition = condition(&mut params, filter);
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            table,
            assignments.join(", "),
            condition
        );
        params.finish(sql)
    }

    /// `DELETE FROM table WHERE c = p`
    pub fn delete(&self, table: &str, filter: &FieldPair) -> Statement {
        let mut params = Params::new(self.dialect);
        let condition = condition(&mut params, filter);
        params.finish(format!("DELETE FROM {} WHERE {}", table, condition))
    }

    /// `SELECT cols FROM table [WHERE ...] [ORDER BY ...]`
    ///
    /// An empty column list selects `*`.
    pub fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: &[FieldPair],
        combinator: Combinator,
        order: Option<OrderBy<'_>>,
    ) -> Statement {
        let mut params = Params::new(self.dialect);
        let mut sql = format!("SELECT {} FROM {}", projection(columns), table);
        push_where(&mut sql, &mut params, filter, combinator);
        if let Some(order) = order {
            let _ = write!(sql, " ORDER BY {} {}", order.column, order.order.as_sql());
        }
        params.finish(sql)
    }

    /// `SELECT cols FROM table <kind> JOIN right ON left_key = right_key [WHERE c = p]`
    pub fn select_join(
        &self,
        table: &str,
        join: Join<'_>,
        columns: &[&str],
        filter: Option<&FieldPair>,
    ) -> Statement {
        let mut params = Params::new(self.dialect);
        let mut sql = format!(
            "SELECT {} FROM {} {} {} ON {} = {}",
            projection(columns),
            table,
            join.kind.as_sql(),
            join.right_table,
            join.left_key,
            join.right_key
        );
        let filter = filter.map(std::slice::from_ref).unwrap_or_default();
        push_where(&mut sql, &mut params, filter, Combinator::And);
        params.finish(sql)
    }
}

fn join_names(pairs: &[FieldPair]) -> String {
    pairs
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn projection(columns: &[&str]) -> String {
    if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    }
}

fn condition(params: &mut Params, pair: &FieldPair) -> String {
    if pair.value.is_null() {
        format!("{} IS NULL", pair.name)
    } else {
        format!("{} = {}", pair.name, params.push(&pair.value))
    }
}

fn push_where(sql: &mut String, params: &mut Params, filter: &[FieldPair], combinator: Combinator) {
    if filter.is_empty() {
        return;
    }
    let conditions: Vec<String> = filter.iter().map(|p| condition(params, p)).collect();
    let _ = write!(sql, " WHERE {}", conditions.join(combinator.as_sql()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decimal;

    fn pg() -> StatementBuilder {
        StatementBuilder::new(DatabaseType::PostgreSQL)
    }

    fn mysql() -> StatementBuilder {
        StatementBuilder::new(DatabaseType::MySQL)
    }

    fn sqlite() -> StatementBuilder {
        StatementBuilder::new(DatabaseType::SQLite)
    }

    #[test]
    fn test_insert_placeholders_per_dialect() {
        let pairs = vec![FieldPair::new("text", "Hi"), FieldPair::new("rating", 5)];

        let stmt = mysql().insert("post", &pairs);
        assert_eq!(stmt.sql, "INSERT INTO post (text, rating) VALUES (?, ?)");
        assert_eq!(stmt.params, vec![Value::from("Hi"), Value::Int(5)]);

        let stmt = pg().insert("post", &pairs);
        assert_eq!(stmt.sql, "INSERT INTO post (text, rating) VALUES ($1, $2)");
    }

    #[test]
    fn test_insert_null_is_literal() {
        let pairs = vec![
            FieldPair::new("a", Value::Null),
            FieldPair::new("b", 1),
        ];
        let stmt = pg().insert("t", &pairs);
        assert_eq!(stmt.sql, "INSERT INTO t (a, b) VALUES (NULL, $1)");
        assert_eq!(stmt.params, vec![Value::Int(1)]);
    }

    #[test]
    fn test_insert_without_columns() {
        assert_eq!(sqlite().insert("t", &[]).sql, "INSERT INTO t DEFAULT VALUES");
        assert_eq!(mysql().insert("t", &[]).sql, "INSERT INTO t () VALUES ()");
    }

    #[test]
    fn test_postgres_decimal_cast() {
        let dec: Decimal = "9.99".parse().unwrap();
        let stmt = pg().insert("price", &[FieldPair::new("amount", dec)]);
        assert_eq!(stmt.sql, "INSERT INTO price (amount) VALUES ($1::numeric)");
    }

    #[test]
    fn test_insert_returning() {
        let pairs = vec![FieldPair::new("text", "x")];
        assert_eq!(
            pg().insert_returning("post", &pairs, "post_id").sql,
            "INSERT INTO post (text) VALUES ($1) RETURNING post_id"
        );
        assert_eq!(
            sqlite().insert_returning("post", &pairs, "post_id").sql,
            "INSERT INTO post (text) VALUES (?)"
        );
    }

    #[test]
    fn test_insert_positional_default_key() {
        let pairs = vec![FieldPair::new("city", "Naples")];
        assert_eq!(
            pg().insert_positional("users", &KeyValue::Default, &pairs).sql,
            "INSERT INTO users VALUES (DEFAULT, $1)"
        );
        assert_eq!(
            mysql().insert_positional("users", &KeyValue::Default, &pairs).sql,
            "INSERT INTO users VALUES (DEFAULT, ?)"
        );
        assert_eq!(
            sqlite().insert_positional("users", &KeyValue::Default, &pairs).sql,
            "INSERT INTO users VALUES (NULL, ?)"
        );

        let stmt = pg().insert_positional("users", &KeyValue::value(7), &pairs);
        assert_eq!(stmt.sql, "INSERT INTO users VALUES ($1, $2)");
        assert_eq!(stmt.params, vec![Value::Int(7), Value::from("Naples")]);
    }

    #[test]
    fn test_update_binds_key_last() {
        let stmt = pg().update(
            "post",
            &[FieldPair::new("text", "new"), FieldPair::new("rating", 1)],
            &FieldPair::key("post_id", 3),
        );
        assert_eq!(
            stmt.sql,
            "UPDATE post SET text = $1, rating = $2 WHERE post_id = $3"
        );
        assert_eq!(stmt.params.last(), Some(&Value::Int(3)));
    }

    #[test]
    fn test_delete() {
        let stmt = mysql().delete("post", &FieldPair::new("post_id", 3));
        assert_eq!(stmt.sql, "DELETE FROM post WHERE post_id = ?");
        assert_eq!(stmt.params, vec![Value::Int(3)]);
    }

    #[test]
    fn test_select_with_criterion() {
        let filter = vec![
            FieldPair::new("username", "alpha"),
            FieldPair::new("rating", 5),
        ];
        let stmt = sqlite().select("post", &[], &filter, Combinator::Or, None);
        assert_eq!(
            stmt.sql,
            "SELECT * FROM post WHERE username = ? OR rating = ?"
        );
        let stmt = pg().select("post", &[], &filter, Combinator::And, None);
        assert_eq!(
            stmt.sql,
            "SELECT * FROM post WHERE username = $1 AND rating = $2"
        );
    }

    #[test]
    fn test_select_null_filter() {
        let stmt = pg().select(
            "post",
            &[],
            &[FieldPair::new("tag", Value::Null)],
            Combinator::Single,
            None,
        );
        assert_eq!(stmt.sql, "SELECT * FROM post WHERE tag IS NULL");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_select_projection_and_order() {
        let stmt = mysql().select(
            "post",
            &["text", "rating"],
            &[FieldPair::new("username", "alpha")],
            Combinator::Single,
            Some(OrderBy {
                column: "rating",
                order: SortOrder::Descending,
            }),
        );
        assert_eq!(
            stmt.sql,
            "SELECT text, rating FROM post WHERE username = ? ORDER BY rating DESC"
        );
    }

    #[test]
    fn test_select_join() {
        let join = Join {
            kind: JoinKind::Inner,
            left_key: "users.username",
            right_table: "post",
            right_key: "post.username",
        };
        let stmt = pg().select_join("users", join, &["country", "city", "rating"], None);
        assert_eq!(
            stmt.sql,
            "SELECT country, city, rating FROM users INNER JOIN post ON users.username = post.username"
        );

        let filter = FieldPair::new("tag", "food");
        let stmt = pg().select_join("users", join, &["country"], Some(&filter));
        assert!(stmt.sql.ends_with(" WHERE tag = $1"));
        assert_eq!(stmt.params, vec![Value::from("food")]);
    }
}

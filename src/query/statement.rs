//! Statement plumbing shared by the query builder, the persistence path and
//! the relation loaders.

use crate::executor::Backend;
use sea_query::{
    Condition, DeleteStatement, Expr, ExprTrait, Iden, InsertStatement, PostgresQueryBuilder,
    SelectStatement, SqliteQueryBuilder, UpdateStatement, Value, Values,
};

/// Runtime table or column name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Ident(String);

impl Ident {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl Iden for Ident {
    fn unquoted(&self) -> &str {
        &self.0
    }
}

/// Any statement the mapper can send to a connection
#[derive(Debug, Clone)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl Statement {
    /// Render SQL and bound values for the given dialect
    #[must_use]
    pub fn build(&self, backend: Backend) -> (String, Values) {
        match backend {
            Backend::Postgres => match self {
                Statement::Select(s) => s.build(PostgresQueryBuilder),
                Statement::Insert(s) => s.build(PostgresQueryBuilder),
                Statement::Update(s) => s.build(PostgresQueryBuilder),
                Statement::Delete(s) => s.build(PostgresQueryBuilder),
            },
            Backend::Sqlite => match self {
                Statement::Select(s) => s.build(SqliteQueryBuilder),
                Statement::Insert(s) => s.build(SqliteQueryBuilder),
                Statement::Update(s) => s.build(SqliteQueryBuilder),
                Statement::Delete(s) => s.build(SqliteQueryBuilder),
            },
        }
    }
}

impl From<SelectStatement> for Statement {
    fn from(s: SelectStatement) -> Self {
        Statement::Select(s)
    }
}

impl From<InsertStatement> for Statement {
    fn from(s: InsertStatement) -> Self {
        Statement::Insert(s)
    }
}

impl From<UpdateStatement> for Statement {
    fn from(s: UpdateStatement) -> Self {
        Statement::Update(s)
    }
}

impl From<DeleteStatement> for Statement {
    fn from(s: DeleteStatement) -> Self {
        Statement::Delete(s)
    }
}

/// `(t.c1 = v1 AND t.c2 = v2) OR (...)` over every key tuple
pub(crate) fn key_condition(table: &str, columns: &[String], keys: &[Vec<Value>]) -> Condition {
    let mut any = Condition::any();
    for key in keys {
        let mut all = Condition::all();
        for (column, value) in columns.iter().zip(key) {
            all = all.add(Expr::col((Ident::new(table), Ident::new(column.as_str()))).eq(value.clone()));
        }
        any = any.add(all);
    }
    any
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{Asterisk, Query};

    #[test]
    fn test_composite_key_condition_sql() {
        let mut select = Query::select();
        select
            .column((Ident::new("ck_records"), Asterisk))
            .from(Ident::new("ck_records"))
            .cond_where(key_condition(
                "ck_records",
                &["key1".to_string(), "key2".to_string()],
                &[
                    vec![Value::Int(Some(1)), Value::Int(Some(1))],
                    vec![Value::Int(Some(1)), Value::Int(Some(2))],
                ],
            ));
        let (sql, values) = Statement::from(select).build(Backend::Sqlite);

        assert!(sql.starts_with(r#"SELECT "ck_records".* FROM "ck_records" WHERE"#));
        assert!(sql.contains(r#""ck_records"."key1" = ?"#));
        assert!(sql.contains(" OR "));
        assert_eq!(values.iter().count(), 4);
    }

    #[test]
    fn test_postgres_placeholders() {
        let mut select = Query::select();
        select
            .column((Ident::new("users"), Asterisk))
            .from(Ident::new("users"))
            .cond_where(key_condition("users", &["id".to_string()], &[vec![Value::Int(Some(1))]]));
        let (sql, _) = Statement::from(select).build(Backend::Postgres);
        assert!(sql.contains("$1"));
    }
}

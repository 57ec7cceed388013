// Query builder: route + projection + caller filter/sort -> parameterized SQL

use crate::error::{Result, StoreError};
use crate::locator::Locator;
use crate::projection::{ProjectedColumn, ProjectionGuard, ProjectionMap};
use crate::route::{Route, RouteKind};
use crate::schema::{columns, DEFAULT_SORT_ORDER, TABLE_NAME};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

/// A caller-supplied filter plus its positional arguments.
///
/// The filter is either a SQL boolean expression over the route's columns
/// with `?` placeholders, or free text. Free text becomes a case-insensitive
/// substring search over title and body. The text is used verbatim inside the
/// `LIKE` pattern, so `%` and `_` keep their wildcard meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    filter: Option<FilterText>,
    args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum FilterText {
    /// Classified when the query is built.
    Auto(String),
    /// Always a substring search, even if it would parse as SQL.
    Search(String),
}

impl Selection {
    pub fn new(filter: impl Into<String>) -> Self {
        Selection {
            filter: Some(FilterText::Auto(filter.into())),
            args: Vec::new(),
        }
    }

    /// Build from the optional filter/argument pair callers usually carry.
    pub fn from_parts(filter: Option<&str>, args: Vec<Value>) -> Self {
        Selection {
            filter: filter.map(|f| FilterText::Auto(f.to_string())),
            args,
        }
    }

    /// A substring search for `token`, never interpreted as SQL.
    pub fn search(token: impl Into<String>) -> Self {
        Selection {
            filter: Some(FilterText::Search(token.into())),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    fn text(&self) -> Option<&FilterText> {
        match &self.filter {
            Some(FilterText::Auto(s)) | Some(FilterText::Search(s)) if s.trim().is_empty() => None,
            other => other.as_ref(),
        }
    }
}

/// How a filter string was interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClass {
    /// A complete boolean SQL expression.
    Expression(Expr),
    /// Anything else: a free-text search token.
    Search,
}

/// Decide whether `text` is a filter expression or a search token.
///
/// Anything that parses completely as SQL is an expression, unless it is
/// only names and literals, optionally joined by arithmetic (`abc`,
/// `2024-01`, `50%_off`). Expressions the store cannot run are rejected
/// later rather than searched for.
pub fn classify_filter(text: &str) -> FilterClass {
    let dialect = GenericDialect {};
    let parsed = Parser::new(&dialect).try_with_sql(text).and_then(|mut parser| {
        let expr = parser.parse_expr()?;
        Ok((expr, parser.peek_token().token == Token::EOF))
    });

    match parsed {
        Ok((expr, true)) if !is_plain_text(&expr) => FilterClass::Expression(expr),
        _ => FilterClass::Search,
    }
}

fn is_plain_text(expr: &Expr) -> bool {
    match expr {
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) | Expr::Value(_) => true,
        Expr::BinaryOp { left, op, right } => {
            !is_predicate(op) && is_plain_text(left) && is_plain_text(right)
        }
        Expr::UnaryOp { op, expr } => *op != UnaryOperator::Not && is_plain_text(expr),
        _ => false,
    }
}

fn is_predicate(op: &BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
            | BinaryOperator::Spaceship
            | BinaryOperator::And
            | BinaryOperator::Or
            | BinaryOperator::Xor
    )
}

/// Resolve identifiers through the projection map, rewriting them to their
/// internal column, and count `?` placeholders. Anything beyond plain column
/// predicates (functions, subqueries, casts, qualified names) is rejected.
fn sanitize(expr: &mut Expr, map: &ProjectionMap, placeholders: &mut usize) -> Result<()> {
    match expr {
        Expr::Identifier(ident) => {
            let column = map
                .get(&ident.value)
                .or_else(|| map.get(&ident.value.to_ascii_lowercase()))
                .ok_or_else(|| {
                    StoreError::InvalidFilter(format!("unknown column '{}'", ident.value))
                })?;
            ident.value = column.to_string();
            ident.quote_style = None;
            Ok(())
        }
        Expr::Value(sqlparser::ast::Value::Placeholder(p)) => {
            if p.as_str() != "?" {
                return Err(StoreError::InvalidFilter(format!(
                    "unsupported placeholder '{p}', use '?'"
                )));
            }
            *placeholders += 1;
            Ok(())
        }
        Expr::Value(_) => Ok(()),
        Expr::BinaryOp { left, right, .. } => {
            sanitize(left, map, placeholders)?;
            sanitize(right, map, placeholders)
        }
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr) => sanitize(expr, map, placeholders),
        Expr::InList { expr, list, .. } => {
            sanitize(expr, map, placeholders)?;
            for item in list {
                sanitize(item, map, placeholders)?;
            }
            Ok(())
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            sanitize(expr, map, placeholders)?;
            sanitize(low, map, placeholders)?;
            sanitize(high, map, placeholders)
        }
        Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
            sanitize(expr, map, placeholders)?;
            sanitize(pattern, map, placeholders)
        }
        other => Err(StoreError::InvalidFilter(format!(
            "unsupported expression '{other}'"
        ))),
    }
}

/// Convert a caller argument to a bindable SQLite value.
fn to_sql_value(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => {
            return Err(StoreError::InvalidFilter(format!(
                "argument {other} is not a scalar"
            )));
        }
    })
}

/// Parse `column [ASC|DESC], ...` over the route's external names.
fn parse_sort(sort: &str, map: &ProjectionMap) -> Result<String> {
    let mut terms = Vec::new();
    for term in sort.split(',') {
        let mut parts = term.split_whitespace();
        let name = parts
            .next()
            .ok_or_else(|| StoreError::InvalidSort(format!("empty term in '{sort}'")))?;
        let column = map
            .get(name)
            .or_else(|| map.get(&name.to_ascii_lowercase()))
            .ok_or_else(|| StoreError::InvalidSort(format!("unknown column '{name}'")))?;
        let direction = match parts.next().map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") => "ASC",
            Some("DESC") => "DESC",
            Some(other) => {
                return Err(StoreError::InvalidSort(format!("unknown direction '{other}'")));
            }
        };
        if parts.next().is_some() {
            return Err(StoreError::InvalidSort(format!("unexpected tokens in '{term}'")));
        }
        terms.push(format!("{column} {direction}"));
    }
    Ok(terms.join(", "))
}

/// A complete, executable read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub columns: Vec<ProjectedColumn>,
}

impl ReadQuery {
    /// External column names of the result.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.external.clone()).collect()
    }
}

/// The row scope of an update or delete.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteScope {
    /// `None` means every row: updating or deleting through the collection
    /// locator without a filter touches the whole table.
    pub clause: Option<String>,
    pub params: Vec<SqlValue>,
}

/// Assembles reads and write scopes. Holds the projection maps it enforces.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    guard: ProjectionGuard,
}

impl QueryBuilder {
    pub fn new(guard: ProjectionGuard) -> Self {
        QueryBuilder { guard }
    }

    pub fn guard(&self) -> &ProjectionGuard {
        &self.guard
    }

    /// Build a read for a classified locator.
    pub fn build_read(
        &self,
        locator: &Locator,
        route: Route,
        columns: Option<&[&str]>,
        selection: Option<&Selection>,
        sort: Option<&str>,
    ) -> Result<ReadQuery> {
        let kind = route
            .kind()
            .ok_or_else(|| StoreError::UnknownLocator(locator.to_string()))?;
        let map = self.guard.map_for(kind);
        let projected = map.resolve(locator, columns)?;

        let (mut clauses, params) = filter_clause(map, selection, true)?;
        if let Route::ItemById(id) = route {
            clauses.insert(0, format!("{} = {id}", columns::ID));
        }

        let order_by = match sort.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => parse_sort(s, map)?,
            None => DEFAULT_SORT_ORDER.to_string(),
        };

        let select_list = projected
            .iter()
            .map(ProjectedColumn::select_expr)
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {select_list} FROM {TABLE_NAME}");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_by);

        log::debug!("read {locator}: {sql}");
        Ok(ReadQuery {
            sql,
            params,
            columns: projected,
        })
    }

    /// Build the row scope of an update or delete. Only the collection and
    /// item routes are writable; the item identity is always part of the scope.
    pub fn build_scope(
        &self,
        locator: &Locator,
        route: Route,
        selection: Option<&Selection>,
    ) -> Result<WriteScope> {
        let map = match route.kind() {
            Some(kind @ (RouteKind::Collection | RouteKind::ItemById)) => self.guard.map_for(kind),
            _ => return Err(StoreError::UnknownLocator(locator.to_string())),
        };

        let (mut clauses, params) = filter_clause(map, selection, false)?;
        if let Route::ItemById(id) = route {
            clauses.insert(0, format!("{} = {id}", columns::ID));
        }

        Ok(WriteScope {
            clause: if clauses.is_empty() {
                None
            } else {
                Some(clauses.join(" AND "))
            },
            params,
        })
    }
}

/// The caller's part of a WHERE clause. Arguments must be consumed by
/// placeholders: a search token or a missing filter takes none.
fn filter_clause(
    map: &ProjectionMap,
    selection: Option<&Selection>,
    allow_search: bool,
) -> Result<(Vec<String>, Vec<SqlValue>)> {
    let args = selection.map(Selection::args).unwrap_or(&[]);
    let token = match selection.and_then(Selection::text) {
        None if args.is_empty() => return Ok((Vec::new(), Vec::new())),
        None => {
            return Err(StoreError::InvalidFilter(format!(
                "{} argument(s) given without a filter",
                args.len()
            )));
        }
        Some(FilterText::Auto(text)) => match classify_filter(text) {
            FilterClass::Expression(expr) => return expression_clause(expr, map, args),
            FilterClass::Search => text,
        },
        Some(FilterText::Search(token)) => token,
    };

    if !allow_search {
        return Err(StoreError::InvalidFilter(format!(
            "'{token}' is not a filter expression; writes do not take search text"
        )));
    }
    if !args.is_empty() {
        return Err(StoreError::InvalidFilter(format!(
            "search '{token}' takes no arguments, {} given",
            args.len()
        )));
    }
    Ok(search_clause(token))
}

fn search_clause(token: &str) -> (Vec<String>, Vec<SqlValue>) {
    let pattern = format!("%{token}%");
    (
        vec![format!(
            "({} LIKE ? OR {} LIKE ?)",
            columns::TITLE,
            columns::BODY
        )],
        vec![SqlValue::Text(pattern.clone()), SqlValue::Text(pattern)],
    )
}

fn expression_clause(
    mut expr: Expr,
    map: &ProjectionMap,
    args: &[Value],
) -> Result<(Vec<String>, Vec<SqlValue>)> {
    let mut placeholders = 0;
    sanitize(&mut expr, map, &mut placeholders)?;
    if placeholders != args.len() {
        return Err(StoreError::InvalidFilter(format!(
            "filter has {placeholders} placeholder(s) but {} argument(s) were given",
            args.len()
        )));
    }
    let params = args.iter().map(to_sql_value).collect::<Result<Vec<_>>>()?;
    Ok((vec![format!("({expr})")], params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AUTHORITY;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    fn notes() -> Locator {
        Locator::notes(AUTHORITY)
    }

    #[test]
    fn test_default_read() {
        let q = builder()
            .build_read(&notes(), Route::Collection, None, None, None)
            .unwrap();
        assert_eq!(
            q.sql,
            "SELECT id, title, body, color FROM notes ORDER BY modified DESC"
        );
        assert!(q.params.is_empty());
        assert_eq!(q.column_names(), vec!["id", "title", "body", "color"]);
    }

    #[test]
    fn test_item_read_injects_identity() {
        let loc = Locator::note(AUTHORITY, 9);
        let q = builder()
            .build_read(&loc, Route::ItemById(9), Some(&["title"][..]), None, None)
            .unwrap();
        assert_eq!(q.sql, "SELECT title FROM notes WHERE id = 9 ORDER BY modified DESC");
    }

    #[test]
    fn test_item_read_ands_caller_filter() {
        let loc = Locator::note(AUTHORITY, 9);
        let sel = Selection::new("color = ?").arg(2);
        let q = builder()
            .build_read(&loc, Route::ItemById(9), None, Some(&sel), None)
            .unwrap();
        assert_eq!(
            q.sql,
            "SELECT id, title, body, color FROM notes WHERE id = 9 AND (color = ?) ORDER BY modified DESC"
        );
        assert_eq!(q.params, vec![SqlValue::Integer(2)]);
    }

    #[test]
    fn test_search_shortcut() {
        let sel = Selection::new("abc");
        let q = builder()
            .build_read(&notes(), Route::Collection, None, Some(&sel), None)
            .unwrap();
        assert!(q.sql.contains("WHERE (title LIKE ? OR body LIKE ?)"));
        assert_eq!(
            q.params,
            vec![SqlValue::Text("%abc%".into()), SqlValue::Text("%abc%".into())]
        );
    }

    #[test]
    fn test_search_token_is_not_escaped() {
        let sel = Selection::new("50%_off");
        let q = builder()
            .build_read(&notes(), Route::Collection, None, Some(&sel), None)
            .unwrap();
        assert_eq!(q.params[0], SqlValue::Text("%50%_off%".into()));
    }

    #[test]
    fn test_explicit_search_is_never_sql() {
        let sel = Selection::search("title = 'x'");
        let q = builder()
            .build_read(&notes(), Route::Collection, None, Some(&sel), None)
            .unwrap();
        assert_eq!(q.params[0], SqlValue::Text("%title = 'x'%".into()));
    }

    #[test]
    fn test_classify_filter() {
        assert!(matches!(classify_filter("title = ?"), FilterClass::Expression(_)));
        assert!(matches!(
            classify_filter("title LIKE ? OR body LIKE ?"),
            FilterClass::Expression(_)
        ));
        assert!(matches!(classify_filter("color IN (1, 2)"), FilterClass::Expression(_)));
        assert_eq!(classify_filter("abc"), FilterClass::Search);
        assert_eq!(classify_filter("shopping list"), FilterClass::Search);
        assert_eq!(classify_filter("2024-01"), FilterClass::Search);
        assert_eq!(classify_filter("it's"), FilterClass::Search);
        assert_eq!(classify_filter("50%_off"), FilterClass::Search);
        assert!(matches!(
            classify_filter("id IN (SELECT id FROM notes)"),
            FilterClass::Expression(_)
        ));
        assert!(matches!(
            classify_filter("title IS DISTINCT FROM ?"),
            FilterClass::Expression(_)
        ));
        assert!(matches!(classify_filter("length(title)"), FilterClass::Expression(_)));
    }

    #[test]
    fn test_search_rejects_arguments() {
        for sel in [
            Selection::new("abc").arg(1).arg(2),
            Selection::search("abc").arg("x"),
            Selection::from_parts(None, vec![json!(1)]),
        ] {
            let err = builder()
                .build_read(&notes(), Route::Collection, None, Some(&sel), None)
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidFilter(_)), "{sel:?}");
        }
    }

    #[test]
    fn test_blank_filter_is_ignored() {
        let sel = Selection::new("   ");
        let q = builder()
            .build_read(&notes(), Route::Collection, None, Some(&sel), None)
            .unwrap();
        assert!(!q.sql.contains("WHERE"));
    }

    #[test]
    fn test_filter_rejects_unknown_columns() {
        let sel = Selection::new("password = ?").arg("x");
        let err = builder()
            .build_read(&notes(), Route::Collection, None, Some(&sel), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilter(_)));
    }

    #[test]
    fn test_filter_rejects_subqueries_and_functions() {
        for filter in [
            "id IN (SELECT id FROM notes)",
            "EXISTS (SELECT 1 FROM notes)",
            "length(title) > 3",
            "notes.title = 'a'",
            "title IS DISTINCT FROM 'a'",
            "title IS TRUE",
        ] {
            let sel = Selection::new(filter);
            let err = builder()
                .build_read(&notes(), Route::Collection, None, Some(&sel), None)
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidFilter(_)), "{filter}");
        }
    }

    #[test]
    fn test_filter_argument_count_must_match() {
        let sel = Selection::new("title = ? AND color = ?").arg("a");
        let err = builder()
            .build_read(&notes(), Route::Collection, None, Some(&sel), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilter(_)));
    }

    #[test]
    fn test_live_view_filter_uses_aliases() {
        let loc = Locator::live_folder(AUTHORITY);
        let sel = Selection::new("name = ?").arg("a");
        let q = builder()
            .build_read(&loc, Route::AlternateView, None, Some(&sel), Some("name desc"))
            .unwrap();
        assert_eq!(
            q.sql,
            "SELECT id AS _id, title AS name FROM notes WHERE (title = ?) ORDER BY title DESC"
        );
    }

    #[test]
    fn test_sort_parsing() {
        let q = builder()
            .build_read(&notes(), Route::Collection, None, None, Some("title, created DESC"))
            .unwrap();
        assert!(q.sql.ends_with("ORDER BY title ASC, created DESC"));

        for bad in ["title; DROP TABLE notes", "secret", "title SIDEWAYS", "title,"] {
            let err = builder()
                .build_read(&notes(), Route::Collection, None, None, Some(bad))
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidSort(_)), "{bad}");
        }
    }

    #[test]
    fn test_no_match_is_unknown_locator() {
        let loc = Locator::new(AUTHORITY, "widgets");
        let err = builder()
            .build_read(&loc, Route::NoMatch, None, None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownLocator(_)));
    }

    #[test]
    fn test_write_scope() {
        let all = builder()
            .build_scope(&notes(), Route::Collection, None)
            .unwrap();
        assert_eq!(all.clause, None);

        let loc = Locator::note(AUTHORITY, 4);
        let sel = Selection::new("title = ?").arg(json!("x"));
        let scope = builder()
            .build_scope(&loc, Route::ItemById(4), Some(&sel))
            .unwrap();
        assert_eq!(scope.clause.as_deref(), Some("id = 4 AND (title = ?)"));
        assert_eq!(scope.params, vec![SqlValue::Text("x".into())]);
    }

    #[test]
    fn test_write_scope_rejects_search_and_live_view() {
        let sel = Selection::new("groceries");
        assert!(matches!(
            builder().build_scope(&notes(), Route::Collection, Some(&sel)),
            Err(StoreError::InvalidFilter(_))
        ));

        let loc = Locator::live_folder(AUTHORITY);
        assert!(matches!(
            builder().build_scope(&loc, Route::AlternateView, None),
            Err(StoreError::UnknownLocator(_))
        ));
    }
}

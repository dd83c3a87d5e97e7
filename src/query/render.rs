//! Single renderer from [`Predicate`] trees to parameterized SQL.
//!
//! Only column names from the closed [`Column`]/[`SortColumn`] tables and
//! fixed keywords are written into the SQL text. Every value, including
//! internally produced ids, is bound as a `?` parameter.

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;

use crate::query::order::SortSpec;
use crate::query::predicate::{Column, CompareOp, Membership, Predicate, Value};
use crate::store::fts::{compile_match, MatchTree, TIMESTAMP_FORMAT};

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn bind(value: &Value) -> SqlValue {
    match value {
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Time(ts) => SqlValue::Text(format_timestamp(ts)),
    }
}

fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn join(parts: &[Predicate], op: &str, params: &mut Vec<SqlValue>) -> String {
    let rendered: Vec<String> = parts.iter().map(|p| render_predicate(p, params)).collect();
    format!("({})", rendered.join(op))
}

/// Renders `predicate`, appending its parameters in placeholder order.
pub fn render_predicate(predicate: &Predicate, params: &mut Vec<SqlValue>) -> String {
    match predicate {
        Predicate::True => "1".to_string(),
        Predicate::False => "0".to_string(),
        Predicate::And(parts) if parts.is_empty() => "1".to_string(),
        Predicate::Or(parts) if parts.is_empty() => "0".to_string(),
        Predicate::And(parts) => join(parts, " AND ", params),
        Predicate::Or(parts) => join(parts, " OR ", params),
        Predicate::Not(inner) => format!("NOT ({})", render_predicate(inner, params)),
        Predicate::Compare { column, op, value } => {
            let op = match op {
                CompareOp::Eq => "=",
                CompareOp::IsNot => "IS NOT",
                CompareOp::Lt => "<",
                CompareOp::Le => "<=",
                CompareOp::Gt => ">",
                CompareOp::Ge => ">=",
            };
            params.push(bind(value));
            format!("{} {} ?", column.sql(), op)
        }
        Predicate::IsNull(column) => format!("{} IS NULL", column.sql()),
        Predicate::NotNull(column) => format!("{} IS NOT NULL", column.sql()),
        Predicate::Contains { column, needle } => {
            params.push(SqlValue::Text(like_pattern(needle)));
            format!("unicode_lower({}) LIKE ? ESCAPE '\\'", column.sql())
        }
        Predicate::InList { values, .. } if values.is_empty() => "0".to_string(),
        Predicate::InList { column, values } => {
            params.extend(values.iter().map(|v| SqlValue::Integer(*v)));
            let marks = vec!["?"; values.len()].join(", ");
            format!("{} IN ({})", column.sql(), marks)
        }
        Predicate::DatePrefix { column, prefix } => {
            params.push(SqlValue::Integer(prefix.chars().count() as i64));
            params.push(SqlValue::Text(prefix.clone()));
            format!("SUBSTR({}, 1, ?) = ?", column.sql())
        }
        Predicate::Member(Membership::Label(label_id)) => {
            params.push(SqlValue::Integer(*label_id));
            "e.id IN (SELECT article_id FROM user_labels WHERE label_id = ?)".to_string()
        }
        Predicate::Member(Membership::AnyLabel { owner_uid }) => {
            params.push(SqlValue::Integer(*owner_uid));
            "e.id IN (SELECT ul.article_id FROM user_labels ul \
             JOIN labels l ON l.id = ul.label_id WHERE l.owner_uid = ?)"
                .to_string()
        }
        Predicate::Member(Membership::Tag { owner_uid, name }) => {
            params.push(SqlValue::Integer(*owner_uid));
            params.push(SqlValue::Text(name.clone()));
            "ue.int_id IN (SELECT post_int_id FROM tags WHERE owner_uid = ? AND tag_name = ?)"
                .to_string()
        }
        Predicate::FullTextMatch { language, query } => match compile_match(language, query) {
            Ok(tree) => render_match(&tree, params),
            Err(err) => {
                // ts_check raises the same error once evaluated.
                tracing::debug!(error = %err, "full-text query left to ts_check");
                params.push(SqlValue::Text(language.clone()));
                params.push(SqlValue::Text(query.clone()));
                "ts_check(?, ?) = 1".to_string()
            }
        },
    }
}

fn render_match(tree: &MatchTree, params: &mut Vec<SqlValue>) -> String {
    let join = |parts: &[MatchTree], op: &str, params: &mut Vec<SqlValue>| {
        let rendered: Vec<String> = parts.iter().map(|p| render_match(p, params)).collect();
        format!("({})", rendered.join(op))
    };

    match tree {
        MatchTree::Expr(expr) => {
            params.push(SqlValue::Text(expr.clone()));
            "e.id IN (SELECT rowid FROM entries_fts WHERE entries_fts MATCH ?)".to_string()
        }
        MatchTree::And(parts) => join(parts, " AND ", params),
        MatchTree::Or(parts) => join(parts, " OR ", params),
        MatchTree::Not(inner) => format!("NOT ({})", render_match(inner, params)),
    }
}

/// Column list of a headline row, in the order the store maps it.
const HEADLINE_COLUMNS: &str = "e.id, ue.int_id, e.guid, e.title, e.link, e.author, {content}, \
     e.score, e.date_entered, e.updated, ue.unread, ue.marked, ue.published, ue.note, \
     ue.feed_id, f.title, ue.last_read, ue.last_marked, ue.last_published, \
     ue.label_cache, ue.tag_cache, iso_year_week(e.date_entered)";

fn from_clause(allow_archived: bool) -> &'static str {
    if allow_archived {
        "entries e JOIN user_entries ue ON ue.ref_id = e.id LEFT JOIN feeds f ON f.id = ue.feed_id"
    } else {
        "entries e JOIN user_entries ue ON ue.ref_id = e.id JOIN feeds f ON f.id = ue.feed_id"
    }
}

fn where_clause(owner_uid: i64, filter: &Predicate, params: &mut Vec<SqlValue>) -> String {
    params.push(SqlValue::Integer(owner_uid));
    format!("ue.owner_uid = ? AND {}", render_predicate(filter, params))
}

/// One page of headlines.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlineQuery {
    pub owner_uid: i64,
    /// Keep rows whose feed no longer exists.
    pub allow_archived: bool,
    pub filter: Predicate,
    pub order: SortSpec,
    pub distinct: bool,
    pub include_content: bool,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl HeadlineQuery {
    pub fn render_page(&self) -> RenderedQuery {
        let mut params = Vec::new();
        let columns = HEADLINE_COLUMNS.replace(
            "{content}",
            if self.include_content { "e.content" } else { "NULL" },
        );

        let mut sql = format!(
            "SELECT {}{} FROM {} WHERE {} ORDER BY {}",
            if self.distinct { "DISTINCT " } else { "" },
            columns,
            from_clause(self.allow_archived),
            where_clause(self.owner_uid, &self.filter, &mut params),
            self.order.to_sql(),
        );

        match self.limit {
            Some(limit) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(SqlValue::Integer(limit));
                params.push(SqlValue::Integer(self.offset));
            }
            None if self.offset > 0 => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(SqlValue::Integer(self.offset));
            }
            None => {}
        }

        RenderedQuery { sql, params }
    }

    /// Id of the first row this query would return, among rows that
    /// arrived since `since`.
    pub fn render_first_id_probe(&self, since: DateTime<Utc>) -> RenderedQuery {
        let mut params = Vec::new();
        let filter = Predicate::all(vec![
            Predicate::compare(Column::DateEntered, CompareOp::Ge, since),
            self.filter.clone(),
        ]);
        let sql = format!(
            "SELECT e.id FROM {} WHERE {} ORDER BY {} LIMIT 1",
            from_clause(self.allow_archived),
            where_clause(self.owner_uid, &filter, &mut params),
            self.order.to_sql(),
        );
        RenderedQuery { sql, params }
    }
}

/// `COUNT` of the owner's rows matching `filter`.
pub fn render_count(owner_uid: i64, allow_archived: bool, filter: &Predicate) -> RenderedQuery {
    let mut params = Vec::new();
    let sql = format!(
        "SELECT COUNT(DISTINCT ue.int_id) FROM {} WHERE {}",
        from_clause(allow_archived),
        where_clause(owner_uid, filter, &mut params),
    );
    RenderedQuery { sql, params }
}

/// Evaluates `filter` against at most one row. Used to surface full-text
/// syntax errors before the real query runs.
pub fn render_syntax_probe(owner_uid: i64, filter: &Predicate) -> RenderedQuery {
    let mut params = Vec::new();
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} LIMIT 1",
        from_clause(true),
        where_clause(owner_uid, filter, &mut params),
    );
    RenderedQuery { sql, params }
}

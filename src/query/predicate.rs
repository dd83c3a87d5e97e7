//! Structured filter tree shared by the resolver, the search compiler and
//! plugins. Nothing here holds SQL text; [`render`](super::render) turns a
//! tree into a parameterized fragment exactly once.

use chrono::{DateTime, Utc};

/// Columns a predicate may reference. The set is closed: column names are
/// never taken from caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    EntryId,
    Title,
    Content,
    Author,
    Score,
    DateEntered,
    Updated,
    Unread,
    Marked,
    Published,
    Note,
    FeedId,
    CategoryId,
    LastRead,
    LastMarked,
    LastPublished,
}

impl Column {
    pub const fn sql(self) -> &'static str {
        match self {
            Self::EntryId => "e.id",
            Self::Title => "e.title",
            Self::Content => "e.content",
            Self::Author => "e.author",
            Self::Score => "e.score",
            Self::DateEntered => "e.date_entered",
            Self::Updated => "e.updated",
            Self::Unread => "ue.unread",
            Self::Marked => "ue.marked",
            Self::Published => "ue.published",
            Self::Note => "ue.note",
            Self::FeedId => "ue.feed_id",
            Self::CategoryId => "f.cat_id",
            Self::LastRead => "ue.last_read",
            Self::LastMarked => "ue.last_marked",
            Self::LastPublished => "ue.last_published",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Time(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    /// Null-safe inequality (`IS NOT`): rows holding NULL still match.
    IsNot,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Sub-selects with a fixed shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Membership {
    /// Article carries the given label.
    Label(i64),
    /// Article carries any label owned by the owner.
    AnyLabel { owner_uid: i64 },
    /// Owner's copy of the article carries the tag.
    Tag { owner_uid: i64, name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare {
        column: Column,
        op: CompareOp,
        value: Value,
    },
    IsNull(Column),
    NotNull(Column),
    /// Case-insensitive substring match.
    Contains { column: Column, needle: String },
    InList { column: Column, values: Vec<i64> },
    /// The column's text starts with `prefix`.
    DatePrefix { column: Column, prefix: String },
    Member(Membership),
    /// Delegated to the storage full-text capability.
    FullTextMatch { language: String, query: String },
}

impl Predicate {
    pub fn eq(column: Column, value: impl Into<Value>) -> Self {
        Self::Compare {
            column,
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    pub fn compare(column: Column, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn contains(column: Column, needle: impl Into<String>) -> Self {
        Self::Contains {
            column,
            needle: needle.into(),
        }
    }

    /// Conjunction that drops `True` members and collapses to `False` if any
    /// member is `False`.
    pub fn all(parts: Vec<Predicate>) -> Self {
        let mut kept = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Self::True => {}
                Self::False => return Self::False,
                Self::And(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::True,
            1 => kept.pop().unwrap_or(Self::True),
            _ => Self::And(kept),
        }
    }

    pub fn any(parts: Vec<Predicate>) -> Self {
        let mut kept = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Self::False => {}
                Self::True => return Self::True,
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::False,
            1 => kept.pop().unwrap_or(Self::False),
            _ => Self::Or(kept),
        }
    }

    /// Logical negation. Equality on a column becomes a null-safe `IS NOT`
    /// so that negating `marked = true` also keeps rows that are unset.
    pub fn negate(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Not(inner) => *inner,
            Self::Compare {
                column,
                op: CompareOp::Eq,
                value,
            } => Self::Compare {
                column,
                op: CompareOp::IsNot,
                value,
            },
            Self::IsNull(column) => Self::NotNull(column),
            Self::NotNull(column) => Self::IsNull(column),
            other => Self::Not(Box::new(other)),
        }
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Self::False)
    }

    /// Every full-text node in the tree, as `(language, query)`.
    pub fn full_text_terms(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::And(parts) | Self::Or(parts) => stack.extend(parts.iter()),
                Self::Not(inner) => stack.push(inner),
                Self::FullTextMatch { language, query } => out.push((language.as_str(), query.as_str())),
                _ => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_flattens_and_short_circuits() {
        let p = Predicate::all(vec![
            Predicate::True,
            Predicate::eq(Column::Unread, true),
            Predicate::all(vec![
                Predicate::eq(Column::Marked, true),
                Predicate::eq(Column::Published, true),
            ]),
        ]);
        assert!(matches!(p, Predicate::And(ref parts) if parts.len() == 3));

        let p = Predicate::all(vec![Predicate::eq(Column::Unread, true), Predicate::False]);
        assert!(p.is_false());

        assert_eq!(Predicate::all(vec![]), Predicate::True);
    }

    #[test]
    fn test_any_drops_false() {
        assert_eq!(Predicate::any(vec![]), Predicate::False);
        assert_eq!(
            Predicate::any(vec![Predicate::False, Predicate::eq(Column::Unread, true)]),
            Predicate::eq(Column::Unread, true)
        );
    }

    #[test]
    fn test_negate_equality_is_null_safe() {
        let p = Predicate::eq(Column::Marked, true).negate();
        assert_eq!(
            p,
            Predicate::Compare {
                column: Column::Marked,
                op: CompareOp::IsNot,
                value: Value::Bool(true),
            }
        );
        assert_eq!(Predicate::False.negate(), Predicate::True);
    }

    #[test]
    fn test_full_text_terms_walks_tree() {
        let p = Predicate::all(vec![
            Predicate::eq(Column::Unread, true),
            Predicate::Not(Box::new(Predicate::FullTextMatch {
                language: "simple".into(),
                query: "a & b".into(),
            })),
        ]);
        assert_eq!(p.full_text_terms(), vec![("simple", "a & b")]);
    }
}

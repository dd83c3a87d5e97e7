//! Full-text search over the `entries_fts` FTS5 index.
//!
//! Each article is indexed as its lowercased title and content words, markup
//! removed. Queries use the tsquery operators `&`, `|`, `!`, `<->` (or
//! `<N>`), parentheses and the `:*` prefix marker; they are parsed here and
//! rewritten into FTS5 MATCH expressions. Helpers exposed to SQL:
//!
//! - `ts_check(language, query)`: 1, or an error for a malformed query
//! - `unicode_lower(text)`: full Unicode lowercasing
//! - `iso_year_week(timestamp)`: `IYYY-IW`

use chrono::{Datelike, NaiveDateTime};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

pub const SUPPORTED_LANGUAGES: [&str; 6] = ["simple", "english", "german", "french", "spanish", "russian"];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TsQueryError {
    #[error("text search configuration \"{0}\" does not exist")]
    UnknownLanguage(String),
    #[error("syntax error in tsquery: \"{0}\"")]
    Syntax(String),
}

/// Lowercased words of `text`, markup removed.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    let mut in_tag = false;
    text.split(move |c: char| {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                return true;
            }
            _ => {}
        }
        in_tag || !c.is_alphanumeric()
    })
    .filter(|w| !w.is_empty())
    .map(str::to_lowercase)
}

/// Builds the indexed text for an article.
pub fn to_index_text(title: &str, content: &str) -> String {
    words(title).chain(words(content)).collect::<Vec<_>>().join(" ")
}

pub fn check_language(language: &str) -> Result<(), TsQueryError> {
    if SUPPORTED_LANGUAGES.contains(&language.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(TsQueryError::UnknownLanguage(language.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TsQuery {
    Term { word: String, prefix: bool },
    And(Box<TsQuery>, Box<TsQuery>),
    Or(Box<TsQuery>, Box<TsQuery>),
    Not(Box<TsQuery>),
    /// `right` starts `distance` words after `left`.
    Follow {
        left: Box<TsQuery>,
        right: Box<TsQuery>,
        distance: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexeme {
    And,
    Or,
    Not,
    Open,
    Close,
    Follow(usize),
    Word { text: String, prefix: bool },
}

fn lex(input: &str) -> Result<Vec<Lexeme>, TsQueryError> {
    let syntax = || TsQueryError::Syntax(input.to_string());
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '&' => {
                out.push(Lexeme::And);
                i += 1;
            }
            '|' => {
                out.push(Lexeme::Or);
                i += 1;
            }
            '!' => {
                out.push(Lexeme::Not);
                i += 1;
            }
            '(' => {
                out.push(Lexeme::Open);
                i += 1;
            }
            ')' => {
                out.push(Lexeme::Close);
                i += 1;
            }
            '<' => {
                let close = chars[i..].iter().position(|c| *c == '>').ok_or_else(syntax)?;
                let inner: String = chars[i + 1..i + close].iter().collect();
                let distance = if inner == "-" {
                    1
                } else {
                    inner.parse::<usize>().map_err(|_| syntax())?
                };
                out.push(Lexeme::Follow(distance));
                i += close + 1;
            }
            ':' => return Err(syntax()),
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !matches!(chars[i], '&' | '|' | '!' | '(' | ')' | '<' | ':')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();

                let mut prefix = false;
                if i < chars.len() && chars[i] == ':' {
                    i += 1;
                    let flags_start = i;
                    while i < chars.len() && matches!(chars[i], '*' | 'a'..='d' | 'A'..='D') {
                        prefix |= chars[i] == '*';
                        i += 1;
                    }
                    if i == flags_start {
                        return Err(syntax());
                    }
                }

                out.push(Lexeme::Word { text, prefix });
            }
        }
    }

    Ok(out)
}

struct Parser<'a> {
    lexemes: Vec<Lexeme>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn error(&self) -> TsQueryError {
        TsQueryError::Syntax(self.source.to_string())
    }

    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn or(&mut self) -> Result<TsQuery, TsQueryError> {
        let mut left = self.and()?;
        while self.peek() == Some(&Lexeme::Or) {
            self.pos += 1;
            let right = self.and()?;
            left = TsQuery::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<TsQuery, TsQueryError> {
        let mut left = self.follow()?;
        while self.peek() == Some(&Lexeme::And) {
            self.pos += 1;
            let right = self.follow()?;
            left = TsQuery::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn follow(&mut self) -> Result<TsQuery, TsQueryError> {
        let mut left = self.unary()?;
        while let Some(Lexeme::Follow(distance)) = self.peek() {
            let distance = *distance;
            self.pos += 1;
            let right = self.unary()?;
            left = TsQuery::Follow {
                left: Box::new(left),
                right: Box::new(right),
                distance,
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<TsQuery, TsQueryError> {
        let lexeme = self.peek().cloned().ok_or_else(|| self.error())?;
        self.pos += 1;
        match lexeme {
            Lexeme::Not => Ok(TsQuery::Not(Box::new(self.unary()?))),
            Lexeme::Open => {
                let inner = self.or()?;
                if self.peek() != Some(&Lexeme::Close) {
                    return Err(self.error());
                }
                self.pos += 1;
                Ok(inner)
            }
            Lexeme::Word { text, prefix } => {
                // A word with inner punctuation is a phrase of its parts.
                let mut parts = words(&text).map(|word| TsQuery::Term { word, prefix: false });
                let first = parts.next().ok_or_else(|| self.error())?;
                let mut node = parts.fold(first, |left, right| TsQuery::Follow {
                    left: Box::new(left),
                    right: Box::new(right),
                    distance: 1,
                });
                if prefix {
                    mark_prefix(&mut node);
                }
                Ok(node)
            }
            _ => Err(self.error()),
        }
    }
}

fn mark_prefix(node: &mut TsQuery) {
    match node {
        TsQuery::Term { prefix, .. } => *prefix = true,
        TsQuery::Follow { right, .. } => mark_prefix(right),
        _ => {}
    }
}

impl TsQuery {
    pub fn parse(input: &str) -> Result<Self, TsQueryError> {
        let mut parser = Parser {
            lexemes: lex(input)?,
            pos: 0,
            source: input,
        };
        let query = parser.or()?;
        if parser.pos != parser.lexemes.len() {
            return Err(parser.error());
        }
        Ok(query)
    }

    /// Rewrites the query over `entries_fts`. `None` when a proximity
    /// operator joins something other than words or phrases.
    pub fn to_match_tree(&self) -> Option<MatchTree> {
        match self {
            Self::And(a, b) => Some(MatchTree::and(a.to_match_tree()?, b.to_match_tree()?)),
            Self::Or(a, b) => Some(MatchTree::or(a.to_match_tree()?, b.to_match_tree()?)),
            Self::Not(inner) => Some(MatchTree::Not(Box::new(inner.to_match_tree()?))),
            Self::Term { .. } | Self::Follow { .. } => self.proximity().map(MatchTree::Expr),
        }
    }

    /// Words of an adjacent run, and whether the last one is a prefix.
    fn phrase_words(&self) -> Option<(Vec<&str>, bool)> {
        match self {
            Self::Term { word, prefix } => Some((vec![word.as_str()], *prefix)),
            Self::Follow {
                left,
                right,
                distance: 1,
            } => {
                let (mut words, left_prefix) = left.phrase_words()?;
                if left_prefix {
                    return None;
                }
                let (tail, prefix) = right.phrase_words()?;
                words.extend(tail);
                Some((words, prefix))
            }
            _ => None,
        }
    }

    fn proximity(&self) -> Option<String> {
        if let Some((words, prefix)) = self.phrase_words() {
            return Some(quote_phrase(&words, prefix));
        }
        match self {
            // NEAR is unordered; the order is not enforced for gaps.
            Self::Follow {
                left,
                right,
                distance,
            } => {
                let (left, left_prefix) = left.phrase_words()?;
                let (right, right_prefix) = right.phrase_words()?;
                Some(format!(
                    "NEAR({} {}, {})",
                    quote_phrase(&left, left_prefix),
                    quote_phrase(&right, right_prefix),
                    distance.saturating_sub(1)
                ))
            }
            _ => None,
        }
    }
}

fn quote_phrase(words: &[&str], prefix: bool) -> String {
    let body = words.join(" ").replace('"', "\"\"");
    if prefix {
        format!("\"{body}\"*")
    } else {
        format!("\"{body}\"")
    }
}

/// A query as `entries_fts` MATCH expressions. FTS5 has no unary NOT, so a
/// negation that cannot pair with a positive operand stays in SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchTree {
    Expr(String),
    And(Vec<MatchTree>),
    Or(Vec<MatchTree>),
    Not(Box<MatchTree>),
}

impl MatchTree {
    fn and(a: Self, b: Self) -> Self {
        match (a, b) {
            (Self::Expr(a), Self::Expr(b)) => Self::Expr(format!("({a}) AND ({b})")),
            (Self::Expr(a), Self::Not(b)) => match *b {
                Self::Expr(b) => Self::Expr(format!("({a}) NOT ({b})")),
                b => Self::And(vec![Self::Expr(a), Self::Not(Box::new(b))]),
            },
            (Self::Not(a), Self::Expr(b)) => match *a {
                Self::Expr(a) => Self::Expr(format!("({b}) NOT ({a})")),
                a => Self::And(vec![Self::Not(Box::new(a)), Self::Expr(b)]),
            },
            (Self::And(mut parts), b) => {
                parts.push(b);
                Self::And(parts)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    fn or(a: Self, b: Self) -> Self {
        match (a, b) {
            (Self::Expr(a), Self::Expr(b)) => Self::Expr(format!("({a}) OR ({b})")),
            (Self::Or(mut parts), b) => {
                parts.push(b);
                Self::Or(parts)
            }
            (a, b) => Self::Or(vec![a, b]),
        }
    }
}

/// Validates and rewrites a search query for `language`.
pub fn compile_match(language: &str, query: &str) -> Result<MatchTree, TsQueryError> {
    check_language(language)?;
    TsQuery::parse(query)?
        .to_match_tree()
        .ok_or_else(|| TsQueryError::Syntax(query.to_string()))
}

/// `IYYY-IW` for a stored timestamp.
pub fn iso_year_week(timestamp: &str) -> Option<String> {
    let parsed = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
    let week = parsed.iso_week();
    Some(format!("{:04}-{:02}", week.year(), week.week()))
}

fn text_arg(value: ValueRef<'_>) -> rusqlite::Result<Option<String>> {
    match value {
        ValueRef::Null => Ok(None),
        ValueRef::Text(bytes) => Ok(Some(String::from_utf8_lossy(bytes).into_owned())),
        other => Err(rusqlite::Error::InvalidFunctionParameterType(0, other.data_type())),
    }
}

/// Whether `err` is a rejected full-text query rather than a storage fault.
pub fn is_query_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::UserFunctionError(inner) => inner.downcast_ref::<TsQueryError>().is_some(),
        rusqlite::Error::SqliteFailure(e, Some(message)) => {
            let message = message.to_lowercase();
            (e.code == rusqlite::ErrorCode::Unknown
                && (message.contains("tsquery") || message.contains("text search configuration")))
                || (message.contains("fts5") && message.contains("syntax"))
        }
        _ => false,
    }
}

fn user_error(err: TsQueryError) -> rusqlite::Error {
    rusqlite::Error::UserFunctionError(Box::new(err))
}

pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("ts_check", 2, flags, |ctx| {
        let language = text_arg(ctx.get_raw(0))?.unwrap_or_default();
        let query = text_arg(ctx.get_raw(1))?.unwrap_or_default();
        compile_match(&language, &query).map_err(user_error)?;
        Ok(true)
    })?;

    // SQLite's LOWER folds ASCII only.
    conn.create_scalar_function("unicode_lower", 1, flags, |ctx| {
        Ok(text_arg(ctx.get_raw(0))?.map(|text| text.to_lowercase()))
    })?;

    conn.create_scalar_function("iso_year_week", 1, flags, |ctx| {
        Ok(text_arg(ctx.get_raw(0))?.and_then(|ts| iso_year_week(&ts)))
    })?;

    Ok(())
}

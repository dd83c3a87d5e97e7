//! The headline search language.
//!
//! A search string is a list of whitespace separated tokens. Double quotes
//! group words into one token and a leading `-` negates it. Tokens of the
//! form `key:value` with a known key become column filters; `@date`
//! restricts the update day; everything else is free text, folded into one
//! full-text query:
//!
//! ```text
//! title:"daily report" -draft @yesterday star:true "rust async"
//! ```

use serde::Serialize;

use crate::app::Result;
use crate::query::context::{CancelToken, RequestContext};
use crate::query::dates::parse_search_date;
use crate::query::predicate::{Column, CompareOp, Membership, Predicate};

/// Resolves label captions named by `label:` tokens.
pub trait LabelLookup {
    fn find_label_id(&self, owner_uid: i64, caption: &str, cancel: &CancelToken) -> Result<Option<i64>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledSearch {
    #[serde(skip)]
    pub predicate: Predicate,
    /// Free-text words, for highlighting matches in the result view.
    pub highlight_words: Vec<String>,
    /// User-facing message when the search could not be run as written.
    pub error: Option<String>,
}

impl CompiledSearch {
    pub fn new(predicate: Predicate, highlight_words: Vec<String>) -> Self {
        Self {
            predicate,
            highlight_words,
            error: None,
        }
    }

    /// Replaces the filter with one that matches nothing and records why.
    pub fn into_syntax_error(self) -> Self {
        let message = format!("Incorrect search syntax: {}.", self.highlight_words.join(" "));
        Self {
            predicate: Predicate::False,
            error: Some(message),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    negated: bool,
    text: String,
}

/// Splits on whitespace outside double quotes. Quote characters are
/// dropped, so `-"a b"` and `title:"a b"` come out as `-a b` and
/// `title:a b`. An unterminated quote runs to the end of input.
fn tokenize(input: &str) -> Vec<Token> {
    let mut raw = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in input.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    raw.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        raw.push(current);
    }

    raw.into_iter()
        .filter_map(|text| {
            let (negated, rest) = match text.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, text.as_str()),
            };
            let rest = rest.trim();
            if rest.is_empty() {
                None
            } else {
                Some(Token {
                    negated,
                    text: rest.to_string(),
                })
            }
        })
        .collect()
}

fn bool_flag(column: Column, value: &str) -> Predicate {
    Predicate::eq(column, value == "true")
}

fn note_filter(value: &str) -> Predicate {
    match value {
        "true" => Predicate::all(vec![
            Predicate::NotNull(Column::Note),
            Predicate::compare(Column::Note, CompareOp::IsNot, ""),
        ]),
        "false" => Predicate::any(vec![
            Predicate::IsNull(Column::Note),
            Predicate::eq(Column::Note, ""),
        ]),
        needle => Predicate::contains(Column::Note, needle),
    }
}

/// Title-or-content match used when a known key is given without a value.
/// Negation applies to each side: either one lacking the needle matches.
fn title_or_content(needle: &str, negated: bool) -> Predicate {
    Predicate::any(vec![
        apply_negation(Predicate::contains(Column::Title, needle), negated),
        apply_negation(Predicate::contains(Column::Content, needle), negated),
    ])
}

fn apply_negation(predicate: Predicate, negated: bool) -> Predicate {
    if negated {
        predicate.negate()
    } else {
        predicate
    }
}

/// Compiles a search string. `language` overrides the owner's default
/// search language when non-empty.
pub fn compile(
    search: &str,
    language: Option<&str>,
    ctx: &RequestContext,
    labels: &dyn LabelLookup,
) -> Result<CompiledSearch> {
    let mut filters = Vec::new();
    let mut words = Vec::new();
    let mut leftover = Vec::new();

    for token in tokenize(search) {
        let lowered = token.text.to_lowercase();
        let (name, value) = match lowered.split_once(':') {
            Some((name, value)) => (name, value.trim()),
            None => (lowered.as_str(), ""),
        };

        let filter = match name {
            "title" | "author" | "note" | "star" | "pub" | "label" | "unread" if value.is_empty() => {
                if !token.negated || matches!(name, "title" | "author") {
                    words.push(token.text.clone());
                }
                title_or_content(&lowered, token.negated)
            }
            "title" => apply_negation(Predicate::contains(Column::Title, value), token.negated),
            "author" => apply_negation(Predicate::contains(Column::Author, value), token.negated),
            "note" => apply_negation(note_filter(value), token.negated),
            "star" => apply_negation(bool_flag(Column::Marked, value), token.negated),
            "pub" => apply_negation(bool_flag(Column::Published, value), token.negated),
            "unread" => apply_negation(bool_flag(Column::Unread, value), token.negated),
            "label" => match labels.find_label_id(ctx.owner_uid, value, &ctx.cancel)? {
                Some(id) => apply_negation(Predicate::Member(Membership::Label(id)), token.negated),
                None => {
                    tracing::debug!(label = value, "search names an unknown label");
                    Predicate::False
                }
            },
            _ if token.text.starts_with('@') => {
                match parse_search_date(&token.text[1..], ctx.now, ctx.prefs.timezone()) {
                    Some(prefix) => apply_negation(
                        Predicate::DatePrefix {
                            column: Column::Updated,
                            prefix,
                        },
                        token.negated,
                    ),
                    None => {
                        tracing::debug!(date = %token.text, "unparseable search date");
                        Predicate::False
                    }
                }
            }
            _ => {
                let term = if lowered.contains(char::is_whitespace) {
                    format!("({})", lowered.split_whitespace().collect::<Vec<_>>().join(" <-> "))
                } else {
                    lowered.clone()
                };
                if token.negated {
                    leftover.push(format!("!{term}"));
                } else {
                    words.push(term.clone());
                    leftover.push(term);
                }
                continue;
            }
        };

        filters.push(filter);
    }

    if !leftover.is_empty() {
        let joined = leftover.join(" ");
        // Operator-bearing input is passed through as written.
        let query = if joined.contains(['&', '|']) {
            joined
        } else {
            leftover.join(" & ")
        };

        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(ctx.prefs.default_search_language.as_str())
            .to_lowercase();

        filters.push(Predicate::FullTextMatch { language, query });
    }

    let predicate = if filters.is_empty() {
        Predicate::False
    } else {
        Predicate::all(filters)
    };

    tracing::debug!(search, ?predicate, ?words, "compiled search");
    Ok(CompiledSearch::new(predicate, words))
}

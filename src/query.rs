//! Rich query language.
//!
//! ```text
//! expr   := or
//! or     := and ("OR" and)*
//! and    := unary (["AND"] unary)*
//! unary  := ("NOT" | "-") unary | "(" expr ")" | term
//! term   := field ":" value | word
//! value  := "/" regex "/" | "\"" text "\"" | op? text
//! ```
//!
//! Keywords are case-insensitive. Bare words search title and notes.

use chrono::{Days, NaiveDate};
use regex::{Regex, RegexBuilder};

use crate::filter::FilterError;
use crate::models::{Status, Task};
use crate::utils;

#[derive(Debug, Clone)]
pub struct RichQuery {
    expr: Expr,
    today: NaiveDate,
}

impl RichQuery {
    /// Parse a query. Relative dates (`today`, `tomorrow`) resolve against `today`.
    pub fn parse(input: &str, today: NaiveDate) -> Result<Self, FilterError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(FilterError::InvalidQuery("empty query".to_string()));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            today,
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(FilterError::InvalidQuery(format!(
                "unexpected {}",
                token.describe()
            )));
        }
        Ok(RichQuery { expr, today })
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.expr.eval(task, self.today)
    }
}

#[derive(Debug, Clone)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Text(TextField, Matcher),
    Date(DateField, DateTest),
    Status(Option<Status>),
    Trashed(bool),
    Repeating(bool),
    Bucket(String),
}

impl Expr {
    fn eval(&self, task: &Task, today: NaiveDate) -> bool {
        match self {
            Expr::And(a, b) => a.eval(task, today) && b.eval(task, today),
            Expr::Or(a, b) => a.eval(task, today) || b.eval(task, today),
            Expr::Not(inner) => !inner.eval(task, today),
            Expr::Text(field, matcher) => field.values(task).iter().any(|v| matcher.is_match(v)),
            Expr::Date(field, test) => test.check(field.value(task)),
            Expr::Status(status) => status.is_none_or(|s| s == task.status),
            Expr::Trashed(wanted) => task.trashed == *wanted,
            Expr::Repeating(wanted) => task.repeating == *wanted,
            Expr::Bucket(name) => task.bucket(today) == name,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TextField {
    Title,
    Notes,
    Text,
    Tags,
    Project,
    Area,
    Heading,
    Id,
}

impl TextField {
    fn values<'a>(self, task: &'a Task) -> Vec<&'a str> {
        match self {
            TextField::Title => vec![task.title.as_str()],
            TextField::Notes => vec![task.notes.as_str()],
            TextField::Text => vec![task.title.as_str(), task.notes.as_str()],
            TextField::Tags => task.tags.iter().map(String::as_str).collect(),
            TextField::Project => [task.project_title.as_deref(), task.project_id.as_deref()]
                .into_iter()
                .flatten()
                .collect(),
            TextField::Area => [task.area_title.as_deref(), task.area_id.as_deref()]
                .into_iter()
                .flatten()
                .collect(),
            TextField::Heading => task.heading_title.as_deref().into_iter().collect(),
            TextField::Id => vec![task.uuid.as_str()],
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Contains(String),
    Exact(String),
    Pattern(Regex),
}

impl Matcher {
    fn is_match(&self, value: &str) -> bool {
        match self {
            Matcher::Contains(needle) => value.to_lowercase().contains(needle),
            Matcher::Exact(wanted) => value == wanted,
            Matcher::Pattern(re) => re.is_match(value),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DateField {
    Start,
    Deadline,
    Created,
    Modified,
}

impl DateField {
    fn value(self, task: &Task) -> Option<NaiveDate> {
        match self {
            DateField::Start => task.start_date,
            DateField::Deadline => task.deadline,
            DateField::Created => task.created.map(|dt| dt.date_naive()),
            DateField::Modified => task.modified.map(|dt| dt.date_naive()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy)]
enum DateTest {
    Missing,
    Present,
    Compare(Comparison, NaiveDate),
}

impl DateTest {
    fn check(self, value: Option<NaiveDate>) -> bool {
        match (self, value) {
            (DateTest::Missing, value) => value.is_none(),
            (DateTest::Present, value) => value.is_some(),
            (DateTest::Compare(_, _), None) => false,
            (DateTest::Compare(op, bound), Some(value)) => match op {
                Comparison::Eq => value == bound,
                Comparison::Lt => value < bound,
                Comparison::Le => value <= bound,
                Comparison::Gt => value > bound,
                Comparison::Ge => value >= bound,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Plain,
    Quoted,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Term {
        field: Option<String>,
        value: String,
        kind: ValueKind,
    },
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::And => "AND".to_string(),
            Token::Or => "OR".to_string(),
            Token::Not => "NOT".to_string(),
            Token::Term { field: Some(f), value, .. } => format!("term '{f}:{value}'"),
            Token::Term { field: None, value, .. } => format!("term '{value}'"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '-' if chars.get(i + 1).is_some_and(|next| !next.is_whitespace()) => {
                tokens.push(Token::Not);
                i += 1;
            }
            '"' => {
                let (text, next) = read_delimited(&chars, i + 1, '"')?;
                tokens.push(Token::Term {
                    field: None,
                    value: text,
                    kind: ValueKind::Quoted,
                });
                i = next;
            }
            _ => {
                let start = i;
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !matches!(chars[i], '(' | ')' | ':')
                {
                    i += 1;
                }
                let head: String = chars[start..i].iter().collect();

                if chars.get(i) == Some(&':') && !head.is_empty() {
                    i += 1;
                    let (value, kind, next) = match chars.get(i) {
                        Some('/') => {
                            let (text, next) = read_delimited(&chars, i + 1, '/')?;
                            (text, ValueKind::Regex, next)
                        }
                        Some('"') => {
                            let (text, next) = read_delimited(&chars, i + 1, '"')?;
                            (text, ValueKind::Quoted, next)
                        }
                        _ => {
                            let value_start = i;
                            while i < chars.len()
                                && !chars[i].is_whitespace()
                                && !matches!(chars[i], '(' | ')')
                            {
                                i += 1;
                            }
                            (chars[value_start..i].iter().collect(), ValueKind::Plain, i)
                        }
                    };
                    if kind == ValueKind::Plain && value.is_empty() {
                        return Err(FilterError::InvalidQuery(format!(
                            "missing value for field '{head}'"
                        )));
                    }
                    tokens.push(Token::Term {
                        field: Some(head.to_lowercase()),
                        value,
                        kind,
                    });
                    i = next;
                    continue;
                }

                // A stray ':' with nothing before it is part of the word
                if head.is_empty() {
                    i += 1;
                    tokens.push(Token::Term {
                        field: None,
                        value: ":".to_string(),
                        kind: ValueKind::Plain,
                    });
                    continue;
                }

                tokens.push(match head.to_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Term {
                        field: None,
                        value: head,
                        kind: ValueKind::Plain,
                    },
                });
            }
        }
    }
    Ok(tokens)
}

/// Read up to an unescaped `delim`. `\delim` yields the delimiter itself;
/// other escapes are kept so regex classes like `\d` survive.
fn read_delimited(chars: &[char], mut i: usize, delim: char) -> Result<(String, usize), FilterError> {
    let mut text = String::new();
    while i < chars.len() {
        match chars[i] {
            '\\' if chars.get(i + 1) == Some(&delim) => {
                text.push(delim);
                i += 2;
            }
            '\\' => {
                text.push('\\');
                if let Some(next) = chars.get(i + 1) {
                    text.push(*next);
                }
                i += 2;
            }
            c if c == delim => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(FilterError::InvalidQuery(format!("unterminated {delim}")))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    today: NaiveDate,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.pos += 1;
                }
                Some(Token::Not | Token::LParen | Token::Term { .. }) => {}
                _ => break,
            }
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        match self.next() {
            Some(Token::Not) => Ok(Expr::Not(Box::new(self.parse_unary()?))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(FilterError::InvalidQuery("unbalanced parentheses".to_string())),
                }
            }
            Some(Token::Term { field, value, kind }) => self.term(field.as_deref(), value, kind),
            Some(token @ (Token::And | Token::Or)) => Err(FilterError::InvalidQuery(format!(
                "dangling operator {}",
                token.describe()
            ))),
            Some(Token::RParen) => Err(FilterError::InvalidQuery("unbalanced parentheses".to_string())),
            None => Err(FilterError::InvalidQuery("unexpected end of query".to_string())),
        }
    }

    fn term(&self, field: Option<&str>, value: String, kind: ValueKind) -> Result<Expr, FilterError> {
        let Some(field) = field else {
            return Ok(Expr::Text(TextField::Text, text_matcher(value, kind)?));
        };
        let text_field = match field {
            "title" => Some(TextField::Title),
            "notes" => Some(TextField::Notes),
            "text" => Some(TextField::Text),
            "tag" | "tags" => Some(TextField::Tags),
            "project" => Some(TextField::Project),
            "area" => Some(TextField::Area),
            "heading" => Some(TextField::Heading),
            _ => None,
        };
        if let Some(text_field) = text_field {
            return Ok(Expr::Text(text_field, text_matcher(value, kind)?));
        }

        match field {
            "id" | "uuid" => {
                let matcher = match kind {
                    ValueKind::Regex => text_matcher(value, kind)?,
                    _ => Matcher::Exact(value),
                };
                Ok(Expr::Text(TextField::Id, matcher))
            }
            "status" => {
                let status = match plain(field, &value, kind)?.as_str() {
                    "incomplete" | "open" => Some(Status::Incomplete),
                    "completed" | "done" => Some(Status::Completed),
                    "canceled" | "cancelled" => Some(Status::Canceled),
                    "any" => None,
                    other => {
                        return Err(FilterError::InvalidQuery(format!("unknown status '{other}'")));
                    }
                };
                Ok(Expr::Status(status))
            }
            "trashed" => Ok(Expr::Trashed(boolean(field, &value, kind)?)),
            "repeating" => Ok(Expr::Repeating(boolean(field, &value, kind)?)),
            "start" | "when" => {
                let lowered = plain(field, &value, kind)?;
                if matches!(lowered.as_str(), "inbox" | "anytime" | "someday" | "upcoming") {
                    return Ok(Expr::Bucket(lowered));
                }
                Ok(Expr::Date(DateField::Start, self.date_test(&value)?))
            }
            "deadline" | "due" => {
                plain(field, &value, kind)?;
                Ok(Expr::Date(DateField::Deadline, self.date_test(&value)?))
            }
            "created" => {
                plain(field, &value, kind)?;
                Ok(Expr::Date(DateField::Created, self.date_test(&value)?))
            }
            "modified" => {
                plain(field, &value, kind)?;
                Ok(Expr::Date(DateField::Modified, self.date_test(&value)?))
            }
            other => Err(FilterError::InvalidQuery(format!("unknown field '{other}'"))),
        }
    }

    fn date_test(&self, value: &str) -> Result<DateTest, FilterError> {
        let trimmed = value.trim();
        match trimmed.to_lowercase().as_str() {
            "none" => return Ok(DateTest::Missing),
            "any" => return Ok(DateTest::Present),
            _ => {}
        }
        let (op, rest) = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
            ("=", Comparison::Eq),
        ]
        .iter()
        .find_map(|(prefix, op)| trimmed.strip_prefix(prefix).map(|rest| (*op, rest)))
        .unwrap_or((Comparison::Eq, trimmed));

        let date = match rest.to_lowercase().as_str() {
            "today" => Some(self.today),
            "tomorrow" => self.today.checked_add_days(Days::new(1)),
            "yesterday" => self.today.checked_sub_days(Days::new(1)),
            _ => utils::parse_date_or_time(rest).map(|(instant, _)| instant.date_naive()),
        }
        .ok_or_else(|| FilterError::InvalidDate {
            value: value.to_string(),
        })?;
        Ok(DateTest::Compare(op, date))
    }
}

fn text_matcher(value: String, kind: ValueKind) -> Result<Matcher, FilterError> {
    match kind {
        ValueKind::Regex => RegexBuilder::new(&value)
            .case_insensitive(true)
            .build()
            .map(Matcher::Pattern)
            .map_err(|e| FilterError::InvalidQuery(format!("invalid regex /{value}/: {e}"))),
        _ => Ok(Matcher::Contains(value.to_lowercase())),
    }
}

fn plain(field: &str, value: &str, kind: ValueKind) -> Result<String, FilterError> {
    if kind == ValueKind::Regex {
        return Err(FilterError::InvalidQuery(format!(
            "field '{field}' does not accept a regex"
        )));
    }
    Ok(value.trim().to_lowercase())
}

fn boolean(field: &str, value: &str, kind: ValueKind) -> Result<bool, FilterError> {
    match plain(field, value, kind)?.as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(FilterError::InvalidQuery(format!(
            "field '{field}' expects true or false, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn q(input: &str) -> RichQuery {
        RichQuery::parse(input, today()).unwrap()
    }

    fn task(title: &str) -> Task {
        Task::new(format!("id-{title}"), title)
    }

    #[test]
    fn bare_words_and_adjacency_mean_and() {
        let query = q("buy milk");
        assert!(query.matches(&task("Buy oat milk")));
        assert!(!query.matches(&task("Buy bread")));
    }

    #[test]
    fn or_binds_looser_than_and() {
        let query = q("title:milk OR title:bread tag:errand");
        assert!(query.matches(&task("milk")));
        assert!(!query.matches(&task("bread")));
        let mut bread = task("bread");
        bread.tags = vec!["Errand".into()];
        assert!(query.matches(&bread));
    }

    #[test]
    fn negation_and_grouping() {
        let query = q("-(title:milk OR title:bread)");
        assert!(!query.matches(&task("milk")));
        assert!(query.matches(&task("eggs")));
        assert!(q("NOT title:milk").matches(&task("eggs")));
    }

    #[test]
    fn regex_values_are_case_insensitive() {
        let query = q(r"title:/^call\s+\w+$/");
        assert!(query.matches(&task("Call Mom")));
        assert!(!query.matches(&task("Call")));
    }

    #[test]
    fn regex_may_contain_parens_and_escaped_slash() {
        let query = q(r"notes:/a\/(b|c)/");
        let mut t = task("x");
        t.notes = "path a/c".into();
        assert!(query.matches(&t));
    }

    #[test]
    fn quoted_values_keep_spaces() {
        let query = q(r#"project:"Home Renovation""#);
        let mut t = task("paint");
        t.project_title = Some("Home renovation".into());
        assert!(query.matches(&t));
    }

    #[test]
    fn date_comparisons() {
        let mut t = task("x");
        t.deadline = NaiveDate::from_ymd_opt(2025, 3, 1);
        assert!(q("due:<2025-03-02").matches(&t));
        assert!(q("due:<=2025-03-01").matches(&t));
        assert!(!q("due:>2025-03-01").matches(&t));
        assert!(q("deadline:any").matches(&t));
        assert!(!q("deadline:none").matches(&t));
        t.deadline = None;
        assert!(q("deadline:none").matches(&t));
        assert!(!q("due:<2030-01-01").matches(&t));
    }

    #[test]
    fn relative_dates_use_supplied_today() {
        let mut t = task("x");
        t.start_date = today().succ_opt();
        assert!(q("when:tomorrow").matches(&t));
        assert!(q("start:upcoming").matches(&t));
        assert!(!q("start:today").matches(&t));
    }

    #[test]
    fn status_trashed_and_repeating_terms() {
        let mut t = task("x");
        t.status = Status::Completed;
        t.trashed = true;
        assert!(q("status:done trashed:yes repeating:false").matches(&t));
        assert!(!q("status:incomplete").matches(&t));
        assert!(q("status:any").matches(&t));
    }

    #[test]
    fn id_matches_exactly() {
        let t = task("x");
        assert!(q("id:id-x").matches(&t));
        assert!(!q("uuid:id").matches(&t));
    }

    #[test]
    fn errors_are_reported() {
        let invalid = [
            "color:red",
            "title:/[unclosed/",
            "title:/(/",
            "(title:a",
            "title:a)",
            "title:a OR",
            "AND title:a",
            "status:/done/",
            "title:",
            "\"open quote",
        ];
        for input in invalid {
            assert!(
                matches!(RichQuery::parse(input, today()), Err(FilterError::InvalidQuery(_))),
                "expected InvalidQuery for {input:?}"
            );
        }
        assert!(matches!(
            RichQuery::parse("due:<next-week", today()),
            Err(FilterError::InvalidDate { .. })
        ));
    }
}

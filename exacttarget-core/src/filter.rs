//! Protocol-neutral filter expressions.
//!
//! A [`Filter`] is a small boolean tree over external field names. It is
//! parsed from the textual grammar
//!
//! ```text
//! filter     := unary (("and" | "or") unary)*
//! unary      := "not" unary | "(" filter ")" | comparison
//! comparison := property operator value
//! ```
//!
//! `and`/`or` combine strictly left to right with no precedence between
//! them: `a = 1 and b = 2 or c = 3` is `(a = 1 and b = 2) or c = 3`. Use
//! parentheses to group differently. Values may be bare words or quoted
//! with `'` or `"` (a doubled quote escapes itself).
//!
//! Field names are not checked here. The entity being queried is only known
//! when the filter is rendered for a transport, see [`crate::soap`] and
//! [`crate::rest`].
//!
//! # Example
//!
//! ```
//! use exacttarget_core::filter::{Filter, Operator};
//!
//! let filter: Filter = "age >= 18 and name like 'B%'".parse().unwrap();
//! assert_eq!(
//!     filter,
//!     Filter::comparison("age", Operator::GreaterThanOrEqual, "18")
//!         .and(Filter::comparison("name", Operator::Like, "B%")),
//! );
//! ```

use std::fmt;
use std::str::FromStr;

/// Comparison operator of a filter leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Like,
    /// Any other word operator, kept verbatim.
    Other(String),
}

impl Operator {
    /// Textual form used by the filter grammar.
    pub fn symbol(&self) -> &str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::Like => "like",
            Operator::Other(name) => name,
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Operator::Equals),
            "!=" | "<>" => Some(Operator::NotEquals),
            "<" => Some(Operator::LessThan),
            "<=" => Some(Operator::LessThanOrEqual),
            ">" => Some(Operator::GreaterThan),
            ">=" => Some(Operator::GreaterThanOrEqual),
            _ => None,
        }
    }

    /// Only the lowercase spelling is [`Operator::Like`]; any other word,
    /// including `LIKE`, is kept as written.
    fn from_word(word: &str) -> Self {
        if word == "like" {
            Operator::Like
        } else {
            Operator::Other(word.to_string())
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Boolean predicate tree over external field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Comparison {
        property: String,
        operator: Operator,
        value: String,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Creates a comparison leaf.
    pub fn comparison(
        property: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        Filter::Comparison {
            property: property.into(),
            operator,
            value: value.into(),
        }
    }

    /// Shorthand for an equality comparison.
    pub fn equals(property: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::comparison(property, Operator::Equals, value)
    }

    pub fn and(self, right: Filter) -> Self {
        Filter::And(Box::new(self), Box::new(right))
    }

    pub fn or(self, right: Filter) -> Self {
        Filter::Or(Box::new(self), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Parses the textual filter grammar.
    ///
    /// # Errors
    ///
    /// Returns a [`FilterSyntaxError`] describing the first problem found.
    pub fn parse(text: &str) -> Result<Self, FilterSyntaxError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            tokens,
            position: 0,
            end: text.len(),
        };
        let filter = parser.filter()?;
        match parser.peek() {
            None => Ok(filter),
            Some(token) => Err(FilterSyntaxError::new(
                token.offset,
                format!("unexpected {}", token.kind),
            )),
        }
    }

    /// Parses `text` if it is a filter.
    ///
    /// Retrieval entry points use this to tell a filter apart from a bare
    /// column name.
    pub fn try_parse(text: &str) -> Option<Self> {
        Filter::parse(text).ok()
    }

    /// Number of comparison leaves.
    pub fn comparison_count(&self) -> usize {
        match self {
            Filter::Comparison { .. } => 1,
            Filter::And(left, right) | Filter::Or(left, right) => {
                left.comparison_count() + right.comparison_count()
            }
            Filter::Not(inner) => inner.comparison_count(),
        }
    }

    fn is_binary(&self) -> bool {
        matches!(self, Filter::And(..) | Filter::Or(..))
    }
}

impl FromStr for Filter {
    type Err = FilterSyntaxError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Filter::parse(text)
    }
}

/// Writes the filter back in the textual grammar.
///
/// Nested `and`/`or` nodes are parenthesised so the output parses to the same
/// tree.
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Comparison {
                property,
                operator,
                value,
            } => {
                write!(f, "{property} {operator} ")?;
                write_value(f, value)
            }
            Filter::And(left, right) => write_binary(f, left, "and", right),
            Filter::Or(left, right) => write_binary(f, left, "or", right),
            Filter::Not(inner) if inner.is_binary() => write!(f, "not ({inner})"),
            Filter::Not(inner) => write!(f, "not {inner}"),
        }
    }
}

fn write_binary(f: &mut fmt::Formatter<'_>, left: &Filter, word: &str, right: &Filter) -> fmt::Result {
    for (position, operand) in [left, right].into_iter().enumerate() {
        if position > 0 {
            write!(f, " {word} ")?;
        }
        if operand.is_binary() {
            write!(f, "({operand})")?;
        } else {
            write!(f, "{operand}")?;
        }
    }
    Ok(())
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let bare = !value.is_empty()
        && !is_keyword(value)
        && value.chars().all(|c| !c.is_whitespace() && !is_special(c));
    if bare {
        f.write_str(value)
    } else {
        write!(f, "'{}'", value.replace('\'', "''"))
    }
}

/// A filter string that does not follow the grammar.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid filter at offset {offset}: {message}")]
pub struct FilterSyntaxError {
    /// Byte offset into the filter text.
    pub offset: usize,
    pub message: String,
}

impl FilterSyntaxError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    OpenParen,
    CloseParen,
    Symbol(String),
    Word(String),
    Quoted(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::OpenParen => f.write_str("'('"),
            TokenKind::CloseParen => f.write_str("')'"),
            TokenKind::Symbol(symbol) => write!(f, "operator '{symbol}'"),
            TokenKind::Word(word) => write!(f, "'{word}'"),
            TokenKind::Quoted(text) => write!(f, "quoted value '{text}'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn is_symbol_char(c: char) -> bool {
    matches!(c, '=' | '!' | '<' | '>')
}

fn is_special(c: char) -> bool {
    is_symbol_char(c) || matches!(c, '(' | ')' | '\'' | '"')
}

fn is_keyword(word: &str) -> bool {
    ["and", "or", "not"]
        .iter()
        .any(|keyword| word.eq_ignore_ascii_case(keyword))
}

fn tokenize(text: &str) -> Result<Vec<Token>, FilterSyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match c {
            '(' => {
                chars.next();
                TokenKind::OpenParen
            }
            ')' => {
                chars.next();
                TokenKind::CloseParen
            }
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, next)) if next == c => {
                            if chars.peek().is_some_and(|&(_, after)| after == c) {
                                chars.next();
                                value.push(c);
                            } else {
                                break;
                            }
                        }
                        Some((_, next)) => value.push(next),
                        None => {
                            return Err(FilterSyntaxError::new(offset, "unterminated quoted value"))
                        }
                    }
                }
                TokenKind::Quoted(value)
            }
            c if is_symbol_char(c) => {
                let mut symbol = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if !is_symbol_char(next) {
                        break;
                    }
                    symbol.push(next);
                    chars.next();
                }
                TokenKind::Symbol(symbol)
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() || is_special(next) {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                TokenKind::Word(word)
            }
        };
        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.peek(),
            Some(Token { kind: TokenKind::Word(word), .. }) if word.eq_ignore_ascii_case(keyword)
        )
    }

    fn filter(&mut self) -> Result<Filter, FilterSyntaxError> {
        let mut filter = self.unary()?;
        loop {
            if self.peek_keyword("and") {
                self.next();
                filter = filter.and(self.unary()?);
            } else if self.peek_keyword("or") {
                self.next();
                filter = filter.or(self.unary()?);
            } else {
                return Ok(filter);
            }
        }
    }

    fn unary(&mut self) -> Result<Filter, FilterSyntaxError> {
        if self.peek_keyword("not") {
            self.next();
            return Ok(self.unary()?.not());
        }

        if matches!(self.peek(), Some(Token { kind: TokenKind::OpenParen, .. })) {
            self.next();
            let inner = self.filter()?;
            return match self.next() {
                Some(Token { kind: TokenKind::CloseParen, .. }) => Ok(inner),
                Some(token) => Err(FilterSyntaxError::new(
                    token.offset,
                    format!("expected ')' but found {}", token.kind),
                )),
                None => Err(FilterSyntaxError::new(self.end, "missing ')'")),
            };
        }

        self.comparison()
    }

    fn comparison(&mut self) -> Result<Filter, FilterSyntaxError> {
        let property = match self.next() {
            Some(Token { kind: TokenKind::Word(word), offset }) => {
                if is_keyword(&word) {
                    return Err(FilterSyntaxError::new(
                        offset,
                        format!("expected a property name but found '{word}'"),
                    ));
                }
                word
            }
            Some(token) => {
                return Err(FilterSyntaxError::new(
                    token.offset,
                    format!("expected a property name but found {}", token.kind),
                ))
            }
            None => return Err(FilterSyntaxError::new(self.end, "expected a property name")),
        };

        let operator = match self.next() {
            Some(Token { kind: TokenKind::Symbol(symbol), offset }) => Operator::from_symbol(&symbol)
                .ok_or_else(|| {
                    FilterSyntaxError::new(offset, format!("unknown operator '{symbol}'"))
                })?,
            Some(Token { kind: TokenKind::Word(word), offset }) => {
                if is_keyword(&word) {
                    return Err(FilterSyntaxError::new(
                        offset,
                        format!("expected an operator after '{property}' but found '{word}'"),
                    ));
                }
                Operator::from_word(&word)
            }
            Some(token) => {
                return Err(FilterSyntaxError::new(
                    token.offset,
                    format!("expected an operator but found {}", token.kind),
                ))
            }
            None => {
                return Err(FilterSyntaxError::new(
                    self.end,
                    format!("expected an operator after '{property}'"),
                ))
            }
        };

        let value = match self.next() {
            Some(Token { kind: TokenKind::Quoted(text), .. }) => text,
            Some(Token { kind: TokenKind::Word(word), offset }) => {
                if is_keyword(&word) {
                    return Err(FilterSyntaxError::new(
                        offset,
                        format!("expected a value but found '{word}'"),
                    ));
                }
                word
            }
            Some(token) => {
                return Err(FilterSyntaxError::new(
                    token.offset,
                    format!("expected a value but found {}", token.kind),
                ))
            }
            None => {
                return Err(FilterSyntaxError::new(
                    self.end,
                    format!("expected a value after '{property} {operator}'"),
                ))
            }
        };

        Ok(Filter::Comparison {
            property,
            operator,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_comparison() {
        let filter = Filter::parse("FirstName = Bob").unwrap();
        assert_eq!(filter, Filter::equals("FirstName", "Bob"));
    }

    #[test]
    fn test_parse_without_spaces() {
        let filter = Filter::parse("age>=18").unwrap();
        assert_eq!(
            filter,
            Filter::comparison("age", Operator::GreaterThanOrEqual, "18")
        );
    }

    #[test]
    fn test_parse_all_symbols() {
        let cases = [
            ("a = 1", Operator::Equals),
            ("a != 1", Operator::NotEquals),
            ("a <> 1", Operator::NotEquals),
            ("a < 1", Operator::LessThan),
            ("a <= 1", Operator::LessThanOrEqual),
            ("a > 1", Operator::GreaterThan),
            ("a >= 1", Operator::GreaterThanOrEqual),
            ("a like 1", Operator::Like),
            ("a LIKE 1", Operator::Other("LIKE".to_string())),
            ("a beginsWith 1", Operator::Other("beginsWith".to_string())),
        ];
        for (text, operator) in cases {
            assert_eq!(
                Filter::parse(text).unwrap(),
                Filter::comparison("a", operator, "1"),
                "{text}"
            );
        }
    }

    #[test]
    fn test_parse_quoted_values() {
        let filter = Filter::parse("name = 'Mary Ann'").unwrap();
        assert_eq!(filter, Filter::equals("name", "Mary Ann"));

        let filter = Filter::parse(r#"name = "O""Brien""#).unwrap();
        assert_eq!(filter, Filter::equals("name", "O\"Brien"));

        let filter = Filter::parse("name = 'it''s'").unwrap();
        assert_eq!(filter, Filter::equals("name", "it's"));

        let filter = Filter::parse("name = ''").unwrap();
        assert_eq!(filter, Filter::equals("name", ""));
    }

    #[test]
    fn test_parse_is_left_to_right() {
        let filter = Filter::parse("a = 1 and b = 2 or c = 3").unwrap();
        assert_eq!(
            filter,
            Filter::equals("a", "1")
                .and(Filter::equals("b", "2"))
                .or(Filter::equals("c", "3"))
        );

        let filter = Filter::parse("a = 1 or b = 2 and c = 3").unwrap();
        assert_eq!(
            filter,
            Filter::equals("a", "1")
                .or(Filter::equals("b", "2"))
                .and(Filter::equals("c", "3"))
        );
    }

    #[test]
    fn test_parse_parentheses_and_not() {
        let filter = Filter::parse("not (a = 1 or b = 2) and NOT c = 3").unwrap();
        assert_eq!(
            filter,
            Filter::equals("a", "1")
                .or(Filter::equals("b", "2"))
                .not()
                .and(Filter::equals("c", "3").not())
        );
    }

    #[test]
    fn test_parse_dotted_property() {
        let filter = Filter::parse("DataExtension.CustomerKey = abc-123").unwrap();
        assert_eq!(filter, Filter::equals("DataExtension.CustomerKey", "abc-123"));
    }

    #[test]
    fn test_bare_column_name_is_not_a_filter() {
        let error = Filter::parse("FirstName").unwrap_err();
        assert_eq!(error.offset, 9);
        assert!(error.message.contains("expected an operator"));
        assert!(Filter::try_parse("FirstName").is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Filter::parse("").is_err());
        assert!(Filter::parse("a =").is_err());
        assert!(Filter::parse("a == 1").is_err());
        assert!(Filter::parse("a = 1 and").is_err());
        assert!(Filter::parse("(a = 1").is_err());
        assert!(Filter::parse("a = 1)").is_err());
        assert!(Filter::parse("a = 'open").is_err());
        assert!(Filter::parse("and = 1").is_err());
        assert!(Filter::parse("a = 1 b = 2").is_err());
    }

    #[test]
    fn test_error_display() {
        let error = Filter::parse("a = 1 )").unwrap_err();
        assert_eq!(error.to_string(), "invalid filter at offset 6: unexpected ')'");
    }

    #[test]
    fn test_display_parses_back() {
        let filters = [
            "a = 1",
            "name = 'Mary Ann' and age > 3",
            "not (a = 1 or b = 2) and c like 'x%'",
            "a = 1 or (b = 2 and c = 3)",
            "name = 'and'",
        ];
        for text in filters {
            let filter = Filter::parse(text).unwrap();
            let rendered = filter.to_string();
            assert_eq!(Filter::parse(&rendered).unwrap(), filter, "{rendered}");
        }
    }

    #[test]
    fn test_comparison_count() {
        let filter = Filter::parse("a = 1 and (b = 2 or not c = 3)").unwrap();
        assert_eq!(filter.comparison_count(), 3);
    }

    #[test]
    fn test_operator_spelling_is_kept() {
        let filter = Filter::parse("name LIKE 'B%'").unwrap();
        assert_eq!(filter.to_string(), "name LIKE B%");
        assert_eq!(Filter::parse(&filter.to_string()).unwrap(), filter);
    }
}

//! Query string parser.
//!
//! ```text
//! query     = ("*" | union) [knn]
//! union     = intersect ("|" intersect)*
//! intersect = unary+
//! unary     = "-" unary | atom
//! atom      = "(" union ")" | "*" | phrase | "@" field ":" fieldexpr | term
//! fieldexpr = "{" tag ("|" tag)* "}"
//!           | "[" bound bound "]"
//!           | "[" lon lat radius unit "]"
//!           | "(" union ")"
//!           | term
//! bound     = ["("] number | "-inf" | "+inf"
//! term      = word ["*"]
//! phrase    = '"' word* '"'
//! knn       = "=>" "[" "KNN" (int | $param) "@" field "$" param
//!             ["EF_RUNTIME" (int | $param)] ["AS" alias] "]"
//! ```
//!
//! The parser is purely syntactic. Field names are resolved against the
//! index definition by the executor.

use std::ops::Bound;

use crate::error::{Result, TesseraError};
use crate::index::geo::GeoUnit;
use crate::types::GeoPoint;

/// A field reference and where it appeared in the query string.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub name: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermQuery {
    /// `None` searches every text field.
    pub field: Option<FieldRef>,
    pub word: String,
    pub prefix: bool,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// `*`: every indexed document.
    All,
    Term(TermQuery),
    Tags {
        field: FieldRef,
        values: Vec<String>,
    },
    Range {
        field: FieldRef,
        min: Bound<f64>,
        max: Bound<f64>,
    },
    Geo {
        field: FieldRef,
        center: GeoPoint,
        radius: f64,
        unit: GeoUnit,
    },
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

/// A literal or a `$name` reference into the search parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamOr<T> {
    Value(T),
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnnClause {
    pub k: ParamOr<usize>,
    pub field: FieldRef,
    pub vector_param: String,
    pub ef_runtime: Option<ParamOr<usize>>,
    pub alias: Option<String>,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub filter: QueryNode,
    pub knn: Option<KnnClause>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn is_field_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '$')
}

/// Deepest allowed nesting of groups and negations.
pub const MAX_NESTING: usize = 128;

struct Parser<'a> {
    input: &'a str,
    position: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            depth: 0,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn is_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.next();
        }
    }

    fn error(&self, reason: impl Into<String>) -> TesseraError {
        TesseraError::malformed(self.position, reason)
    }

    fn take(&mut self, expected: char) -> Result<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.next();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    fn take_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> &'a str {
        let start = self.position;
        while self.peek().is_some_and(&predicate) {
            self.next();
        }
        &self.input[start..self.position]
    }

    /// Consume `keyword` (case-insensitive) if it is next and followed by a boundary.
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let rest = self.rest();
        let matches = rest
            .as_bytes()
            .get(..keyword.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(keyword.as_bytes()));
        if !matches {
            return false;
        }
        // The keyword is ASCII, so its end is a char boundary.
        if rest[keyword.len()..].chars().next().is_some_and(is_word_char) {
            return false;
        }
        self.position += keyword.len();
        true
    }

    fn at_arrow(&self) -> bool {
        self.rest().starts_with("=>")
    }

    fn parse_query(&mut self) -> Result<ParsedQuery> {
        self.skip_ws();
        if self.is_end() {
            return Err(self.error("empty query"));
        }
        let filter = if self.at_arrow() {
            QueryNode::All
        } else {
            self.parse_union(None)?
        };
        self.skip_ws();

        let knn = if self.at_arrow() {
            self.position += 2;
            Some(self.parse_knn()?)
        } else {
            None
        };

        self.skip_ws();
        if let Some(c) = self.peek() {
            return Err(self.error(format!("unexpected '{c}'")));
        }
        Ok(ParsedQuery { filter, knn })
    }

    fn parse_union(&mut self, field: Option<&FieldRef>) -> Result<QueryNode> {
        let mut branches = vec![self.parse_intersect(field)?];
        loop {
            self.skip_ws();
            if self.peek() != Some('|') {
                break;
            }
            self.next();
            branches.push(self.parse_intersect(field)?);
        }
        Ok(if branches.len() == 1 {
            branches.swap_remove(0)
        } else {
            QueryNode::Or(branches)
        })
    }

    fn parse_intersect(&mut self, field: Option<&FieldRef>) -> Result<QueryNode> {
        let mut parts = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None | Some(')') | Some('|') => break,
                Some('=') if self.at_arrow() => break,
                _ => parts.push(self.parse_unary(field)?),
            }
        }
        match parts.len() {
            0 => Err(self.error("expected an expression")),
            1 => Ok(parts.swap_remove(0)),
            _ => Ok(QueryNode::And(parts)),
        }
    }

    fn parse_unary(&mut self, field: Option<&FieldRef>) -> Result<QueryNode> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("query nested deeper than {MAX_NESTING} levels")));
        }
        self.depth += 1;
        let node = self.parse_negation(field);
        self.depth -= 1;
        node
    }

    fn parse_negation(&mut self, field: Option<&FieldRef>) -> Result<QueryNode> {
        if self.peek() == Some('-') {
            self.next();
            self.skip_ws();
            return Ok(QueryNode::Not(Box::new(self.parse_unary(field)?)));
        }
        self.parse_atom(field)
    }

    fn parse_atom(&mut self, field: Option<&FieldRef>) -> Result<QueryNode> {
        match self.peek() {
            Some('(') => {
                self.next();
                let inner = self.parse_union(field)?;
                self.skip_ws();
                self.take(')')?;
                Ok(inner)
            }
            Some('*') => {
                self.next();
                Ok(QueryNode::All)
            }
            Some('"') => self.parse_phrase(field),
            Some('@') => {
                if let Some(outer) = field {
                    return Err(self.error(format!(
                        "field reference nested inside '@{}'",
                        outer.name
                    )));
                }
                self.parse_field_expr()
            }
            Some(c) if is_word_char(c) => self.parse_term(field),
            Some(c) => Err(self.error(format!("unexpected '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_term(&mut self, field: Option<&FieldRef>) -> Result<QueryNode> {
        let position = self.position;
        let word = self.take_while(is_word_char);
        if word.is_empty() {
            return Err(self.error("expected a term"));
        }
        let prefix = self.peek() == Some('*');
        if prefix {
            self.next();
        }
        Ok(QueryNode::Term(TermQuery {
            field: field.cloned(),
            word: word.to_string(),
            prefix,
            position,
        }))
    }

    /// Quoted phrase: all of its words must match (positions are not checked).
    fn parse_phrase(&mut self, field: Option<&FieldRef>) -> Result<QueryNode> {
        self.take('"')?;
        let mut words = Vec::new();
        loop {
            self.take_while(|c| !is_word_char(c) && c != '"');
            match self.peek() {
                Some('"') => {
                    self.next();
                    break;
                }
                Some(_) => {
                    let position = self.position;
                    let word = self.take_while(is_word_char);
                    words.push(QueryNode::Term(TermQuery {
                        field: field.cloned(),
                        word: word.to_string(),
                        prefix: false,
                        position,
                    }));
                }
                None => return Err(self.error("unterminated phrase")),
            }
        }
        match words.len() {
            0 => Err(self.error("empty phrase")),
            1 => Ok(words.swap_remove(0)),
            _ => Ok(QueryNode::And(words)),
        }
    }

    fn parse_field_ref(&mut self) -> Result<FieldRef> {
        self.take('@')?;
        let position = self.position;
        let name = self.take_while(is_field_char);
        if name.is_empty() {
            return Err(self.error("expected a field name after '@'"));
        }
        Ok(FieldRef {
            name: name.to_string(),
            position,
        })
    }

    fn parse_field_expr(&mut self) -> Result<QueryNode> {
        let field = self.parse_field_ref()?;
        self.skip_ws();
        self.take(':')?;
        self.skip_ws();
        match self.peek() {
            Some('{') => self.parse_tags(field),
            Some('[') => self.parse_bracket(field),
            Some('(') => {
                self.next();
                let inner = self.parse_union(Some(&field))?;
                self.skip_ws();
                self.take(')')?;
                Ok(inner)
            }
            Some('"') => self.parse_phrase(Some(&field)),
            Some(c) if is_word_char(c) => self.parse_term(Some(&field)),
            Some(c) => Err(self.error(format!("unexpected '{c}' after '@{}:'", field.name))),
            None => Err(self.error(format!("missing expression after '@{}:'", field.name))),
        }
    }

    fn parse_tags(&mut self, field: FieldRef) -> Result<QueryNode> {
        self.take('{')?;
        let mut values = Vec::new();
        loop {
            let start = self.position;
            let raw = self.take_while(|c| c != '|' && c != '}');
            let tag = raw.trim().replace("\\ ", " ");
            if tag.is_empty() {
                return Err(TesseraError::malformed(start, "empty tag"));
            }
            values.push(tag);
            match self.next() {
                Some('|') => continue,
                Some('}') => break,
                _ => return Err(self.error("unterminated tag set")),
            }
        }
        Ok(QueryNode::Tags { field, values })
    }

    fn parse_bracket(&mut self, field: FieldRef) -> Result<QueryNode> {
        self.take('[')?;
        let start = self.position;
        let body = self.take_while(|c| c != ']');
        self.take(']')?;
        let parts: Vec<&str> = body.split_whitespace().collect();
        match parts.as_slice() {
            [min, max] => {
                let min = parse_bound(min, true).map_err(|r| TesseraError::malformed(start, r))?;
                let max = parse_bound(max, false).map_err(|r| TesseraError::malformed(start, r))?;
                Ok(QueryNode::Range { field, min, max })
            }
            [lon, lat, radius, unit] => {
                let num = |s: &str| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .ok_or_else(|| TesseraError::malformed(start, format!("'{s}' is not a number")))
                };
                let center = GeoPoint::new(num(*lon)?, num(*lat)?);
                let radius = num(*radius)?;
                if radius < 0.0 {
                    return Err(TesseraError::malformed(start, "negative radius"));
                }
                let unit = GeoUnit::parse(unit).ok_or_else(|| {
                    TesseraError::malformed(start, format!("unknown distance unit '{unit}'"))
                })?;
                Ok(QueryNode::Geo {
                    field,
                    center,
                    radius,
                    unit,
                })
            }
            _ => Err(TesseraError::malformed(
                start,
                "expected '[min max]' or '[lon lat radius unit]'",
            )),
        }
    }

    fn parse_count(&mut self) -> Result<ParamOr<usize>> {
        self.skip_ws();
        if self.peek() == Some('$') {
            return Ok(ParamOr::Param(self.parse_param()?));
        }
        let digits = self.take_while(|c| c.is_ascii_digit());
        digits
            .parse()
            .map(ParamOr::Value)
            .map_err(|_| self.error("expected an integer or $parameter"))
    }

    fn parse_param(&mut self) -> Result<String> {
        self.take('$')?;
        let name = self.take_while(|c| c.is_alphanumeric() || c == '_');
        if name.is_empty() {
            return Err(self.error("expected a parameter name after '$'"));
        }
        Ok(name.to_string())
    }

    fn parse_knn(&mut self) -> Result<KnnClause> {
        self.skip_ws();
        let position = self.position;
        self.take('[')?;
        self.skip_ws();
        if !self.eat_keyword("KNN") {
            return Err(self.error("expected KNN"));
        }
        let k = self.parse_count()?;
        self.skip_ws();
        let field = self.parse_field_ref()?;
        self.skip_ws();
        let vector_param = self.parse_param()?;

        let mut ef_runtime = None;
        let mut alias = None;
        loop {
            self.skip_ws();
            if self.eat_keyword("EF_RUNTIME") {
                ef_runtime = Some(self.parse_count()?);
            } else if self.eat_keyword("AS") {
                self.skip_ws();
                let name = self.take_while(|c| c.is_alphanumeric() || c == '_');
                if name.is_empty() {
                    return Err(self.error("expected an alias after AS"));
                }
                alias = Some(name.to_string());
            } else {
                break;
            }
        }
        self.take(']')?;
        Ok(KnnClause {
            k,
            field,
            vector_param,
            ef_runtime,
            alias,
            position,
        })
    }
}

/// Parse a range bound. `(` marks it exclusive; `-inf`/`+inf` open the range.
fn parse_bound(raw: &str, is_min: bool) -> std::result::Result<Bound<f64>, String> {
    let (exclusive, number) = match raw.strip_prefix('(') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| format!("'{number}' is not a number"))?;
    if value.is_nan() {
        return Err("NaN is not a valid bound".to_string());
    }
    if value.is_infinite() && (value < 0.0) == is_min {
        return Ok(Bound::Unbounded);
    }
    Ok(if exclusive {
        Bound::Excluded(value)
    } else {
        Bound::Included(value)
    })
}

/// Parse a query string.
///
/// # Errors
/// `MalformedQuery` with the byte offset of the first problem.
pub fn parse(input: &str) -> Result<ParsedQuery> {
    Parser::new(input).parse_query()
}

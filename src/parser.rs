//! Parser driver + grammar (spec.md §4.3 C3): a hand-written
//! recursive-descent lexer/parser over rule text, matching the teacher
//! engine's own hand-rolled `parser/mod.rs` rather than reaching for a
//! grammar-generator crate (out of scope — spec.md §1 excludes "the
//! scanner/lexer toolchain generation").
//!
//! Grammar (spec.md §4.3, repeated here for the reader navigating this
//! file):
//!
//! ```text
//! rule        := destination '=' [ 'C:' | 'N:' ] expr [ '@' markerList ]
//! expr        := expr binop expr | unop expr | '(' expr ')' | call | source | marker | literal | variable
//! binop       := '+' | '-' | '*' | '/' | '<' | '<=' | '=' | '>=' | '>' | '<>'
//! source      := '[' elements ']' | '{' elementsIds '}'
//! marker      := '[[' elements ']]' | '{{' elementsIds '}}'
//! variable    := '!' IDENT
//! ```
//!
//! `variable`'s `!` sigil is what lets the grammar tell it apart from
//! `call` (`IDENT '(' ...')'`) on a bare identifier with no trailing `('
//! (spec.md §4.3, §8 scenario 5's `!Product`). A bare identifier with no
//! `!` and no trailing `(` is still accepted as a variable for backward
//! compatibility with rule text written before this was resolved, but `!`
//! is the canonical, always-emitted form (see `ast::render`).

use std::collections::HashSet;

use crate::ast::area::AreaInput;
use crate::ast::{Node, RuleNode, RuleOption, ValidateContext};
use crate::cube::Cube;
use crate::error::{ParseError, RuleEngineError};

/// A single parse attempt over rule text. The driver keeps only the last
/// error (spec.md §4.3 "The driver keeps the last error message").
#[derive(Debug, Default)]
pub struct RuleParser {
    last_error: Option<ParseError>,
}

impl RuleParser {
    pub fn new() -> Self {
        RuleParser::default()
    }

    pub fn last_error(&self) -> Option<&ParseError> {
        self.last_error.as_ref()
    }

    /// Parse rule text into an unvalidated `RuleNode`. Call
    /// `RuleNode::validate` next (full mode against a cube, or parse-only
    /// mode against a whitelist) — spec.md §4.3 "Modes".
    pub fn parse(&mut self, text: &str) -> Result<RuleNode, ParseError> {
        let mut cursor = Cursor::new(text);
        match cursor.parse_rule() {
            Ok(rule) => Ok(rule),
            Err(err) => {
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}

/// Parse and fully validate a rule against a live cube in one step
/// (spec.md §4.3 "full mode").
pub fn parse_and_validate(text: &str, cube: &dyn Cube) -> Result<RuleNode, RuleEngineError> {
    let mut parser = RuleParser::new();
    let mut rule = parser.parse(text)?;
    let ctx = ValidateContext::full(cube);
    rule.validate(&ctx)?;
    Ok(rule)
}

/// Parse and validate against a parse-only function whitelist, without a
/// cube (spec.md §4.3 "parse-only mode").
pub fn parse_only(text: &str, whitelist: &HashSet<String>) -> Result<RuleNode, RuleEngineError> {
    let mut parser = RuleParser::new();
    let mut rule = parser.parse(text)?;
    let ctx = ValidateContext::parse_only(whitelist);
    rule.validate(&ctx)?;
    Ok(rule)
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(src: &str) -> Self {
        Cursor {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message.into(), 1, self.pos as u32 + 1)
    }

    fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn try_char(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn try_str(&mut self, s: &str) -> bool {
        self.skip_ws();
        let chars: Vec<char> = s.chars().collect();
        if chars
            .iter()
            .enumerate()
            .all(|(i, &c)| self.peek_at(i) == Some(c))
        {
            self.pos += chars.len();
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, c: char) -> Result<(), ParseError> {
        if self.try_char(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn expect_str(&mut self, s: &str) -> Result<(), ParseError> {
        if self.try_str(s) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{s}'")))
        }
    }

    // ------------------------------------------------------------------
    // Top level
    // ------------------------------------------------------------------

    fn parse_rule(&mut self) -> Result<RuleNode, ParseError> {
        self.skip_ws();
        let (dest_input, dest_is_marker) = self.parse_area()?;
        if dest_is_marker {
            return Err(self.error("destination area cannot use marker ([[ ]] / {{ }}) brackets"));
        }
        let destination = Node::destination(dest_input);

        self.expect_char('=')?;

        let option = self.parse_option_prefix();

        let expr = self.parse_expr()?;

        self.skip_ws();
        let mut external_markers = Vec::new();
        if self.try_char('@') {
            external_markers = self.parse_marker_list()?;
        }

        self.skip_ws();
        if !self.eof() {
            return Err(self.error("unexpected trailing input"));
        }

        Ok(RuleNode::new(option, destination, expr, external_markers))
    }

    fn parse_option_prefix(&mut self) -> RuleOption {
        self.skip_ws();
        if self.peek() == Some('C') && self.peek_at(1) == Some(':') {
            self.pos += 2;
            RuleOption::Consolidation
        } else if self.peek() == Some('N') && self.peek_at(1) == Some(':') {
            self.pos += 2;
            RuleOption::Base
        } else {
            RuleOption::None
        }
    }

    fn parse_marker_list(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut out = vec![self.parse_marker_item()?];
        while self.try_char(',') {
            out.push(self.parse_marker_item()?);
        }
        Ok(out)
    }

    fn parse_marker_item(&mut self) -> Result<Node, ParseError> {
        self.skip_ws();
        match self.peek() {
            Some('[') | Some('{') => {
                let (input, is_marker) = self.parse_area()?;
                Ok(Node::source(input, is_marker))
            }
            _ => self.parse_call(),
        }
    }

    // ------------------------------------------------------------------
    // Expressions (precedence climbing: comparison < additive < multiplicative < unary < primary)
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> Result<Node, ParseError> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Node, ParseError> {
        let lhs = self.parse_additive()?;
        self.skip_ws();
        let op = if self.try_str("<=") {
            Some("<=")
        } else if self.try_str(">=") {
            Some(">=")
        } else if self.try_str("<>") {
            Some("<>")
        } else if self.try_char('<') {
            Some("<")
        } else if self.try_char('>') {
            Some(">")
        } else if self.try_char('=') {
            Some("=")
        } else {
            None
        };
        match op {
            Some(op) => {
                let rhs = self.parse_additive()?;
                Ok(Node::call(op, vec![lhs, rhs]))
            }
            None => Ok(lhs),
        }
    }

    fn parse_additive(&mut self) -> Result<Node, ParseError> {
        let mut node = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            if self.try_char('+') {
                let rhs = self.parse_multiplicative()?;
                node = Node::call("+", vec![node, rhs]);
            } else if self.try_char('-') {
                let rhs = self.parse_multiplicative()?;
                node = Node::call("-", vec![node, rhs]);
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_multiplicative(&mut self) -> Result<Node, ParseError> {
        let mut node = self.parse_unary()?;
        loop {
            self.skip_ws();
            if self.try_char('*') {
                let rhs = self.parse_unary()?;
                node = Node::call("*", vec![node, rhs]);
            } else if self.try_char('/') {
                let rhs = self.parse_unary()?;
                node = Node::call("/", vec![node, rhs]);
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        self.skip_ws();
        if self.peek() == Some('+') || self.peek() == Some('-') {
            let sign = self.advance().unwrap();
            self.skip_ws();
            if matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
                let mut value = self.parse_number_literal()?;
                if sign == '-' {
                    value = -value;
                }
                return Ok(Node::Double(value));
            }
            let inner = self.parse_unary()?;
            return Ok(Node::call(sign.to_string(), vec![inner]));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let node = self.parse_expr()?;
                self.expect_char(')')?;
                Ok(node)
            }
            Some('[') | Some('{') => {
                let (input, is_marker) = self.parse_area()?;
                Ok(Node::source(input, is_marker))
            }
            Some('\'') => Ok(Node::String(self.parse_quoted_string()?)),
            Some(c) if c.is_ascii_digit() || c == '.' => Ok(Node::Double(self.parse_number_literal()?)),
            Some('!') => {
                self.pos += 1;
                let name = self.read_ident()?;
                Ok(Node::variable(name))
            }
            Some(c) if is_ident_start(c) => self.parse_call_or_variable(),
            _ => Err(self.error("expected an expression")),
        }
    }

    fn parse_call_or_variable(&mut self) -> Result<Node, ParseError> {
        let name = self.read_ident()?;
        self.skip_ws();
        if self.peek() == Some('(') {
            self.pos += 1;
            let params = self.parse_call_args()?;
            self.expect_char(')')?;
            Ok(Node::call(name, params))
        } else {
            Ok(Node::variable(name))
        }
    }

    fn parse_call(&mut self) -> Result<Node, ParseError> {
        self.skip_ws();
        if !matches!(self.peek(), Some(c) if is_ident_start(c)) {
            return Err(self.error("expected a function call in marker list"));
        }
        let name = self.read_ident()?;
        self.expect_char('(')?;
        let params = self.parse_call_args()?;
        self.expect_char(')')?;
        Ok(Node::call(name, params))
    }

    fn parse_call_args(&mut self) -> Result<Vec<Node>, ParseError> {
        self.skip_ws();
        if self.peek() == Some(')') {
            return Ok(Vec::new());
        }
        let mut args = vec![self.parse_expr()?];
        while self.try_char(',') {
            args.push(self.parse_expr()?);
        }
        Ok(args)
    }

    fn read_ident(&mut self) -> Result<String, ParseError> {
        self.skip_ws();
        let start = self.pos;
        if !matches!(self.peek(), Some(c) if is_ident_start(c)) {
            return Err(self.error("expected identifier"));
        }
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_number_literal(&mut self) -> Result<f64, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some('.') {
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map_err(|_| self.error(format!("invalid numeric literal '{text}'")))
    }

    fn parse_quoted_string(&mut self) -> Result<String, ParseError> {
        self.expect_char('\'')?;
        let mut out = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("unterminated string literal")),
                Some('\\') => match self.advance() {
                    Some('\'') => out.push('\''),
                    Some('\\') => out.push('\\'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape in string literal")),
                },
                Some('\'') => break,
                Some(c) => out.push(c),
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Areas
    // ------------------------------------------------------------------

    fn parse_area(&mut self) -> Result<(AreaInput, bool), ParseError> {
        self.skip_ws();
        if self.try_str("[[") {
            let tokens = self.parse_name_elements(']')?;
            self.expect_str("]]")?;
            Ok((AreaInput::names(tokens), true))
        } else if self.try_char('[') {
            let tokens = self.parse_name_elements(']')?;
            self.expect_char(']')?;
            Ok((AreaInput::names(tokens), false))
        } else if self.try_str("{{") {
            let tokens = self.parse_id_elements('}')?;
            self.expect_str("}}")?;
            Ok((AreaInput::ids(tokens), true))
        } else if self.try_char('{') {
            let tokens = self.parse_id_elements('}')?;
            self.expect_char('}')?;
            Ok((AreaInput::ids(tokens), false))
        } else {
            Err(self.error("expected an area ('[', '[[', '{' or '{{')"))
        }
    }

    fn parse_name_elements(&mut self, stop: char) -> Result<Vec<(Option<String>, Option<String>)>, ParseError> {
        let mut out = vec![self.parse_name_element(stop)?];
        loop {
            self.skip_ws();
            if self.peek() == Some(',') {
                self.pos += 1;
                out.push(self.parse_name_element(stop)?);
            } else {
                break;
            }
        }
        Ok(out)
    }

    fn parse_name_element(&mut self, stop: char) -> Result<(Option<String>, Option<String>), ParseError> {
        self.skip_ws();
        if self.peek() == Some(',') || self.peek() == Some(stop) {
            return Ok((None, None)); // empty placeholder, preserves positional index
        }
        let first = self.read_elem_token(stop)?;
        self.skip_ws();
        if self.peek() == Some(':') {
            self.pos += 1;
            self.skip_ws();
            if self.peek() == Some(',') || self.peek() == Some(stop) {
                return Ok((Some(first), None));
            }
            let second = self.read_elem_token(stop)?;
            Ok((Some(first), Some(second)))
        } else {
            Ok((None, Some(first)))
        }
    }

    fn read_elem_token(&mut self, stop: char) -> Result<String, ParseError> {
        self.skip_ws();
        if self.peek() == Some('\'') {
            return self.parse_quoted_string();
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ',' || c == ':' || c == stop {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected an element name"));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        Ok(text.trim().to_string())
    }

    fn parse_id_elements(&mut self, stop: char) -> Result<Vec<(i64, i64)>, ParseError> {
        let mut out = vec![self.parse_id_element(stop)?];
        loop {
            self.skip_ws();
            if self.peek() == Some(',') {
                self.pos += 1;
                out.push(self.parse_id_element(stop)?);
            } else {
                break;
            }
        }
        Ok(out)
    }

    fn parse_id_element(&mut self, stop: char) -> Result<(i64, i64), ParseError> {
        self.skip_ws();
        if self.peek() == Some(',') || self.peek() == Some(stop) {
            return Ok((-1, -1)); // empty placeholder
        }
        let first = self.read_signed_int()?;
        self.skip_ws();
        // '@' marks the pair as originally-unqualified on render (spec.md
        // §6); both forms resolve as an explicit dimension id here.
        if self.peek() == Some(':') || self.peek() == Some('@') {
            self.pos += 1;
            self.skip_ws();
            if self.peek() == Some(',') || self.peek() == Some(stop) {
                return Ok((first, -1));
            }
            let second = self.read_signed_int()?;
            Ok((first, second))
        } else {
            Err(self.error("expected ':' or '@' in id-form area element"))
        }
    }

    fn read_signed_int(&mut self) -> Result<i64, ParseError> {
        self.skip_ws();
        let start = self.pos;
        if matches!(self.peek(), Some('+') | Some('-')) {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<i64>()
            .map_err(|_| self.error(format!("invalid integer '{text}'")))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::test_fixtures::sample_cube;

    #[test]
    fn parses_literal_rule() {
        let cube = sample_cube();
        let rule = parse_and_validate("[Measure:Revenue] = 2.0 * [Measure:Units]", &cube).unwrap();
        assert_eq!(rule.option, RuleOption::None);
        if let Node::FunctionCall { name, params } = &rule.expr {
            assert_eq!(name, "*");
            assert_eq!(params.len(), 2);
        } else {
            panic!("expected a function call");
        }
    }

    #[test]
    fn parses_stet_conditional_rule() {
        let cube = sample_cube();
        let text = "[Measure:Revenue] = IF(Year = '2024', STET(), 0.0)";
        let rule = parse_and_validate(text, &cube).unwrap();
        if let Node::FunctionCall { name, .. } = &rule.expr {
            assert_eq!(name, "IF");
        } else {
            panic!("expected IF call");
        }
    }

    #[test]
    fn parses_option_prefix() {
        let cube = sample_cube();
        let rule = parse_and_validate("[Measure:Revenue] = N:1.1 * [Measure:Units]", &cube).unwrap();
        assert_eq!(rule.option, RuleOption::Base);
    }

    #[test]
    fn parses_same_cube_marker_rule() {
        let cube = sample_cube();
        let rule = parse_and_validate("[Measure:Revenue] = SUM([[Measure:Units]])", &cube).unwrap();
        assert_eq!(rule.internal_markers.len(), 1);
    }

    #[test]
    fn parses_external_marker_list() {
        let cube = sample_cube();
        let rule = parse_and_validate(
            "[Measure:Revenue] = N:1.0 @ [[Measure:Units]]",
            &cube,
        )
        .unwrap();
        assert_eq!(rule.external_markers.len(), 1);
    }

    #[test]
    fn parses_bang_prefixed_variable_in_palo_marker() {
        let cube = sample_cube();
        let text = "[Measure:Revenue] = PALO.MARKER('db','SalesRaw','2024',!Product,'Units')";
        let rule = parse_and_validate(text, &cube).unwrap();
        if let Node::FunctionCall { name, params } = &rule.expr {
            assert_eq!(name, "PALO.MARKER");
            assert!(matches!(&params[3], Node::Variable { name, .. } if name == "Product"));
        } else {
            panic!("expected PALO.MARKER call");
        }
    }

    #[test]
    fn rejects_unknown_element() {
        let cube = sample_cube();
        let result = parse_and_validate("[Measure:NoSuchThing] = 1.0", &cube);
        assert!(result.is_err());
    }

    #[test]
    fn parse_only_mode_accepts_whitelisted_function_without_cube() {
        let mut whitelist = HashSet::new();
        whitelist.insert("IF".to_string());
        whitelist.insert("STET".to_string());
        let rule = parse_only("[Revenue] = IF([Year] = '2024', STET(), 0.0)", &whitelist).unwrap();
        assert_eq!(rule.option, RuleOption::None);
    }

    #[test]
    fn parse_only_mode_rejects_non_whitelisted_function() {
        let whitelist = HashSet::new();
        let result = parse_only("[Revenue] = SOMEFUNC(1.0)", &whitelist);
        assert!(result.is_err());
    }

    #[test]
    fn round_trip_render_reparses_equivalently() {
        let cube = sample_cube();
        let rule = parse_and_validate("[Measure:Revenue] = 2.0 * [Measure:Units]", &cube).unwrap();
        let text = crate::ast::render::rule_to_single_line(&rule, false);
        let reparsed = parse_and_validate(&text, &cube).unwrap();
        assert_eq!(
            crate::ast::render::rule_to_single_line(&rule, false),
            crate::ast::render::rule_to_single_line(&reparsed, false)
        );
    }
}

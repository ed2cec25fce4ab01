//! Check-string parser and evaluator.
//!
//! Supported syntax:
//! - Role membership: `role:reader`
//! - System scope: `system_scope:all`
//! - Field equality: `user_id:%(target.credential.user_id)s`, `project_id:p1`
//!   (fields: `user_id`, `project_id`, `domain_id`)
//! - Constants: `@` (always), bare `!` (never)
//! - Boolean operators: `and`, `or`, `not` / `!` prefix
//! - Parentheses for grouping; `and` binds tighter than `or`

use crate::policy::context::{CredentialField, RequestContext, ScopeType};
use crate::policy::errors::PolicyError;

pub const MAX_CHECK_LENGTH: usize = 4096;
pub const MAX_CHECK_DEPTH: usize = 64;

// ─── AST ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Check {
    And(Box<Check>, Box<Check>),
    Or(Box<Check>, Box<Check>),
    Not(Box<Check>),
    Role(String),
    Scope(ScopeType),
    FieldEqual {
        field: CredentialField,
        operand: Operand,
    },
    Always,
    Never,
}

/// Right-hand side of a field comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// `%(target.<path>)s`, resolved against the request target at evaluation time
    Target(String),
    Literal(String),
}

// ─── Tokenizer ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Bang,
    Always,
    Term { kind: String, value: String },
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(input: &str) -> Result<Vec<Token>, PolicyError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => {
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '@' => {
                tokens.push(Token::Always);
                i += 1;
            }
            '!' => {
                tokens.push(Token::Bang);
                i += 1;
            }
            c if is_word_char(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();

                if i < chars.len() && chars[i] == ':' {
                    i += 1;
                    let value_start = i;
                    if chars[i..].starts_with(&['%', '(']) {
                        // placeholder runs until the closing `)s`
                        while i < chars.len() && !(chars[i] == ')' && chars.get(i + 1) == Some(&'s')) {
                            i += 1;
                        }
                        if i >= chars.len() {
                            return Err(PolicyError::parse(
                                input,
                                format!("unterminated placeholder in `{word}:` term"),
                            ));
                        }
                        i += 2;
                    } else {
                        while i < chars.len()
                            && !chars[i].is_whitespace()
                            && chars[i] != '('
                            && chars[i] != ')'
                        {
                            i += 1;
                        }
                    }
                    let value: String = chars[value_start..i].iter().collect();
                    tokens.push(Token::Term { kind: word, value });
                    continue;
                }

                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    other => {
                        return Err(PolicyError::parse(
                            input,
                            format!("unknown term `{other}` (expected `kind:value`)"),
                        ));
                    }
                }
            }
            c => {
                return Err(PolicyError::parse(
                    input,
                    format!("unexpected character `{c}`"),
                ));
            }
        }
    }
    Ok(tokens)
}

// ─── Parser ─────────────────────────────────────────────────────────────

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn error(&self, message: impl Into<String>) -> PolicyError {
        PolicyError::parse(self.source, message)
    }

    fn descend(&mut self) -> Result<(), PolicyError> {
        self.depth += 1;
        if self.depth > MAX_CHECK_DEPTH {
            return Err(self.error(format!(
                "nesting exceeds the maximum depth of {MAX_CHECK_DEPTH}"
            )));
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Check, PolicyError> {
        self.parse_or()
    }

    /// or = and ("or" and)*
    fn parse_or(&mut self) -> Result<Check, PolicyError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Check::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// and = not ("and" not)*
    fn parse_and(&mut self) -> Result<Check, PolicyError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Check::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// not = ("not" | "!") not | primary
    fn parse_not(&mut self) -> Result<Check, PolicyError> {
        match self.peek() {
            Some(Token::Not) => {
                self.advance();
                self.descend()?;
                let inner = self.parse_not()?;
                self.depth -= 1;
                Ok(Check::Not(Box::new(inner)))
            }
            Some(Token::Bang) => {
                self.advance();
                // a bare `!` is the constant false check
                match self.peek() {
                    None | Some(Token::RParen) | Some(Token::And) | Some(Token::Or) => {
                        Ok(Check::Never)
                    }
                    _ => {
                        self.descend()?;
                        let inner = self.parse_not()?;
                        self.depth -= 1;
                        Ok(Check::Not(Box::new(inner)))
                    }
                }
            }
            _ => self.parse_primary(),
        }
    }

    /// primary = "(" expr ")" | "@" | term
    fn parse_primary(&mut self) -> Result<Check, PolicyError> {
        match self.advance() {
            Some(Token::LParen) => {
                self.descend()?;
                let expr = self.parse_expr()?;
                if self.advance() != Some(Token::RParen) {
                    return Err(self.error("expected closing parenthesis `)`"));
                }
                self.depth -= 1;
                Ok(expr)
            }
            Some(Token::Always) => Ok(Check::Always),
            Some(Token::Term { kind, value }) => self.term(&kind, &value),
            Some(Token::RParen) => Err(self.error("unbalanced parenthesis `)`")),
            Some(other) => Err(self.error(format!("unexpected token: {other:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn term(&self, kind: &str, value: &str) -> Result<Check, PolicyError> {
        if value.is_empty() {
            return Err(self.error(format!("`{kind}:` requires a value")));
        }
        match kind {
            "role" if value.contains("%(") => Err(self.error(format!(
                "`role:{value}` takes a role name, not a placeholder"
            ))),
            "role" => Ok(Check::Role(value.to_string())),
            "system_scope" => {
                if value == "all" {
                    Ok(Check::Scope(ScopeType::System))
                } else {
                    Err(self.error(format!(
                        "`system_scope:{value}` is not supported (only `system_scope:all`)"
                    )))
                }
            }
            _ => {
                let field = CredentialField::parse(kind)
                    .ok_or_else(|| self.error(format!("unknown check kind `{kind}`")))?;
                let operand = self.operand(value)?;
                Ok(Check::FieldEqual { field, operand })
            }
        }
    }

    fn operand(&self, value: &str) -> Result<Operand, PolicyError> {
        let Some(inner) = value
            .strip_prefix("%(")
            .and_then(|rest| rest.strip_suffix(")s"))
        else {
            if value.contains("%(") {
                return Err(self.error(format!("malformed placeholder `{value}`")));
            }
            return Ok(Operand::Literal(value.to_string()));
        };
        match inner.strip_prefix("target.") {
            Some(path) if !path.is_empty() => Ok(Operand::Target(path.to_string())),
            _ => Err(self.error(format!(
                "placeholder `{value}` must reference a target attribute (e.g. %(target.credential.user_id)s)"
            ))),
        }
    }
}

/// Parse a check-string into a compiled predicate tree.
pub fn parse_check(input: &str) -> Result<Check, PolicyError> {
    if input.len() > MAX_CHECK_LENGTH {
        return Err(PolicyError::parse(
            input,
            format!("check string exceeds {MAX_CHECK_LENGTH} bytes"),
        ));
    }
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(PolicyError::parse(input, "empty expression"));
    }
    let mut parser = Parser::new(input, tokens);
    let check = parser.parse_expr()?;
    if parser.pos < parser.tokens.len() {
        let message = match &parser.tokens[parser.pos] {
            Token::RParen => "unbalanced parenthesis `)`".to_string(),
            other => format!("unexpected trailing token: {other:?}"),
        };
        return Err(parser.error(message));
    }
    Ok(check)
}

// ─── Display ────────────────────────────────────────────────────────────

impl Check {
    fn precedence(&self) -> u8 {
        match self {
            Check::Or(..) => 1,
            Check::And(..) => 2,
            _ => 3,
        }
    }

    fn write_operand(&self, f: &mut std::fmt::Formatter<'_>, min: u8) -> std::fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

/// Prints the canonical check-string; it parses back to an equal tree.
impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Check::Or(left, right) => {
                left.write_operand(f, 1)?;
                f.write_str(" or ")?;
                right.write_operand(f, 2)
            }
            Check::And(left, right) => {
                left.write_operand(f, 2)?;
                f.write_str(" and ")?;
                right.write_operand(f, 3)
            }
            Check::Not(inner) => {
                f.write_str("not ")?;
                inner.write_operand(f, 3)
            }
            Check::Role(name) => write!(f, "role:{name}"),
            Check::Scope(_) => f.write_str("system_scope:all"),
            Check::FieldEqual { field, operand } => match operand {
                Operand::Target(path) => write!(f, "{}:%(target.{path})s", field.as_str()),
                Operand::Literal(value) => write!(f, "{}:{value}", field.as_str()),
            },
            Check::Always => f.write_str("@"),
            Check::Never => f.write_str("!"),
        }
    }
}

// ─── Evaluator ──────────────────────────────────────────────────────────

/// Evaluate a compiled check against a request context.
///
/// A `%(target.*)s` placeholder whose attribute is absent yields
/// `MissingAttribute`. Such an unknown only resolves when the other side of
/// an `and`/`or` decides the result on its own; `not` never turns it into a
/// grant.
pub fn evaluate(check: &Check, ctx: &RequestContext) -> Result<bool, PolicyError> {
    match check {
        Check::Always => Ok(true),
        Check::Never => Ok(false),
        Check::And(left, right) => match evaluate(left, ctx) {
            Ok(false) => Ok(false),
            Ok(true) => evaluate(right, ctx),
            Err(e) => match evaluate(right, ctx) {
                Ok(false) => Ok(false),
                _ => Err(e),
            },
        },
        Check::Or(left, right) => match evaluate(left, ctx) {
            Ok(true) => Ok(true),
            Ok(false) => evaluate(right, ctx),
            Err(e) => match evaluate(right, ctx) {
                Ok(true) => Ok(true),
                _ => Err(e),
            },
        },
        Check::Not(inner) => evaluate(inner, ctx).map(|b| !b),
        Check::Role(name) => Ok(ctx.has_role(name)),
        Check::Scope(scope) => Ok(ctx.scope_type == *scope),
        Check::FieldEqual { field, operand } => {
            let expected = match operand {
                Operand::Target(path) => ctx
                    .target_attr(path)
                    .ok_or_else(|| PolicyError::MissingAttribute(format!("target.{path}")))?,
                Operand::Literal(value) => value.as_str(),
            };
            Ok(ctx.field(*field) == Some(expected))
        }
    }
}

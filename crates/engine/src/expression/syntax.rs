//! Lexer and recursive-descent parser for the expression language.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparisons and membership, `+ -`,
//! `* / // %`, unary `+ -`, then postfix indexing, slicing, and calls.

use super::{ExprValue, ExpressionError, eval::Builtin};

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    And,
    Or,
    Not,
    In,
    True,
    False,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    End,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Negate,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
    NotIn,
    And,
    Or,
}

impl BinaryOp {
    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
                | BinaryOp::In
                | BinaryOp::NotIn
        )
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(ExprValue),
    Name(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Call(Builtin, Vec<Expr>),
}

impl Expr {
    /// Collects referenced variable names, first occurrence order.
    pub(crate) fn collect_names(&self, names: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Name(name) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Expr::List(items) | Expr::Call(_, items) => items.iter().for_each(|item| item.collect_names(names)),
            Expr::Unary(_, operand) => operand.collect_names(names),
            Expr::Binary(_, left, right) | Expr::Index(left, right) => {
                left.collect_names(names);
                right.collect_names(names);
            }
            Expr::Slice { target, start, end } => {
                target.collect_names(names);
                for bound in [start, end].into_iter().flatten() {
                    bound.collect_names(names);
                }
            }
        }
    }
}

/// Parse `source` into an expression tree.
pub(crate) fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, position: 0 };
    let expression = parser.parse_or()?;
    match parser.peek() {
        TokenKind::End => Ok(expression),
        _ => Err(parser.error("unexpected trailing input")),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let characters: Vec<(usize, char)> = source.char_indices().collect();
    let mut index = 0;

    while index < characters.len() {
        let (offset, character) = characters[index];
        if character.is_whitespace() {
            index += 1;
            continue;
        }

        let peek_next = characters.get(index + 1).map(|(_, next)| *next);
        let (kind, consumed) = match character {
            '0'..='9' => lex_number(source, &characters, index)?,
            '.' if peek_next.is_some_and(|next| next.is_ascii_digit()) => lex_number(source, &characters, index)?,
            '\'' | '"' => lex_string(&characters, index)?,
            letter if letter.is_alphabetic() || letter == '_' => {
                let end = characters[index..]
                    .iter()
                    .position(|(_, candidate)| !(candidate.is_alphanumeric() || *candidate == '_'))
                    .map(|length| index + length)
                    .unwrap_or(characters.len());
                let word: String = characters[index..end].iter().map(|(_, candidate)| candidate).collect();
                let kind = match word.as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    "in" => TokenKind::In,
                    "True" => TokenKind::True,
                    "False" => TokenKind::False,
                    _ => TokenKind::Name(word),
                };
                (kind, end - index)
            }
            '+' => (TokenKind::Plus, 1),
            '-' => (TokenKind::Minus, 1),
            '*' => (TokenKind::Star, 1),
            '/' if peek_next == Some('/') => (TokenKind::DoubleSlash, 2),
            '/' => (TokenKind::Slash, 1),
            '%' => (TokenKind::Percent, 1),
            '=' if peek_next == Some('=') => (TokenKind::Equal, 2),
            '!' if peek_next == Some('=') => (TokenKind::NotEqual, 2),
            '<' if peek_next == Some('=') => (TokenKind::LessEqual, 2),
            '<' => (TokenKind::Less, 1),
            '>' if peek_next == Some('=') => (TokenKind::GreaterEqual, 2),
            '>' => (TokenKind::Greater, 1),
            '(' => (TokenKind::LeftParen, 1),
            ')' => (TokenKind::RightParen, 1),
            '[' => (TokenKind::LeftBracket, 1),
            ']' => (TokenKind::RightBracket, 1),
            ',' => (TokenKind::Comma, 1),
            ':' => (TokenKind::Colon, 1),
            other => {
                return Err(ExpressionError::Syntax {
                    offset,
                    message: format!("unexpected character '{}'", other),
                });
            }
        };
        tokens.push(Token { kind, offset });
        index += consumed;
    }

    tokens.push(Token {
        kind: TokenKind::End,
        offset: source.len(),
    });
    Ok(tokens)
}

fn lex_number(source: &str, characters: &[(usize, char)], start: usize) -> Result<(TokenKind, usize), ExpressionError> {
    let mut end = start;
    let mut seen_dot = false;
    while let Some((_, character)) = characters.get(end) {
        match character {
            '0'..='9' => end += 1,
            '.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }

    let byte_start = characters[start].0;
    let byte_end = characters.get(end).map(|(offset, _)| *offset).unwrap_or(source.len());
    let text = &source[byte_start..byte_end];

    let kind = if seen_dot {
        let value = text.parse::<f64>().map_err(|_| ExpressionError::Syntax {
            offset: byte_start,
            message: format!("invalid number '{}'", text),
        })?;
        TokenKind::Float(value)
    } else {
        let value = text.parse::<i64>().map_err(|_| ExpressionError::InvalidInteger(text.to_string()))?;
        TokenKind::Int(value)
    };
    Ok((kind, end - start))
}

fn lex_string(characters: &[(usize, char)], start: usize) -> Result<(TokenKind, usize), ExpressionError> {
    let (offset, quote) = characters[start];
    let mut text = String::new();
    let mut index = start + 1;

    while let Some((_, character)) = characters.get(index) {
        match character {
            '\\' => {
                let escaped = characters.get(index + 1).map(|(_, next)| *next).ok_or(ExpressionError::Syntax {
                    offset,
                    message: "unterminated string literal".to_string(),
                })?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                index += 2;
            }
            closing if *closing == quote => return Ok((TokenKind::Str(text), index + 1 - start)),
            other => {
                text.push(*other);
                index += 1;
            }
        }
    }

    Err(ExpressionError::Syntax {
        offset,
        message: "unterminated string literal".to_string(),
    })
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.position.min(self.tokens.len() - 1)].kind
    }

    fn peek_second(&self) -> &TokenKind {
        &self.tokens[(self.position + 1).min(self.tokens.len() - 1)].kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.position.min(self.tokens.len() - 1)].offset
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        kind
    }

    fn eat(&mut self, expected: &TokenKind) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &TokenKind, description: &str) -> Result<(), ExpressionError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {}", description)))
        }
    }

    fn error(&self, message: &str) -> ExpressionError {
        let found = match self.peek() {
            TokenKind::End => "end of input".to_string(),
            other => format!("{:?}", other),
        };
        ExpressionError::Syntax {
            offset: self.offset(),
            message: format!("{}, found {}", message, found),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_not()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_additive()?;
        let Some(operator) = self.comparison_operator() else {
            return Ok(left);
        };
        let right = self.parse_additive()?;
        if self.comparison_operator().is_some() {
            return Err(self.error("chained comparisons are not supported"));
        }
        debug_assert!(operator.is_comparison());
        Ok(Expr::Binary(operator, Box::new(left), Box::new(right)))
    }

    /// Consumes a comparison operator when one is next.
    fn comparison_operator(&mut self) -> Option<BinaryOp> {
        let operator = match self.peek() {
            TokenKind::Equal => BinaryOp::Equal,
            TokenKind::NotEqual => BinaryOp::NotEqual,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEqual,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            TokenKind::In => BinaryOp::In,
            TokenKind::Not if self.peek_second() == &TokenKind::In => {
                self.advance();
                BinaryOp::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(operator)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_term()?;
        loop {
            let operator = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let operator = match self.peek() {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::DoubleSlash => BinaryOp::FloorDivide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        let operator = match self.peek() {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Plus => UnaryOp::Plus,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary(operator, Box::new(operand)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut target = self.parse_primary()?;
        while self.eat(&TokenKind::LeftBracket) {
            let start = if matches!(self.peek(), TokenKind::Colon) {
                None
            } else {
                Some(Box::new(self.parse_or()?))
            };

            if self.eat(&TokenKind::Colon) {
                let end = if matches!(self.peek(), TokenKind::RightBracket) {
                    None
                } else {
                    Some(Box::new(self.parse_or()?))
                };
                self.expect(&TokenKind::RightBracket, "']'")?;
                target = Expr::Slice {
                    target: Box::new(target),
                    start,
                    end,
                };
            } else {
                self.expect(&TokenKind::RightBracket, "']'")?;
                let Some(index) = start else {
                    return Err(self.error("expected an index"));
                };
                target = Expr::Index(Box::new(target), index);
            }
        }
        Ok(target)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.advance() {
            TokenKind::Int(value) => Ok(Expr::Literal(ExprValue::Int(value))),
            TokenKind::Float(value) => Ok(Expr::Literal(ExprValue::Float(value))),
            TokenKind::Str(value) => Ok(Expr::Literal(ExprValue::Str(value))),
            TokenKind::True => Ok(Expr::Literal(ExprValue::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(ExprValue::Bool(false))),
            TokenKind::Name(name) => {
                if !self.eat(&TokenKind::LeftParen) {
                    return Ok(Expr::Name(name));
                }
                let builtin = Builtin::from_name(&name).ok_or(ExpressionError::UnknownFunction(name))?;
                let arguments = self.parse_sequence(&TokenKind::RightParen, "')'")?;
                if arguments.len() != 1 {
                    return Err(ExpressionError::Arity {
                        function: builtin.name().to_string(),
                        expected: 1,
                        found: arguments.len(),
                    });
                }
                Ok(Expr::Call(builtin, arguments))
            }
            TokenKind::LeftParen => {
                let inner = self.parse_or()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LeftBracket => Ok(Expr::List(self.parse_sequence(&TokenKind::RightBracket, "']'")?)),
            TokenKind::End => Err(ExpressionError::Syntax {
                offset,
                message: "unexpected end of input".to_string(),
            }),
            other => Err(ExpressionError::Syntax {
                offset,
                message: format!("unexpected token {:?}", other),
            }),
        }
    }

    /// Comma separated expressions up to `closing`, trailing comma allowed.
    fn parse_sequence(&mut self, closing: &TokenKind, description: &str) -> Result<Vec<Expr>, ExpressionError> {
        let mut items = Vec::new();
        if self.eat(closing) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_or()?);
            if self.eat(&TokenKind::Comma) {
                if self.eat(closing) {
                    return Ok(items);
                }
                continue;
            }
            self.expect(closing, description)?;
            return Ok(items);
        }
    }
}

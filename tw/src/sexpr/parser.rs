//! S-expression parser with position-tracked errors

use thiserror::Error;

use super::ast::Sexpr;

/// Malformed input, with 1-indexed position
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("syntax error at {line}:{column}: {message}")]
pub struct SexpSyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Quote,
    Str(String),
    Atom(String),
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> SexpSyntaxError {
        SexpSyntaxError {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize, usize)>, SexpSyntaxError> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            let (line, column) = (self.line, self.column);
            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                ';' => {
                    // Comment to end of line
                    while let Some(&c) = self.chars.peek() {
                        self.bump();
                        if c == '\n' {
                            break;
                        }
                    }
                }
                '(' => {
                    self.bump();
                    tokens.push((Token::LParen, line, column));
                }
                ')' => {
                    self.bump();
                    tokens.push((Token::RParen, line, column));
                }
                '\'' => {
                    self.bump();
                    tokens.push((Token::Quote, line, column));
                }
                '"' => {
                    self.bump();
                    let mut value = String::new();
                    loop {
                        match self.bump() {
                            Some('"') => break,
                            Some('\\') => match self.bump() {
                                Some('"') => value.push('"'),
                                Some('\\') => value.push('\\'),
                                Some(other) => {
                                    return Err(self.error(format!("unknown escape '\\{}'", other)));
                                }
                                None => return Err(self.error("unterminated string")),
                            },
                            Some(other) => value.push(other),
                            None => return Err(self.error("unterminated string")),
                        }
                    }
                    tokens.push((Token::Str(value), line, column));
                }
                _ => {
                    let mut atom = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_whitespace() || c == '(' || c == ')' || c == '"' || c == ';' {
                            break;
                        }
                        atom.push(c);
                        self.bump();
                    }
                    tokens.push((Token::Atom(atom), line, column));
                }
            }
        }
        Ok(tokens)
    }
}

fn atom_to_sexpr(atom: &str) -> Sexpr {
    match atom {
        "true" => return Sexpr::Bool(true),
        "false" => return Sexpr::Bool(false),
        "nil" => return Sexpr::Nil,
        _ => {}
    }
    if let Ok(n) = atom.parse::<i64>() {
        return Sexpr::Int(n);
    }
    // Digit guard keeps words like "inf" and "nan" symbolic
    if atom.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(x) = atom.parse::<f64>() {
            return Sexpr::Float(x);
        }
    }
    Sexpr::Symbol(atom.to_string())
}

struct Parser {
    tokens: Vec<(Token, usize, usize)>,
    position: usize,
}

impl Parser {
    fn error_at(&self, message: impl Into<String>) -> SexpSyntaxError {
        let (line, column) = self
            .tokens
            .get(self.position.min(self.tokens.len().saturating_sub(1)))
            .map(|(_, l, c)| (*l, *c))
            .unwrap_or((1, 1));
        SexpSyntaxError {
            message: message.into(),
            line,
            column,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(t, _, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).map(|(t, _, _)| t.clone());
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn parse_expr(&mut self) -> Result<Sexpr, SexpSyntaxError> {
        match self.next() {
            Some(Token::LParen) => {
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        Some(Token::RParen) => {
                            self.next();
                            return Ok(Sexpr::List(items));
                        }
                        Some(_) => items.push(self.parse_expr()?),
                        None => return Err(self.error_at("unclosed parenthesis")),
                    }
                }
            }
            Some(Token::RParen) => Err(self.error_at("unexpected ')'")),
            Some(Token::Quote) => {
                let quoted = self.parse_expr()?;
                Ok(Sexpr::List(vec![Sexpr::symbol("quote"), quoted]))
            }
            Some(Token::Str(value)) => Ok(Sexpr::Str(value)),
            Some(Token::Atom(atom)) => Ok(atom_to_sexpr(&atom)),
            None => Err(self.error_at("unexpected end of input")),
        }
    }
}

/// Parse every top-level expression in the input
pub fn parse_many(input: &str) -> Result<Vec<Sexpr>, SexpSyntaxError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser { tokens, position: 0 };

    let mut forms = Vec::new();
    while parser.peek().is_some() {
        forms.push(parser.parse_expr()?);
    }
    Ok(forms)
}

/// Parse exactly one expression; trailing input is an error
pub fn parse(input: &str) -> Result<Sexpr, SexpSyntaxError> {
    let mut forms = parse_many(input)?;
    match forms.len() {
        0 => Err(SexpSyntaxError {
            message: "empty input".to_string(),
            line: 1,
            column: 1,
        }),
        1 => Ok(forms.remove(0)),
        _ => Err(SexpSyntaxError {
            message: "unexpected trailing expression".to_string(),
            line: 1,
            column: 1,
        }),
    }
}

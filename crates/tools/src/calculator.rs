//! Arithmetic evaluator for tax and cost questions.
//!
//! Handles `+ - * /`, parentheses, unary minus, decimal numbers with
//! `_` or `,` digit separators, and a postfix `%` so "22% * 500000000"
//! reads the way a tax question is asked. Implemented as a small Pratt
//! parser over a peekable lexer; a trusted tool must fail loudly on
//! anything it does not fully understand.

use async_trait::async_trait;
use clarion_core::{Tool, ToolError, ToolKind, ToolResult};

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Calculator
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports +, -, *, /, parentheses, \
         decimals, digit separators (500_000_000) and postfix percent (22%)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Expression to evaluate, e.g. '22% * 500_000_000'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let expression = arguments
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'expression'".into()))?;

        match evaluate(expression) {
            Ok(value) => Ok(ToolResult {
                call_id: String::new(),
                success: true,
                output: render(value),
                data: Some(serde_json::json!({ "result": value })),
            }),
            Err(e) => Ok(ToolResult {
                call_id: String::new(),
                success: false,
                output: format!("Error: {e}"),
                data: None,
            }),
        }
    }
}

/// Whole numbers print without a fractional part.
fn render(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Evaluate an expression to a single number.
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let mut lexer = Lexer::new(expression);
    let value = parse_expression(&mut lexer, 0)?;
    match lexer.next()? {
        Token::End => Ok(value),
        trailing => Err(format!("trailing input after expression: {trailing}")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Open,
    Close,
    End,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
            Token::Open => write!(f, "'('"),
            Token::Close => write!(f, "')'"),
            Token::End => write!(f, "end of input"),
        }
    }
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    lookahead: Option<Token>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            lookahead: None,
        }
    }

    fn peek(&mut self) -> Result<Token, String> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lex()?);
        }
        Ok(self.lookahead.unwrap_or(Token::End))
    }

    fn next(&mut self) -> Result<Token, String> {
        match self.lookahead.take() {
            Some(token) => Ok(token),
            None => self.lex(),
        }
    }

    fn lex(&mut self) -> Result<Token, String> {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }

        let Some(&c) = self.chars.peek() else {
            return Ok(Token::End);
        };

        let simple = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '(' => Some(Token::Open),
            ')' => Some(Token::Close),
            _ => None,
        };
        if let Some(token) = simple {
            self.chars.next();
            return Ok(token);
        }

        if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&c) = self.chars.peek() {
                match c {
                    // Separators are legal inside a literal and ignored.
                    '_' | ',' => {
                        self.chars.next();
                    }
                    c if c.is_ascii_digit() || c == '.' => {
                        literal.push(c);
                        self.chars.next();
                    }
                    _ => break,
                }
            }
            return literal
                .parse()
                .map(Token::Number)
                .map_err(|_| format!("not a number: '{literal}'"));
        }

        Err(format!("unexpected character '{c}'"))
    }
}

/// Left binding power per infix operator; zero means "not infix".
fn binding_power(token: Token) -> u8 {
    match token {
        Token::Plus | Token::Minus => 1,
        Token::Star | Token::Slash => 2,
        _ => 0,
    }
}

fn parse_expression(lexer: &mut Lexer<'_>, min_power: u8) -> Result<f64, String> {
    let mut left = parse_operand(lexer)?;

    loop {
        let op = lexer.peek()?;
        let power = binding_power(op);
        if power == 0 || power < min_power {
            return Ok(left);
        }
        lexer.next()?;

        let right = parse_expression(lexer, power + 1)?;
        left = match op {
            Token::Plus => left + right,
            Token::Minus => left - right,
            Token::Star => left * right,
            Token::Slash => {
                if right == 0.0 {
                    return Err("division by zero".into());
                }
                left / right
            }
            _ => unreachable!("binding_power admits only infix operators"),
        };
    }
}

fn parse_operand(lexer: &mut Lexer<'_>) -> Result<f64, String> {
    let mut value = match lexer.next()? {
        Token::Number(n) => n,
        Token::Minus => -parse_operand(lexer)?,
        Token::Open => {
            let inner = parse_expression(lexer, 0)?;
            match lexer.next()? {
                Token::Close => inner,
                other => return Err(format!("expected ')', found {other}")),
            }
        }
        other => return Err(format!("expected a value, found {other}")),
    };

    while lexer.peek()? == Token::Percent {
        lexer.next()?;
        value /= 100.0;
    }
    Ok(value)
}

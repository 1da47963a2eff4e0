use async_trait::async_trait;
use wnk_core::plugin::{Plugin, PluginError, PluginManifest};
use wnk_core::protocol::{HostContext, ResultItem};
use wnk_core::value::format_number;

pub const ID: &str = "calculator";

#[derive(Clone, Copy, Debug, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn precedence(self) -> u8 {
        match self {
            Self::Mul | Self::Div => 2,
            Self::Add | Self::Sub => 1,
        }
    }

    fn apply(self, a: f64, b: f64) -> Option<f64> {
        let value = match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div if b == 0.0 => return None,
            Self::Div => a / b,
        };
        value.is_finite().then_some(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Token {
    Num(f64),
    Op(Op),
    LParen,
    RParen,
}

/// Length of the numeric literal at the start of `s`: optional sign, digits
/// with an optional fraction (or a bare fraction), optional exponent.
fn number_len(s: &[u8]) -> Option<usize> {
    let mut i = 0;
    if s.first() == Some(&b'-') {
        i += 1;
    }
    let int_start = i;
    while s.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    let has_int = i > int_start;
    if s.get(i) == Some(&b'.') {
        i += 1;
        let frac_start = i;
        while s.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        if !has_int && i == frac_start {
            return None;
        }
    } else if !has_int {
        return None;
    }
    if matches!(s.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(s.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_start = j;
        while s.get(j).is_some_and(u8::is_ascii_digit) {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    Some(i)
}

fn tokenize(input: &str) -> Option<Vec<Token>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = compact.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let token = match bytes[i] {
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'+' => Some(Token::Op(Op::Add)),
            b'*' => Some(Token::Op(Op::Mul)),
            b'/' => Some(Token::Op(Op::Div)),
            b'-' => {
                let unary = matches!(tokens.last(), None | Some(Token::Op(_)) | Some(Token::LParen));
                (!unary).then_some(Token::Op(Op::Sub))
            }
            _ => None,
        };
        if let Some(token) = token {
            tokens.push(token);
            i += 1;
            continue;
        }

        let len = number_len(&bytes[i..])?;
        let value: f64 = compact.get(i..i + len)?.parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        tokens.push(Token::Num(value));
        i += len;
    }
    Some(tokens)
}

fn to_rpn(tokens: Vec<Token>) -> Option<Vec<Token>> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Token> = Vec::new();

    for token in tokens {
        match token {
            Token::Num(_) => output.push(token),
            Token::Op(op) => {
                while let Some(&Token::Op(top)) = stack.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    output.push(Token::Op(top));
                    stack.pop();
                }
                stack.push(token);
            }
            Token::LParen => stack.push(token),
            Token::RParen => loop {
                match stack.pop()? {
                    Token::LParen => break,
                    other => output.push(other),
                }
            },
        }
    }

    while let Some(token) = stack.pop() {
        if matches!(token, Token::LParen | Token::RParen) {
            return None;
        }
        output.push(token);
    }
    Some(output)
}

fn eval_rpn(tokens: &[Token]) -> Option<f64> {
    let mut stack = Vec::new();
    for token in tokens {
        match *token {
            Token::Num(value) => stack.push(value),
            Token::Op(op) => {
                let b = stack.pop()?;
                let a = stack.pop()?;
                stack.push(op.apply(a, b)?);
            }
            Token::LParen | Token::RParen => return None,
        }
    }
    match stack.as_slice() {
        [value] => Some(*value),
        _ => None,
    }
}

/// Evaluates an arithmetic expression. `None` for empty, malformed, or
/// non-finite input and for division by zero.
pub fn evaluate(expr: &str) -> Option<f64> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return None;
    }
    eval_rpn(&to_rpn(tokens)?)
}

#[derive(Debug)]
pub struct Calculator {
    manifest: PluginManifest,
}

impl Calculator {
    pub fn new() -> Self {
        Self::with_manifest(PluginManifest::new(ID, "Calculator").with_icon("="))
    }

    pub fn with_manifest(manifest: PluginManifest) -> Self {
        Self { manifest }
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Plugin for Calculator {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn get_results(&self, query: &str, context: &HostContext) -> Result<Vec<ResultItem>, PluginError> {
        let trimmed = query.trim();
        let input = if trimmed.is_empty() {
            context.selection().unwrap_or_default()
        } else {
            trimmed
        };
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let Some(value) = evaluate(input) else {
            return Ok(Vec::new());
        };
        let title = format_number(value);
        let subtitle = format!("{input} = {title}");
        Ok(vec![ResultItem::new(title).subtitle(subtitle).icon("=")])
    }
}

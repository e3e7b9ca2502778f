//! EG-003: Inline expression language for `!func:` nodes.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! lambda     := "lambda" [ident ("," ident)*] ":" comparison
//! comparison := additive [("<" | "<=" | ">" | ">=" | "==" | "!=") additive]
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "//" | "%") unary)*
//! unary      := ("-" | "+") unary | power
//! power      := atom ["**" unary]
//! atom       := number | name | name "(" [comparison ("," comparison)*] ")" | "(" comparison ")"
//! ```
//!
//! Parameter references are bound to argument slots at parse time. Any
//! other name is kept symbolic and only fails when the function is called.

use super::error::EvalError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Colon,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// Compiled expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    /// Positional parameter slot.
    Param(usize),
    /// Free name (constant or undefined).
    Name(String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// A parsed `lambda` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
}

impl Lambda {
    /// Evaluate with positional arguments (one per parameter).
    pub fn eval(&self, args: &[f64]) -> Result<f64, EvalError> {
        eval(&self.body, args)
    }
}

/// Parse `lambda <params>: <expr>` source into a [`Lambda`].
pub fn parse_lambda(src: &str) -> Result<Lambda, String> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        params: Vec::new(),
    };

    match parser.next() {
        Some(Token::Ident(kw)) if kw == "lambda" => {}
        _ => return Err("expression must start with 'lambda'".to_string()),
    }

    parser.parse_params()?;
    let body = parser.parse_comparison()?;
    if let Some(tok) = parser.peek() {
        return Err(format!("unexpected trailing token {:?}", tok));
    }

    Ok(Lambda {
        params: parser.params,
        body,
    })
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let starts_number = c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()));
        if starts_number {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| format!("invalid number '{}'", text))?;
            tokens.push(Token::Num(n));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if text.ends_with('.') || text.contains("..") {
                return Err(format!("invalid name '{}'", text));
            }
            tokens.push(Token::Ident(text));
            continue;
        }

        let next = chars.get(i + 1).copied();
        let two = match (c, next) {
            ('*', Some('*')) => Some("**"),
            ('/', Some('/')) => Some("//"),
            ('<', Some('=')) => Some("<="),
            ('>', Some('=')) => Some(">="),
            ('=', Some('=')) => Some("=="),
            ('!', Some('=')) => Some("!="),
            _ => None,
        };
        if let Some(op) = two {
            tokens.push(Token::Op(op));
            i += 2;
            continue;
        }

        let tok = match c {
            '+' => Token::Op("+"),
            '-' => Token::Op("-"),
            '*' => Token::Op("*"),
            '/' => Token::Op("/"),
            '%' => Token::Op("%"),
            '<' => Token::Op("<"),
            '>' => Token::Op(">"),
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            ':' => Token::Colon,
            other => return Err(format!("unexpected character '{}'", other)),
        };
        tokens.push(tok);
        i += 1;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    params: Vec<String>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn parse_params(&mut self) -> Result<(), String> {
        if let Some(Token::Colon) = self.peek() {
            self.pos += 1;
            return Ok(());
        }
        loop {
            match self.next() {
                Some(Token::Ident(name)) => {
                    if name.contains('.') || name == "lambda" {
                        return Err(format!("invalid parameter name '{}'", name));
                    }
                    if self.params.contains(&name) {
                        return Err(format!("duplicate parameter '{}'", name));
                    }
                    self.params.push(name);
                }
                other => return Err(format!("expected parameter name, found {:?}", other)),
            }
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::Colon) => return Ok(()),
                other => return Err(format!("expected ',' or ':', found {:?}", other)),
            }
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_additive()?;
        let op = match self.eat_op(&["<", "<=", ">", ">=", "==", "!="]) {
            Some(op) => op,
            None => return Ok(lhs),
        };
        let rhs = self.parse_additive()?;
        let op = match op {
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "==" => BinOp::Eq,
            _ => BinOp::Ne,
        };
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.parse_term()?;
            let op = if op == "+" { BinOp::Add } else { BinOp::Sub };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "//", "%"]) {
            let rhs = self.parse_unary()?;
            let op = match op {
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                "//" => BinOp::FloorDiv,
                _ => BinOp::Mod,
            };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.eat_op(&["-", "+"]) {
            Some("-") => Ok(Expr::Neg(Box::new(self.parse_unary()?))),
            Some(_) => self.parse_unary(),
            None => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_atom()?;
        if self.eat_op(&["**"]).is_some() {
            let exp = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::LParen) => {
                let inner = self.parse_comparison()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    other => Err(format!("expected ')', found {:?}", other)),
                }
            }
            Some(Token::Ident(name)) if name == "lambda" => {
                Err("nested 'lambda' is not supported".to_string())
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    let args = self.parse_args()?;
                    return Ok(Expr::Call(name, args));
                }
                match self.params.iter().position(|p| *p == name) {
                    Some(slot) => Ok(Expr::Param(slot)),
                    None => Ok(Expr::Name(name)),
                }
            }
            Some(tok) => Err(format!("unexpected token {:?}", tok)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_comparison()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                other => return Err(format!("expected ',' or ')', found {:?}", other)),
            }
        }
    }
}

fn eval(expr: &Expr, args: &[f64]) -> Result<f64, EvalError> {
    match expr {
        Expr::Num(n) => Ok(*n),
        Expr::Param(slot) => args.get(*slot).copied().ok_or_else(|| EvalError::Arity {
            name: "lambda".to_string(),
            expected: slot + 1,
            got: args.len(),
        }),
        Expr::Name(name) => {
            constant(name).ok_or_else(|| EvalError::UndefinedName(name.clone()))
        }
        Expr::Neg(inner) => Ok(-eval(inner, args)?),
        Expr::Binary(op, lhs, rhs) => apply(*op, eval(lhs, args)?, eval(rhs, args)?),
        Expr::Call(name, call_args) => {
            let values = call_args
                .iter()
                .map(|a| eval(a, args))
                .collect::<Result<Vec<_>, _>>()?;
            call_builtin(name, &values)
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" | "math.pi" => Some(std::f64::consts::PI),
        "math.e" => Some(std::f64::consts::E),
        "math.inf" | "inf" => Some(f64::INFINITY),
        _ => None,
    }
}

fn apply(op: BinOp, a: f64, b: f64) -> Result<f64, EvalError> {
    let truth = |t: bool| if t { 1.0 } else { 0.0 };
    match op {
        BinOp::Add => Ok(a + b),
        BinOp::Sub => Ok(a - b),
        BinOp::Mul => Ok(a * b),
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0.0 => {
            Err(EvalError::Domain("division by zero".to_string()))
        }
        BinOp::Div => Ok(a / b),
        BinOp::FloorDiv => Ok((a / b).floor()),
        // Result takes the sign of the divisor.
        BinOp::Mod => Ok(a - b * (a / b).floor()),
        BinOp::Pow => Ok(a.powf(b)),
        BinOp::Lt => Ok(truth(a < b)),
        BinOp::Le => Ok(truth(a <= b)),
        BinOp::Gt => Ok(truth(a > b)),
        BinOp::Ge => Ok(truth(a >= b)),
        BinOp::Eq => Ok(truth(a == b)),
        BinOp::Ne => Ok(truth(a != b)),
    }
}

fn call_builtin(name: &str, args: &[f64]) -> Result<f64, EvalError> {
    let short = name.strip_prefix("math.").unwrap_or(name);
    let arity = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(EvalError::Arity {
                name: short.to_string(),
                expected,
                got: args.len(),
            })
        }
    };
    let domain = || EvalError::Domain("math domain error".to_string());

    match short {
        "abs" | "fabs" => arity(1).map(|_| args[0].abs()),
        "sqrt" => {
            arity(1)?;
            if args[0] < 0.0 {
                return Err(domain());
            }
            Ok(args[0].sqrt())
        }
        "exp" => arity(1).map(|_| args[0].exp()),
        "log" => match args {
            [x] if *x > 0.0 => Ok(x.ln()),
            [x, base] if *x > 0.0 && *base > 0.0 && *base != 1.0 => Ok(x.ln() / base.ln()),
            [_] | [_, _] => Err(domain()),
            _ => Err(EvalError::Arity {
                name: short.to_string(),
                expected: 2,
                got: args.len(),
            }),
        },
        "sin" => arity(1).map(|_| args[0].sin()),
        "cos" => arity(1).map(|_| args[0].cos()),
        "tan" => arity(1).map(|_| args[0].tan()),
        "pow" => arity(2).map(|_| args[0].powf(args[1])),
        "min" | "max" => {
            if args.is_empty() {
                return Err(EvalError::Arity {
                    name: short.to_string(),
                    expected: 1,
                    got: 0,
                });
            }
            let init = args[0];
            Ok(args[1..].iter().fold(init, |acc, &v| {
                if short == "min" {
                    acc.min(v)
                } else {
                    acc.max(v)
                }
            }))
        }
        _ => Err(EvalError::UndefinedName(name.to_string())),
    }
}

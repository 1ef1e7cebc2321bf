// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Affine scaling inference for ECUFlash `toexpr` formulas
//!
//! Formulas are parsed with a small recursive-descent parser over the
//! grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := '-' factor | number | 'x' | '(' expr ')'
//! ```
//!
//! Every sub-expression is kept in the form `a*x + b`, so the result gives
//! `scale` and `offset` directly.  Anything outside the grammar, and
//! anything that is not linear in `x` (`x*x`, `1/x`), is rejected.  Nothing
//! is ever evaluated dynamically.

#[allow(unused_imports)]
use log::{debug, warn};

/// `physical = raw * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Affine {
    pub scale: f64,
    pub offset: f64,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        scale: 1.0,
        offset: 0.0,
    };

    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Reasons a formula is rejected.  Only used for logging.
#[derive(Debug, Clone, PartialEq)]
enum Rejection {
    UnexpectedChar(char),
    UnexpectedEnd,
    BadNumber(String),
    NonLinear,
    DivideByZero,
    TrailingInput(usize),
}

/// Infers the affine transform expressed by `toexpr`.
///
/// Returns [`Affine::IDENTITY`] (and logs a warning) for an absent, unsafe
/// or non-linear expression.
pub fn infer_affine(toexpr: Option<&str>) -> Affine {
    let Some(expr) = toexpr.map(str::trim).filter(|e| !e.is_empty()) else {
        return Affine::IDENTITY;
    };

    match parse_linear(expr) {
        Ok(linear) if linear.a.is_finite() && linear.b.is_finite() => Affine {
            scale: linear.a,
            offset: linear.b,
        },
        Ok(_) => {
            warn!("Scaling expression '{expr}' is not finite, using identity scaling");
            Affine::IDENTITY
        }
        Err(rejection) => {
            warn!("Scaling expression '{expr}' rejected ({rejection:?}), using identity scaling");
            Affine::IDENTITY
        }
    }
}

// a*x + b
#[derive(Debug, Clone, Copy, PartialEq)]
struct Linear {
    a: f64,
    b: f64,
}

impl Linear {
    fn constant(b: f64) -> Self {
        Self { a: 0.0, b }
    }

    fn is_constant(&self) -> bool {
        self.a == 0.0
    }
}

fn parse_linear(expr: &str) -> Result<Linear, Rejection> {
    let mut parser = ExprParser {
        chars: expr.chars().collect(),
        pos: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos != parser.chars.len() {
        return Err(Rejection::TrailingInput(parser.pos));
    }
    Ok(value)
}

struct ExprParser {
    chars: Vec<char>,
    pos: usize,
}

impl ExprParser {
    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<Linear, Rejection> {
        let mut lhs = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = if op == '+' {
                Linear {
                    a: lhs.a + rhs.a,
                    b: lhs.b + rhs.b,
                }
            } else {
                Linear {
                    a: lhs.a - rhs.a,
                    b: lhs.b - rhs.b,
                }
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Linear, Rejection> {
        let mut lhs = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = if op == '*' {
                if !lhs.is_constant() && !rhs.is_constant() {
                    return Err(Rejection::NonLinear);
                }
                Linear {
                    a: lhs.a * rhs.b + rhs.a * lhs.b,
                    b: lhs.b * rhs.b,
                }
            } else {
                if !rhs.is_constant() {
                    return Err(Rejection::NonLinear);
                }
                if rhs.b == 0.0 {
                    return Err(Rejection::DivideByZero);
                }
                Linear {
                    a: lhs.a / rhs.b,
                    b: lhs.b / rhs.b,
                }
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Linear, Rejection> {
        match self.peek() {
            None => Err(Rejection::UnexpectedEnd),
            Some('-') => {
                self.pos += 1;
                let inner = self.factor()?;
                Ok(Linear {
                    a: -inner.a,
                    b: -inner.b,
                })
            }
            Some('x' | 'X') => {
                self.pos += 1;
                Ok(Linear { a: 1.0, b: 0.0 })
            }
            Some('(') => {
                self.pos += 1;
                let inner = self.expr()?;
                match self.peek() {
                    Some(')') => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    Some(c) => Err(Rejection::UnexpectedChar(c)),
                    None => Err(Rejection::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(Rejection::UnexpectedChar(c)),
        }
    }

    fn number(&mut self) -> Result<Linear, Rejection> {
        let start = self.pos;
        while self.pos < self.chars.len()
            && (self.chars[self.pos].is_ascii_digit() || self.chars[self.pos] == '.')
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map(Linear::constant)
            .map_err(|_| Rejection::BadNumber(text))
    }
}

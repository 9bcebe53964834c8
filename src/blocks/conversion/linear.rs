use crate::Result;
use crate::blocks::conversion::base::ConversionBlock;
use crate::types::DecodedValue;
use alloc::string::String;
use alloc::vec::Vec;

/// Attempts to extract a numeric value from a [`DecodedValue`].
/// Returns `Some(f64)` if the input is numeric, or `None` otherwise.
pub fn extract_numeric(value: &DecodedValue) -> Option<f64> {
    match value {
        DecodedValue::Float(n) => Some(*n),
        DecodedValue::UnsignedInteger(n) => Some(*n as f64),
        DecodedValue::SignedInteger(n) => Some(*n as f64),
        DecodedValue::Timestamp(n) => Some(*n as f64),
        _ => None,
    }
}

/// Apply a linear conversion: `eng = p0 + p1 * raw`.
pub fn apply_linear(block: &ConversionBlock, value: DecodedValue) -> Result<DecodedValue> {
    if let Some(raw) = extract_numeric(&value) {
        if block.values.len() >= 2 {
            Ok(DecodedValue::Float(block.values[0] + block.values[1] * raw))
        } else {
            Ok(DecodedValue::Float(raw))
        }
    } else {
        Ok(value)
    }
}

/// Apply a rational conversion:
/// `eng = (p0*x² + p1*x + p2) / (p3*x² + p4*x + p5)`.
///
/// A vanishing divisor or a non-finite result yields `Unknown`, surfaced as
/// an invalid sample by the observers.
pub fn apply_rational(block: &ConversionBlock, value: DecodedValue) -> Result<DecodedValue> {
    if let Some(raw) = extract_numeric(&value) {
        if block.values.len() < 6 {
            return Ok(DecodedValue::Float(raw));
        }
        let v = &block.values;
        let num = v[0] * raw * raw + v[1] * raw + v[2];
        let den = v[3] * raw * raw + v[4] * raw + v[5];
        let eng = num / den;
        if den == 0.0 || !eng.is_finite() {
            Ok(DecodedValue::Unknown)
        } else {
            Ok(DecodedValue::Float(eng))
        }
    } else {
        Ok(value)
    }
}

/// Apply an MDF3 polynomial conversion (6 parameters).
///
/// `eng = (p1 - p3*(x - p4 - p5)) / (p2*(x - p4 - p5) - p0)`
pub fn apply_polynomial(block: &ConversionBlock, value: DecodedValue) -> Result<DecodedValue> {
    if let Some(raw) = extract_numeric(&value) {
        if block.values.len() < 6 {
            return Ok(DecodedValue::Unknown);
        }
        let v = &block.values;
        let temp = raw - v[4] - v[5];
        let den = v[2] * temp - v[0];
        let eng = (v[1] - v[3] * temp) / den;
        if den == 0.0 || !eng.is_finite() {
            Ok(DecodedValue::Unknown)
        } else {
            Ok(DecodedValue::Float(eng))
        }
    } else {
        Ok(value)
    }
}

/// Apply an MDF3 exponential conversion (7 parameters).
pub fn apply_exponential(block: &ConversionBlock, value: DecodedValue) -> Result<DecodedValue> {
    apply_exp_log(block, value, false)
}

/// Apply an MDF3 logarithmic conversion (7 parameters).
pub fn apply_logarithmic(block: &ConversionBlock, value: DecodedValue) -> Result<DecodedValue> {
    apply_exp_log(block, value, true)
}

fn apply_exp_log(
    block: &ConversionBlock,
    value: DecodedValue,
    logarithmic: bool,
) -> Result<DecodedValue> {
    let raw = match extract_numeric(&value) {
        Some(x) => x,
        None => return Ok(value),
    };
    if block.values.len() < 7 {
        return Ok(DecodedValue::Unknown);
    }
    let v = &block.values;

    // Two closed forms, selected by which of p0/p3 is zero; anything else
    // is malformed.
    let eng = if v[3] == 0.0 {
        if v[0] == 0.0 || v[1] == 0.0 {
            return Ok(DecodedValue::Unknown);
        }
        let arg = ((raw - v[6]) * v[5] - v[2]) / v[0];
        match ln_or_exp(arg, logarithmic) {
            Some(y) => y / v[1],
            None => return Ok(DecodedValue::Unknown),
        }
    } else if v[0] == 0.0 {
        if v[4] == 0.0 || raw - v[6] == 0.0 {
            return Ok(DecodedValue::Unknown);
        }
        let arg = (v[2] / (raw - v[6]) - v[5]) / v[3];
        match ln_or_exp(arg, logarithmic) {
            Some(y) => y / v[4],
            None => return Ok(DecodedValue::Unknown),
        }
    } else {
        return Ok(DecodedValue::Unknown);
    };

    if eng.is_finite() {
        Ok(DecodedValue::Float(eng))
    } else {
        Ok(DecodedValue::Unknown)
    }
}

/// ln/exp with a fail-closed non-positive-log guard; without `std` these
/// transcendental forms are unavailable.
fn ln_or_exp(arg: f64, logarithmic: bool) -> Option<f64> {
    #[cfg(feature = "std")]
    {
        if logarithmic {
            if arg <= 0.0 {
                return None;
            }
            Some(arg.ln())
        } else {
            Some(arg.exp())
        }
    }
    #[cfg(not(feature = "std"))]
    {
        let _ = (arg, logarithmic);
        None
    }
}

/// Apply an algebraic conversion using a stored formula.
pub fn apply_algebraic(block: &ConversionBlock, value: DecodedValue) -> Result<DecodedValue> {
    if let (Some(raw), Some(expr_str)) = (extract_numeric(&value), block.formula.as_ref()) {
        match eval_formula(expr_str, raw) {
            Ok(res) => Ok(DecodedValue::Float(res)),
            Err(_) => Ok(DecodedValue::Float(raw)),
        }
    } else {
        Ok(value)
    }
}

/// Simple expression evaluator for MCD-2 MC algebraic formulas.
/// Supports: +, -, *, /, ^, parentheses, and the variable X.
fn eval_formula(expr: &str, x: f64) -> core::result::Result<f64, &'static str> {
    let tokens = tokenize(expr)?;
    let mut pos = 0;
    let result = parse_expr(&tokens, &mut pos, x)?;
    if pos != tokens.len() {
        return Err("Trailing tokens");
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Variable, // X
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> core::result::Result<Vec<Token>, &'static str> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::Caret); // ** as power
                } else {
                    tokens.push(Token::Star);
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                chars.next();
            }
            '^' => {
                tokens.push(Token::Caret);
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            'X' | 'x' => {
                tokens.push(Token::Variable);
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' {
                        num_str.push(ch);
                        chars.next();
                        // Handle exponent sign
                        if (ch == 'e' || ch == 'E')
                            && matches!(chars.peek(), Some(&'-') | Some(&'+'))
                        {
                            num_str.push(*chars.peek().unwrap());
                            chars.next();
                        }
                    } else {
                        break;
                    }
                }
                let n: f64 = num_str.parse().map_err(|_| "Invalid number")?;
                tokens.push(Token::Number(n));
            }
            _ => return Err("Unexpected character"),
        }
    }

    Ok(tokens)
}

// Grammar:
// expr   = term (('+' | '-') term)*
// term   = power (('*' | '/') power)*
// power  = unary ('^' power)?
// unary  = '-' unary | primary
// primary = NUMBER | VARIABLE | '(' expr ')'

fn parse_expr(
    tokens: &[Token],
    pos: &mut usize,
    x: f64,
) -> core::result::Result<f64, &'static str> {
    let mut left = parse_term(tokens, pos, x)?;

    while *pos < tokens.len() {
        match &tokens[*pos] {
            Token::Plus => {
                *pos += 1;
                left += parse_term(tokens, pos, x)?;
            }
            Token::Minus => {
                *pos += 1;
                left -= parse_term(tokens, pos, x)?;
            }
            _ => break,
        }
    }

    Ok(left)
}

fn parse_term(
    tokens: &[Token],
    pos: &mut usize,
    x: f64,
) -> core::result::Result<f64, &'static str> {
    let mut left = parse_power(tokens, pos, x)?;

    while *pos < tokens.len() {
        match &tokens[*pos] {
            Token::Star => {
                *pos += 1;
                left *= parse_power(tokens, pos, x)?;
            }
            Token::Slash => {
                *pos += 1;
                let right = parse_power(tokens, pos, x)?;
                if right == 0.0 {
                    return Err("Division by zero");
                }
                left /= right;
            }
            _ => break,
        }
    }

    Ok(left)
}

fn parse_power(
    tokens: &[Token],
    pos: &mut usize,
    x: f64,
) -> core::result::Result<f64, &'static str> {
    let base = parse_unary(tokens, pos, x)?;

    if *pos < tokens.len() && tokens[*pos] == Token::Caret {
        *pos += 1;
        let exp = parse_power(tokens, pos, x)?; // Right associative
        Ok(pow_compat(base, exp))
    } else {
        Ok(base)
    }
}

/// Round to nearest integer (works without std).
#[inline]
fn round_compat(x: f64) -> f64 {
    if x >= 0.0 {
        (x + 0.5) as i64 as f64
    } else {
        (x - 0.5) as i64 as f64
    }
}

/// Integer power by squaring (works without std).
#[inline]
fn powi_compat(base: f64, exp: i32) -> f64 {
    if exp == 0 {
        return 1.0;
    }
    let mut result = 1.0;
    let mut b = base;
    let mut n = exp.unsigned_abs();
    while n > 0 {
        if n & 1 != 0 {
            result *= b;
        }
        b *= b;
        n >>= 1;
    }
    if exp < 0 { 1.0 / result } else { result }
}

/// Power function usable in both std and no_std environments. Integer
/// exponents use exponentiation by squaring; non-integer exponents need
/// `powf` and therefore std.
#[inline]
fn pow_compat(base: f64, exp: f64) -> f64 {
    let exp_rounded = round_compat(exp);
    if (exp - exp_rounded).abs() < 1e-10 {
        powi_compat(base, exp_rounded as i32)
    } else {
        #[cfg(feature = "std")]
        {
            base.powf(exp)
        }
        #[cfg(not(feature = "std"))]
        {
            f64::NAN
        }
    }
}

fn parse_unary(
    tokens: &[Token],
    pos: &mut usize,
    x: f64,
) -> core::result::Result<f64, &'static str> {
    if *pos < tokens.len() && tokens[*pos] == Token::Minus {
        *pos += 1;
        Ok(-parse_unary(tokens, pos, x)?)
    } else {
        parse_primary(tokens, pos, x)
    }
}

fn parse_primary(
    tokens: &[Token],
    pos: &mut usize,
    x: f64,
) -> core::result::Result<f64, &'static str> {
    if *pos >= tokens.len() {
        return Err("Unexpected end of expression");
    }

    match &tokens[*pos] {
        Token::Number(n) => {
            *pos += 1;
            Ok(*n)
        }
        Token::Variable => {
            *pos += 1;
            Ok(x)
        }
        Token::LParen => {
            *pos += 1;
            let result = parse_expr(tokens, pos, x)?;
            if *pos >= tokens.len() || tokens[*pos] != Token::RParen {
                return Err("Expected closing parenthesis");
            }
            *pos += 1;
            Ok(result)
        }
        _ => Err("Unexpected token"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_variable() {
        assert!((eval_formula("X", 5.0).unwrap() - 5.0).abs() < 1e-10);
        assert!((eval_formula("x", 5.0).unwrap() - 5.0).abs() < 1e-10);
    }

    #[test]
    fn formula_linear() {
        assert!((eval_formula("2*X + 1", 3.0).unwrap() - 7.0).abs() < 1e-10);
        assert!((eval_formula("X * 2 + 1", 3.0).unwrap() - 7.0).abs() < 1e-10);
    }

    #[test]
    fn formula_power() {
        assert!((eval_formula("X^2", 3.0).unwrap() - 9.0).abs() < 1e-10);
        assert!((eval_formula("X**2", 3.0).unwrap() - 9.0).abs() < 1e-10);
    }

    #[test]
    fn formula_parentheses() {
        assert!((eval_formula("(X + 1) * 2", 3.0).unwrap() - 8.0).abs() < 1e-10);
    }

    #[test]
    fn formula_negative() {
        assert!((eval_formula("-X", 5.0).unwrap() - (-5.0)).abs() < 1e-10);
        assert!((eval_formula("X - 3", 5.0).unwrap() - 2.0).abs() < 1e-10);
    }

    #[test]
    fn formula_scientific_notation() {
        assert!((eval_formula("1e3 * X", 2.0).unwrap() - 2000.0).abs() < 1e-10);
        assert!((eval_formula("1.5e-2 * X", 100.0).unwrap() - 1.5).abs() < 1e-10);
    }

    #[test]
    fn rational_divisor_vanishes() {
        // eng = x / (x - 1): divisor vanishes at x = 1
        let block = ConversionBlock::rational(0.0, 1.0, 0.0, 0.0, 1.0, -1.0);
        let ok = apply_rational(&block, DecodedValue::Float(3.0)).unwrap();
        assert_eq!(ok, DecodedValue::Float(1.5));
        let bad = apply_rational(&block, DecodedValue::Float(1.0)).unwrap();
        assert_eq!(bad, DecodedValue::Unknown);
    }

    #[test]
    fn linear_conversion() {
        let block = ConversionBlock::linear(-40.0, 0.1);
        let v = apply_linear(&block, DecodedValue::UnsignedInteger(500)).unwrap();
        assert_eq!(v, DecodedValue::Float(10.0));
    }
}

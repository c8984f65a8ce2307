//! Evaluator for ASAM-MCD2 text formulas.
//!
//! Supports `+`, `-`, `*`, `/`, `^` (also spelled `**`), parentheses, and
//! the variable `X`.

/// Evaluate `expr` with the channel's raw value bound to `X`.
pub(super) fn eval_formula(expr: &str, x: f64) -> Result<f64, &'static str> {
    let tokens = tokenize(expr)?;
    let mut pos = 0;
    let value = parse_expr(&tokens, &mut pos, x)?;
    if pos != tokens.len() {
        return Err("trailing tokens in formula");
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Variable,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, &'static str> {
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
                    tokens.push(Token::Caret);
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
                let mut text = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' {
                        text.push(ch);
                        chars.next();
                        // Sign directly after an exponent marker
                        if (ch == 'e' || ch == 'E')
                            && matches!(chars.peek(), Some('+') | Some('-'))
                        {
                            text.push(chars.next().ok_or("truncated exponent")?);
                        }
                    } else {
                        break;
                    }
                }
                let n: f64 = text.parse().map_err(|_| "invalid number")?;
                tokens.push(Token::Number(n));
            }
            _ => return Err("unexpected character"),
        }
    }

    Ok(tokens)
}

// Grammar:
// expr    = term (('+' | '-') term)*
// term    = power (('*' | '/') power)*
// power   = unary ('^' power)?
// unary   = '-' unary | primary
// primary = NUMBER | 'X' | '(' expr ')'

fn parse_expr(tokens: &[Token], pos: &mut usize, x: f64) -> Result<f64, &'static str> {
    let mut left = parse_term(tokens, pos, x)?;
    while *pos < tokens.len() {
        match tokens[*pos] {
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

fn parse_term(tokens: &[Token], pos: &mut usize, x: f64) -> Result<f64, &'static str> {
    let mut left = parse_power(tokens, pos, x)?;
    while *pos < tokens.len() {
        match tokens[*pos] {
            Token::Star => {
                *pos += 1;
                left *= parse_power(tokens, pos, x)?;
            }
            Token::Slash => {
                *pos += 1;
                let right = parse_power(tokens, pos, x)?;
                if right.abs() < f64::EPSILON {
                    return Err("division by zero");
                }
                left /= right;
            }
            _ => break,
        }
    }
    Ok(left)
}

fn parse_power(tokens: &[Token], pos: &mut usize, x: f64) -> Result<f64, &'static str> {
    let base = parse_unary(tokens, pos, x)?;
    if *pos < tokens.len() && tokens[*pos] == Token::Caret {
        *pos += 1;
        // Right associative
        let exp = parse_power(tokens, pos, x)?;
        Ok(base.powf(exp))
    } else {
        Ok(base)
    }
}

fn parse_unary(tokens: &[Token], pos: &mut usize, x: f64) -> Result<f64, &'static str> {
    if *pos < tokens.len() && tokens[*pos] == Token::Minus {
        *pos += 1;
        Ok(-parse_unary(tokens, pos, x)?)
    } else {
        parse_primary(tokens, pos, x)
    }
}

fn parse_primary(tokens: &[Token], pos: &mut usize, x: f64) -> Result<f64, &'static str> {
    let token = tokens.get(*pos).ok_or("unexpected end of formula")?;
    match *token {
        Token::Number(n) => {
            *pos += 1;
            Ok(n)
        }
        Token::Variable => {
            *pos += 1;
            Ok(x)
        }
        Token::LParen => {
            *pos += 1;
            let value = parse_expr(tokens, pos, x)?;
            if tokens.get(*pos) != Some(&Token::RParen) {
                return Err("expected closing parenthesis");
            }
            *pos += 1;
            Ok(value)
        }
        _ => Err("unexpected token"),
    }
}

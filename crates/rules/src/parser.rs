// Rule parser - converts rule text into an AST
// Supports: numbers, "strings", TRUE/FALSE, column refs (name or [Any Name]),
// functions (IF, ROUND, ...), + - * / ^ &, comparisons (== != <> < > <= >=)
// A rule is either `target = expr` or a bare `expr` (a check).

/// Deepest nesting a rule may use, in parser recursion and tree height.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    Column(String),
    Function {
        name: String,
        args: Vec<Expr>,
    },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Nodes on the longest root-to-leaf path. Walks with an explicit
    /// stack, so it is safe on trees of any shape.
    pub fn height(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((expr, h)) = stack.pop() {
            max = max.max(h);
            match expr {
                Expr::Function { args, .. } => stack.extend(args.iter().map(|a| (a, h + 1))),
                Expr::BinaryOp { left, right, .. } => {
                    stack.push((left, h + 1));
                    stack.push((right, h + 1));
                }
                _ => {}
            }
        }
        max
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    // Comparison
    Lt,
    Gt,
    Eq,
    LtEq,
    GtEq,
    NotEq,
    // String
    Concat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// `target = expr`: derive (or overwrite) a column.
    Assign { target: String, expr: Expr },
    /// Bare expression: must be TRUE on every row.
    Check(Expr),
}

/// True for lines the evaluator ignores entirely.
pub fn is_comment_or_blank(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

pub fn parse_rule(text: &str) -> Result<Rule, String> {
    let tokens = tokenize(text.trim())?;
    if tokens.is_empty() {
        return Err("Empty rule".to_string());
    }

    if tokens.len() >= 2 && tokens[1] == Token::Assign {
        let target = match &tokens[0] {
            Token::Ident(name) | Token::Column(name) => name.clone(),
            _ => return Err("Assignment target must be a column name".to_string()),
        };
        let expr = parse_expr(&tokens[2..])?;
        return Ok(Rule::Assign { target, expr });
    }

    Ok(Rule::Check(parse_expr(&tokens)?))
}

/// Parse a standalone expression (no assignment).
pub fn parse(text: &str) -> Result<Expr, String> {
    let tokens = tokenize(text.trim())?;
    parse_expr(&tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    StringLit(String),
    Ident(String),
    /// Bracketed column name, e.g. [Median income]
    Column(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Ampersand,
    LParen,
    RParen,
    Comma,
    Lt,
    Gt,
    LtEq,
    GtEq,
    EqEq,
    NotEq,
    Assign,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '^' => { tokens.push(Token::Caret); chars.next(); }
            '&' => { tokens.push(Token::Ampersand); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            ',' => { tokens.push(Token::Comma); chars.next(); }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some(&'=') => { tokens.push(Token::LtEq); chars.next(); }
                    Some(&'>') => { tokens.push(Token::NotEq); chars.next(); }
                    _ => tokens.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                if let Some(&'=') = chars.peek() {
                    tokens.push(Token::GtEq);
                    chars.next();
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '=' => {
                chars.next();
                if let Some(&'=') = chars.peek() {
                    tokens.push(Token::EqEq);
                    chars.next();
                } else {
                    tokens.push(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err("Expected '=' after '!'".to_string());
                }
                tokens.push(Token::NotEq);
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        // Doubled quote is an escaped quote
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            s.push('"');
                        }
                        Some('"') => break,
                        Some(ch) => s.push(ch),
                        None => return Err("Unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::StringLit(s));
            }
            '[' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(ch) => name.push(ch),
                        None => return Err("Unterminated column name".to_string()),
                    }
                }
                if name.is_empty() {
                    return Err("Empty column name".to_string());
                }
                tokens.push(Token::Column(name));
            }
            'A'..='Z' | 'a'..='z' | '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str.parse().map_err(|_| format!("Invalid number: {}", num_str))?;
                tokens.push(Token::Number(num));
            }
            _ => return Err(format!("Unexpected character: {}", c)),
        }
    }

    Ok(tokens)
}

fn parse_expr(tokens: &[Token]) -> Result<Expr, String> {
    if tokens.is_empty() {
        return Err("Empty expression".to_string());
    }
    let (expr, pos) = parse_comparison(tokens, 0, 0)?;
    match tokens.get(pos) {
        None => Ok(expr),
        Some(Token::Assign) => Err("Unexpected '=' (use == to compare)".to_string()),
        Some(_) => Err(format!("Unexpected token at position {}", pos)),
    }
}

// `depth` counts nested parentheses, function calls, unary signs and `^`.

// Lowest precedence: comparison operators
fn parse_comparison(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_concat(tokens, pos, depth)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Lt => Op::Lt,
            Token::Gt => Op::Gt,
            Token::EqEq => Op::Eq,
            Token::LtEq => Op::LtEq,
            Token::GtEq => Op::GtEq,
            Token::NotEq => Op::NotEq,
            _ => break,
        };
        let (right, new_pos) = parse_concat(tokens, pos + 1, depth)?;
        left = binary(op, left, right)?;
        pos = new_pos;
    }

    Ok((left, pos))
}

// String concatenation (&)
fn parse_concat(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_add_sub(tokens, pos, depth)?;

    while let Some(Token::Ampersand) = tokens.get(pos) {
        let (right, new_pos) = parse_add_sub(tokens, pos + 1, depth)?;
        left = binary(Op::Concat, left, right)?;
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_add_sub(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos, depth)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1, depth)?;
        left = binary(op, left, right)?;
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_power(tokens, pos, depth)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_power(tokens, pos + 1, depth)?;
        left = binary(op, left, right)?;
        pos = new_pos;
    }

    Ok((left, pos))
}

// Exponentiation (^) - right-associative, higher precedence than * /
fn parse_power(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (base, pos) = parse_primary(tokens, pos, depth)?;

    if let Some(Token::Caret) = tokens.get(pos) {
        let (exponent, new_pos) = parse_power(tokens, pos + 1, depth + 1)?;
        return Ok((binary(Op::Pow, base, exponent)?, new_pos));
    }

    Ok((base, pos))
}

fn parse_primary(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    if depth > MAX_DEPTH {
        return Err(too_deep());
    }
    let token = tokens
        .get(pos)
        .ok_or_else(|| "Unexpected end of expression".to_string())?;

    match token {
        Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        Token::StringLit(s) => Ok((Expr::Text(s.clone()), pos + 1)),
        Token::Column(name) => Ok((Expr::Column(name.clone()), pos + 1)),
        Token::Ident(name) => {
            let upper = name.to_uppercase();
            if let Some(Token::LParen) = tokens.get(pos + 1) {
                let (args, new_pos) = parse_function_args(tokens, pos + 2, depth + 1)?;
                return Ok((Expr::Function { name: upper, args }, new_pos));
            }
            match upper.as_str() {
                "TRUE" => Ok((Expr::Boolean(true), pos + 1)),
                "FALSE" => Ok((Expr::Boolean(false), pos + 1)),
                _ => Ok((Expr::Column(name.clone()), pos + 1)),
            }
        }
        Token::LParen => {
            let (expr, pos) = parse_comparison(tokens, pos + 1, depth + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                Some(_) => Err("Expected closing parenthesis".to_string()),
                None => Err("Missing closing parenthesis".to_string()),
            }
        }
        Token::Plus => parse_primary(tokens, pos + 1, depth + 1),
        Token::Minus => {
            // Unary minus
            let (expr, pos) = parse_power(tokens, pos + 1, depth + 1)?;
            Ok((binary(Op::Sub, Expr::Number(0.0), expr)?, pos))
        }
        _ => Err(format!("Unexpected token at position {}", pos)),
    }
}

fn parse_function_args(tokens: &[Token], pos: usize, depth: usize) -> Result<(Vec<Expr>, usize), String> {
    let mut args = Vec::new();
    let mut pos = pos;

    // Empty argument list, e.g. CONCAT()
    if let Some(Token::RParen) = tokens.get(pos) {
        return Ok((args, pos + 1));
    }

    loop {
        let (arg, new_pos) = parse_comparison(tokens, pos, depth)?;
        args.push(arg);
        pos = new_pos;

        match tokens.get(pos) {
            Some(Token::Comma) => pos += 1,
            Some(Token::RParen) => return Ok((args, pos + 1)),
            Some(_) => return Err("Expected ',' or ')' in function arguments".to_string()),
            None => return Err("Missing closing parenthesis in function call".to_string()),
        }
    }
}

/// Joins two operands, refusing trees taller than [`MAX_DEPTH`]. Operator
/// chains like `a + a + ...` grow the tree without recursing in the parser.
fn binary(op: Op, left: Expr, right: Expr) -> Result<Expr, String> {
    if 1 + left.height().max(right.height()) > MAX_DEPTH {
        return Err(too_deep());
    }
    Ok(Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub(crate) fn too_deep() -> String {
    format!("expression nested too deeply (limit {})", MAX_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Expr {
        Expr::Column(name.to_string())
    }

    fn bin(op: Op, left: Expr, right: Expr) -> Expr {
        binary(op, left, right).unwrap()
    }

    #[test]
    fn test_parse_assignment() {
        let rule = parse_rule("pct_under5 = B01001_003E / B01001_001E").unwrap();
        match rule {
            Rule::Assign { target, expr } => {
                assert_eq!(target, "pct_under5");
                assert_eq!(expr, bin(Op::Div, col("B01001_003E"), col("B01001_001E")));
            }
            other => panic!("Expected Assign, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bracketed_target_and_column() {
        let rule = parse_rule("[Median Income] = [raw income] * 1").unwrap();
        assert!(matches!(rule, Rule::Assign { ref target, .. } if target == "Median Income"));
    }

    #[test]
    fn test_parse_check() {
        let rule = parse_rule("total >= 0").unwrap();
        assert_eq!(rule, Rule::Check(bin(Op::GtEq, col("total"), Expr::Number(0.0))));
    }

    #[test]
    fn test_bare_equals_outside_assignment_is_error() {
        let err = parse_rule("a + 1 = 2").unwrap_err();
        assert!(err.contains("use =="), "err: {}", err);
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 ^ 2 parses as 1 + (2 * (3 ^ 2))
        let expr = parse("1 + 2 * 3 ^ 2").unwrap();
        let expected = bin(
            Op::Add,
            Expr::Number(1.0),
            bin(Op::Mul, Expr::Number(2.0), bin(Op::Pow, Expr::Number(3.0), Expr::Number(2.0))),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_unary_minus() {
        let expr = parse("-x").unwrap();
        assert_eq!(expr, bin(Op::Sub, Expr::Number(0.0), col("x")));
    }

    #[test]
    fn test_function_call_uppercases_name() {
        let expr = parse("round(a, 2)").unwrap();
        assert_eq!(
            expr,
            Expr::Function { name: "ROUND".into(), args: vec![col("a"), Expr::Number(2.0)] }
        );
    }

    #[test]
    fn test_string_with_escaped_quote() {
        let expr = parse(r#""say ""hi""""#).unwrap();
        assert_eq!(expr, Expr::Text(r#"say "hi""#.into()));
    }

    #[test]
    fn test_not_equal_forms() {
        assert_eq!(parse("a != 1").unwrap(), parse("a <> 1").unwrap());
    }

    #[test]
    fn test_errors() {
        assert!(parse_rule("").is_err());
        assert!(parse("(a + 1").is_err());
        assert!(parse("a +").is_err());
        assert!(parse("\"open").is_err());
        assert!(parse("a $ b").is_err());
        assert!(parse("[unterminated").is_err());
        assert!(parse_rule("1 = a").is_err());
    }

    #[test]
    fn test_comment_detection() {
        assert!(is_comment_or_blank("# derived columns"));
        assert!(is_comment_or_blank("   # indented"));
        assert!(is_comment_or_blank("   "));
        assert!(!is_comment_or_blank("a = 1"));
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse(&ok).unwrap(), Expr::Number(1.0));

        let deep = format!("x = {}1{}", "(".repeat(2_000), ")".repeat(2_000));
        let err = parse_rule(&deep).unwrap_err();
        assert!(err.contains("nested too deeply"), "err: {}", err);

        let signs = format!("{}1", "-".repeat(5_000));
        assert!(parse(&signs).unwrap_err().contains("nested too deeply"));

        let calls = format!("{}1{}", "ABS(".repeat(1_000), ")".repeat(1_000));
        assert!(parse(&calls).unwrap_err().contains("nested too deeply"));
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let short = vec!["a"; 100].join(" + ");
        assert_eq!(parse(&short).unwrap().height(), 100);

        let long = format!("x = {}", vec!["a"; 200_000].join(" + "));
        let err = parse_rule(&long).unwrap_err();
        assert!(err.contains("nested too deeply"), "err: {}", err);

        let powers = vec!["2"; 5_000].join("^");
        assert!(parse(&powers).is_err());
    }

    #[test]
    fn test_height() {
        assert_eq!(Expr::Number(1.0).height(), 1);
        let e = parse("IF(a > 1, b, c + d)").unwrap();
        assert_eq!(e.height(), 3);
    }
}

//! Tokenizer and recursive-descent parser for filter predicates such as
//! `name CONTAINS[c] 'x' AND age > 8` or `ANY dogs.name BEGINSWITH 'R'`.

use crate::error::{BurrowError, Result};
use crate::value::Value;

/// A parsed filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Comparison(Comparison),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub quantifier: Quantifier,
    pub path: KeyPath,
    pub operator: Operator,
    pub case_insensitive: bool,
    pub operand: Operand,
}

/// How a comparison through a to-many link is aggregated over the linked objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Quantifier {
    #[default]
    Any,
    All,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyPath {
    pub segments: Vec<String>,
    pub aggregate: Option<Aggregate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Count,
    Min(String),
    Max(String),
    Sum(String),
    Avg(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    BeginsWith,
    EndsWith,
    Like,
    In,
    Between,
}

impl Operator {
    pub fn is_string_op(self) -> bool {
        matches!(
            self,
            Operator::Contains | Operator::BeginsWith | Operator::EndsWith | Operator::Like
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
}

const OPERATOR_WORDS: [&str; 6] = ["contains", "beginswith", "endswith", "like", "in", "between"];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    At(String),
    Str(String),
    Int(i64),
    Float(f64),
    Arg(usize),
    Op(&'static str),
    Modifier(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Dot,
}

/// Parse a predicate, substituting `$N` placeholders from `args`.
pub fn parse_predicate(input: &str, args: &[Value]) -> Result<Predicate> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        args,
        input,
    };
    let predicate = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error(&format!(
            "unexpected token {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(predicate)
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    let err = |msg: String| BurrowError::Query(format!("{msg} in predicate \"{input}\""));

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' if !chars.get(i + 1).map(|d| d.is_ascii_digit()).unwrap_or(false) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .map(|p| start + p)
                    .ok_or_else(|| err("unterminated '[' modifier".into()))?;
                tokens.push(Token::Modifier(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(err("unterminated string literal".into())),
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| err("dangling escape".into()))?;
                            s.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                let digits: String = chars[start..end].iter().collect();
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| err(format!("invalid argument placeholder '${digits}'")))?;
                tokens.push(Token::Arg(index));
                i = end;
            }
            '@' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_alphabetic() {
                    end += 1;
                }
                tokens.push(Token::At(chars[start..end].iter().collect::<String>().to_lowercase()));
                i = end;
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                let next = chars.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    ('=', Some('=')) => ("==", 2),
                    ('=', _) => ("==", 1),
                    ('!', Some('=')) => ("!=", 2),
                    ('!', _) => ("!", 1),
                    ('<', Some('=')) => ("<=", 2),
                    ('<', Some('>')) => ("!=", 2),
                    ('<', _) => ("<", 1),
                    ('>', Some('=')) => (">=", 2),
                    ('>', _) => (">", 1),
                    ('&', Some('&')) => ("&&", 2),
                    ('|', Some('|')) => ("||", 2),
                    _ => return Err(err(format!("unexpected character '{c}'"))),
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if text.contains('.') {
                    let f = text
                        .parse::<f64>()
                        .map_err(|_| err(format!("invalid number '{text}'")))?;
                    tokens.push(Token::Float(f));
                } else {
                    let n = text
                        .parse::<i64>()
                        .map_err(|_| err(format!("invalid number '{text}'")))?;
                    tokens.push(Token::Int(n));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(err(format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    args: &'a [Value],
    input: &'a str,
}

impl<'a> Parser<'a> {
    fn error(&self, msg: &str) -> BurrowError {
        BurrowError::Query(format!("{msg} in predicate \"{}\"", self.input))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Like `eat_keyword`, for words that open a clause. The word is left for
    /// the key path when an operator follows it, so `none > 0` compares a
    /// property named `none`.
    fn eat_clause_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) && !self.operator_at(self.pos + 1) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn operator_at(&self, pos: usize) -> bool {
        match self.tokens.get(pos) {
            Some(Token::Op(op)) => matches!(*op, "==" | "!=" | "<" | "<=" | ">" | ">="),
            Some(Token::Dot) | Some(Token::Modifier(_)) => true,
            Some(Token::Ident(word)) => OPERATOR_WORDS
                .iter()
                .any(|op| word.eq_ignore_ascii_case(op)),
            _ => false,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(self.error(&format!("expected {expected:?}, found {t:?}"))),
            None => Err(self.error(&format!("expected {expected:?}, found end of input"))),
        }
    }

    fn parse_or(&mut self) -> Result<Predicate> {
        let mut left = self.parse_and()?;
        loop {
            if self.eat_keyword("or") || self.eat_op("||") {
                let right = self.parse_and()?;
                left = Predicate::Or(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Predicate> {
        let mut left = self.parse_not()?;
        loop {
            if self.eat_keyword("and") || self.eat_op("&&") {
                let right = self.parse_not()?;
                left = Predicate::And(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_not(&mut self) -> Result<Predicate> {
        if self.eat_clause_keyword("not") || self.eat_op("!") {
            let inner = self.parse_not()?;
            return Ok(Predicate::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_primary(&mut self) -> Result<Predicate> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.pos += 1;
            let inner = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        if self.eat_clause_keyword("truepredicate") {
            return Ok(Predicate::True);
        }
        if self.eat_clause_keyword("falsepredicate") {
            return Ok(Predicate::False);
        }
        self.parse_comparison().map(Predicate::Comparison)
    }

    fn parse_comparison(&mut self) -> Result<Comparison> {
        let quantifier = if self.eat_clause_keyword("any") || self.eat_clause_keyword("some") {
            Quantifier::Any
        } else if self.eat_clause_keyword("all") {
            Quantifier::All
        } else if self.eat_clause_keyword("none") {
            Quantifier::None
        } else {
            Quantifier::Any
        };

        let path = self.parse_key_path()?;
        let operator = self.parse_operator()?;

        let mut case_insensitive = false;
        if let Some(Token::Modifier(m)) = self.peek().cloned() {
            self.pos += 1;
            for flag in m.chars() {
                match flag.to_ascii_lowercase() {
                    'c' => case_insensitive = true,
                    'd' => return Err(self.error("diacritic-insensitive matching is not supported")),
                    other => return Err(self.error(&format!("unknown modifier '{other}'"))),
                }
            }
        }

        let operand = match operator {
            Operator::In | Operator::Between => Operand::List(self.parse_value_list()?),
            _ => Operand::Value(self.parse_value()?),
        };

        if let (Operator::Between, Operand::List(values)) = (operator, &operand) {
            if values.len() != 2 {
                return Err(self.error("BETWEEN needs exactly two values"));
            }
        }

        Ok(Comparison {
            quantifier,
            path,
            operator,
            case_insensitive,
            operand,
        })
    }

    fn parse_key_path(&mut self) -> Result<KeyPath> {
        let mut segments = Vec::new();
        let mut aggregate = None;

        loop {
            match self.next() {
                Some(Token::Ident(name)) => segments.push(name),
                Some(Token::At(op)) => {
                    aggregate = Some(self.parse_aggregate(&op)?);
                    break;
                }
                Some(t) => return Err(self.error(&format!("expected property name, found {t:?}"))),
                None => return Err(self.error("expected property name, found end of input")),
            }
            if matches!(self.peek(), Some(Token::Dot)) {
                self.pos += 1;
            } else {
                break;
            }
        }

        if segments.is_empty() {
            return Err(self.error("collection operator needs a preceding list property"));
        }

        Ok(KeyPath {
            segments,
            aggregate,
        })
    }

    fn parse_aggregate(&mut self, op: &str) -> Result<Aggregate> {
        if op == "count" {
            return Ok(Aggregate::Count);
        }
        self.expect(Token::Dot)?;
        let field = match self.next() {
            Some(Token::Ident(f)) => f,
            _ => return Err(self.error(&format!("@{op} needs a property name"))),
        };
        match op {
            "min" => Ok(Aggregate::Min(field)),
            "max" => Ok(Aggregate::Max(field)),
            "sum" => Ok(Aggregate::Sum(field)),
            "avg" => Ok(Aggregate::Avg(field)),
            other => Err(self.error(&format!("unknown collection operator '@{other}'"))),
        }
    }

    fn parse_operator(&mut self) -> Result<Operator> {
        match self.next() {
            Some(Token::Op(op)) => match op {
                "==" => Ok(Operator::Eq),
                "!=" => Ok(Operator::Ne),
                "<" => Ok(Operator::Lt),
                "<=" => Ok(Operator::Le),
                ">" => Ok(Operator::Gt),
                ">=" => Ok(Operator::Ge),
                other => Err(self.error(&format!("unexpected operator '{other}'"))),
            },
            Some(Token::Ident(word)) => match word.to_ascii_lowercase().as_str() {
                "contains" => Ok(Operator::Contains),
                "beginswith" => Ok(Operator::BeginsWith),
                "endswith" => Ok(Operator::EndsWith),
                "like" => Ok(Operator::Like),
                "in" => Ok(Operator::In),
                "between" => Ok(Operator::Between),
                _ => Err(self.error(&format!("unknown operator '{word}'"))),
            },
            Some(t) => Err(self.error(&format!("expected operator, found {t:?}"))),
            None => Err(self.error("expected operator, found end of input")),
        }
    }

    fn parse_value_list(&mut self) -> Result<Vec<Value>> {
        if let Some(Token::Arg(_)) = self.peek() {
            return Err(self.error("list operands must be written as {a, b, ...}"));
        }
        self.expect(Token::LBrace)?;
        let mut values = Vec::new();
        if matches!(self.peek(), Some(Token::RBrace)) {
            self.pos += 1;
            return Ok(values);
        }
        loop {
            values.push(self.parse_value()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RBrace) => return Ok(values),
                _ => return Err(self.error("expected ',' or '}' in value list")),
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Int(n)) => Ok(Value::Int(n)),
            Some(Token::Float(f)) => Ok(Value::Float(f)),
            Some(Token::Arg(i)) => self.args.get(i).cloned().ok_or_else(|| {
                self.error(&format!(
                    "argument ${i} not supplied ({} given)",
                    self.args.len()
                ))
            }),
            Some(Token::Ident(word)) => match word.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "nil" | "null" => Ok(Value::Null),
                _ => Err(self.error(&format!("expected a value, found '{word}'"))),
            },
            Some(t) => Err(self.error(&format!("expected a value, found {t:?}"))),
            None => Err(self.error("expected a value, found end of input")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(p: &Predicate) -> &Comparison {
        match p {
            Predicate::Comparison(c) => c,
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_contains() {
        let p = parse_predicate("name contains 'x'", &[]).unwrap();
        let c = cmp(&p);
        assert_eq!(c.path.segments, vec!["name"]);
        assert_eq!(c.operator, Operator::Contains);
        assert_eq!(c.operand, Operand::Value(Value::from("x")));
        assert!(!c.case_insensitive);
    }

    #[test]
    fn test_precedence_or_binds_loosest() {
        let p = parse_predicate("age > 8 AND name == 'Rex' OR age < 2", &[]).unwrap();
        match p {
            Predicate::Or(left, _) => assert!(matches!(*left, Predicate::And(_, _))),
            other => panic!("expected OR at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_not_and_parentheses() {
        let p = parse_predicate("!(age >= 3 || age <= -1)", &[]).unwrap();
        match p {
            Predicate::Not(inner) => assert!(matches!(*inner, Predicate::Or(_, _))),
            other => panic!("expected NOT, got {other:?}"),
        }
    }

    #[test]
    fn test_modifier_and_quantifier() {
        let p = parse_predicate("NONE dogs.name BEGINSWITH[c] \"r\"", &[]).unwrap();
        let c = cmp(&p);
        assert_eq!(c.quantifier, Quantifier::None);
        assert_eq!(c.path.segments, vec!["dogs", "name"]);
        assert!(c.case_insensitive);
        assert!(parse_predicate("name ==[d] 'x'", &[]).is_err());
    }

    #[test]
    fn test_collection_operators() {
        let p = parse_predicate("dogs.@count > 1", &[]).unwrap();
        assert_eq!(cmp(&p).path.aggregate, Some(Aggregate::Count));

        let p = parse_predicate("dogs.@avg.age >= 4.5", &[]).unwrap();
        let c = cmp(&p);
        assert_eq!(c.path.segments, vec!["dogs"]);
        assert_eq!(c.path.aggregate, Some(Aggregate::Avg("age".into())));
        assert_eq!(c.operand, Operand::Value(Value::Float(4.5)));
    }

    #[test]
    fn test_arguments_and_lists() {
        let p = parse_predicate("age IN {1, 2, $0}", &[Value::Int(7)]).unwrap();
        assert_eq!(
            cmp(&p).operand,
            Operand::List(vec![Value::Int(1), Value::Int(2), Value::Int(7)])
        );

        let p = parse_predicate("age BETWEEN {1, 5}", &[]).unwrap();
        assert_eq!(cmp(&p).operator, Operator::Between);

        assert!(parse_predicate("age BETWEEN {1}", &[]).is_err());
        assert!(parse_predicate("name == $1", &[Value::Null]).is_err());
    }

    #[test]
    fn test_escapes_and_literals() {
        let p = parse_predicate(r"name == 'it\'s' AND owner == nil", &[]).unwrap();
        match p {
            Predicate::And(l, r) => {
                assert_eq!(cmp(&l).operand, Operand::Value(Value::from("it's")));
                assert_eq!(cmp(&r).operand, Operand::Value(Value::Null));
            }
            other => panic!("expected AND, got {other:?}"),
        }
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_predicate("name contains", &[]).is_err());
        assert!(parse_predicate("name 'x'", &[]).is_err());
        assert!(parse_predicate("(age > 1", &[]).is_err());
        assert!(parse_predicate("age > 1 age", &[]).is_err());
        assert!(parse_predicate("name == 'open", &[]).is_err());
    }

    #[test]
    fn test_keywords_as_property_names() {
        let p = parse_predicate("all == true", &[]).unwrap();
        let c = cmp(&p);
        assert_eq!(c.path.segments, vec!["all"]);
        assert_eq!(c.quantifier, Quantifier::Any);

        let p = parse_predicate("none > 0 AND not != 'x'", &[]).unwrap();
        match p {
            Predicate::And(l, r) => {
                assert_eq!(cmp(&l).path.segments, vec!["none"]);
                assert_eq!(cmp(&r).path.segments, vec!["not"]);
            }
            other => panic!("expected AND, got {other:?}"),
        }

        let p = parse_predicate("any CONTAINS[c] 'x'", &[]).unwrap();
        assert_eq!(cmp(&p).path.segments, vec!["any"]);

        let p = parse_predicate("NOT none.age IN {1, 2}", &[]).unwrap();
        match p {
            Predicate::Not(inner) => assert_eq!(cmp(&inner).path.segments, vec!["none", "age"]),
            other => panic!("expected NOT, got {other:?}"),
        }

        let p = parse_predicate("ALL dogs.age > 1", &[]).unwrap();
        assert_eq!(cmp(&p).quantifier, Quantifier::All);
        assert_eq!(
            parse_predicate("TRUEPREDICATE && falsepredicate", &[]).unwrap(),
            Predicate::And(Box::new(Predicate::True), Box::new(Predicate::False))
        );
    }

    #[test]
    fn test_true_false_predicates() {
        assert_eq!(parse_predicate("TRUEPREDICATE", &[]).unwrap(), Predicate::True);
        assert_eq!(parse_predicate("falsepredicate", &[]).unwrap(), Predicate::False);
    }
}

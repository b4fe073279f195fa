use std::fmt;
use std::str::FromStr;

/// 태그 표현식 파싱 오류이다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{expression}': {reason}")]
pub struct TagExpressionError {
    /// 원본 표현식.
    pub expression: String,
    /// 실패 사유.
    pub reason: String,
}

/// `@a and not (@b or @c)` 형태의 불리언 태그 표현식이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagExpression {
    /// 빈 표현식. 항상 참이다.
    True,
    /// 태그 리터럴.
    Literal(String),
    /// 부정.
    Not(Box<TagExpression>),
    /// 논리곱.
    And(Box<TagExpression>, Box<TagExpression>),
    /// 논리합.
    Or(Box<TagExpression>, Box<TagExpression>),
}

impl TagExpression {
    /// 표현식을 파싱한다.
    pub fn parse(expression: &str) -> Result<Self, TagExpressionError> {
        let fail = |reason: String| TagExpressionError {
            expression: expression.to_string(),
            reason,
        };
        let tokens = tokenize(expression).map_err(fail)?;
        if tokens.is_empty() {
            return Ok(TagExpression::True);
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            nesting: 0,
        };
        let (parsed, _) = parser.parse_or().map_err(fail)?;
        if let Some(extra) = parser.peek() {
            return Err(fail(format!("예상치 못한 토큰 '{extra}'")));
        }
        Ok(parsed)
    }

    /// 태그 집합에 대해 표현식을 평가한다.
    pub fn evaluate<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        match self {
            TagExpression::True => true,
            TagExpression::Literal(name) => tags.iter().any(|tag| tag.as_ref() == name),
            TagExpression::Not(inner) => !inner.evaluate(tags),
            TagExpression::And(left, right) => left.evaluate(tags) && right.evaluate(tags),
            TagExpression::Or(left, right) => left.evaluate(tags) || right.evaluate(tags),
        }
    }
}

impl FromStr for TagExpression {
    type Err = TagExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TagExpression::parse(s)
    }
}

impl fmt::Display for TagExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagExpression::True => Ok(()),
            TagExpression::Literal(name) => {
                for ch in name.chars() {
                    if ch == '(' || ch == ')' || ch == '\\' || ch.is_whitespace() {
                        write!(f, "\\")?;
                    }
                    write!(f, "{ch}")?;
                }
                Ok(())
            }
            TagExpression::Not(inner) => write!(f, "not ( {inner} )"),
            TagExpression::And(left, right) => write!(f, "( {left} and {right} )"),
            TagExpression::Or(left, right) => write!(f, "( {left} or {right} )"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    And,
    Or,
    Not,
    Open,
    Close,
    Literal(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
            Token::Not => f.write_str("not"),
            Token::Open => f.write_str("("),
            Token::Close => f.write_str(")"),
            Token::Literal(name) => f.write_str(name),
        }
    }
}

fn tokenize(expression: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut escaped = false;

    fn flush(word: &mut String, tokens: &mut Vec<Token>) {
        if word.is_empty() {
            return;
        }
        let token = match word.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            _ => Token::Literal(word.clone()),
        };
        tokens.push(token);
        word.clear();
    }

    for ch in expression.chars() {
        if escaped {
            if ch == '(' || ch == ')' || ch == '\\' || ch.is_whitespace() {
                word.push(ch);
                escaped = false;
                continue;
            }
            return Err(format!("'\\{ch}' 는 허용되지 않는 이스케이프입니다"));
        }
        match ch {
            '\\' => escaped = true,
            '(' | ')' => {
                flush(&mut word, &mut tokens);
                tokens.push(if ch == '(' { Token::Open } else { Token::Close });
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens),
            c => word.push(c),
        }
    }
    if escaped {
        return Err("표현식이 이스케이프 문자로 끝났습니다".to_string());
    }
    flush(&mut word, &mut tokens);
    Ok(tokens)
}

/// 표현식 트리의 최대 깊이.
const MAX_DEPTH: usize = 256;
const TOO_DEEP: &str = "표현식 중첩이 너무 깊습니다";

/// `or` < `and` < `not` 우선순위의 재귀 하강 파서.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    /// 괄호나 `not` 안으로 한 단계 들어간다.
    fn enter(&mut self) -> Result<(), String> {
        self.nesting += 1;
        if self.nesting > MAX_DEPTH {
            return Err(TOO_DEEP.to_string());
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<(TagExpression, usize), String> {
        let (mut left, mut depth) = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let (right, right_depth) = self.parse_and()?;
            depth = deeper(depth.max(right_depth))?;
            left = TagExpression::Or(Box::new(left), Box::new(right));
        }
        Ok((left, depth))
    }

    fn parse_and(&mut self) -> Result<(TagExpression, usize), String> {
        let (mut left, mut depth) = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let (right, right_depth) = self.parse_unary()?;
            depth = deeper(depth.max(right_depth))?;
            left = TagExpression::And(Box::new(left), Box::new(right));
        }
        Ok((left, depth))
    }

    fn parse_unary(&mut self) -> Result<(TagExpression, usize), String> {
        match self.next() {
            Some(Token::Not) => {
                self.enter()?;
                let (inner, depth) = self.parse_unary()?;
                self.nesting -= 1;
                Ok((TagExpression::Not(Box::new(inner)), deeper(depth)?))
            }
            Some(Token::Open) => {
                self.enter()?;
                let (inner, depth) = self.parse_or()?;
                self.nesting -= 1;
                match self.next() {
                    Some(Token::Close) => Ok((inner, depth)),
                    _ => Err("닫는 괄호가 없습니다".to_string()),
                }
            }
            Some(Token::Literal(name)) => Ok((TagExpression::Literal(name), 1)),
            Some(other) => Err(format!("'{other}' 위치에 태그가 와야 합니다")),
            None => Err("표현식이 중간에 끝났습니다".to_string()),
        }
    }
}

/// 트리 깊이를 한 단계 늘린다. 평가와 해제가 재귀하므로 깊이를 제한한다.
fn deeper(depth: usize) -> Result<usize, String> {
    if depth >= MAX_DEPTH {
        return Err(TOO_DEEP.to_string());
    }
    Ok(depth + 1)
}

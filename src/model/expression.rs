use super::DefinitionError;

/// Boolean combination of pointcut names
///
/// Operators are `!`, `&&`, and `||` (also spelled `not`, `and`, and `or`), from tightest to
/// loosest binding, and parentheses group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    Pointcut(String),
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Name(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

impl Expression {
    pub fn parse(text: &str) -> Result<Expression, DefinitionError> {
        let malformed = |reason: &str| DefinitionError::MalformedExpression {
            expression: text.to_owned(),
            reason: reason.to_owned(),
        };
        let tokens = tokenize(text).map_err(|reason| malformed(&reason))?;
        let mut parser = Parser { tokens, next: 0 };
        let expression = parser.or().map_err(|reason| malformed(&reason))?;
        if parser.next != parser.tokens.len() {
            return Err(malformed("unexpected trailing tokens"));
        }
        Ok(expression)
    }

    /// Every pointcut name mentioned, in order of appearance
    pub fn pointcut_names(&self) -> Vec<&str> {
        let mut names = vec![];
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expression::Pointcut(name) => names.push(name),
            Expression::Not(inner) => inner.collect_names(names),
            Expression::And(left, right) | Expression::Or(left, right) => {
                left.collect_names(names);
                right.collect_names(names);
            }
        }
    }

    /// Evaluate, deciding each pointcut with `matches`
    pub fn evaluate(&self, matches: &mut impl FnMut(&str) -> bool) -> bool {
        match self {
            Expression::Pointcut(name) => matches(name),
            Expression::Not(inner) => !inner.evaluate(matches),
            Expression::And(left, right) => left.evaluate(matches) && right.evaluate(matches),
            Expression::Or(left, right) => left.evaluate(matches) || right.evaluate(matches),
        }
    }

    /// Evaluate as a filter that may only err on the side of matching
    ///
    /// Used when `matches` only approximates the real answer from above (a class pattern that
    /// matches says nothing about its members). Negations can't be decided that way, so they
    /// count as matching.
    pub fn may_match(&self, matches: &mut impl FnMut(&str) -> bool) -> bool {
        match self {
            Expression::Pointcut(name) => matches(name),
            Expression::Not(_) => true,
            Expression::And(left, right) => left.may_match(matches) && right.may_match(matches),
            Expression::Or(left, right) => left.may_match(matches) || right.may_match(matches),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = vec![];
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | '!' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::Open,
                    ')' => Token::Close,
                    _ => Token::Not,
                });
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(format!("expected '{}{}'", c, c));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            c if is_name_char(c) => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_name_char(c) {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                tokens.push(match name.as_str() {
                    "not" | "NOT" => Token::Not,
                    "and" | "AND" => Token::And,
                    "or" | "OR" => Token::Or,
                    _ => Token::Name(name),
                });
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }
    Ok(tokens)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '.' || c == '-'
}

struct Parser {
    tokens: Vec<Token>,
    next: usize,
}

impl Parser {
    fn eat(&mut self, token: &Token) -> bool {
        if self.tokens.get(self.next) == Some(token) {
            self.next += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Expression, String> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            left = Expression::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expression, String> {
        let mut left = self.unary()?;
        while self.eat(&Token::And) {
            left = Expression::And(Box::new(left), Box::new(self.unary()?));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expression, String> {
        if self.eat(&Token::Not) {
            return Ok(Expression::Not(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Open) {
            let inner = self.or()?;
            if !self.eat(&Token::Close) {
                return Err(String::from("missing ')'"));
            }
            return Ok(inner);
        }
        match self.tokens.get(self.next) {
            Some(Token::Name(name)) => {
                let name = name.clone();
                self.next += 1;
                Ok(Expression::Pointcut(name))
            }
            Some(other) => Err(format!("unexpected {:?}", other)),
            None => Err(String::from("unexpected end of expression")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pc(name: &str) -> Box<Expression> {
        Box::new(Expression::Pointcut(name.to_owned()))
    }

    #[test]
    fn precedence() {
        assert_eq!(
            Expression::parse("a || b && !c").unwrap(),
            Expression::Or(
                pc("a"),
                Box::new(Expression::And(pc("b"), Box::new(Expression::Not(pc("c")))))
            )
        );
        assert_eq!(
            Expression::parse("(a or b) and not c").unwrap(),
            Expression::And(
                Box::new(Expression::Or(pc("a"), pc("b"))),
                Box::new(Expression::Not(pc("c")))
            )
        );
    }

    #[test]
    fn names_and_evaluation() {
        let expression = Expression::parse("save && !(log || audit)").unwrap();
        assert_eq!(expression.pointcut_names(), vec!["save", "log", "audit"]);
        assert!(expression.evaluate(&mut |name| name == "save"));
        assert!(!expression.evaluate(&mut |name| name == "save" || name == "audit"));
        assert!(expression.may_match(&mut |name| name == "save"));
        assert!(!expression.may_match(&mut |_| false));
    }

    #[test]
    fn malformed() {
        for text in ["", "a &&", "a & b", "(a || b", "a b", "a ? b"] {
            assert!(
                matches!(Expression::parse(text), Err(DefinitionError::MalformedExpression { .. })),
                "{}",
                text
            );
        }
    }
}

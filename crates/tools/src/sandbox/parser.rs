//! Recursive-descent parser producing the sandbox AST.
//!
//! Precedence, loosest first: conditional expression, `or`, `and`, `not`,
//! comparisons (chained, including `in` / `not in`), `+ -`,
//! `* / // %`, unary `- +`, `**` (right-associative), then calls,
//! indexing and attribute access.

use super::lexer::Token;
use super::SandboxError;

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Assign { target: Target, value: Expr },
    AugAssign { target: Target, op: BinOp, value: Expr },
    Import(String),
}

#[derive(Debug, Clone)]
pub enum Target {
    Name(String),
    Index { name: String, index: Expr },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "** or pow()",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    ListComp {
        element: Box<Expr>,
        var: String,
        iter: Box<Expr>,
        cond: Option<Box<Expr>>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call(Box<Expr>, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Attr(Box<Expr>, String),
}

/// Parse a whole program.
pub fn parse(tokens: &[Token]) -> Result<Vec<Stmt>, SandboxError> {
    let mut parser = Parser::new(tokens);
    let mut program = Vec::new();

    loop {
        while parser.eat(&Token::Separator) {}
        if parser.peek().is_none() {
            break;
        }
        program.push(parser.parse_stmt()?);
        match parser.peek() {
            None | Some(Token::Separator) => {}
            Some(tok) => {
                return Err(SandboxError::Syntax(format!("unexpected {tok:?}")));
            }
        }
    }

    Ok(program)
}

/// Nesting deeper than this is rejected before it can exhaust the stack.
const MAX_DEPTH: usize = 100;

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SandboxError>,
    ) -> Result<T, SandboxError> {
        if self.depth >= MAX_DEPTH {
            return Err(SandboxError::Syntax("expression nested too deeply".into()));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    fn consume(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), SandboxError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(SandboxError::Syntax(format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self) -> Result<String, SandboxError> {
        match self.consume() {
            Some(Token::Ident(name)) => Ok(name.clone()),
            _ => Err(SandboxError::Syntax("expected a name".into())),
        }
    }

    // stmt = 'import' IDENT | expr [assign_op expr]
    fn parse_stmt(&mut self) -> Result<Stmt, SandboxError> {
        if self.eat(&Token::Import) {
            return Ok(Stmt::Import(self.expect_ident()?));
        }

        let expr = self.parse_expr()?;
        let op = match self.peek() {
            Some(Token::Assign) => None,
            Some(Token::PlusAssign) => Some(BinOp::Add),
            Some(Token::MinusAssign) => Some(BinOp::Sub),
            Some(Token::StarAssign) => Some(BinOp::Mul),
            Some(Token::SlashAssign) => Some(BinOp::Div),
            _ => return Ok(Stmt::Expr(expr)),
        };
        self.consume();

        let target = match expr {
            Expr::Name(name) => Target::Name(name),
            Expr::Index(base, index) => match *base {
                Expr::Name(name) => Target::Index {
                    name,
                    index: *index,
                },
                _ => return Err(SandboxError::Syntax("cannot assign to expression".into())),
            },
            _ => return Err(SandboxError::Syntax("cannot assign to expression".into())),
        };
        let value = self.parse_expr()?;

        Ok(match op {
            None => Stmt::Assign { target, value },
            Some(op) => Stmt::AugAssign { target, op, value },
        })
    }

    // expr = or_expr ['if' or_expr 'else' expr]
    fn parse_expr(&mut self) -> Result<Expr, SandboxError> {
        self.nested(Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> Result<Expr, SandboxError> {
        let then = self.parse_or()?;
        if self.eat(&Token::If) {
            let cond = self.parse_or()?;
            self.expect(&Token::Else, "'else'")?;
            let otherwise = self.parse_expr()?;
            return Ok(Expr::IfElse {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(then)
    }

    fn parse_or(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, SandboxError> {
        if self.eat(&Token::Not) {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    // comparison = arith (cmp_op arith)*
    fn parse_comparison(&mut self) -> Result<Expr, SandboxError> {
        let first = self.parse_arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::NotEq) => CmpOp::NotEq,
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::LtEq) => CmpOp::LtEq,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::GtEq) => CmpOp::GtEq,
                Some(Token::In) => CmpOp::In,
                Some(Token::Not) if self.peek_at(1) == Some(&Token::In) => {
                    self.consume();
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.consume();
            rest.push((op, self.parse_arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    // arith = term (('+' | '-') term)*
    fn parse_arith(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // term = unary (('*' | '/' | '//' | '%') unary)*
    fn parse_term(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::DoubleSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // unary = ('-' | '+') unary | power
    fn parse_unary(&mut self) -> Result<Expr, SandboxError> {
        let op = if self.eat(&Token::Minus) {
            UnaryOp::Neg
        } else if self.eat(&Token::Plus) {
            UnaryOp::Pos
        } else {
            return self.parse_power();
        };
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    // power = postfix ['**' unary]
    fn parse_power(&mut self) -> Result<Expr, SandboxError> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::DoubleStar) {
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    // postfix = atom ('(' args ')' | '[' expr ']' | '.' IDENT)*
    fn parse_postfix(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat(&Token::LParen) {
                let args = self.parse_sequence(&Token::RParen, "')'")?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&Token::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&Token::Dot) {
                let attr = self.expect_ident()?;
                expr = Expr::Attr(Box::new(expr), attr);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Expr, SandboxError> {
        let tok = self
            .consume()
            .cloned()
            .ok_or_else(|| SandboxError::Syntax("unexpected end of input".into()))?;

        match tok {
            Token::Int(i) => Ok(Expr::Int(i)),
            Token::Float(f) => Ok(Expr::Float(f)),
            Token::Str(mut s) => {
                // Adjacent literals concatenate.
                while let Some(Token::Str(next)) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Str(s))
            }
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::None => Ok(Expr::None),
            Token::Ident(name) => Ok(Expr::Name(name)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => self.parse_list(),
            Token::LBrace => self.parse_dict(),
            other => Err(SandboxError::Syntax(format!("unexpected {other:?}"))),
        }
    }

    // list = ']' | expr 'for' IDENT 'in' or_expr ['if' or_expr] ']' | expr (',' expr)* [','] ']'
    fn parse_list(&mut self) -> Result<Expr, SandboxError> {
        if self.eat(&Token::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.parse_expr()?;
        if self.eat(&Token::For) {
            let var = self.expect_ident()?;
            self.expect(&Token::In, "'in'")?;
            let iter = self.parse_or()?;
            let cond = if self.eat(&Token::If) {
                Some(Box::new(self.parse_or()?))
            } else {
                None
            };
            self.expect(&Token::RBracket, "']'")?;
            return Ok(Expr::ListComp {
                element: Box::new(first),
                var,
                iter: Box::new(iter),
                cond,
            });
        }

        let mut items = vec![first];
        if self.eat(&Token::Comma) {
            items.extend(self.parse_sequence(&Token::RBracket, "']'")?);
        } else {
            self.expect(&Token::RBracket, "']'")?;
        }
        Ok(Expr::List(items))
    }

    fn parse_dict(&mut self) -> Result<Expr, SandboxError> {
        let mut entries = Vec::new();
        loop {
            if self.eat(&Token::RBrace) {
                break;
            }
            let key = self.parse_expr()?;
            self.expect(&Token::Colon, "':'")?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RBrace, "'}'")?;
                break;
            }
        }
        Ok(Expr::Dict(entries))
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed.
    fn parse_sequence(&mut self, close: &Token, what: &str) -> Result<Vec<Expr>, SandboxError> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                break;
            }
            items.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(close, what)?;
                break;
            }
        }
        Ok(items)
    }
}

use log::debug;

use crate::ast::{ASTNode, Expression, Function, Prototype};
use crate::lexer::{LexError, Lexer, Position, Token};
use crate::precedence::{PrecedenceTable, NOT_AN_OPERATOR};

/// Nesting bound for parenthesised expressions, call arguments and
/// tighter-binding operator suffixes, and for the height of the trees
/// built from operator chains.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Every syntactic error carries the offending token, which is left
/// unconsumed as the parser's current token, and where it starts.
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("unknown token {0} when expecting an expression at {1}")]
    ExpectedExpression(Token, Position),
    #[error("expected ')' but found {0} at {1}")]
    ExpectedCloseParen(Token, Position),
    #[error("expected ')' or ',' in argument list but found {0} at {1}")]
    ExpectedArgumentDelimiter(Token, Position),
    #[error("expected function name in prototype but found {0} at {1}")]
    ExpectedFunctionName(Token, Position),
    #[error("expected '(' in prototype but found {0} at {1}")]
    ExpectedPrototypeOpen(Token, Position),
    #[error("expected ')' in prototype but found {0} at {1}")]
    ExpectedPrototypeClose(Token, Position),
    #[error("expression nested deeper than {0} levels at {1}")]
    NestingTooDeep(usize, Position),
    #[error(transparent)]
    Lex(#[from] LexError),
}

pub type PartialParseResult = Result<Expression, ParserError>;

pub struct Parser<I> {
    lexer: Lexer<I>,
    current: Token,
    position: Position,
    operator_precedence: PrecedenceTable,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<std::str::Bytes<'a>> {
    pub fn from_source(
        input: &'a str,
        operator_precedence: PrecedenceTable,
    ) -> Result<Self, ParserError> {
        Parser::new(Lexer::from_source(input), operator_precedence)
    }
}

impl<I: Iterator<Item = u8>> Parser<I> {
    /// Creates a parser and reads its first token.
    pub fn new(
        lexer: Lexer<I>,
        operator_precedence: PrecedenceTable,
    ) -> Result<Self, ParserError> {
        let mut parser = Self {
            lexer,
            current: Token::Eof,
            position: Position::new(1, 1),
            operator_precedence,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        };
        parser.advance()?;
        Ok(parser)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn precedence(&self) -> &PrecedenceTable {
        &self.operator_precedence
    }

    /// Operators may be rebound between top-level constructs.
    pub fn precedence_mut(&mut self) -> &mut PrecedenceTable {
        &mut self.operator_precedence
    }

    /// Moves to the next token. On a lexical error the malformed text has
    /// already been consumed and the current token is left unchanged.
    pub fn advance(&mut self) -> Result<&Token, ParserError> {
        let token = self.lexer.next_token()?;
        self.current = token;
        self.position = self.lexer.position();
        Ok(&self.current)
    }

    fn unexpected(&self, error: fn(Token, Position) -> ParserError) -> ParserError {
        error(self.current.clone(), self.position)
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParserError>,
    ) -> Result<T, ParserError> {
        if self.depth >= self.max_depth {
            return Err(ParserError::NestingTooDeep(self.max_depth, self.position));
        }
        self.depth += 1;
        let res = parse(self);
        self.depth -= 1;
        res
    }

    fn current_operator(&self) -> Option<(char, i32)> {
        match self.current {
            Token::Char(op) => self.operator_precedence.lookup(op).map(|prec| (op, prec)),
            _ => None,
        }
    }

    /// Precedence of the current token as a binary operator, or
    /// [`NOT_AN_OPERATOR`].
    pub fn current_precedence(&self) -> i32 {
        match self.current_operator() {
            Some((_, prec)) => prec,
            None => NOT_AN_OPERATOR,
        }
    }

    fn parse_number_expr(&mut self) -> PartialParseResult {
        match self.current {
            Token::Number(value) => {
                self.advance()?;
                Ok(Expression::Number(value))
            }
            _ => Err(self.unexpected(ParserError::ExpectedExpression)),
        }
    }

    fn parse_paren_expr(&mut self) -> PartialParseResult {
        self.advance()?; // eat (
        let res = self.nested(|p| p.parse_expression())?;
        if self.current != Token::Char(')') {
            return Err(self.unexpected(ParserError::ExpectedCloseParen));
        }
        self.advance()?;
        Ok(res)
    }

    /// identifier, or identifier '(' [expression (',' expression)*] ')'
    pub fn parse_identifier_expr(&mut self) -> PartialParseResult {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            _ => return Err(self.unexpected(ParserError::ExpectedExpression)),
        };
        self.advance()?;

        if self.current != Token::Char('(') {
            return Ok(Expression::Variable(name));
        }
        self.advance()?;

        let mut args = Vec::new();
        if self.current != Token::Char(')') {
            loop {
                args.push(self.nested(|p| p.parse_expression())?);

                match self.current {
                    Token::Char(')') => break,
                    Token::Char(',') => {
                        self.advance()?;
                    }
                    _ => return Err(self.unexpected(ParserError::ExpectedArgumentDelimiter)),
                }
            }
        }
        self.advance()?; // eat )

        Ok(Expression::Call(name, args))
    }

    pub fn parse_primary(&mut self) -> PartialParseResult {
        match self.current {
            Token::Number(_) => self.parse_number_expr(),
            Token::Ident(_) => self.parse_identifier_expr(),
            Token::Char('(') => self.parse_paren_expr(),
            _ => Err(self.unexpected(ParserError::ExpectedExpression)),
        }
    }

    /// Folds `[op primary]*` onto `lhs` for every operator binding at least
    /// as tightly as `min_precedence`.
    pub fn parse_bin_op_rhs(
        &mut self,
        min_precedence: i32,
        mut lhs: Expression,
    ) -> PartialParseResult {
        let mut lhs_depth = lhs.depth();
        loop {
            let (operator, precedence) = match self.current_operator() {
                Some((op, prec)) if prec >= min_precedence => (op, prec),
                _ => return Ok(lhs),
            };
            self.advance()?;

            let mut rhs = self.parse_primary()?;

            // a tighter operator after rhs takes rhs as its left operand first
            if precedence < self.current_precedence() {
                rhs = self.nested(|p| p.parse_bin_op_rhs(precedence + 1, rhs))?;
            }

            // each fold adds a level, so long chains are bounded like nesting
            let depth = lhs_depth.max(rhs.depth()) + 1;
            if self.depth + depth > self.max_depth {
                return Err(ParserError::NestingTooDeep(self.max_depth, self.position));
            }

            lhs = Expression::Binary(operator, Box::new(lhs), Box::new(rhs));
            lhs_depth = depth;
        }
    }

    pub fn parse_expression(&mut self) -> PartialParseResult {
        let lhs = self.parse_primary()?;
        self.parse_bin_op_rhs(0, lhs)
    }

    /// name '(' identifier* ')'
    pub fn parse_prototype(&mut self) -> Result<Prototype, ParserError> {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            _ => return Err(self.unexpected(ParserError::ExpectedFunctionName)),
        };
        self.advance()?;

        if self.current != Token::Char('(') {
            return Err(self.unexpected(ParserError::ExpectedPrototypeOpen));
        }

        let mut args = Vec::new();
        while let Token::Ident(arg) = self.advance()? {
            args.push(arg.clone());
        }

        if self.current != Token::Char(')') {
            return Err(self.unexpected(ParserError::ExpectedPrototypeClose));
        }
        self.advance()?;

        Ok(Prototype { name, args })
    }

    pub fn parse_definition(&mut self) -> Result<Function, ParserError> {
        self.advance()?; // eat def
        let prototype = self.parse_prototype()?;
        let body = self.parse_expression()?;
        debug!("parsed definition of {}", prototype.name);
        Ok(Function { prototype, body })
    }

    pub fn parse_extern(&mut self) -> Result<Prototype, ParserError> {
        self.advance()?; // eat extern
        let prototype = self.parse_prototype()?;
        debug!("parsed extern {}", prototype.name);
        Ok(prototype)
    }

    pub fn parse_top_level_expr(&mut self) -> Result<Function, ParserError> {
        let body = self.parse_expression()?;
        debug!("parsed top-level expression");
        Ok(Function::anonymous(body))
    }

    /// Parses every remaining top-level construct, skipping `;` separators.
    /// Stops at the first error without attempting recovery.
    pub fn parse_program(&mut self) -> Result<Vec<ASTNode>, ParserError> {
        let mut ast = Vec::new();

        loop {
            let node = match self.current {
                Token::Eof => break,
                Token::Char(';') => {
                    self.advance()?;
                    continue;
                }
                Token::Def => ASTNode::Function(self.parse_definition()?),
                Token::Extern => ASTNode::Extern(self.parse_extern()?),
                _ => ASTNode::Function(self.parse_top_level_expr()?),
            };
            ast.push(node);
        }

        Ok(ast)
    }
}

/// Parses a whole program with the given operator table.
pub fn parse_str(
    input: &str,
    operator_precedence: PrecedenceTable,
) -> Result<Vec<ASTNode>, ParserError> {
    Parser::from_source(input, operator_precedence)?.parse_program()
}

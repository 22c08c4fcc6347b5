use std::fmt;

use log::{debug, warn};

use crate::ast::{Function, Prototype};
use crate::codegen::Codegen;
use crate::eval::{CodegenError, Evaluator};
use crate::lexer::Token;
use crate::parser::{Parser, ParserError};

/// Result of handling one top-level construct.
#[derive(Debug, PartialEq, Clone)]
pub enum Outcome {
    Definition(Function),
    Extern(Prototype),
    /// `value` is only filled in when the driver evaluates.
    Expression { function: Function, value: Option<f64> },
    ParseError(ParserError),
    CodegenError(CodegenError),
}

impl Outcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::ParseError(_) | Outcome::CodegenError(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Definition(function) => {
                write!(f, "parsed a function definition: {}", function)
            }
            Outcome::Extern(proto) => write!(f, "parsed an extern: extern {}", proto),
            Outcome::Expression {
                value: Some(value), ..
            } => write!(f, "evaluated to {}", value),
            Outcome::Expression {
                function,
                value: None,
            } => write!(f, "parsed a top-level expr: {}", function.body),
            Outcome::ParseError(err) => write!(f, "error: {}", err),
            Outcome::CodegenError(err) => write!(f, "error: {}", err),
        }
    }
}

/// Top-level loop: `def`, `extern`, bare expressions and `;` separators.
///
/// After a parse error the driver skips the offending token and carries on
/// with whatever follows.
pub struct Driver<I> {
    parser: Parser<I>,
    evaluator: Option<Evaluator>,
}

impl<I: Iterator<Item = u8>> Driver<I> {
    /// A driver that only parses.
    pub fn new(parser: Parser<I>) -> Self {
        Self {
            parser,
            evaluator: None,
        }
    }

    /// Compile definitions and externs and evaluate expressions as they
    /// are parsed.
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn parser_mut(&mut self) -> &mut Parser<I> {
        &mut self.parser
    }

    pub fn evaluator(&self) -> Option<&Evaluator> {
        self.evaluator.as_ref()
    }

    fn recover(&mut self, err: ParserError) -> Outcome {
        warn!("{}, skipping {}", err, self.parser.current());
        if let Err(skip_err) = self.parser.advance() {
            // the malformed text is consumed either way, report the first error
            debug!("error while skipping token: {}", skip_err);
        }
        Outcome::ParseError(err)
    }

    fn handle_definition(&mut self) -> Outcome {
        let function = match self.parser.parse_definition() {
            Ok(function) => function,
            Err(err) => return self.recover(err),
        };

        match self.evaluator.as_mut().map(|ev| ev.compile_fn(&function)) {
            Some(Err(err)) => Outcome::CodegenError(err),
            _ => Outcome::Definition(function),
        }
    }

    fn handle_extern(&mut self) -> Outcome {
        let proto = match self.parser.parse_extern() {
            Ok(proto) => proto,
            Err(err) => return self.recover(err),
        };

        match self.evaluator.as_mut().map(|ev| ev.compile_proto(&proto)) {
            Some(Err(err)) => Outcome::CodegenError(err),
            _ => Outcome::Extern(proto),
        }
    }

    fn handle_top_level_expression(&mut self) -> Outcome {
        let function = match self.parser.parse_top_level_expr() {
            Ok(function) => function,
            Err(err) => return self.recover(err),
        };

        match &mut self.evaluator {
            Some(evaluator) => match evaluator.run_anonymous(&function) {
                Ok(value) => Outcome::Expression {
                    function,
                    value: Some(value),
                },
                Err(err) => Outcome::CodegenError(err),
            },
            None => Outcome::Expression {
                function,
                value: None,
            },
        }
    }

    /// Handles the next top-level construct, or returns `None` at the end
    /// of input.
    pub fn handle_next(&mut self) -> Option<Outcome> {
        loop {
            let outcome = match self.parser.current() {
                Token::Eof => return None,
                // ignore top-level semicolons
                Token::Char(';') => match self.parser.advance() {
                    Ok(_) => continue,
                    Err(err) => Outcome::ParseError(err),
                },
                Token::Def => self.handle_definition(),
                Token::Extern => self.handle_extern(),
                _ => self.handle_top_level_expression(),
            };
            return Some(outcome);
        }
    }

    /// Runs until the end of input, calling `prompt` before each construct
    /// and `report` after it. Returns how many errors were reported.
    pub fn run_interactive(
        &mut self,
        mut prompt: impl FnMut(),
        mut report: impl FnMut(&Outcome),
    ) -> usize {
        let mut errors = 0;
        loop {
            prompt();
            let outcome = match self.handle_next() {
                Some(outcome) => outcome,
                None => break,
            };
            if outcome.is_error() {
                errors += 1;
            }
            report(&outcome);
        }
        errors
    }

    pub fn run(&mut self, report: impl FnMut(&Outcome)) -> usize {
        self.run_interactive(|| {}, report)
    }
}

//! Front end for the kaleidoscope toy language: a pull-based lexer, a
//! precedence-climbing parser over a mutable operator table, and a
//! tree-walking backend behind a generic [`codegen::Codegen`] trait.

pub mod ast;
pub mod codegen;
pub mod driver;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod precedence;

pub use ast::{ASTNode, Expression, Function, Prototype};
pub use driver::{Driver, Outcome};
pub use lexer::{Lexer, Token};
pub use parser::{parse_str, Parser, ParserError};
pub use precedence::PrecedenceTable;

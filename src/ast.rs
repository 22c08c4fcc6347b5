use std::fmt;

/// Name given to the synthetic function wrapping a bare top-level
/// expression. Identifiers must start with a letter, so no user-declared
/// function can take this name.
pub const ANONYMOUS_NAME: &str = "__anon_expr";

#[derive(Debug, PartialEq, Clone)]
pub struct Prototype {
    pub name: String,
    pub args: Vec<String>,
}

impl Prototype {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_NAME, Vec::new())
    }

    pub fn is_anonymous(&self) -> bool {
        self.name == ANONYMOUS_NAME
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Number(f64),
    Variable(String),
    Binary(char, Box<Expression>, Box<Expression>),
    Call(String, Vec<Expression>),
}

impl Expression {
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn binary(op: char, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call(callee.into(), args)
    }

    /// Height of the tree, counting a leaf as 1.
    ///
    /// Walks with an explicit stack so arbitrarily deep trees can be measured.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut pending = vec![(self, 1)];
        while let Some((expr, depth)) = pending.pop() {
            max = max.max(depth);
            match expr {
                Expression::Binary(_, lhs, rhs) => {
                    pending.push((lhs.as_ref(), depth + 1));
                    pending.push((rhs.as_ref(), depth + 1));
                }
                Expression::Call(_, args) => {
                    pending.extend(args.iter().map(|arg| (arg, depth + 1)));
                }
                Expression::Number(_) | Expression::Variable(_) => {}
            }
        }
        max
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub prototype: Prototype,
    pub body: Expression,
}

impl Function {
    /// Wraps a bare expression in a zero-argument anonymous function.
    pub fn anonymous(body: Expression) -> Self {
        Self {
            prototype: Prototype::anonymous(),
            body,
        }
    }
}

/// A parsed top-level unit that produces something for a code generator.
#[derive(Debug, PartialEq, Clone)]
pub enum ASTNode {
    Extern(Prototype),
    Function(Function),
}

impl From<Prototype> for ASTNode {
    fn from(proto: Prototype) -> Self {
        ASTNode::Extern(proto)
    }
}

impl From<Function> for ASTNode {
    fn from(function: Function) -> Self {
        ASTNode::Function(function)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Number(value) => write!(f, "{}", value),
            Expression::Variable(name) => write!(f, "{}", name),
            Expression::Binary(op, lhs, rhs) => write!(f, "({} {} {})", op, lhs, rhs),
            Expression::Call(callee, args) => {
                write!(f, "(call {}", callee)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(" "))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def {} {}", self.prototype, self.body)
    }
}

impl fmt::Display for ASTNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ASTNode::Extern(proto) => write!(f, "extern {}", proto),
            ASTNode::Function(function) => write!(f, "{}", function),
        }
    }
}

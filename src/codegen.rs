use crate::ast::{ASTNode, Expression, Function, Prototype};

/// A backend that turns AST nodes into target values.
///
/// The AST knows nothing about its consumers; an implementor matches on
/// [`Expression`] itself and decides what a number, variable, operator or
/// call means for its target.
pub trait Codegen {
    /// What an expression lowers to.
    type Value;
    /// Handle to a declared or defined function.
    type Function;
    type Error;

    fn codegen_expr(&mut self, expr: &Expression) -> Result<Self::Value, Self::Error>;

    fn compile_proto(&mut self, proto: &Prototype) -> Result<Self::Function, Self::Error>;

    fn compile_fn(&mut self, function: &Function) -> Result<Self::Function, Self::Error>;

    fn codegen(&mut self, node: &ASTNode) -> Result<Self::Function, Self::Error> {
        match node {
            ASTNode::Function(func) => self.compile_fn(func),
            ASTNode::Extern(proto) => self.compile_proto(proto),
        }
    }

    fn codegen_all(&mut self, ast_nodes: &[ASTNode]) -> Result<Vec<Self::Function>, Self::Error> {
        ast_nodes.iter().map(|node| self.codegen(node)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use crate::precedence::PrecedenceTable;
    use pretty_assertions::assert_eq;

    /// Lowers expressions to postfix instructions.
    #[derive(Default)]
    struct Postfix {
        declared: Vec<String>,
    }

    impl Codegen for Postfix {
        type Value = Vec<String>;
        type Function = String;
        type Error = String;

        fn codegen_expr(&mut self, expr: &Expression) -> Result<Vec<String>, String> {
            Ok(match expr {
                Expression::Number(value) => vec![format!("push {}", value)],
                Expression::Variable(name) => vec![format!("load {}", name)],
                Expression::Binary(op, lhs, rhs) => {
                    let mut code = self.codegen_expr(lhs)?;
                    code.extend(self.codegen_expr(rhs)?);
                    code.push(format!("op {}", op));
                    code
                }
                Expression::Call(callee, args) => {
                    if !self.declared.contains(callee) {
                        return Err(format!("unknown function {}", callee));
                    }
                    let mut code = Vec::new();
                    for arg in args {
                        code.extend(self.codegen_expr(arg)?);
                    }
                    code.push(format!("call {} {}", callee, args.len()));
                    code
                }
            })
        }

        fn compile_proto(&mut self, proto: &Prototype) -> Result<String, String> {
            self.declared.push(proto.name.clone());
            Ok(format!("declare {}/{}", proto.name, proto.args.len()))
        }

        fn compile_fn(&mut self, function: &Function) -> Result<String, String> {
            let header = self.compile_proto(&function.prototype)?;
            let body = self.codegen_expr(&function.body)?;
            Ok(format!("{}: {}", header, body.join("; ")))
        }
    }

    #[test]
    fn codegen_dispatches_per_node() {
        let ast = parse_str(
            "extern sin(x); def thing(x) sin(x) * x; thing(2)",
            PrecedenceTable::default(),
        )
        .unwrap();
        let mut backend = Postfix::default();
        assert_eq!(
            backend.codegen_all(&ast).unwrap(),
            vec![
                "declare sin/1".to_string(),
                "declare thing/1: load x; call sin 1; load x; op *".to_string(),
                "declare __anon_expr/0: push 2; call thing 1".to_string(),
            ]
        );
    }

    #[test]
    fn codegen_stops_at_first_error() {
        let ast = parse_str("missing(1); 2", PrecedenceTable::default()).unwrap();
        let mut backend = Postfix::default();
        assert_eq!(
            backend.codegen_all(&ast),
            Err("unknown function missing".to_string())
        );
    }
}

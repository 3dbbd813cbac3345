use std::fmt;

use crate::{
    ast::{BinaryOp, Decl, Expr, ExprKind, FunctionDecl, Program, Stmt, UnaryOp, VarDecl},
    resolver::{Resolution, Symbol},
    types::Type,
};

/// Checks the typing rules over a resolved AST.
///
/// Every expression gets a type; `Unknown` stands in wherever a type cannot
/// be determined and silently satisfies every later comparison, so a single
/// mistake produces a single diagnostic.
pub struct Checker<'res> {
    resolution: &'res Resolution,
    diagnostics: Vec<Diagnostic>,
    /// Declared return type of the function being checked.
    ret_type: Option<Type>,
    saw_return: bool,
    /// Loop nesting depth, kept for future `break`/`continue` support.
    loop_depth: u32,
}

impl<'res> Checker<'res> {
    pub fn new(resolution: &'res Resolution) -> Checker<'res> {
        Checker {
            resolution,
            diagnostics: Vec::new(),
            ret_type: None,
            saw_return: false,
            loop_depth: 0,
        }
    }

    pub fn check(mut self, program: &Program) -> Result<(), Vec<Diagnostic>> {
        for decl in &program.decls {
            match decl {
                Decl::Function(f) => self.function_decl(f),
                Decl::Var(v) => self.var_decl(v),
            }
        }
        if self.diagnostics.is_empty() {
            Ok(())
        } else {
            Err(self.diagnostics)
        }
    }

    fn function_decl(&mut self, f: &FunctionDecl) {
        self.saw_return = false;
        self.ret_type = f.ret_type;
        for stmt in &f.body {
            self.stmt(stmt);
        }
        // Presence check, not a reachability check.
        if self.ret_type.is_some() && !self.saw_return {
            self.report(
                ErrorKind::ReturnStmtNotFound,
                Some(f.pos),
                format!("function '{}' is missing a return statement", f.name),
            );
        }
    }

    fn var_decl(&mut self, v: &VarDecl) {
        if let Some(init) = &v.init {
            let init_ty = self.expr(init);
            if !init_ty.is_unknown() && init_ty != v.ty {
                self.report(
                    ErrorKind::ErroneousVarDecl,
                    Some(v.pos),
                    format!("initializer type does not match declared type '{}'", v.ty),
                );
            }
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.stmt(s);
                }
            }
            Stmt::Expr(e) => {
                self.expr(e);
            }
            Stmt::Return { value, pos } => self.return_stmt(value.as_ref(), *pos),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.condition(cond, "if condition must be boolean");
                self.stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.stmt(else_branch);
                }
            }
            Stmt::While { cond, body } => {
                self.condition(cond, "while condition must be boolean");
                self.loop_depth += 1;
                self.stmt(body);
                self.loop_depth -= 1;
            }
            Stmt::For {
                init,
                cond,
                incr,
                body,
            } => {
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(cond) = cond {
                    self.condition(cond, "for condition must be boolean");
                }
                if let Some(incr) = incr {
                    self.expr(incr);
                }
                self.loop_depth += 1;
                self.stmt(body);
                self.loop_depth -= 1;
            }
            Stmt::VarDecl(v) => self.var_decl(v),
        }
    }

    fn condition(&mut self, cond: &Expr, message: &str) {
        let ty = self.expr(cond);
        if ty != Type::Bool && !ty.is_unknown() {
            self.report(ErrorKind::NonBooleanCondStmt, Some(cond.pos), message.into());
        }
    }

    fn return_stmt(&mut self, value: Option<&Expr>, pos: usize) {
        self.saw_return = true;
        let Some(expected) = self.ret_type else {
            if let Some(value) = value {
                self.expr(value);
                self.report(
                    ErrorKind::ErroneousReturnType,
                    Some(pos),
                    "void function should not return a value".into(),
                );
            }
            return;
        };
        let Some(value) = value else {
            self.report(
                ErrorKind::ErroneousReturnType,
                Some(pos),
                "non-void function must return a value".into(),
            );
            return;
        };
        let ty = self.expr(value);
        if !ty.is_unknown() && ty != expected {
            self.report(
                ErrorKind::ErroneousReturnType,
                Some(pos),
                "return expression type does not match function return type".into(),
            );
        }
    }

    fn expr(&mut self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::IntLit { .. } => Type::Int,
            ExprKind::FloatLit { .. } => Type::Float,
            ExprKind::StringLit(_) => Type::String,
            ExprKind::CharLit(_) => Type::Char,
            ExprKind::BoolLit(_) => Type::Bool,
            ExprKind::Ident(_) => self.identifier(expr),
            ExprKind::Unary { op, operand } => self.unary(expr, *op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.binary(expr, *op, lhs, rhs),
            ExprKind::Call { args, .. } => self.call(expr, args),
            ExprKind::Index { base, index } => self.index(base, index),
        }
    }

    fn identifier(&mut self, expr: &Expr) -> Type {
        match self.resolution.symbol_for_ident(expr.id) {
            Some(Symbol::Variable { ty }) => *ty,
            // An identifier bound to a function types as the function's
            // return type. The stock resolver never produces such a binding,
            // but resolutions assembled elsewhere may.
            Some(Symbol::Function { sig, .. }) => sig.ret_type.unwrap_or(Type::Unknown),
            None => Type::Unknown,
        }
    }

    fn unary(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr) -> Type {
        let ty = self.expr(operand);
        if ty.is_unknown() {
            return ty;
        }
        match op {
            UnaryOp::Not => {
                if ty != Type::Bool {
                    self.report(
                        ErrorKind::ExpectedBooleanExpression,
                        Some(expr.pos),
                        "logical not operator expects boolean".into(),
                    );
                }
                Type::Bool
            }
            UnaryOp::BitNot => {
                if ty != Type::Int {
                    self.report(
                        ErrorKind::AttemptedBitOpOnNonNumeric,
                        Some(expr.pos),
                        "bitwise not operator expects integer".into(),
                    );
                }
                Type::Int
            }
            UnaryOp::Neg | UnaryOp::Pos => {
                if !ty.is_numeric() {
                    self.report(
                        ErrorKind::AttemptedAddOpOnNonNumeric,
                        Some(expr.pos),
                        "unary plus/minus expect numeric operand".into(),
                    );
                }
                ty
            }
        }
    }

    fn binary(&mut self, expr: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Type {
        let left = self.expr(lhs);
        let right = self.expr(rhs);
        if left.is_unknown() || right.is_unknown() {
            return Type::Unknown;
        }
        match op {
            BinaryOp::Assign => {
                if left != right {
                    self.report(
                        ErrorKind::ExpressionTypeMismatch,
                        Some(expr.pos),
                        "assignment requires both sides to have the same type".into(),
                    );
                }
                left
            }
            BinaryOp::Or | BinaryOp::And => {
                if left != Type::Bool || right != Type::Bool {
                    self.report(
                        ErrorKind::AttemptedBoolOpOnNonBools,
                        Some(expr.pos),
                        "logical operators require boolean operands".into(),
                    );
                }
                Type::Bool
            }
            BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::BitAnd => {
                if left != Type::Int || right != Type::Int {
                    self.report(
                        ErrorKind::AttemptedBitOpOnNonNumeric,
                        Some(expr.pos),
                        "bitwise operators require integer operands".into(),
                    );
                }
                Type::Int
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if left != right {
                    self.report(
                        ErrorKind::ExpressionTypeMismatch,
                        Some(expr.pos),
                        "equality operators require operands of the same type".into(),
                    );
                }
                Type::Bool
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                if !left.is_numeric() || !right.is_numeric() {
                    self.report(
                        ErrorKind::ExpressionTypeMismatch,
                        Some(expr.pos),
                        "relational operators require numeric operands".into(),
                    );
                }
                Type::Bool
            }
            BinaryOp::Shl | BinaryOp::Shr => {
                if left != Type::Int || right != Type::Int {
                    self.report(
                        ErrorKind::AttemptedShiftOnNonInt,
                        Some(expr.pos),
                        "shift operators require integer operands".into(),
                    );
                }
                Type::Int
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                if !left.is_numeric() || !right.is_numeric() {
                    self.report(
                        ErrorKind::AttemptedAddOpOnNonNumeric,
                        Some(expr.pos),
                        "arithmetic operators require numeric operands".into(),
                    );
                    return Type::Unknown;
                }
                if left == Type::Float || right == Type::Float {
                    Type::Float
                } else {
                    Type::Int
                }
            }
        }
    }

    fn call(&mut self, expr: &Expr, args: &[Expr]) -> Type {
        let Some(Symbol::Function { sig, .. }) = self.resolution.symbol_for_call(expr.id) else {
            for arg in args {
                self.expr(arg);
            }
            return Type::Unknown;
        };
        let sig = sig.clone();
        if args.len() != sig.param_types.len() {
            self.report(
                ErrorKind::FnCallParamCount,
                Some(expr.pos),
                "function call has incorrect number of arguments".into(),
            );
        }
        for (arg, &param_ty) in args.iter().zip(&sig.param_types) {
            let arg_ty = self.expr(arg);
            if !arg_ty.is_unknown() && arg_ty != param_ty {
                self.report(
                    ErrorKind::FnCallParamType,
                    Some(arg.pos),
                    "argument type does not match parameter type".into(),
                );
            }
        }
        sig.ret_type.unwrap_or(Type::Unknown)
    }

    fn index(&mut self, base: &Expr, index: &Expr) -> Type {
        let base_ty = self.expr(base);
        let index_ty = self.expr(index);
        if index_ty != Type::Int && !index_ty.is_unknown() {
            self.report(
                ErrorKind::ExpressionTypeMismatch,
                Some(index.pos),
                "index expression must be integer".into(),
            );
        }
        base_ty
    }

    fn report(&mut self, kind: ErrorKind, pos: Option<usize>, message: String) {
        self.diagnostics.push(Diagnostic { kind, message, pos });
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    ErroneousVarDecl,
    FnCallParamCount,
    FnCallParamType,
    ErroneousReturnType,
    ExpressionTypeMismatch,
    ExpectedBooleanExpression,
    NonBooleanCondStmt,
    /// Reserved for optional children that checking requires present; no
    /// source form produces one today.
    EmptyExpression,
    AttemptedBoolOpOnNonBools,
    AttemptedBitOpOnNonNumeric,
    AttemptedShiftOnNonInt,
    AttemptedAddOpOnNonNumeric,
    ReturnStmtNotFound,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::ErroneousVarDecl => "ErroneousVarDecl",
            ErrorKind::FnCallParamCount => "FnCallParamCount",
            ErrorKind::FnCallParamType => "FnCallParamType",
            ErrorKind::ErroneousReturnType => "ErroneousReturnType",
            ErrorKind::ExpressionTypeMismatch => "ExpressionTypeMismatch",
            ErrorKind::ExpectedBooleanExpression => "ExpectedBooleanExpression",
            ErrorKind::NonBooleanCondStmt => "NonBooleanCondStmt",
            ErrorKind::EmptyExpression => "EmptyExpression",
            ErrorKind::AttemptedBoolOpOnNonBools => "AttemptedBoolOpOnNonBools",
            ErrorKind::AttemptedBitOpOnNonNumeric => "AttemptedBitOpOnNonNumeric",
            ErrorKind::AttemptedShiftOnNonInt => "AttemptedShiftOnNonInt",
            ErrorKind::AttemptedAddOpOnNonNumeric => "AttemptedAddOpOnNonNumeric",
            ErrorKind::ReturnStmtNotFound => "ReturnStmtNotFound",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    /// Byte offset of the offending node, when one is known.
    pub pos: Option<usize>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.name(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::util::test_utils::{check_errors, check_source, check_with_ret_type};

    fn kinds(diags: &[Diagnostic]) -> Vec<ErrorKind> {
        diags.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn literals_and_declarations() {
        check_source(
            r#"
            int a = 1;
            float b = 1.5;
            bool c = true;
            string d = "text";
            char e = 'x';
            "#,
        );
    }

    #[test]
    fn var_decl_mismatch() {
        // Literal mismatches are caught earlier by the parser, so use a
        // resolved name to reach the checker's rule.
        let diags = check_errors("float g; fn f() { int y = g; }");
        assert_eq!(kinds(&diags), vec![ErrorKind::ErroneousVarDecl]);
        assert_eq!(
            diags[0].to_string(),
            "[ErroneousVarDecl] initializer type does not match declared type 'int'"
        );
    }

    #[test]
    fn unary_rules() {
        check_source("fn f(bool b, int i, float g) { !b; ~i; -i; -g; +i; }");
        let diags = check_errors("fn f(int i, bool b, string s) { !i; ~b; -s; +b; }");
        assert_eq!(
            kinds(&diags),
            vec![
                ErrorKind::ExpectedBooleanExpression,
                ErrorKind::AttemptedBitOpOnNonNumeric,
                ErrorKind::AttemptedAddOpOnNonNumeric,
                ErrorKind::AttemptedAddOpOnNonNumeric,
            ]
        );
    }

    #[test]
    fn logical_operators_require_bools() {
        check_source("fn f(bool a, bool b) { a || b; a && b; }");
        let diags = check_errors("fn f(bool a, int i) { a || i; i && i; }");
        assert_eq!(
            kinds(&diags),
            vec![
                ErrorKind::AttemptedBoolOpOnNonBools,
                ErrorKind::AttemptedBoolOpOnNonBools,
            ]
        );
    }

    #[test]
    fn bitwise_and_shift_require_ints() {
        check_source("fn f(int a, int b) { a | b; a ^ b; a & b; a << b; a >> b; }");
        let diags = check_errors("fn f(int a, float g) { a | g; a ^ g; g & a; a << g; g >> a; }");
        assert_eq!(
            kinds(&diags),
            vec![
                ErrorKind::AttemptedBitOpOnNonNumeric,
                ErrorKind::AttemptedBitOpOnNonNumeric,
                ErrorKind::AttemptedBitOpOnNonNumeric,
                ErrorKind::AttemptedShiftOnNonInt,
                ErrorKind::AttemptedShiftOnNonInt,
            ]
        );
    }

    #[test]
    fn equality_requires_same_kind() {
        check_source(r#"fn f(string s, char c, bool b) { s == s; c != c; b == b; 1 == 2; }"#);
        let diags = check_errors(r#"fn f(string s) { s == 'c'; 1 != 1.5; }"#);
        // `1 != 1.5` mixes kinds; equality has no numeric widening.
        assert_eq!(
            kinds(&diags),
            vec![
                ErrorKind::ExpressionTypeMismatch,
                ErrorKind::ExpressionTypeMismatch,
            ]
        );
    }

    #[test]
    fn relational_requires_numeric() {
        check_source("fn f(int a, float g) { a < g; g <= a; a > 1; 2.5 >= g; }");
        let diags = check_errors(r#"fn f(string s) { s < s; }"#);
        assert_eq!(kinds(&diags), vec![ErrorKind::ExpressionTypeMismatch]);
    }

    #[test]
    fn arithmetic_widens_to_float() {
        check_source("fn f(int a, float g) { float x = a + g; int y = a * a; float z = g / g; }");
        let diags = check_errors("fn f(int a, float g) { int x = a + g; }");
        assert_eq!(kinds(&diags), vec![ErrorKind::ErroneousVarDecl]);
    }

    #[test]
    fn arithmetic_on_non_numeric_returns_unknown() {
        // The bad operand produces one diagnostic; the result is Unknown, so
        // the enclosing declaration stays quiet.
        let diags = check_errors(r#"fn f(string s) { int x = s + 1; }"#);
        assert_eq!(kinds(&diags), vec![ErrorKind::AttemptedAddOpOnNonNumeric]);
    }

    #[test]
    fn assignment_requires_same_kind() {
        check_source("fn f(int a, int b) { a = b; }");
        let diags = check_errors("fn f(int a, string s) { a = s; }");
        assert_eq!(kinds(&diags), vec![ErrorKind::ExpressionTypeMismatch]);
    }

    #[test]
    fn unknown_silences_cascades() {
        // `u` is unresolved: its uses type as Unknown and nothing else fires.
        let diags = check_errors("fn f() { int x = u + 1; x = u; if (u) { } }");
        assert_eq!(kinds(&diags), vec![]);
    }

    #[test]
    fn conditions_must_be_boolean() {
        check_source("fn f(bool b) { if (b) { } while (b) { } for (; b; ) { } }");
        let diags = check_errors("fn f(int i) { if (i) { } while (i) { } for (; i; ) { } }");
        assert_eq!(
            kinds(&diags),
            vec![
                ErrorKind::NonBooleanCondStmt,
                ErrorKind::NonBooleanCondStmt,
                ErrorKind::NonBooleanCondStmt,
            ]
        );
        assert_eq!(diags[0].message, "if condition must be boolean");
        assert_eq!(diags[1].message, "while condition must be boolean");
        assert_eq!(diags[2].message, "for condition must be boolean");
    }

    #[test]
    fn call_argument_rules() {
        check_source("fn g(int a, float b) { } fn f() { g(1, 2.5); }");
        let diags = check_errors("fn g(int a) { } fn f() { g(1, 2); g('c'); g(); }");
        assert_eq!(
            kinds(&diags),
            vec![
                ErrorKind::FnCallParamCount,
                ErrorKind::FnCallParamType,
                ErrorKind::FnCallParamCount,
            ]
        );
    }

    #[test]
    fn surplus_arguments_are_not_type_checked() {
        // Positional checking stops at the shorter of the two lists.
        let diags = check_errors("fn g(int a) { } fn f() { g(1, \"extra\"); }");
        assert_eq!(kinds(&diags), vec![ErrorKind::FnCallParamCount]);
    }

    #[test]
    fn call_without_return_type_is_unknown() {
        let diags = check_errors("fn g() { } fn f() { int x = g(); }");
        assert_eq!(kinds(&diags), vec![]);
    }

    #[test]
    fn return_in_void_function() {
        check_source("fn f() { return; }");
        let diags = check_errors("fn f(int a) { if (a > 0) { return 1; } else { return 0; } }");
        assert_eq!(
            kinds(&diags),
            vec![ErrorKind::ErroneousReturnType, ErrorKind::ErroneousReturnType]
        );
        assert_eq!(diags[0].message, "void function should not return a value");
    }

    #[test]
    fn declared_return_type_rules() {
        // No surface syntax declares a return type; install one directly.
        let diags = check_with_ret_type("fn f(int a) { return a; }", Type::Int);
        assert_eq!(diags, vec![]);

        let diags = check_with_ret_type("fn f(int a) { return 1.5; }", Type::Int);
        assert_eq!(kinds(&diags), vec![ErrorKind::ErroneousReturnType]);
        assert_eq!(
            diags[0].message,
            "return expression type does not match function return type"
        );

        let diags = check_with_ret_type("fn f() { return; }", Type::Int);
        assert_eq!(kinds(&diags), vec![ErrorKind::ErroneousReturnType]);
        assert_eq!(diags[0].message, "non-void function must return a value");

        let diags = check_with_ret_type("fn f(int a) { a = 1; }", Type::Int);
        assert_eq!(kinds(&diags), vec![ErrorKind::ReturnStmtNotFound]);
        assert_eq!(
            diags[0].message,
            "function 'f' is missing a return statement"
        );

        // Presence anywhere in the body satisfies the check, reachable or
        // not.
        let diags =
            check_with_ret_type("fn f(int a) { if (a > 0) { return 1; } }", Type::Int);
        assert_eq!(diags, vec![]);
    }

    #[test]
    fn index_rules() {
        check_source("fn f(int a, int i) { a[i]; a[0]; }");
        let diags = check_errors("fn f(int a, float g) { a[g]; }");
        assert_eq!(kinds(&diags), vec![ErrorKind::ExpressionTypeMismatch]);
        assert_eq!(diags[0].message, "index expression must be integer");
    }

    #[test]
    fn index_result_is_base_type() {
        check_source("fn f(string s, int i) { string c = s[i]; }");
        let diags = check_errors("fn f(string s, int i) { int c = s[i]; }");
        assert_eq!(kinds(&diags), vec![ErrorKind::ErroneousVarDecl]);
    }

    #[test]
    fn adding_an_unused_variable_changes_nothing() {
        let base = check_errors("fn f(int a) { a = a + 1; if (a) { } }");
        let extended = check_errors("int unused; fn f(int a) { a = a + 1; if (a) { } }");
        assert_eq!(base, extended);
    }
}

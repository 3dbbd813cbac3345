use std::fmt;
use std::mem;

use crate::{
    ast::{BinaryOp, Decl, Expr, ExprKind, FunctionDecl, Program, Stmt, VarDecl},
    ir,
    resolver::{Resolution, Symbol},
};

/// Lowers a resolved AST into linear three-address code.
///
/// Assumes a clean resolver and type-checker run upstream; its own
/// diagnostics cover only the forms it cannot lower, and it synthesizes a
/// plausible fallback for each so the rest of the function still lowers.
pub struct Lowerer<'res> {
    resolution: &'res Resolution,
    diagnostics: Vec<Diagnostic>,
    /// Instructions of the function currently being lowered.
    code: Vec<ir::Instr>,
    /// Reset per function.
    temp_counter: u32,
    /// Monotonic across the whole program.
    label_counter: u32,
}

impl<'res> Lowerer<'res> {
    pub fn new(resolution: &'res Resolution) -> Lowerer<'res> {
        Lowerer {
            resolution,
            diagnostics: Vec::new(),
            code: Vec::new(),
            temp_counter: 0,
            label_counter: 0,
        }
    }

    pub fn lower(
        mut self,
        program: &Program,
    ) -> Result<ir::Program, (ir::Program, Vec<Diagnostic>)> {
        self.temp_counter = 0;
        self.label_counter = 0;
        let mut out = ir::Program::default();
        for decl in &program.decls {
            match decl {
                Decl::Function(f) => {
                    let function = self.function(f);
                    out.functions.push(function);
                }
                Decl::Var(v) => {
                    let global = self.global(v);
                    out.globals.push(global);
                }
            }
        }
        if self.diagnostics.is_empty() {
            Ok(out)
        } else {
            Err((out, self.diagnostics))
        }
    }

    /// Only pure-literal initializers are carried into the IR; anything else
    /// leaves the global uninitialized and is reported.
    fn global(&mut self, v: &VarDecl) -> ir::Global {
        let init = v.init.as_ref().and_then(|init| match literal_text(init) {
            Some(text) => Some(text),
            None => {
                self.report(
                    ErrorKind::UnsupportedExpression,
                    Some(init.pos),
                    "non-literal global initializer is not supported",
                );
                None
            }
        });
        ir::Global {
            name: v.name.clone(),
            ty: v.ty,
            init,
        }
    }

    fn function(&mut self, f: &FunctionDecl) -> ir::Function {
        self.temp_counter = 0;
        for stmt in &f.body {
            self.stmt(stmt);
        }
        ir::Function {
            name: f.name.clone(),
            params: f.params.iter().map(|p| p.name.clone()).collect(),
            instructions: mem::take(&mut self.code),
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
            Stmt::Return { value, .. } => match value {
                Some(value) => {
                    let v = self.expr(value);
                    self.emit(ir::Instr::ret(v));
                }
                None => self.emit(ir::Instr::ret_void()),
            },
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.if_stmt(cond, then_branch, else_branch.as_deref()),
            Stmt::While { cond, body } => self.while_stmt(cond, body),
            Stmt::For {
                init,
                cond,
                incr,
                body,
            } => self.for_stmt(init.as_deref(), cond.as_ref(), incr.as_ref(), body),
            // IR carries no types, so a local declaration is just the
            // initializing store, if any.
            Stmt::VarDecl(v) => {
                if let Some(init) = &v.init {
                    let value = self.expr(init);
                    self.emit(ir::Instr::assign(v.name.clone(), value));
                }
            }
        }
    }

    fn if_stmt(&mut self, cond: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) {
        let cond_value = self.expr(cond);
        let then_label = self.new_label("if_then");
        // Without an else, the jump-over label doubles as the end label.
        let (else_label, end_label) = if else_branch.is_some() {
            (self.new_label("if_else"), self.new_label("if_end"))
        } else {
            let end = self.new_label("if_end");
            (end.clone(), end)
        };
        self.emit(ir::Instr::if_goto(cond_value, then_label.clone()));
        self.emit(ir::Instr::goto(else_label.clone()));
        self.emit(ir::Instr::label(then_label));
        self.stmt(then_branch);
        match else_branch {
            Some(else_branch) => {
                self.emit(ir::Instr::goto(end_label.clone()));
                self.emit(ir::Instr::label(else_label));
                self.stmt(else_branch);
                self.emit(ir::Instr::label(end_label));
            }
            None => self.emit(ir::Instr::label(else_label)),
        }
    }

    fn while_stmt(&mut self, cond: &Expr, body: &Stmt) {
        let cond_label = self.new_label("while_cond");
        let body_label = self.new_label("while_body");
        let end_label = self.new_label("while_end");
        self.emit(ir::Instr::label(cond_label.clone()));
        let cond_value = self.expr(cond);
        self.emit(ir::Instr::if_goto(cond_value, body_label.clone()));
        self.emit(ir::Instr::goto(end_label.clone()));
        self.emit(ir::Instr::label(body_label));
        self.stmt(body);
        self.emit(ir::Instr::goto(cond_label));
        self.emit(ir::Instr::label(end_label));
    }

    fn for_stmt(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        incr: Option<&Expr>,
        body: &Stmt,
    ) {
        if let Some(init) = init {
            self.stmt(init);
        }
        let cond_label = self.new_label("for_cond");
        let body_label = self.new_label("for_body");
        let end_label = self.new_label("for_end");
        self.emit(ir::Instr::label(cond_label.clone()));
        match cond {
            Some(cond) => {
                let cond_value = self.expr(cond);
                self.emit(ir::Instr::if_goto(cond_value, body_label.clone()));
                self.emit(ir::Instr::goto(end_label.clone()));
            }
            None => self.emit(ir::Instr::goto(body_label.clone())),
        }
        self.emit(ir::Instr::label(body_label));
        self.stmt(body);
        if let Some(incr) = incr {
            // The increment's value is discarded.
            self.expr(incr);
        }
        self.emit(ir::Instr::goto(cond_label));
        self.emit(ir::Instr::label(end_label));
    }

    /// Lowers an expression, returning the operand name holding its value.
    /// Identifiers pass through by name; everything else lands in a
    /// temporary.
    fn expr(&mut self, expr: &Expr) -> String {
        if let Some(text) = literal_text(expr) {
            let temp = self.new_temp();
            self.emit(ir::Instr::assign(temp.clone(), text));
            return temp;
        }
        match &expr.kind {
            ExprKind::Ident(name) => name.clone(),
            ExprKind::Unary { op, operand } => {
                let value = self.expr(operand);
                let temp = self.new_temp();
                self.emit(ir::Instr::unary(temp.clone(), op.symbol(), value));
                temp
            }
            ExprKind::Binary { op: BinaryOp::Assign, lhs, rhs } => self.assignment(lhs, rhs),
            ExprKind::Binary { op, lhs, rhs } => {
                let left = self.expr(lhs);
                let right = self.expr(rhs);
                let temp = self.new_temp();
                self.emit(ir::Instr::binary(temp.clone(), left, op.symbol(), right));
                temp
            }
            ExprKind::Call { callee, args } => self.call(expr, callee, args),
            ExprKind::Index { base, index } => {
                let base = self.expr(base);
                let index = self.expr(index);
                let temp = self.new_temp();
                self.emit(ir::Instr::index_load(temp.clone(), base, index));
                temp
            }
            ExprKind::IntLit { .. }
            | ExprKind::FloatLit { .. }
            | ExprKind::StringLit(_)
            | ExprKind::CharLit(_)
            | ExprKind::BoolLit(_) => unreachable!("literals are handled above"),
        }
    }

    fn assignment(&mut self, lhs: &Expr, rhs: &Expr) -> String {
        match &lhs.kind {
            ExprKind::Ident(name) => {
                let value = self.expr(rhs);
                self.emit(ir::Instr::assign(name.clone(), value));
                name.clone()
            }
            ExprKind::Index { base, index } => {
                let base = self.expr(base);
                let index = self.expr(index);
                let value = self.expr(rhs);
                self.emit(ir::Instr::index_store(base, index, value.clone()));
                value
            }
            _ => {
                self.report(
                    ErrorKind::InvalidAssignmentTarget,
                    Some(lhs.pos),
                    "invalid assignment target",
                );
                // Still lower the right side, dropping its value, so the
                // surrounding code keeps lowering.
                self.expr(rhs)
            }
        }
    }

    fn call(&mut self, call: &Expr, callee: &Expr, args: &[Expr]) -> String {
        for arg in args {
            let value = self.expr(arg);
            self.emit(ir::Instr::param(value));
        }
        let callee_name = match &callee.kind {
            ExprKind::Ident(name) => name.clone(),
            _ => "<call>".to_string(),
        };
        let has_value = matches!(
            self.resolution.symbol_for_call(call.id),
            Some(Symbol::Function { sig, .. }) if sig.ret_type.is_some()
        );
        if has_value {
            let temp = self.new_temp();
            self.emit(ir::Instr::call(temp.clone(), callee_name, args.len()));
            temp
        } else {
            self.emit(ir::Instr::call("", callee_name, args.len()));
            String::new()
        }
    }

    fn emit(&mut self, instr: ir::Instr) {
        self.code.push(instr);
    }

    fn new_temp(&mut self) -> String {
        let temp = format!("%t{}", self.temp_counter);
        self.temp_counter += 1;
        temp
    }

    fn new_label(&mut self, base: &str) -> String {
        let label = format!("{base}_{}", self.label_counter);
        self.label_counter += 1;
        label
    }

    fn report(&mut self, kind: ErrorKind, pos: Option<usize>, message: &str) {
        self.diagnostics.push(Diagnostic {
            kind,
            message: message.to_string(),
            pos,
        });
    }
}

/// The surface form of a pure literal: raw text for numbers, `true`/`false`
/// for booleans, and the decoded contents requoted for strings and chars.
fn literal_text(expr: &Expr) -> Option<String> {
    match &expr.kind {
        ExprKind::IntLit { raw, .. } | ExprKind::FloatLit { raw, .. } => Some(raw.clone()),
        ExprKind::BoolLit(b) => Some(if *b { "true" } else { "false" }.to_string()),
        ExprKind::StringLit(s) => Some(format!("\"{s}\"")),
        ExprKind::CharLit(c) => Some(format!("'{c}'")),
        _ => None,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedExpression,
    InvalidAssignmentTarget,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::UnsupportedExpression => "UnsupportedExpression",
            ErrorKind::InvalidAssignmentTarget => "InvalidAssignmentTarget",
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

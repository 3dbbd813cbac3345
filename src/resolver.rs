use std::collections::HashMap;
use std::fmt;

use crate::{
    ast::{Decl, Expr, ExprId, ExprKind, FunctionDecl, Program, Stmt, VarDecl},
    types::Type,
};

/// A resolved symbol. Function symbols keep the prototype/definition state so
/// that redeclarations can be judged against what was seen before.
#[derive(Clone, Debug, PartialEq)]
pub enum Symbol {
    Variable {
        ty: Type,
    },
    Function {
        sig: Signature,
        is_prototype: bool,
        is_defined: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub param_types: Vec<Type>,
    pub ret_type: Option<Type>,
}

impl Signature {
    /// Two signatures match when their parameter kinds agree positionally and
    /// their return types agree in presence and kind.
    pub fn matches(&self, other: &Signature) -> bool {
        self.param_types == other.param_types && self.ret_type == other.ret_type
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct SymbolId(u32);

/// Side tables produced by the resolver, keyed by expression identity.
///
/// The tree itself holds no back-edges; these maps are how later passes get
/// from a use site to its declaration.
#[derive(Debug, PartialEq)]
pub struct Resolution {
    symbols: Vec<Symbol>,
    idents: HashMap<ExprId, SymbolId>,
    calls: HashMap<ExprId, SymbolId>,
}

impl Resolution {
    /// The symbol an identifier expression resolved to, if any.
    pub fn symbol_for_ident(&self, id: ExprId) -> Option<&Symbol> {
        self.idents.get(&id).map(|&SymbolId(i)| &self.symbols[i as usize])
    }

    /// The function symbol a call expression resolved to, if any.
    pub fn symbol_for_call(&self, id: ExprId) -> Option<&Symbol> {
        self.calls.get(&id).map(|&SymbolId(i)| &self.symbols[i as usize])
    }
}

struct Frame {
    parent: Option<usize>,
    table: HashMap<String, SymbolId>,
}

/// Walks a program, declaring names frame by frame and binding every use.
///
/// Diagnostics accumulate; the walk always finishes so one bad name does not
/// hide the next one.
pub struct Resolver {
    frames: Vec<Frame>,
    current: usize,
    symbols: Vec<Symbol>,
    idents: HashMap<ExprId, SymbolId>,
    calls: HashMap<ExprId, SymbolId>,
    diagnostics: Vec<Diagnostic>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// Creates a resolver with the file-scope frame open.
    pub fn new() -> Resolver {
        Resolver {
            frames: vec![Frame {
                parent: None,
                table: HashMap::new(),
            }],
            current: 0,
            symbols: Vec::new(),
            idents: HashMap::new(),
            calls: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Pre-declares a function that has no definition in the analyzed
    /// program. The surface language has no prototype syntax, so source
    /// programs only ever reach the definition path.
    pub fn declare_function_prototype(&mut self, name: &str, sig: Signature) {
        match self.frames[self.current].table.get(name).copied() {
            None => {
                let id = self.add_symbol(Symbol::Function {
                    sig,
                    is_prototype: true,
                    is_defined: false,
                });
                self.bind(name, id);
            }
            Some(SymbolId(i)) => match &self.symbols[i as usize] {
                Symbol::Variable { .. } => self.report(
                    ErrorKind::VariableRedefinition,
                    name,
                    None,
                    "name already used for a variable in this scope",
                ),
                Symbol::Function { is_defined: true, .. } => self.report(
                    ErrorKind::FunctionPrototypeRedefinition,
                    name,
                    None,
                    "prototype appears after a definition in the same scope",
                ),
                Symbol::Function { sig: existing, .. } => {
                    if !existing.matches(&sig) {
                        self.report(
                            ErrorKind::FunctionPrototypeRedefinition,
                            name,
                            None,
                            "conflicting function prototypes in the same scope",
                        );
                    }
                }
            },
        }
    }

    pub fn resolve(
        mut self,
        program: &Program,
    ) -> Result<Resolution, (Resolution, Vec<Diagnostic>)> {
        for decl in &program.decls {
            match decl {
                Decl::Function(f) => self.function_decl(f),
                Decl::Var(v) => self.var_decl(v),
            }
        }
        let resolution = Resolution {
            symbols: self.symbols,
            idents: self.idents,
            calls: self.calls,
        };
        if self.diagnostics.is_empty() {
            Ok(resolution)
        } else {
            Err((resolution, self.diagnostics))
        }
    }

    fn function_decl(&mut self, f: &FunctionDecl) {
        let sig = Signature {
            param_types: f.params.iter().map(|p| p.ty).collect(),
            ret_type: f.ret_type,
        };
        self.declare_function_definition(&f.name, sig, Some(f.pos));
        // Parameters share the body's top-level frame.
        self.enter_scope();
        for param in &f.params {
            self.declare_variable(&param.name, param.ty, Some(f.pos));
        }
        for stmt in &f.body {
            self.stmt(stmt);
        }
        self.exit_scope();
    }

    fn var_decl(&mut self, v: &VarDecl) {
        self.declare_variable(&v.name, v.ty, Some(v.pos));
        if let Some(init) = &v.init {
            self.expr(init);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts) => {
                self.enter_scope();
                for s in stmts {
                    self.stmt(s);
                }
                self.exit_scope();
            }
            Stmt::Expr(e) => self.expr(e),
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond);
                self.stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.stmt(else_branch);
                }
            }
            Stmt::While { cond, body } => {
                self.expr(cond);
                self.stmt(body);
            }
            // One frame spans init, cond, incr and body.
            Stmt::For {
                init,
                cond,
                incr,
                body,
            } => {
                self.enter_scope();
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(cond) = cond {
                    self.expr(cond);
                }
                if let Some(incr) = incr {
                    self.expr(incr);
                }
                self.stmt(body);
                self.exit_scope();
            }
            Stmt::VarDecl(v) => self.var_decl(v),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::IntLit { .. }
            | ExprKind::FloatLit { .. }
            | ExprKind::StringLit(_)
            | ExprKind::CharLit(_)
            | ExprKind::BoolLit(_) => {}
            ExprKind::Ident(name) => self.identifier_use(name, expr),
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Call { callee, args } => {
                self.call(expr, callee, args);
            }
            ExprKind::Index { base, index } => {
                self.expr(base);
                self.expr(index);
            }
        }
    }

    fn identifier_use(&mut self, name: &str, expr: &Expr) {
        match self.lookup_variable(name) {
            Some(id) => {
                self.idents.insert(expr.id, id);
            }
            None => self.report(
                ErrorKind::UndeclaredVariableAccessed,
                name,
                Some(expr.pos),
                "use of undeclared variable",
            ),
        }
    }

    fn call(&mut self, call: &Expr, callee: &Expr, args: &[Expr]) {
        if let ExprKind::Ident(name) = &callee.kind {
            match self.lookup_function(name) {
                Some(id) => {
                    self.calls.insert(call.id, id);
                }
                None if self.lookup_variable(name).is_some() => self.report(
                    ErrorKind::UndefinedFunctionCalled,
                    name,
                    Some(call.pos),
                    "identifier is a variable, not a function",
                ),
                None => self.report(
                    ErrorKind::UndefinedFunctionCalled,
                    name,
                    Some(call.pos),
                    "call to undefined function",
                ),
            }
        } else {
            self.expr(callee);
        }
        for arg in args {
            self.expr(arg);
        }
    }

    fn declare_variable(&mut self, name: &str, ty: Type, pos: Option<usize>) {
        if self.frames[self.current].table.contains_key(name) {
            self.report(
                ErrorKind::VariableRedefinition,
                name,
                pos,
                "conflicting variable name in the same scope",
            );
            return;
        }
        let id = self.add_symbol(Symbol::Variable { ty });
        self.bind(name, id);
    }

    fn declare_function_definition(&mut self, name: &str, sig: Signature, pos: Option<usize>) {
        match self.frames[self.current].table.get(name).copied() {
            None => {
                let id = self.add_symbol(Symbol::Function {
                    sig,
                    is_prototype: false,
                    is_defined: true,
                });
                self.bind(name, id);
            }
            Some(SymbolId(i)) => match &mut self.symbols[i as usize] {
                Symbol::Variable { .. } => self.report(
                    ErrorKind::VariableRedefinition,
                    name,
                    pos,
                    "name already used for a variable in this scope",
                ),
                Symbol::Function { is_defined: true, .. } => self.report(
                    ErrorKind::FunctionPrototypeRedefinition,
                    name,
                    pos,
                    "function redefinition in the same scope",
                ),
                Symbol::Function {
                    sig: existing,
                    is_prototype,
                    is_defined,
                } => {
                    if existing.matches(&sig) {
                        *is_prototype = false;
                        *is_defined = true;
                    } else {
                        self.report(
                            ErrorKind::FunctionPrototypeRedefinition,
                            name,
                            pos,
                            "definition conflicts with previous prototype",
                        );
                    }
                }
            },
        }
    }

    fn enter_scope(&mut self) {
        self.frames.push(Frame {
            parent: Some(self.current),
            table: HashMap::new(),
        });
        self.current = self.frames.len() - 1;
    }

    fn exit_scope(&mut self) {
        self.current = self.frames[self.current]
            .parent
            .expect("attempted to pop the file scope");
    }

    fn add_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(u32::try_from(self.symbols.len()).expect("symbol arena overflow"));
        self.symbols.push(symbol);
        id
    }

    fn bind(&mut self, name: &str, id: SymbolId) {
        self.frames[self.current].table.insert(name.to_string(), id);
    }

    fn lookup(&self, name: &str) -> Option<SymbolId> {
        let mut frame = Some(self.current);
        while let Some(i) = frame {
            if let Some(&id) = self.frames[i].table.get(name) {
                return Some(id);
            }
            frame = self.frames[i].parent;
        }
        None
    }

    fn lookup_variable(&self, name: &str) -> Option<SymbolId> {
        self.lookup(name)
            .filter(|&SymbolId(i)| matches!(self.symbols[i as usize], Symbol::Variable { .. }))
    }

    fn lookup_function(&self, name: &str) -> Option<SymbolId> {
        self.lookup(name)
            .filter(|&SymbolId(i)| matches!(self.symbols[i as usize], Symbol::Function { .. }))
    }

    fn report(&mut self, kind: ErrorKind, name: &str, pos: Option<usize>, message: &str) {
        self.diagnostics.push(Diagnostic {
            kind,
            name: name.to_string(),
            message: message.to_string(),
            pos,
        });
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UndeclaredVariableAccessed,
    UndefinedFunctionCalled,
    VariableRedefinition,
    FunctionPrototypeRedefinition,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::UndeclaredVariableAccessed => "UndeclaredVariableAccessed",
            ErrorKind::UndefinedFunctionCalled => "UndefinedFunctionCalled",
            ErrorKind::VariableRedefinition => "VariableRedefinition",
            ErrorKind::FunctionPrototypeRedefinition => "FunctionPrototypeRedefinition",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    /// The name at fault.
    pub name: String,
    pub message: String,
    /// Byte offset of the offending node, when one is known.
    pub pos: Option<usize>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.name(), self.name, self.message)
    }
}

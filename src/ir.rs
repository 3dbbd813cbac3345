use std::fmt;

use crate::types::Type;

/// A lowered compilation unit: globals in declaration order, then functions.
///
/// `Display` renders the stable textual form consumed by tests and tooling.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct Program {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    /// Surface text of a pure-literal initializer, requoted for strings and
    /// chars.
    pub init: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub instructions: Vec<Instr>,
}

/// One three-address instruction. Fields a kind does not use stay empty.
///
/// Operands are plain names: a temporary `%tN`, a literal in its surface
/// form, or a user-visible variable name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instr {
    pub kind: InstrKind,
    pub dst: String,
    pub src1: String,
    pub src2: String,
    pub info: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstrKind {
    Assign,
    Unary,
    Binary,
    Label,
    Goto,
    IfGoto,
    Param,
    Call,
    Return,
    ReturnVoid,
    IndexLoad,
    IndexStore,
}

impl Instr {
    fn new(kind: InstrKind) -> Instr {
        Instr {
            kind,
            dst: String::new(),
            src1: String::new(),
            src2: String::new(),
            info: String::new(),
        }
    }

    pub fn assign(dst: impl Into<String>, src: impl Into<String>) -> Instr {
        Instr {
            dst: dst.into(),
            src1: src.into(),
            ..Instr::new(InstrKind::Assign)
        }
    }

    pub fn unary(dst: impl Into<String>, op: &str, src: impl Into<String>) -> Instr {
        Instr {
            dst: dst.into(),
            src1: src.into(),
            info: op.to_string(),
            ..Instr::new(InstrKind::Unary)
        }
    }

    pub fn binary(
        dst: impl Into<String>,
        src1: impl Into<String>,
        op: &str,
        src2: impl Into<String>,
    ) -> Instr {
        Instr {
            dst: dst.into(),
            src1: src1.into(),
            src2: src2.into(),
            info: op.to_string(),
            ..Instr::new(InstrKind::Binary)
        }
    }

    pub fn label(name: impl Into<String>) -> Instr {
        Instr {
            info: name.into(),
            ..Instr::new(InstrKind::Label)
        }
    }

    pub fn goto(target: impl Into<String>) -> Instr {
        Instr {
            info: target.into(),
            ..Instr::new(InstrKind::Goto)
        }
    }

    pub fn if_goto(cond: impl Into<String>, target: impl Into<String>) -> Instr {
        Instr {
            src1: cond.into(),
            info: target.into(),
            ..Instr::new(InstrKind::IfGoto)
        }
    }

    pub fn param(value: impl Into<String>) -> Instr {
        Instr {
            src1: value.into(),
            ..Instr::new(InstrKind::Param)
        }
    }

    /// `dst` is empty when the callee produces no value.
    pub fn call(dst: impl Into<String>, callee: impl Into<String>, argc: usize) -> Instr {
        Instr {
            dst: dst.into(),
            src1: argc.to_string(),
            info: callee.into(),
            ..Instr::new(InstrKind::Call)
        }
    }

    pub fn ret(value: impl Into<String>) -> Instr {
        Instr {
            src1: value.into(),
            ..Instr::new(InstrKind::Return)
        }
    }

    pub fn ret_void() -> Instr {
        Instr::new(InstrKind::ReturnVoid)
    }

    pub fn index_load(
        dst: impl Into<String>,
        base: impl Into<String>,
        index: impl Into<String>,
    ) -> Instr {
        Instr {
            dst: dst.into(),
            src1: base.into(),
            src2: index.into(),
            ..Instr::new(InstrKind::IndexLoad)
        }
    }

    pub fn index_store(
        base: impl Into<String>,
        index: impl Into<String>,
        src: impl Into<String>,
    ) -> Instr {
        Instr {
            dst: base.into(),
            src1: index.into(),
            src2: src.into(),
            ..Instr::new(InstrKind::IndexStore)
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Instr {
            kind,
            dst,
            src1,
            src2,
            info,
        } = self;
        match kind {
            InstrKind::Label => write!(f, "{info}:"),
            InstrKind::Goto => write!(f, "goto {info}"),
            InstrKind::IfGoto => write!(f, "if {src1} goto {info}"),
            InstrKind::Assign => write!(f, "{dst} = {src1}"),
            InstrKind::Unary => write!(f, "{dst} = {info}{src1}"),
            InstrKind::Binary => write!(f, "{dst} = {src1} {info} {src2}"),
            InstrKind::Param => write!(f, "param {src1}"),
            InstrKind::Call if dst.is_empty() => write!(f, "call {info}, {src1}"),
            InstrKind::Call => write!(f, "{dst} = call {info}, {src1}"),
            InstrKind::Return => write!(f, "return {src1}"),
            InstrKind::ReturnVoid => write!(f, "return"),
            InstrKind::IndexLoad => write!(f, "{dst} = {src1}[{src2}]"),
            InstrKind::IndexStore => write!(f, "{dst}[{src1}] = {src2}"),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for global in &self.globals {
            write!(f, "global {} {}", global.ty, global.name)?;
            if let Some(init) = &global.init {
                write!(f, " = {init}")?;
            }
            writeln!(f)?;
        }
        if !self.globals.is_empty() {
            writeln!(f)?;
        }
        for function in &self.functions {
            write!(f, "function {}(", function.name)?;
            for (i, param) in function.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                f.write_str(param)?;
            }
            writeln!(f, ")")?;
            for instr in &function.instructions {
                writeln!(f, "  {instr}")?;
            }
            writeln!(f, "end")?;
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn instruction_forms() {
        let cases = [
            (Instr::label("while_cond_0"), "while_cond_0:"),
            (Instr::goto("while_end_2"), "goto while_end_2"),
            (Instr::if_goto("%t0", "while_body_1"), "if %t0 goto while_body_1"),
            (Instr::assign("x", "%t0"), "x = %t0"),
            (Instr::unary("%t1", "-", "x"), "%t1 = -x"),
            (Instr::binary("%t2", "x", "+", "%t1"), "%t2 = x + %t1"),
            (Instr::param("%t2"), "param %t2"),
            (Instr::call("%t3", "f", 2), "%t3 = call f, 2"),
            (Instr::call("", "g", 0), "call g, 0"),
            (Instr::ret("%t3"), "return %t3"),
            (Instr::ret_void(), "return"),
            (Instr::index_load("%t4", "a", "%t0"), "%t4 = a[%t0]"),
            (Instr::index_store("a", "%t0", "%t4"), "a[%t0] = %t4"),
        ];
        for (instr, expected) in cases {
            assert_eq!(instr.to_string(), expected);
        }
    }

    #[test]
    fn program_form() {
        let program = Program {
            globals: vec![
                Global {
                    name: "x".into(),
                    ty: Type::Int,
                    init: Some("1".into()),
                },
                Global {
                    name: "s".into(),
                    ty: Type::String,
                    init: None,
                },
            ],
            functions: vec![Function {
                name: "f".into(),
                params: vec!["a".into(), "b".into()],
                instructions: vec![
                    Instr::binary("%t0", "a", "+", "b"),
                    Instr::ret("%t0"),
                ],
            }],
        };
        assert_eq!(
            program.to_string(),
            indoc! {"
                global int x = 1
                global string s

                function f(a, b)
                  %t0 = a + b
                  return %t0
                end

            "}
        );
    }

    #[test]
    fn empty_globals_print_no_separator() {
        let program = Program {
            globals: vec![],
            functions: vec![Function {
                name: "f".into(),
                params: vec![],
                instructions: vec![Instr::ret_void()],
            }],
        };
        assert_eq!(
            program.to_string(),
            "function f()\n  return\nend\n\n"
        );
    }
}

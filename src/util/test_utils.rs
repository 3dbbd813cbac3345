use crate::{
    ast::{Decl, Program},
    ir, irgen, lexer,
    parser::{self, Parser},
    resolver::{Diagnostic as ResolveDiagnostic, Resolution, Resolver},
    type_checker::{Checker, Diagnostic as TypeDiagnostic},
    types::Type,
};

pub fn parse_source(src: &str) -> Program {
    let tokens = lexer::tokenize(src).expect("source should lex");
    Parser::new(tokens).parse().expect("source should parse")
}

#[track_caller]
pub fn parse_err(src: &str) -> parser::Error {
    let tokens = lexer::tokenize(src).expect("source should lex");
    Parser::new(tokens)
        .parse()
        .expect_err("source should fail to parse")
}

#[track_caller]
pub fn resolve_source(src: &str) -> (Program, Resolution) {
    let program = parse_source(src);
    let resolution = Resolver::new()
        .resolve(&program)
        .expect("source should resolve");
    (program, resolution)
}

#[track_caller]
pub fn resolve_errors(src: &str) -> Vec<ResolveDiagnostic> {
    let program = parse_source(src);
    Resolver::new()
        .resolve(&program)
        .expect_err("source should fail to resolve")
        .1
}

/// Resolves (keeping the resolution even when names were missing) and runs
/// the checker, returning its diagnostics.
pub fn check_errors(src: &str) -> Vec<TypeDiagnostic> {
    let program = parse_source(src);
    let resolution = match Resolver::new().resolve(&program) {
        Ok(resolution) => resolution,
        Err((resolution, _)) => resolution,
    };
    match Checker::new(&resolution).check(&program) {
        Ok(()) => Vec::new(),
        Err(diags) => diags,
    }
}

/// Asserts the source resolves and type-checks cleanly.
#[track_caller]
pub fn check_source(src: &str) {
    let (program, resolution) = resolve_source(src);
    if let Err(diags) = Checker::new(&resolution).check(&program) {
        panic!("unexpected type errors: {diags:?}");
    }
}

/// Installs `ret` as the first function's declared return type, then
/// resolves and checks. The surface grammar cannot declare return types, so
/// tests for those rules patch the AST.
#[track_caller]
pub fn check_with_ret_type(src: &str, ret: Type) -> Vec<TypeDiagnostic> {
    let mut program = parse_source(src);
    set_first_fn_ret_type(&mut program, ret);
    let resolution = match Resolver::new().resolve(&program) {
        Ok(resolution) => resolution,
        Err((resolution, _)) => resolution,
    };
    match Checker::new(&resolution).check(&program) {
        Ok(()) => Vec::new(),
        Err(diags) => diags,
    }
}

#[track_caller]
pub fn lower_source(src: &str) -> ir::Program {
    let (program, resolution) = resolve_source(src);
    irgen::Lowerer::new(&resolution)
        .lower(&program)
        .expect("source should lower")
}

#[track_caller]
pub fn lower_errors(src: &str) -> (ir::Program, Vec<irgen::Diagnostic>) {
    let (program, resolution) = resolve_source(src);
    irgen::Lowerer::new(&resolution)
        .lower(&program)
        .expect_err("source should fail to lower")
}

/// Like [`lower_source`], with `int` installed as the first function's
/// declared return type.
#[track_caller]
pub fn lower_with_ret_type(src: &str) -> ir::Program {
    let mut program = parse_source(src);
    set_first_fn_ret_type(&mut program, Type::Int);
    let resolution = Resolver::new()
        .resolve(&program)
        .expect("source should resolve");
    irgen::Lowerer::new(&resolution)
        .lower(&program)
        .expect("source should lower")
}

fn set_first_fn_ret_type(program: &mut Program, ret: Type) {
    let func = program
        .decls
        .iter_mut()
        .find_map(|decl| match decl {
            Decl::Function(f) => Some(f),
            Decl::Var(_) => None,
        })
        .expect("program should declare a function");
    func.ret_type = Some(ret);
}

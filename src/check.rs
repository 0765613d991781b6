//! Semantic analysis: scope resolution, type checking and constant folding.
//!
//! The checker makes two passes over the top level. The first registers
//! every global `func`, `import func`, `var` and `const` so forward
//! references (including mutual recursion) resolve; the second checks
//! function bodies and global statements in textual order, since global
//! initializers conceptually execute in that order before `main`.
//!
//! Every expression receives exactly one type. Ill-typed expressions get
//! `Type::Error` and further operations on them stay silent, so one mistake
//! produces one report.

use crate::ast::{
    Block, DeclKind, ExprKind, Expression, Location, Program, Statement, UnaryOp,
};
use crate::diag::Diagnostics;
use crate::scope::{ConstValue, FuncSig, GlobalSymbols, Scopes, Storage, Symbol};
use crate::token::Span;
use crate::types::{Type, binary_result, cast_result, unary_result};

pub struct Checker<'d> {
    scopes: Scopes,
    diags: &'d mut Diagnostics,
    loop_depth: usize,
    /// Return type of the function currently being checked.
    return_type: Option<Type>,
    symbols: GlobalSymbols,
}

/// Checks the whole program in place, annotating every expression with its
/// type, and returns the global symbols for the IR generator and back-ends.
pub fn check_program(program: &mut Program, diags: &mut Diagnostics) -> GlobalSymbols {
    let mut checker = Checker {
        scopes: Scopes::new(),
        diags,
        loop_depth: 0,
        return_type: None,
        symbols: GlobalSymbols::default(),
    };
    checker.register_top_level(program);
    checker.check_top_level(program);
    checker.symbols
}

impl<'d> Checker<'d> {
    // Pass one: bind every top-level name. Global variable types come from
    // the annotation when present, otherwise from folding the initializer;
    // what cannot be decided yet is finalized by pass two in textual order.
    fn register_top_level(&mut self, program: &Program) {
        for statement in &program.statements {
            match statement {
                Statement::FuncDecl {
                    imported,
                    name,
                    params,
                    return_type,
                    span,
                    ..
                } => {
                    let sig = FuncSig {
                        params: params
                            .iter()
                            .map(|p| (p.name.clone(), p.ty))
                            .collect(),
                        return_type: *return_type,
                    };
                    let symbol = Symbol::Function {
                        imported: *imported,
                        sig: sig.clone(),
                    };
                    if !self.scopes.declare(name, symbol) {
                        self.diags.error(
                            *span,
                            format!("duplicate declaration of '{name}' in the same scope"),
                        );
                        continue;
                    }
                    if name == "main" {
                        self.symbols.has_main = true;
                    }
                    self.symbols.functions.push((name.clone(), sig));
                }
                Statement::VarDecl {
                    kind,
                    name,
                    declared_type,
                    init,
                    span,
                } => {
                    let folded = init.as_ref().and_then(|e| self.fold(e));
                    let ty = declared_type
                        .or(folded.map(|v| v.ty()))
                        .unwrap_or(Type::Error);
                    let symbol = match kind {
                        DeclKind::Var => Symbol::var(ty, Storage::Global),
                        DeclKind::Const => Symbol::constant(ty, Storage::Global, folded),
                    };
                    if !self.scopes.declare(name, symbol) {
                        self.diags.error(
                            *span,
                            format!("duplicate declaration of '{name}' in the same scope"),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    // Pass two: function bodies and global statements, in textual order.
    fn check_top_level(&mut self, program: &mut Program) {
        for statement in &mut program.statements {
            match statement {
                Statement::FuncDecl {
                    imported,
                    name,
                    params,
                    return_type,
                    body,
                    span,
                } => {
                    if *imported {
                        continue;
                    }
                    self.scopes.push();
                    for param in params.iter() {
                        if !self.scopes.declare(&param.name, Symbol::param(param.ty)) {
                            self.diags.error(
                                param.span,
                                format!(
                                    "duplicate declaration of '{}' in the same scope",
                                    param.name
                                ),
                            );
                        }
                    }
                    self.return_type = Some(*return_type);
                    let saved_depth = std::mem::replace(&mut self.loop_depth, 0);
                    if let Some(body) = body {
                        self.check_block_statements(body);
                        if !block_terminates(body) {
                            self.diags.error(
                                *span,
                                format!("function '{name}' falls off the end without returning"),
                            );
                        }
                    }
                    self.loop_depth = saved_depth;
                    self.return_type = None;
                    self.scopes.pop();
                }
                other => self.check_statement(other),
            }
        }
    }

    fn check_statement(&mut self, statement: &mut Statement) {
        match statement {
            Statement::VarDecl {
                kind,
                name,
                declared_type,
                init,
                span,
            } => self.check_var_decl(*kind, name, *declared_type, init.as_mut(), *span),
            // Nested function declarations were already flagged by the
            // parser; their bodies are not checked.
            Statement::FuncDecl { .. } => {}
            Statement::Assign { target, value, .. } => match target {
                Location::Name { name, span } => {
                    let binding = match self.scopes.lookup(name) {
                        Some(Symbol::Value { ty, mutable, .. }) => Some((*ty, *mutable)),
                        Some(Symbol::Function { .. }) => {
                            self.diags.error(
                                *span,
                                format!("'{name}' is a function and cannot be assigned to"),
                            );
                            None
                        }
                        None => {
                            self.diags
                                .error(*span, format!("undefined name '{name}'"));
                            None
                        }
                    };
                    let Some((lhs_ty, mutable)) = binding else {
                        self.check_expression(value, None);
                        return;
                    };
                    if !mutable {
                        self.diags
                            .error(*span, format!("cannot assign to constant '{name}'"));
                    }
                    let value_ty = self.check_expression(value, non_error(lhs_ty));
                    if value_ty != lhs_ty && !value_ty.is_error() && !lhs_ty.is_error() {
                        self.diags.error(
                            value.span,
                            format!(
                                "type error: cannot assign {value_ty} to '{name}' of type {lhs_ty}"
                            ),
                        );
                    }
                }
                Location::Mem { addr, .. } => {
                    let addr_ty = self.check_expression(addr, Some(Type::Int));
                    if addr_ty != Type::Int && !addr_ty.is_error() {
                        self.diags.error(
                            addr.span,
                            format!("memory address must be an int (got {addr_ty})"),
                        );
                    }
                    // The stored value's own type decides the write width;
                    // it gets no context of its own.
                    self.check_expression(value, None);
                }
            },
            Statement::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                self.check_condition(cond);
                self.scopes.push();
                self.check_block_statements(then_block);
                self.scopes.pop();
                if let Some(else_block) = else_block {
                    self.scopes.push();
                    self.check_block_statements(else_block);
                    self.scopes.pop();
                }
            }
            Statement::While { cond, body, .. } => {
                self.check_condition(cond);
                self.loop_depth += 1;
                self.scopes.push();
                self.check_block_statements(body);
                self.scopes.pop();
                self.loop_depth -= 1;
            }
            Statement::Break { span } => {
                if self.loop_depth == 0 {
                    self.diags.error(*span, "'break' outside of a loop");
                }
            }
            Statement::Continue { span } => {
                if self.loop_depth == 0 {
                    self.diags.error(*span, "'continue' outside of a loop");
                }
            }
            Statement::Return { value, .. } => {
                let expected = self.return_type;
                let value_ty = self.check_expression(value, expected.and_then(non_error));
                if let Some(return_type) = expected
                    && value_ty != return_type
                    && !value_ty.is_error()
                    && !return_type.is_error()
                {
                    self.diags.error(
                        value.span,
                        format!(
                            "type error: return value has type {value_ty}, expected {return_type}"
                        ),
                    );
                }
            }
            Statement::Print { value, .. } => {
                // Any scalar prints; a bare memory load has no context here.
                self.check_expression(value, None);
            }
            Statement::ExprStmt { expr, .. } => {
                self.check_expression(expr, None);
            }
        }
    }

    fn check_var_decl(
        &mut self,
        kind: DeclKind,
        name: &str,
        declared_type: Option<Type>,
        init: Option<&mut Expression>,
        span: Span,
    ) {
        let mut ty = declared_type;
        let mut folded = None;

        match init {
            Some(init) => {
                let init_ty = self.check_expression(init, declared_type.and_then(non_error));
                match ty {
                    Some(declared) => {
                        if init_ty != declared && !init_ty.is_error() && !declared.is_error() {
                            self.diags.error(
                                init.span,
                                format!(
                                    "type error: initializer for '{name}' has type {init_ty}, expected {declared}"
                                ),
                            );
                        }
                    }
                    None => ty = Some(init_ty),
                }
                if kind == DeclKind::Const {
                    folded = self.fold(init);
                    if folded.is_none() && !init.ty().is_error() {
                        self.diags.error(
                            init.span,
                            format!("const initializer for '{name}' is not a constant expression"),
                        );
                    }
                }
            }
            None => {
                if kind == DeclKind::Const {
                    self.diags.error(
                        span,
                        format!("constant declaration of '{name}' requires an initializer"),
                    );
                }
                if ty.is_none() {
                    self.diags.error(
                        span,
                        format!("variable declaration of '{name}' needs a type or an initializer"),
                    );
                    ty = Some(Type::Error);
                }
            }
        }

        let ty = ty.unwrap_or(Type::Error);
        let at_global = self.scopes.at_global_scope();
        let storage = if at_global {
            Storage::Global
        } else {
            Storage::Local
        };
        let symbol = match kind {
            DeclKind::Var => Symbol::var(ty, storage),
            DeclKind::Const => Symbol::constant(ty, storage, folded),
        };

        if at_global {
            // Registered by pass one; finalize the inferred type and folded
            // value now that the initializer has been checked.
            self.scopes.update_global(name, symbol);
            let recorded = self.symbols.globals.iter().any(|(n, _)| n == name);
            if !recorded
                && let Some(Symbol::Value {
                    ty: global_ty,
                    storage: Storage::Global,
                    ..
                }) = self.scopes.lookup(name)
            {
                self.symbols.globals.push((name.to_string(), *global_ty));
            }
        } else if !self.scopes.declare(name, symbol) {
            self.diags.error(
                span,
                format!("duplicate declaration of '{name}' in the same scope"),
            );
        }
    }

    fn check_block_statements(&mut self, block: &mut Block) {
        let mut unreachable_reported = false;
        let mut diverted = false;
        for statement in block.iter_mut() {
            if diverted && !unreachable_reported {
                self.diags.warning(statement.span(), "unreachable statement");
                unreachable_reported = true;
            }
            self.check_statement(statement);
            diverted = diverted || statement_diverts(statement);
        }
    }

    fn check_condition(&mut self, cond: &mut Expression) {
        let ty = self.check_expression(cond, Some(Type::Bool));
        if ty != Type::Bool && !ty.is_error() {
            self.diags.error(
                cond.span,
                format!("condition is not a bool (got {ty})"),
            );
        }
    }

    /// Types one expression. `expected` is the surrounding context; it is
    /// only consulted to give raw memory loads a type and never coerces
    /// anything.
    fn check_expression(&mut self, expr: &mut Expression, expected: Option<Type>) -> Type {
        let span = expr.span;
        let ty = match &mut expr.kind {
            ExprKind::Integer(_) => Type::Int,
            ExprKind::Float(_) => Type::Float,
            ExprKind::Char(_) => Type::Char,
            ExprKind::Bool(_) => Type::Bool,
            ExprKind::Name(name) => match self.scopes.lookup(name) {
                Some(Symbol::Value { ty, .. }) => *ty,
                Some(Symbol::Function { .. }) => {
                    self.diags
                        .error(span, format!("'{name}' is a function, not a variable"));
                    Type::Error
                }
                None => {
                    self.diags.error(span, format!("undefined name '{name}'"));
                    Type::Error
                }
            },
            ExprKind::Binary { op, left, right } => {
                let op = *op;
                // A memory load takes its type from the other operand, so
                // check the side that has one of its own first.
                let (left_ty, right_ty) = if is_memory_load(left) && !is_memory_load(right) {
                    let right_ty = self.check_expression(right, None);
                    let left_ty = self.check_expression(left, non_error(right_ty));
                    (left_ty, right_ty)
                } else {
                    let left_ty = self.check_expression(left, None);
                    let right_ty = self.check_expression(right, non_error(left_ty));
                    (left_ty, right_ty)
                };
                if left_ty.is_error() || right_ty.is_error() {
                    Type::Error
                } else {
                    match binary_result(op, left_ty, right_ty) {
                        Some(ty) => ty,
                        None => {
                            self.diags.error(
                                span,
                                format!(
                                    "invalid operand types for '{op}': {left_ty} and {right_ty}"
                                ),
                            );
                            Type::Error
                        }
                    }
                }
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                match op {
                    UnaryOp::Load => {
                        let addr_ty = self.check_expression(operand, Some(Type::Int));
                        if addr_ty != Type::Int && !addr_ty.is_error() {
                            self.diags.error(
                                operand.span,
                                format!("memory address must be an int (got {addr_ty})"),
                            );
                        }
                        match expected {
                            Some(ty) if !ty.is_error() => ty,
                            _ => {
                                self.diags.error(
                                    span,
                                    "memory load without inferable context; \
                                     no surrounding expression determines its type",
                                );
                                Type::Error
                            }
                        }
                    }
                    UnaryOp::Grow => {
                        let size_ty = self.check_expression(operand, Some(Type::Int));
                        if size_ty.is_error() {
                            Type::Error
                        } else if size_ty != Type::Int {
                            self.diags.error(
                                operand.span,
                                format!("memory grow '^' requires an int size (got {size_ty})"),
                            );
                            Type::Error
                        } else {
                            Type::Int
                        }
                    }
                    UnaryOp::Pos | UnaryOp::Neg | UnaryOp::Not => {
                        let context = match op {
                            // Sign passes numeric context through to its
                            // operand; logical not expects bool anyway.
                            UnaryOp::Pos | UnaryOp::Neg => {
                                expected.filter(|t| t.is_numeric())
                            }
                            _ => None,
                        };
                        let operand_ty = self.check_expression(operand, context);
                        if operand_ty.is_error() {
                            Type::Error
                        } else {
                            match unary_result(op, operand_ty) {
                                Some(ty) => ty,
                                None => {
                                    self.diags.error(
                                        span,
                                        format!(
                                            "invalid operand type for unary '{op}': {operand_ty}"
                                        ),
                                    );
                                    Type::Error
                                }
                            }
                        }
                    }
                }
            }
            ExprKind::Cast { target, value } => {
                let target = *target;
                let value_ty = self.check_expression(value, None);
                if !target.is_numeric() {
                    self.diags.error(
                        span,
                        format!("cast target must be int or float (got {target})"),
                    );
                    Type::Error
                } else if value_ty.is_error() {
                    Type::Error
                } else {
                    match cast_result(target, value_ty) {
                        Some(ty) => ty,
                        None => {
                            self.diags.error(
                                span,
                                format!("invalid cast from {value_ty} to {target}"),
                            );
                            Type::Error
                        }
                    }
                }
            }
            ExprKind::Call { name, args } => {
                let callee = match self.scopes.lookup(name) {
                    Some(Symbol::Function { sig, .. }) => Some(sig.clone()),
                    Some(Symbol::Value { kind, .. }) => {
                        let what = kind.describe();
                        self.diags
                            .error(span, format!("'{name}' is a {what}, not a function"));
                        None
                    }
                    None => {
                        self.diags.error(span, format!("undefined name '{name}'"));
                        None
                    }
                };
                match callee {
                    None => {
                        for arg in args.iter_mut() {
                            self.check_expression(arg, None);
                        }
                        Type::Error
                    }
                    Some(sig) => {
                        let name = name.clone();
                        if args.len() != sig.params.len() {
                            self.diags.error(
                                span,
                                format!(
                                    "function '{name}' expects {} argument(s), got {}",
                                    sig.params.len(),
                                    args.len()
                                ),
                            );
                        }
                        for (index, arg) in args.iter_mut().enumerate() {
                            let param_ty = sig.params.get(index).map(|(_, ty)| *ty);
                            let arg_ty =
                                self.check_expression(arg, param_ty.and_then(non_error));
                            if let Some(param_ty) = param_ty
                                && arg_ty != param_ty
                                && !arg_ty.is_error()
                                && !param_ty.is_error()
                            {
                                self.diags.error(
                                    arg.span,
                                    format!(
                                        "type error: argument {} of '{name}' has type {arg_ty}, expected {param_ty}",
                                        index + 1
                                    ),
                                );
                            }
                        }
                        sig.return_type
                    }
                }
            }
        };
        expr.ty = Some(ty);
        ty
    }

    /// Folds a pure literal expression to its compile-time value. Only
    /// total, exception-free operations fold; anything else returns `None`.
    fn fold(&self, expr: &Expression) -> Option<ConstValue> {
        match &expr.kind {
            ExprKind::Integer(v) => Some(ConstValue::Int(*v)),
            ExprKind::Float(v) => Some(ConstValue::Float(*v)),
            ExprKind::Char(v) => Some(ConstValue::Char(*v)),
            ExprKind::Bool(v) => Some(ConstValue::Bool(*v)),
            ExprKind::Name(name) => match self.scopes.lookup(name) {
                Some(Symbol::Value {
                    folded: Some(value),
                    ..
                }) => Some(*value),
                _ => None,
            },
            ExprKind::Unary { op, operand } => {
                let value = self.fold(operand)?;
                match (op, value) {
                    (UnaryOp::Pos, v @ (ConstValue::Int(_) | ConstValue::Float(_))) => Some(v),
                    (UnaryOp::Neg, ConstValue::Int(v)) => v.checked_neg().map(ConstValue::Int),
                    (UnaryOp::Neg, ConstValue::Float(v)) => Some(ConstValue::Float(-v)),
                    (UnaryOp::Not, ConstValue::Bool(v)) => Some(ConstValue::Bool(!v)),
                    _ => None,
                }
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.fold(left)?;
                let right = self.fold(right)?;
                fold_binary(*op, left, right)
            }
            ExprKind::Cast { target, value } => {
                let value = self.fold(value)?;
                match (target, value) {
                    (Type::Int, ConstValue::Int(v)) => Some(ConstValue::Int(v)),
                    (Type::Int, ConstValue::Float(v)) => Some(ConstValue::Int(v as i32)),
                    (Type::Float, ConstValue::Int(v)) => Some(ConstValue::Float(v as f64)),
                    (Type::Float, ConstValue::Float(v)) => Some(ConstValue::Float(v)),
                    _ => None,
                }
            }
            ExprKind::Call { .. } => None,
        }
    }
}

fn non_error(ty: Type) -> Option<Type> {
    (!ty.is_error()).then_some(ty)
}

fn is_memory_load(expr: &Expression) -> bool {
    matches!(
        expr.kind,
        ExprKind::Unary {
            op: UnaryOp::Load,
            ..
        }
    )
}

fn fold_binary(op: crate::ast::BinaryOp, left: ConstValue, right: ConstValue) -> Option<ConstValue> {
    use crate::ast::BinaryOp::*;
    match (left, right) {
        (ConstValue::Int(l), ConstValue::Int(r)) => match op {
            Add => l.checked_add(r).map(ConstValue::Int),
            Sub => l.checked_sub(r).map(ConstValue::Int),
            Mul => l.checked_mul(r).map(ConstValue::Int),
            // Division folds only when it cannot trap.
            Div => l.checked_div(r).map(ConstValue::Int),
            Lt => Some(ConstValue::Bool(l < r)),
            Le => Some(ConstValue::Bool(l <= r)),
            Gt => Some(ConstValue::Bool(l > r)),
            Ge => Some(ConstValue::Bool(l >= r)),
            Eq => Some(ConstValue::Bool(l == r)),
            Ne => Some(ConstValue::Bool(l != r)),
            And | Or => None,
        },
        (ConstValue::Float(l), ConstValue::Float(r)) => match op {
            Add => Some(ConstValue::Float(l + r)),
            Sub => Some(ConstValue::Float(l - r)),
            Mul => Some(ConstValue::Float(l * r)),
            Div => Some(ConstValue::Float(l / r)),
            Lt => Some(ConstValue::Bool(l < r)),
            Le => Some(ConstValue::Bool(l <= r)),
            Gt => Some(ConstValue::Bool(l > r)),
            Ge => Some(ConstValue::Bool(l >= r)),
            Eq => Some(ConstValue::Bool(l == r)),
            Ne => Some(ConstValue::Bool(l != r)),
            And | Or => None,
        },
        (ConstValue::Char(l), ConstValue::Char(r)) => match op {
            Lt => Some(ConstValue::Bool(l < r)),
            Le => Some(ConstValue::Bool(l <= r)),
            Gt => Some(ConstValue::Bool(l > r)),
            Ge => Some(ConstValue::Bool(l >= r)),
            Eq => Some(ConstValue::Bool(l == r)),
            Ne => Some(ConstValue::Bool(l != r)),
            _ => None,
        },
        (ConstValue::Bool(l), ConstValue::Bool(r)) => match op {
            Eq => Some(ConstValue::Bool(l == r)),
            Ne => Some(ConstValue::Bool(l != r)),
            And => Some(ConstValue::Bool(l && r)),
            Or => Some(ConstValue::Bool(l || r)),
            _ => None,
        },
        _ => None,
    }
}

/// Conservative all-paths-return check: the final statement must be a
/// `return`, or an `if`/`else` whose branches both terminate.
pub fn block_terminates(block: &Block) -> bool {
    match block.last() {
        Some(statement) => statement_terminates(statement),
        None => false,
    }
}

fn statement_terminates(statement: &Statement) -> bool {
    match statement {
        Statement::Return { .. } => true,
        Statement::If {
            then_block,
            else_block: Some(else_block),
            ..
        } => block_terminates(then_block) && block_terminates(else_block),
        _ => false,
    }
}

/// Whether control cannot flow past this statement; used for the
/// unreachable-statement warning.
fn statement_diverts(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::Return { .. } | Statement::Break { .. } | Statement::Continue { .. }
    ) || statement_terminates(statement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_tokens;
    use indoc::indoc;

    fn check(input: &str) -> (Program, GlobalSymbols, Diagnostics) {
        let mut diags = Diagnostics::new("test.wb");
        let tokens = tokenize(input, &mut diags);
        let mut program = parse_tokens(tokens, &mut diags);
        assert!(!diags.has_errors(), "frontend errors: {diags}");
        let symbols = check_program(&mut program, &mut diags);
        (program, symbols, diags)
    }

    fn check_clean(input: &str) -> (Program, GlobalSymbols) {
        let (program, symbols, diags) = check(input);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags}");
        (program, symbols)
    }

    fn errors(input: &str) -> String {
        let (_, _, diags) = check(input);
        assert!(diags.has_errors(), "expected errors, got none");
        diags.render()
    }

    #[test]
    fn assigns_types_to_expressions() {
        let (program, _) = check_clean("var a int = 2; print a + 3;");
        let Statement::Print { value, .. } = &program.statements[1] else {
            panic!("expected print");
        };
        assert_eq!(value.ty(), Type::Int);
    }

    #[test]
    fn infers_declaration_type_from_initializer() {
        let (_, symbols) = check_clean("var x = 2.5; const flag = true;");
        assert_eq!(
            symbols.globals,
            vec![
                ("x".to_string(), Type::Float),
                ("flag".to_string(), Type::Bool)
            ]
        );
    }

    #[test]
    fn rejects_mixed_arithmetic() {
        let rendered = errors("print 1 + 2.5;");
        assert!(rendered.contains("invalid operand types for '+': int and float"));
    }

    #[test]
    fn error_types_do_not_cascade() {
        let (_, _, diags) = check("print missing + 1 + 2 + 3;");
        assert_eq!(diags.error_count(), 1);
        assert!(diags.render().contains("undefined name 'missing'"));
    }

    #[test]
    fn rejects_duplicate_declarations_in_same_scope() {
        let rendered = errors("var x int = 1; var x float = 2.0;");
        assert!(rendered.contains("duplicate declaration of 'x' in the same scope"));
    }

    #[test]
    fn allows_shadowing_in_inner_scope() {
        check_clean(indoc! {"
            var x int = 1;
            if true {
                var x float = 2.0;
                print x;
            }
            print x;
        "});
    }

    #[test]
    fn rejects_assignment_to_constant() {
        let rendered = errors("const pi = 3.14159; pi = 3.0;");
        assert!(rendered.contains("cannot assign to constant 'pi'"));
    }

    #[test]
    fn parameters_are_mutable() {
        check_clean(indoc! {"
            func inc(n int) int {
                n = n + 1;
                return n;
            }
        "});
    }

    #[test]
    fn rejects_non_bool_condition() {
        let rendered = errors("if 1 { print 2; }");
        assert!(rendered.contains("condition is not a bool (got int)"));
    }

    #[test]
    fn rejects_break_outside_loop() {
        let rendered = errors("break;");
        assert!(rendered.contains("'break' outside of a loop"));
    }

    #[test]
    fn forward_references_between_functions_resolve() {
        check_clean(indoc! {"
            func even(n int) bool {
                if n == 0 { return true; }
                return odd(n - 1);
            }
            func odd(n int) bool {
                if n == 0 { return false; }
                return even(n - 1);
            }
        "});
    }

    #[test]
    fn rejects_wrong_argument_types_and_arity() {
        let rendered = errors(indoc! {"
            func add(a int, b int) int { return a + b; }
            var x = add(1, 2.0);
            var y = add(1);
        "});
        assert!(rendered.contains("argument 2 of 'add' has type float, expected int"));
        assert!(rendered.contains("function 'add' expects 2 argument(s), got 1"));
    }

    #[test]
    fn rejects_calling_a_variable() {
        let rendered = errors("var x int = 1; var y = x();");
        assert!(rendered.contains("'x' is a variable, not a function"));
    }

    #[test]
    fn rejects_function_used_as_variable() {
        let rendered = errors(indoc! {"
            func f() int { return 1; }
            print f + 1;
        "});
        assert!(rendered.contains("'f' is a function, not a variable"));
    }

    #[test]
    fn const_initializer_must_fold() {
        let rendered = errors("var x int = 1; const y = x + 1;");
        assert!(rendered.contains("const initializer for 'y' is not a constant expression"));
    }

    #[test]
    fn const_initializers_fold_through_other_constants() {
        check_clean(indoc! {"
            const width = 80;
            const height = 25;
            const cells = width * height;
        "});
    }

    #[test]
    fn division_by_zero_does_not_fold() {
        let rendered = errors("const boom = 1 / 0;");
        assert!(rendered.contains("const initializer for 'boom' is not a constant expression"));
    }

    #[test]
    fn memory_load_takes_type_from_assignment_context() {
        let (program, _) = check_clean("var x int = `1000;");
        let Statement::VarDecl {
            init: Some(init), ..
        } = &program.statements[0]
        else {
            panic!("expected declaration with initializer");
        };
        assert_eq!(init.ty(), Type::Int);
    }

    #[test]
    fn memory_load_takes_type_from_other_operand() {
        let (program, _) = check_clean("var sum = 1.5 + `8;");
        let Statement::VarDecl {
            init: Some(init), ..
        } = &program.statements[0]
        else {
            panic!("expected declaration with initializer");
        };
        assert_eq!(init.ty(), Type::Float);
        let ExprKind::Binary { right, .. } = &init.kind else {
            panic!("expected binary initializer");
        };
        assert_eq!(right.ty(), Type::Float);
    }

    #[test]
    fn memory_load_without_context_is_an_error() {
        let rendered = errors("print `1000;");
        assert!(rendered.contains("memory load without inferable context"));
    }

    #[test]
    fn rejects_char_and_bool_casts() {
        let rendered = errors("var c = char(65);");
        assert!(rendered.contains("cast target must be int or float (got char)"));
        let rendered = errors("var b = bool(1);");
        assert!(rendered.contains("cast target must be int or float (got bool)"));
    }

    #[test]
    fn rejects_cast_of_non_numeric_value() {
        let rendered = errors("var x = int(true);");
        assert!(rendered.contains("invalid cast from bool to int"));
    }

    #[test]
    fn function_must_return_on_every_path() {
        let rendered = errors(indoc! {"
            func sign(n int) int {
                if n < 0 { return 0 - 1; }
            }
        "});
        assert!(rendered.contains("function 'sign' falls off the end without returning"));
    }

    #[test]
    fn if_else_terminating_both_ways_is_enough() {
        check_clean(indoc! {"
            func sign(n int) int {
                if n < 0 { return 0 - 1; } else { return 1; }
            }
        "});
    }

    #[test]
    fn warns_on_unreachable_statement() {
        let (_, _, diags) = check(indoc! {"
            func f() int {
                return 1;
                print 2;
            }
        "});
        assert!(!diags.has_errors());
        assert!(diags.render().contains("warning: unreachable statement"));
    }

    #[test]
    fn bool_ordering_is_rejected() {
        let rendered = errors("print true < false;");
        assert!(rendered.contains("invalid operand types for '<': bool and bool"));
    }

    #[test]
    fn char_comparison_is_allowed() {
        let (program, _) = check_clean("print 'a' < 'b';");
        let Statement::Print { value, .. } = &program.statements[0] else {
            panic!("expected print");
        };
        assert_eq!(value.ty(), Type::Bool);
    }

    #[test]
    fn grow_requires_int_and_yields_int() {
        let (program, _) = check_clean("var size = ^1024;");
        let Statement::VarDecl {
            init: Some(init), ..
        } = &program.statements[0]
        else {
            panic!("expected declaration with initializer");
        };
        assert_eq!(init.ty(), Type::Int);
        let rendered = errors("var size = ^1.5;");
        assert!(rendered.contains("memory grow '^' requires an int size (got float)"));
    }

    #[test]
    fn program_without_main_is_legal() {
        let (_, symbols) = check_clean("var a int = 2; print a;");
        assert!(!symbols.has_main);
    }

    #[test]
    fn records_function_signatures() {
        let (_, symbols) = check_clean(indoc! {"
            import func put_char(c char) int;
            func main() int { return put_char('x'); }
        "});
        assert!(symbols.has_main);
        let sig = symbols.signature("put_char").expect("signature");
        assert_eq!(sig.params, vec![("c".to_string(), Type::Char)]);
        assert_eq!(sig.return_type, Type::Int);
    }
}

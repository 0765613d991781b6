//! Lowers the checked AST into the structured IR.
//!
//! Runs only on programs the checker passed clean, so every expression
//! already carries a concrete type; anything else is an internal invariant
//! violation, not a user error.

use std::collections::HashMap;

use anyhow::{Result, bail};

use crate::ast::{BinaryOp, ExprKind, Expression, Location, Program, Statement, UnaryOp};
use crate::ircode::{CmpOp, Instruction, IrFunction, IrProgram, IrType};
use crate::scope::GlobalSymbols;
use crate::types::Type;

/// Generates the IR program: `__init` holding all top-level non-function
/// statements, user functions in source order, and a synthesized `main`
/// when the source does not define one.
pub fn generate(program: &Program, symbols: &GlobalSymbols) -> Result<IrProgram> {
    let mut globals = Vec::new();
    let mut functions = Vec::new();

    let mut init = FunctionEmitter::new(true);
    for statement in &program.statements {
        if matches!(statement, Statement::FuncDecl { .. }) {
            continue;
        }
        init.emit_statement(statement, &mut globals)?;
    }
    functions.push(init.finish("__init", Vec::new(), IrType::I));

    for statement in &program.statements {
        let Statement::FuncDecl {
            imported: false,
            name,
            params,
            return_type,
            body: Some(body),
            ..
        } = statement
        else {
            continue;
        };
        let mut emitter = FunctionEmitter::new(false);
        let mut ir_params = Vec::new();
        for param in params {
            emitter.bind_param(&param.name);
            ir_params.push((param.name.clone(), ir_type(param.ty)?));
        }
        for statement in body {
            emitter.emit_statement(statement, &mut globals)?;
        }
        functions.push(emitter.finish(name, ir_params, ir_type(*return_type)?));
    }

    if !symbols.has_main {
        functions.push(IrFunction {
            name: "main".to_string(),
            params: Vec::new(),
            return_type: IrType::I,
            code: vec![Instruction::ConstI(0), Instruction::Return],
        });
    }

    Ok(IrProgram { globals, functions })
}

/// How a resolved name is addressed in the IR.
#[derive(Clone)]
enum Binding {
    Global(String),
    Local(String),
}

struct FunctionEmitter {
    code: Vec<Instruction>,
    /// `LOCAL_DECL` prologue entries in lexical order.
    locals: Vec<(String, IrType)>,
    scopes: Vec<HashMap<String, Binding>>,
    /// Occurrence counts per source name; shadowing declarations get
    /// suffixed IR names (`x`, `x.2`, ...) since locals are flat per
    /// function.
    used_names: HashMap<String, usize>,
    /// Scratch locals that absorb discarded call results, one per type.
    discards: HashMap<IrType, String>,
    /// In `__init`, top-scope declarations are globals.
    is_init: bool,
}

impl FunctionEmitter {
    fn new(is_init: bool) -> Self {
        Self {
            code: Vec::new(),
            locals: Vec::new(),
            scopes: vec![HashMap::new()],
            used_names: HashMap::new(),
            discards: HashMap::new(),
            is_init,
        }
    }

    fn bind_param(&mut self, name: &str) {
        self.used_names.insert(name.to_string(), 1);
        self.bind(name, Binding::Local(name.to_string()));
    }

    fn finish(mut self, name: &str, params: Vec<(String, IrType)>, return_type: IrType) -> IrFunction {
        // Implicit return with a default zero value when control can fall
        // off the end (always taken for `__init` and reachable only there
        // and in synthesized code).
        if !matches!(self.code.last(), Some(Instruction::Return)) {
            self.code.push(default_const(return_type));
            self.code.push(Instruction::Return);
        }
        let mut code: Vec<Instruction> = self
            .locals
            .iter()
            .map(|(local, ty)| Instruction::LocalDecl(local.clone(), *ty))
            .collect();
        code.extend(self.code);
        IrFunction {
            name: name.to_string(),
            params,
            return_type,
            code,
        }
    }

    fn emit_statement(
        &mut self,
        statement: &Statement,
        globals: &mut Vec<(String, IrType)>,
    ) -> Result<()> {
        match statement {
            Statement::VarDecl {
                name,
                declared_type,
                init,
                ..
            } => {
                let ty = match (declared_type, init) {
                    (Some(ty), _) => *ty,
                    (None, Some(init)) => init.ty(),
                    (None, None) => {
                        bail!("declaration of '{name}' has no type after checking")
                    }
                };
                let ir_ty = ir_type(ty)?;
                match init {
                    Some(init) => self.emit_expression(init)?,
                    None => self.code.push(default_const(ir_ty)),
                }
                if self.is_init && self.scopes.len() == 1 {
                    globals.push((name.clone(), ir_ty));
                    self.bind(name, Binding::Global(name.clone()));
                    self.code.push(Instruction::GlobalSet(name.clone()));
                } else {
                    let local = self.fresh_local(name);
                    self.locals.push((local.clone(), ir_ty));
                    self.bind(name, Binding::Local(local.clone()));
                    self.code.push(Instruction::LocalSet(local));
                }
            }
            Statement::FuncDecl { name, .. } => {
                bail!("function declaration '{name}' survived checking inside a body")
            }
            Statement::Assign { target, value, .. } => match target {
                Location::Name { name, .. } => {
                    self.emit_expression(value)?;
                    match self.resolve(name) {
                        Binding::Local(local) => self.code.push(Instruction::LocalSet(local)),
                        Binding::Global(global) => {
                            self.code.push(Instruction::GlobalSet(global))
                        }
                    }
                }
                Location::Mem { addr, .. } => {
                    self.emit_expression(value)?;
                    self.emit_expression(addr)?;
                    self.code.push(Instruction::Poke(ir_type(value.ty())?));
                }
            },
            Statement::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                self.emit_expression(cond)?;
                self.code.push(Instruction::If);
                self.scopes.push(HashMap::new());
                for statement in then_block {
                    self.emit_statement(statement, globals)?;
                }
                self.scopes.pop();
                // The ELSE arm is always present, empty or not.
                self.code.push(Instruction::Else);
                if let Some(else_block) = else_block {
                    self.scopes.push(HashMap::new());
                    for statement in else_block {
                        self.emit_statement(statement, globals)?;
                    }
                    self.scopes.pop();
                }
                self.code.push(Instruction::EndIf);
            }
            Statement::While { cond, body, .. } => {
                self.code.push(Instruction::Loop);
                self.emit_expression(cond)?;
                // CBREAK fires on true, so invert: leave when the
                // condition no longer holds.
                self.code.push(Instruction::Not);
                self.code.push(Instruction::CBreak);
                self.scopes.push(HashMap::new());
                for statement in body {
                    self.emit_statement(statement, globals)?;
                }
                self.scopes.pop();
                self.code.push(Instruction::EndLoop);
            }
            Statement::Break { .. } => {
                self.code.push(Instruction::ConstB(true));
                self.code.push(Instruction::CBreak);
            }
            Statement::Continue { .. } => {
                self.code.push(Instruction::Continue);
            }
            Statement::Return { value, .. } => {
                self.emit_expression(value)?;
                self.code.push(Instruction::Return);
            }
            Statement::Print { value, .. } => {
                self.emit_expression(value)?;
                self.code.push(Instruction::Print(ir_type(value.ty())?));
            }
            Statement::ExprStmt { expr, .. } => {
                self.emit_expression(expr)?;
                // The discarded result still has to leave the stack; park
                // it in a per-type scratch local.
                let ty = ir_type(expr.ty())?;
                let discard = self.discard_local(ty);
                self.code.push(Instruction::LocalSet(discard));
            }
        }
        Ok(())
    }

    fn emit_expression(&mut self, expr: &Expression) -> Result<()> {
        match &expr.kind {
            ExprKind::Integer(value) => self.code.push(Instruction::ConstI(*value)),
            ExprKind::Float(value) => self.code.push(Instruction::ConstF(*value)),
            ExprKind::Char(value) => self.code.push(Instruction::ConstC(*value)),
            ExprKind::Bool(value) => self.code.push(Instruction::ConstB(*value)),
            ExprKind::Name(name) => match self.resolve(name) {
                Binding::Local(local) => self.code.push(Instruction::LocalGet(local)),
                Binding::Global(global) => self.code.push(Instruction::GlobalGet(global)),
            },
            ExprKind::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    self.emit_expression(left)?;
                    self.code.push(Instruction::If);
                    self.emit_expression(right)?;
                    self.code.push(Instruction::Else);
                    self.code.push(Instruction::ConstB(false));
                    self.code.push(Instruction::EndIf);
                }
                BinaryOp::Or => {
                    self.emit_expression(left)?;
                    self.code.push(Instruction::If);
                    self.code.push(Instruction::ConstB(true));
                    self.code.push(Instruction::Else);
                    self.emit_expression(right)?;
                    self.code.push(Instruction::EndIf);
                }
                _ => {
                    self.emit_expression(left)?;
                    self.emit_expression(right)?;
                    let operand_ty = ir_type(left.ty())?;
                    let instruction = match op {
                        BinaryOp::Add => Instruction::Add(operand_ty),
                        BinaryOp::Sub => Instruction::Sub(operand_ty),
                        BinaryOp::Mul => Instruction::Mul(operand_ty),
                        BinaryOp::Div => Instruction::Div(operand_ty),
                        BinaryOp::Lt => Instruction::Cmp(CmpOp::Lt, operand_ty),
                        BinaryOp::Le => Instruction::Cmp(CmpOp::Le, operand_ty),
                        BinaryOp::Gt => Instruction::Cmp(CmpOp::Gt, operand_ty),
                        BinaryOp::Ge => Instruction::Cmp(CmpOp::Ge, operand_ty),
                        BinaryOp::Eq => Instruction::Cmp(CmpOp::Eq, operand_ty),
                        BinaryOp::Ne => Instruction::Cmp(CmpOp::Ne, operand_ty),
                        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
                    };
                    self.code.push(instruction);
                }
            },
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Pos => self.emit_expression(operand)?,
                UnaryOp::Neg => {
                    self.emit_expression(operand)?;
                    self.code.push(Instruction::Neg(ir_type(operand.ty())?));
                }
                UnaryOp::Not => {
                    self.emit_expression(operand)?;
                    self.code.push(Instruction::Not);
                }
                UnaryOp::Grow => {
                    self.emit_expression(operand)?;
                    self.code.push(Instruction::Grow);
                }
                UnaryOp::Load => {
                    self.emit_expression(operand)?;
                    self.code.push(Instruction::Peek(ir_type(expr.ty())?));
                }
            },
            ExprKind::Cast { target, value } => {
                self.emit_expression(value)?;
                match (value.ty(), target) {
                    (Type::Int, Type::Float) => self.code.push(Instruction::Itof),
                    (Type::Float, Type::Int) => self.code.push(Instruction::Ftoi),
                    (Type::Int, Type::Int) | (Type::Float, Type::Float) => {}
                    (from, to) => bail!("cast from {from} to {to} survived checking"),
                }
            }
            ExprKind::Call { name, args } => {
                for arg in args {
                    self.emit_expression(arg)?;
                }
                self.code
                    .push(Instruction::Call(name.clone(), args.len()));
            }
        }
        Ok(())
    }

    fn bind(&mut self, name: &str, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), binding);
        }
    }

    /// Innermost binding, falling back to a global: the checker already
    /// guaranteed that unresolved names cannot reach this stage.
    fn resolve(&self, name: &str) -> Binding {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .unwrap_or_else(|| Binding::Global(name.to_string()))
    }

    fn fresh_local(&mut self, name: &str) -> String {
        let count = self
            .used_names
            .entry(name.to_string())
            .and_modify(|count| *count += 1)
            .or_insert(1);
        if *count == 1 {
            name.to_string()
        } else {
            // `.` cannot appear in source identifiers, so suffixed names
            // never collide.
            format!("{name}.{count}")
        }
    }

    fn discard_local(&mut self, ty: IrType) -> String {
        if let Some(existing) = self.discards.get(&ty) {
            return existing.clone();
        }
        let name = format!("discard.{ty}");
        self.locals.push((name.clone(), ty));
        self.discards.insert(ty, name.clone());
        name
    }
}

fn ir_type(ty: Type) -> Result<IrType> {
    match ty {
        Type::Int => Ok(IrType::I),
        Type::Float => Ok(IrType::F),
        Type::Char => Ok(IrType::C),
        Type::Bool => Ok(IrType::B),
        Type::Error => bail!("expression with error type survived checking"),
    }
}

fn default_const(ty: IrType) -> Instruction {
    match ty {
        IrType::I => Instruction::ConstI(0),
        IrType::F => Instruction::ConstF(0.0),
        IrType::C => Instruction::ConstC(0),
        IrType::B => Instruction::ConstB(false),
    }
}

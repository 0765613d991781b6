//! The structured intermediate representation.
//!
//! A program is a list of global declarations plus functions; each function
//! body is a flat instruction list for a stack machine. There are no labels
//! and no jumps: control flow nests through `IF/ELSE/ENDIF` and
//! `LOOP/CBREAK/CONTINUE/ENDLOOP` markers, which every back-end can map
//! onto its own branching model.
//!
//! The text form produced by [`serialize`] is canonical: compiling the same
//! source twice yields byte-identical output.

use std::fmt;

use thiserror::Error;

/// Low-level value type, encoded as the tag suffix: int32, float64, char
/// byte and bool are `I`, `F`, `C`, `B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    I,
    F,
    C,
    B,
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            IrType::I => "I",
            IrType::F => "F",
            IrType::C => "C",
            IrType::B => "B",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            CmpOp::Lt => "LT",
            CmpOp::Le => "LE",
            CmpOp::Gt => "GT",
            CmpOp::Ge => "GE",
            CmpOp::Eq => "EQ",
            CmpOp::Ne => "NE",
        };
        f.write_str(tag)
    }
}

/// One stack-machine instruction. Arithmetic is typed `I`/`F` only;
/// comparisons cover all four types; bools travel as 0/1, chars as their
/// byte value.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    ConstI(i32),
    ConstF(f64),
    ConstC(u8),
    ConstB(bool),

    Add(IrType),
    Sub(IrType),
    Mul(IrType),
    Div(IrType),
    Neg(IrType),
    Cmp(CmpOp, IrType),
    And,
    Or,
    Not,

    Itof,
    Ftoi,

    /// Pops an address, pushes the loaded value (width per type suffix:
    /// 4/8/1/1 bytes).
    Peek(IrType),
    /// Pops an address then the stored value.
    Poke(IrType),
    /// Pops a byte count, pushes the new memory size.
    Grow,

    LocalGet(String),
    LocalSet(String),
    GlobalGet(String),
    GlobalSet(String),
    LocalDecl(String, IrType),

    If,
    Else,
    EndIf,
    Loop,
    /// Pops a bool; breaks out of the enclosing loop when it is true.
    CBreak,
    Continue,
    EndLoop,

    Call(String, usize),
    Return,
    Print(IrType),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::ConstI(value) => write!(f, "CONSTI {value}"),
            Instruction::ConstF(value) => write!(f, "CONSTF {value:?}"),
            Instruction::ConstC(value) => write!(f, "CONSTC {value}"),
            Instruction::ConstB(value) => write!(f, "CONSTB {}", *value as u8),
            Instruction::Add(ty) => write!(f, "ADD{ty}"),
            Instruction::Sub(ty) => write!(f, "SUB{ty}"),
            Instruction::Mul(ty) => write!(f, "MUL{ty}"),
            Instruction::Div(ty) => write!(f, "DIV{ty}"),
            Instruction::Neg(ty) => write!(f, "NEG{ty}"),
            Instruction::Cmp(op, ty) => write!(f, "{op}{ty}"),
            Instruction::And => f.write_str("AND"),
            Instruction::Or => f.write_str("OR"),
            Instruction::Not => f.write_str("NOT"),
            Instruction::Itof => f.write_str("ITOF"),
            Instruction::Ftoi => f.write_str("FTOI"),
            Instruction::Peek(ty) => write!(f, "PEEK{ty}"),
            Instruction::Poke(ty) => write!(f, "POKE{ty}"),
            Instruction::Grow => f.write_str("GROW"),
            Instruction::LocalGet(name) => write!(f, "LOCAL_GET {name}"),
            Instruction::LocalSet(name) => write!(f, "LOCAL_SET {name}"),
            Instruction::GlobalGet(name) => write!(f, "GLOBAL_GET {name}"),
            Instruction::GlobalSet(name) => write!(f, "GLOBAL_SET {name}"),
            Instruction::LocalDecl(name, ty) => write!(f, "LOCAL_DECL {name} {ty}"),
            Instruction::If => f.write_str("IF"),
            Instruction::Else => f.write_str("ELSE"),
            Instruction::EndIf => f.write_str("ENDIF"),
            Instruction::Loop => f.write_str("LOOP"),
            Instruction::CBreak => f.write_str("CBREAK"),
            Instruction::Continue => f.write_str("CONTINUE"),
            Instruction::EndLoop => f.write_str("ENDLOOP"),
            Instruction::Call(name, arity) => write!(f, "CALL {name} {arity}"),
            Instruction::Return => f.write_str("RETURN"),
            Instruction::Print(ty) => write!(f, "PRINT{ty}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<(String, IrType)>,
    pub return_type: IrType,
    pub code: Vec<Instruction>,
}

/// Whole-program IR: globals first, then functions. `__init` always comes
/// first and runs before `main`; a missing source `main` is synthesized at
/// the end.
#[derive(Debug, Clone, PartialEq)]
pub struct IrProgram {
    pub globals: Vec<(String, IrType)>,
    pub functions: Vec<IrFunction>,
}

/// Canonical line-based text form, one record per instruction.
pub fn serialize(program: &IrProgram) -> String {
    let mut out = String::new();
    for (name, ty) in &program.globals {
        out.push_str(&format!("GLOBAL_DECL {name} {ty}\n"));
    }
    for function in &program.functions {
        out.push_str(&format!("FUNC {} {}\n", function.name, function.return_type));
        for (name, ty) in &function.params {
            out.push_str(&format!("PARAM {name} {ty}\n"));
        }
        for instruction in &function.code {
            out.push_str(&format!("  {instruction}\n"));
        }
        out.push_str("ENDFUNC\n");
    }
    out
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("{function}: {marker} without a matching opener at instruction {index}")]
    UnmatchedMarker {
        function: String,
        marker: &'static str,
        index: usize,
    },
    #[error("{function}: IF at instruction {index} has no ELSE")]
    MissingElse { function: String, index: usize },
    #[error("{function}: unclosed {marker} at end of function")]
    Unclosed {
        function: String,
        marker: &'static str,
    },
    #[error("{function}: {marker} outside of a loop at instruction {index}")]
    StrayLoopControl {
        function: String,
        marker: &'static str,
        index: usize,
    },
    #[error("{function}: operand stack underflow at instruction {index}")]
    Underflow { function: String, index: usize },
    #[error(
        "{function}: IF arms disagree on stack depth at instruction {index} (then {then_depth}, else {else_depth})"
    )]
    BranchMismatch {
        function: String,
        index: usize,
        then_depth: usize,
        else_depth: usize,
    },
    #[error("{function}: loop body changes stack depth at instruction {index}")]
    LoopImbalance { function: String, index: usize },
    #[error("{function}: {depth} value(s) left on the stack at end of function")]
    LeftoverStack { function: String, depth: usize },
}

enum Region {
    If {
        opened_at: usize,
        entry: usize,
        then_depth: Option<usize>,
    },
    Loop {
        entry: usize,
    },
}

/// Checks the structural invariants: marker nesting matches, `CBREAK` and
/// `CONTINUE` only appear inside loops, and the operand stack balances in
/// every region.
pub fn verify(program: &IrProgram) -> Result<(), VerifyError> {
    for function in &program.functions {
        verify_function(function)?;
    }
    Ok(())
}

fn verify_function(function: &IrFunction) -> Result<(), VerifyError> {
    let name = || function.name.clone();
    let mut depth: usize = 0;
    let mut regions: Vec<Region> = Vec::new();

    for (index, instruction) in function.code.iter().enumerate() {
        match instruction {
            Instruction::If => {
                depth = pop(depth, 1, &name, index)?;
                regions.push(Region::If {
                    opened_at: index,
                    entry: depth,
                    then_depth: None,
                });
            }
            Instruction::Else => match regions.last_mut() {
                Some(Region::If {
                    entry, then_depth, ..
                }) if then_depth.is_none() => {
                    if depth < *entry {
                        return Err(VerifyError::Underflow {
                            function: name(),
                            index,
                        });
                    }
                    *then_depth = Some(depth);
                    depth = *entry;
                }
                _ => {
                    return Err(VerifyError::UnmatchedMarker {
                        function: name(),
                        marker: "ELSE",
                        index,
                    });
                }
            },
            Instruction::EndIf => match regions.pop() {
                Some(Region::If {
                    then_depth: Some(then_depth),
                    ..
                }) => {
                    if depth != then_depth {
                        return Err(VerifyError::BranchMismatch {
                            function: name(),
                            index,
                            then_depth,
                            else_depth: depth,
                        });
                    }
                }
                Some(Region::If {
                    opened_at,
                    then_depth: None,
                    ..
                }) => {
                    return Err(VerifyError::MissingElse {
                        function: name(),
                        index: opened_at,
                    });
                }
                _ => {
                    return Err(VerifyError::UnmatchedMarker {
                        function: name(),
                        marker: "ENDIF",
                        index,
                    });
                }
            },
            Instruction::Loop => {
                regions.push(Region::Loop { entry: depth });
            }
            Instruction::CBreak => {
                depth = pop(depth, 1, &name, index)?;
                if !inside_loop(&regions) {
                    return Err(VerifyError::StrayLoopControl {
                        function: name(),
                        marker: "CBREAK",
                        index,
                    });
                }
            }
            Instruction::Continue => {
                if !inside_loop(&regions) {
                    return Err(VerifyError::StrayLoopControl {
                        function: name(),
                        marker: "CONTINUE",
                        index,
                    });
                }
            }
            Instruction::EndLoop => match regions.pop() {
                Some(Region::Loop { entry }) => {
                    if depth != entry {
                        return Err(VerifyError::LoopImbalance {
                            function: name(),
                            index,
                        });
                    }
                }
                _ => {
                    return Err(VerifyError::UnmatchedMarker {
                        function: name(),
                        marker: "ENDLOOP",
                        index,
                    });
                }
            },
            other => {
                let (pops, pushes) = stack_effect(other);
                depth = pop(depth, pops, &name, index)?;
                depth += pushes;
            }
        }
    }

    if let Some(region) = regions.last() {
        let marker = match region {
            Region::If { .. } => "IF",
            Region::Loop { .. } => "LOOP",
        };
        return Err(VerifyError::Unclosed {
            function: name(),
            marker,
        });
    }
    if depth != 0 {
        return Err(VerifyError::LeftoverStack {
            function: name(),
            depth,
        });
    }
    Ok(())
}

fn pop(
    depth: usize,
    count: usize,
    name: &impl Fn() -> String,
    index: usize,
) -> Result<usize, VerifyError> {
    depth.checked_sub(count).ok_or(VerifyError::Underflow {
        function: name(),
        index,
    })
}

fn inside_loop(regions: &[Region]) -> bool {
    regions
        .iter()
        .any(|region| matches!(region, Region::Loop { .. }))
}

/// (pops, pushes) for every non-structural instruction.
fn stack_effect(instruction: &Instruction) -> (usize, usize) {
    match instruction {
        Instruction::ConstI(_)
        | Instruction::ConstF(_)
        | Instruction::ConstC(_)
        | Instruction::ConstB(_)
        | Instruction::LocalGet(_)
        | Instruction::GlobalGet(_) => (0, 1),
        Instruction::Add(_)
        | Instruction::Sub(_)
        | Instruction::Mul(_)
        | Instruction::Div(_)
        | Instruction::Cmp(..)
        | Instruction::And
        | Instruction::Or => (2, 1),
        Instruction::Neg(_)
        | Instruction::Not
        | Instruction::Itof
        | Instruction::Ftoi
        | Instruction::Peek(_)
        | Instruction::Grow => (1, 1),
        Instruction::Poke(_) => (2, 0),
        Instruction::LocalSet(_)
        | Instruction::GlobalSet(_)
        | Instruction::Return
        | Instruction::Print(_) => (1, 0),
        Instruction::LocalDecl(..) => (0, 0),
        Instruction::Call(_, arity) => (*arity, 1),
        Instruction::If
        | Instruction::Else
        | Instruction::EndIf
        | Instruction::Loop
        | Instruction::CBreak
        | Instruction::Continue
        | Instruction::EndLoop => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(code: Vec<Instruction>) -> IrFunction {
        IrFunction {
            name: "f".to_string(),
            params: vec![],
            return_type: IrType::I,
            code,
        }
    }

    fn program(code: Vec<Instruction>) -> IrProgram {
        IrProgram {
            globals: vec![],
            functions: vec![function(code)],
        }
    }

    #[test]
    fn serializes_canonically() {
        let program = IrProgram {
            globals: vec![("x".to_string(), IrType::I)],
            functions: vec![IrFunction {
                name: "main".to_string(),
                params: vec![("n".to_string(), IrType::I)],
                return_type: IrType::I,
                code: vec![
                    Instruction::ConstI(2),
                    Instruction::ConstF(1.5),
                    Instruction::Cmp(CmpOp::Lt, IrType::I),
                    Instruction::Return,
                ],
            }],
        };
        assert_eq!(
            serialize(&program),
            "GLOBAL_DECL x I\n\
             FUNC main I\n\
             PARAM n I\n\
             \x20\x20CONSTI 2\n\
             \x20\x20CONSTF 1.5\n\
             \x20\x20LTI\n\
             \x20\x20RETURN\n\
             ENDFUNC\n"
        );
    }

    #[test]
    fn float_constants_keep_their_point() {
        assert_eq!(Instruction::ConstF(3.0).to_string(), "CONSTF 3.0");
        assert_eq!(Instruction::ConstB(true).to_string(), "CONSTB 1");
        assert_eq!(Instruction::ConstC(b'a').to_string(), "CONSTC 97");
    }

    #[test]
    fn verifies_balanced_function() {
        let p = program(vec![
            Instruction::ConstI(2),
            Instruction::ConstI(3),
            Instruction::Add(IrType::I),
            Instruction::Print(IrType::I),
            Instruction::ConstI(0),
            Instruction::Return,
        ]);
        assert_eq!(verify(&p), Ok(()));
    }

    #[test]
    fn verifies_structured_if() {
        let p = program(vec![
            Instruction::ConstB(true),
            Instruction::If,
            Instruction::ConstI(1),
            Instruction::Print(IrType::I),
            Instruction::Else,
            Instruction::EndIf,
            Instruction::ConstI(0),
            Instruction::Return,
        ]);
        assert_eq!(verify(&p), Ok(()));
    }

    #[test]
    fn verifies_short_circuit_if_that_leaves_a_value() {
        let p = program(vec![
            Instruction::ConstB(false),
            Instruction::If,
            Instruction::ConstB(true),
            Instruction::Else,
            Instruction::ConstB(false),
            Instruction::EndIf,
            Instruction::Print(IrType::B),
            Instruction::ConstI(0),
            Instruction::Return,
        ]);
        assert_eq!(verify(&p), Ok(()));
    }

    #[test]
    fn rejects_if_without_else() {
        let p = program(vec![
            Instruction::ConstB(true),
            Instruction::If,
            Instruction::EndIf,
            Instruction::ConstI(0),
            Instruction::Return,
        ]);
        assert_eq!(
            verify(&p),
            Err(VerifyError::MissingElse {
                function: "f".to_string(),
                index: 1
            })
        );
    }

    #[test]
    fn rejects_mismatched_branch_depths() {
        let p = program(vec![
            Instruction::ConstB(true),
            Instruction::If,
            Instruction::ConstI(1),
            Instruction::Else,
            Instruction::EndIf,
            Instruction::Return,
        ]);
        assert!(matches!(
            verify(&p),
            Err(VerifyError::BranchMismatch { .. })
        ));
    }

    #[test]
    fn rejects_cbreak_outside_loop() {
        let p = program(vec![
            Instruction::ConstB(true),
            Instruction::CBreak,
            Instruction::ConstI(0),
            Instruction::Return,
        ]);
        assert_eq!(
            verify(&p),
            Err(VerifyError::StrayLoopControl {
                function: "f".to_string(),
                marker: "CBREAK",
                index: 1
            })
        );
    }

    #[test]
    fn rejects_underflow() {
        let p = program(vec![Instruction::Add(IrType::I)]);
        assert_eq!(
            verify(&p),
            Err(VerifyError::Underflow {
                function: "f".to_string(),
                index: 0
            })
        );
    }

    #[test]
    fn rejects_unclosed_loop() {
        let p = program(vec![Instruction::Loop]);
        assert_eq!(
            verify(&p),
            Err(VerifyError::Unclosed {
                function: "f".to_string(),
                marker: "LOOP"
            })
        );
    }

    #[test]
    fn rejects_leftover_stack_values() {
        let p = program(vec![Instruction::ConstI(1)]);
        assert_eq!(
            verify(&p),
            Err(VerifyError::LeftoverStack {
                function: "f".to_string(),
                depth: 1
            })
        );
    }

    #[test]
    fn accepts_loop_with_conditional_break() {
        let p = program(vec![
            Instruction::Loop,
            Instruction::GlobalGet("n".to_string()),
            Instruction::ConstI(5),
            Instruction::Cmp(CmpOp::Lt, IrType::I),
            Instruction::Not,
            Instruction::CBreak,
            Instruction::ConstB(true),
            Instruction::CBreak,
            Instruction::Continue,
            Instruction::EndLoop,
            Instruction::ConstI(0),
            Instruction::Return,
        ]);
        assert_eq!(verify(&p), Ok(()));
    }
}

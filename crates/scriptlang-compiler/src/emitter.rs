//! Bytecode emitter: lowers a [`crate::bind::BoundProgram`] into a
//! [`scriptlang_bytecode::CompiledProgram`]. See §4.7/§4.8.
//!
//! Holds a byte buffer per instruction, a label → instruction-index map, and
//! a list of pending fixups, all as emitter state threaded explicitly
//! through lowering rather than ambient globals. Labels are bound at
//! *logical* (pre page-padding) instruction indices; [`split_into_pages`]
//! pads the flattened code to page boundaries afterwards, so fixups are
//! resolved against the final, padded addresses only once every
//! instruction's length is known — see [`final_instr_starts`].

use std::collections::HashMap;

use scriptlang_core::Arena;
use scriptlang_bytecode::{CODE_PAGE_SIZE, CompiledProgram, Opcode, split_into_pages};

use crate::ast::{AssignOp, BinOp, UnOp};
use crate::bind::{BoundExpr, BoundExprKind, BoundFunction, BoundProgram, BoundStmt, BoundStmtKind};
use crate::symtab::{FunctionBody, SymbolId, SymbolTable, VariableKind};
use crate::types::{Basic, Type, TypeId};

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("function name `{0}` is longer than 255 bytes")]
    NameTooLong(String),
    #[error("{field} ({value}) does not fit its operand width")]
    FrameFieldOutOfRange { field: &'static str, value: u32 },
    #[error("frame slot {0} exceeds the 24-bit addressable range")]
    SlotOutOfRange(u32),
    #[error("reference to a name that never resolved to a symbol")]
    UnresolvedIdent,
    #[error("call target has no defined body to jump to")]
    UnresolvedCallTarget,
    #[error("a native call has more arguments than the NATIVE encoding can carry")]
    NativeArgCountOutOfRange,
    #[error("this lvalue or call target is too deeply nested for direct addressing")]
    UnsupportedLvalue,
    #[error("no opcode exists for this operator/type combination")]
    UnsupportedBinaryOp,
    #[error("branch displacement {0} does not fit a 16-bit relative offset")]
    BranchOutOfRange(i64),
    #[error("BREAK outside any loop or SWITCH")]
    BreakOutsideLoop,
    #[error("CONTINUE outside any loop")]
    ContinueOutsideLoop,
    #[error("label was never bound to an instruction")]
    UnresolvedLabel,
}

type Label = u32;

#[derive(Clone, Copy)]
enum FixupKind {
    /// `CALL`: absolute 24-bit code offset of the target instruction.
    Absolute,
    /// `J`/`JZ`-family: 16-bit signed, relative to the end of this
    /// instruction itself.
    RelativeToEndOfInstr,
    /// `SWITCH` case entries: 16-bit signed, relative to the end of the
    /// case entry the offset lives in (a byte position inside the same
    /// instruction, not the next one).
    RelativeWithinInstr(usize),
}

struct Fixup {
    instr: usize,
    byte_offset: usize,
    target: Label,
    kind: FixupKind,
}

/// Mirrors [`split_into_pages`]'s padding so logical instruction indices can
/// be translated into final, post-padding byte offsets before fixups are
/// applied. Must stay in lockstep with that function; both are driven from
/// the same `lens` array so they can't disagree about where a page breaks.
fn final_instr_starts(lens: &[usize]) -> Vec<usize> {
    let mut starts = Vec::with_capacity(lens.len());
    let mut page_used = 0usize;
    let mut total = 0usize;
    for &len in lens {
        if page_used + len > CODE_PAGE_SIZE {
            total += CODE_PAGE_SIZE - page_used;
            page_used = 0;
        }
        starts.push(total);
        total += len;
        page_used += len;
    }
    starts
}

fn u24_bytes(v: u32) -> [u8; 3] {
    let b = v.to_le_bytes();
    [b[0], b[1], b[2]]
}

struct Emitter<'a> {
    symbols: &'a SymbolTable,
    types: &'a Arena<Type>,
    interner: &'a scriptlang_core::Interner,

    instrs: Vec<Vec<u8>>,
    labels: HashMap<Label, usize>,
    next_label: u32,
    fixups: Vec<Fixup>,

    func_labels: HashMap<SymbolId, Label>,
    epilogue_label: Label,
    break_stack: Vec<Label>,
    continue_stack: Vec<Label>,

    strings: Vec<String>,
    string_offsets: HashMap<String, u32>,
    string_cursor: u32,

    natives: Vec<u64>,
    native_index: HashMap<u64, u16>,
}

/// Lowers `program` into a fully packaged compiled program. `script_name`
/// and `script_hash` come from the `SCRIPT_NAME`/`SCRIPT_HASH` top-level
/// items; `globals_block_index` from the script's `GLOBAL` block, if any.
pub fn emit(
    program: &BoundProgram,
    symbols: &SymbolTable,
    types: &Arena<Type>,
    interner: &scriptlang_core::Interner,
    script_name: &str,
    script_hash: u64,
    globals_block_index: u32,
) -> Result<CompiledProgram, EmitError> {
    let mut emitter = Emitter {
        symbols,
        types,
        interner,
        instrs: Vec::new(),
        labels: HashMap::new(),
        next_label: 0,
        fixups: Vec::new(),
        func_labels: HashMap::new(),
        epilogue_label: 0,
        break_stack: Vec::new(),
        continue_stack: Vec::new(),
        strings: Vec::new(),
        string_offsets: HashMap::new(),
        string_cursor: 0,
        natives: Vec::new(),
        native_index: HashMap::new(),
    };
    emitter.emit_program(program)?;
    emitter.finish(program, script_name, script_hash, globals_block_index)
}

enum ArithFamily {
    Int,
    Float,
    Vector,
}

impl<'a> Emitter<'a> {
    fn symbol_name(&self, sid: SymbolId) -> String {
        self.interner.resolve(self.symbols.get(sid).name()).to_string()
    }

    fn fresh_label(&mut self) -> Label {
        let l = self.next_label;
        self.next_label += 1;
        l
    }

    fn func_label(&mut self, sid: SymbolId) -> Label {
        if let Some(&l) = self.func_labels.get(&sid) {
            return l;
        }
        let l = self.fresh_label();
        self.func_labels.insert(sid, l);
        l
    }

    fn bind_label(&mut self, label: Label) {
        self.labels.insert(label, self.instrs.len());
    }

    fn push_instr(&mut self, bytes: Vec<u8>) -> usize {
        self.instrs.push(bytes);
        self.instrs.len() - 1
    }

    fn emit_branch(&mut self, opcode: Opcode, target: Label) {
        let idx = self.push_instr(vec![opcode as u8, 0, 0]);
        self.fixups.push(Fixup {
            instr: idx,
            byte_offset: 1,
            target,
            kind: FixupKind::RelativeToEndOfInstr,
        });
    }

    fn emit_program(&mut self, program: &BoundProgram) -> Result<(), EmitError> {
        // Pre-allocate every function's label up front so calls bind
        // correctly regardless of emission order (mutual recursion).
        for f in &program.functions {
            self.func_label(f.symbol);
        }

        let mut functions: Vec<&BoundFunction> = program.functions.iter().collect();
        if let Some(i) = functions.iter().position(|f| self.symbol_name(f.symbol).eq_ignore_ascii_case("MAIN")) {
            let main = functions.remove(i);
            functions.insert(0, main);
        }

        for f in functions {
            self.emit_function(f)?;
        }
        Ok(())
    }

    fn emit_function(&mut self, func: &BoundFunction) -> Result<(), EmitError> {
        let label = self.func_label(func.symbol);
        self.bind_label(label);

        let fs = self
            .symbols
            .get(func.symbol)
            .as_function()
            .expect("bound function's symbol is a FunctionSymbol")
            .clone();
        let name = self.interner.resolve(fs.name).to_string();
        let args_size = fs.args_size.expect("frame layout computed by the second pass");
        let locals_size = fs.locals_size.expect("frame layout computed by the second pass");

        self.emit_enter(args_size, locals_size, &name)?;
        let epilogue = self.fresh_label();
        self.epilogue_label = epilogue;

        for stmt in &func.body {
            self.emit_stmt(stmt)?;
        }

        self.bind_label(epilogue);
        let return_size = match self.types.get(fs.ty) {
            Type::Function(sig) => sig.return_type.map(|t| Type::slot_size(t, self.types)).unwrap_or(0),
            _ => 0,
        };
        self.emit_leave(args_size, return_size)?;
        Ok(())
    }

    /// `ENTER(argsSize, localsSize, nameLen, name)`. Per the testable
    /// "minimal" scenario, the declared `localsSize` operand already
    /// includes the 2-slot caller frame-link/return-address gap — it is
    /// not the second pass's bare `locals_size` field.
    fn emit_enter(&mut self, args_size: u32, locals_size: u32, name: &str) -> Result<(), EmitError> {
        let name_bytes = name.as_bytes();
        if name_bytes.len() > u8::MAX as usize {
            return Err(EmitError::NameTooLong(name.to_string()));
        }
        let declared_locals = locals_size + 2;
        if args_size > u8::MAX as u32 {
            return Err(EmitError::FrameFieldOutOfRange { field: "argsSize", value: args_size });
        }
        if declared_locals > u16::MAX as u32 {
            return Err(EmitError::FrameFieldOutOfRange { field: "localsSize", value: declared_locals });
        }
        let locals_bytes = (declared_locals as u16).to_le_bytes();
        let mut bytes = vec![
            Opcode::Enter as u8,
            args_size as u8,
            locals_bytes[0],
            locals_bytes[1],
            name_bytes.len() as u8,
        ];
        bytes.extend_from_slice(name_bytes);
        self.push_instr(bytes);
        Ok(())
    }

    fn emit_leave(&mut self, args_size: u32, return_size: u32) -> Result<(), EmitError> {
        if args_size > u8::MAX as u32 {
            return Err(EmitError::FrameFieldOutOfRange { field: "argsSize", value: args_size });
        }
        if return_size > u8::MAX as u32 {
            return Err(EmitError::FrameFieldOutOfRange { field: "returnSize", value: return_size });
        }
        self.push_instr(vec![Opcode::Leave as u8, args_size as u8, return_size as u8]);
        Ok(())
    }

    // --- statements ---------------------------------------------------

    fn emit_stmt(&mut self, stmt: &BoundStmt) -> Result<(), EmitError> {
        match &stmt.kind {
            BoundStmtKind::Expr(e) => {
                self.emit_expr(e)?;
                for _ in 0..self.expr_push_slots(e) {
                    self.push_instr(vec![Opcode::Drop as u8]);
                }
            }
            BoundStmtKind::VarDecl { symbol, initializer, .. } => {
                if let (Some(sid), Some(init)) = (symbol, initializer) {
                    self.emit_expr(init)?;
                    self.emit_store_var(*sid)?;
                } else if let Some(init) = initializer {
                    // A duplicate declaration: no symbol to store into, but
                    // the initializer was still parsed as an expression and
                    // must leave the stack balanced.
                    self.emit_expr(init)?;
                    for _ in 0..self.expr_push_slots(init) {
                        self.push_instr(vec![Opcode::Drop as u8]);
                    }
                }
            }
            BoundStmtKind::Assign { lhs, op, rhs } => {
                self.emit_assign(lhs, *op, rhs)?;
            }
            BoundStmtKind::If { cond, then_block, else_block } => {
                let else_label = self.fresh_label();
                self.emit_condition_jump_if_false(cond, else_label)?;
                for s in then_block {
                    self.emit_stmt(s)?;
                }
                if let Some(else_body) = else_block {
                    let end_label = self.fresh_label();
                    self.emit_branch(Opcode::J, end_label);
                    self.bind_label(else_label);
                    for s in else_body {
                        self.emit_stmt(s)?;
                    }
                    self.bind_label(end_label);
                } else {
                    self.bind_label(else_label);
                }
            }
            BoundStmtKind::While { cond, body } => {
                let head = self.fresh_label();
                self.bind_label(head);
                let end = self.fresh_label();
                self.emit_condition_jump_if_false(cond, end)?;
                self.continue_stack.push(head);
                self.break_stack.push(end);
                for s in body {
                    self.emit_stmt(s)?;
                }
                self.continue_stack.pop();
                self.break_stack.pop();
                self.emit_branch(Opcode::J, head);
                self.bind_label(end);
            }
            BoundStmtKind::Repeat { limit, counter, body } => {
                self.emit_int_literal(0);
                self.emit_store_lvalue(counter)?;

                let head = self.fresh_label();
                self.bind_label(head);
                let end = self.fresh_label();
                let cond = BoundExpr {
                    kind: BoundExprKind::Binary(BinOp::Lt, Box::new(counter.clone()), Box::new(limit.clone())),
                    ty: counter.ty,
                    span: counter.span,
                };
                self.emit_condition_jump_if_false(&cond, end)?;

                let continue_label = self.fresh_label();
                self.break_stack.push(end);
                self.continue_stack.push(continue_label);
                for s in body {
                    self.emit_stmt(s)?;
                }
                self.continue_stack.pop();
                self.break_stack.pop();

                self.bind_label(continue_label);
                self.emit_expr(counter)?;
                self.emit_int_literal(1);
                self.push_instr(vec![Opcode::IAdd as u8]);
                self.emit_store_lvalue(counter)?;
                self.emit_branch(Opcode::J, head);
                self.bind_label(end);
            }
            BoundStmtKind::Switch { value, cases, default } => {
                self.emit_switch(value, cases, default.as_deref())?;
            }
            BoundStmtKind::Return(expr) => {
                if let Some(e) = expr {
                    self.emit_expr(e)?;
                }
                self.emit_branch(Opcode::J, self.epilogue_label);
            }
            BoundStmtKind::Break => {
                let target = *self.break_stack.last().ok_or(EmitError::BreakOutsideLoop)?;
                self.emit_branch(Opcode::J, target);
            }
            BoundStmtKind::Continue => {
                let target = *self.continue_stack.last().ok_or(EmitError::ContinueOutsideLoop)?;
                self.emit_branch(Opcode::J, target);
            }
        }
        Ok(())
    }

    fn emit_switch(
        &mut self,
        value: &BoundExpr,
        cases: &[(i64, Vec<BoundStmt>)],
        default: Option<&[BoundStmt]>,
    ) -> Result<(), EmitError> {
        self.emit_expr(value)?;

        let case_labels: Vec<Label> = cases.iter().map(|_| self.fresh_label()).collect();
        let mut switch_bytes = vec![Opcode::Switch as u8, cases.len() as u8];
        let mut entry_fixups = Vec::new();
        for (&(case_value, _), &label) in cases.iter().zip(&case_labels) {
            switch_bytes.extend_from_slice(&(case_value as i32 as u32).to_le_bytes());
            let jump_field = switch_bytes.len();
            switch_bytes.extend_from_slice(&[0, 0]);
            let anchor = switch_bytes.len();
            entry_fixups.push((jump_field, anchor, label));
        }
        let switch_idx = self.push_instr(switch_bytes);
        for (byte_offset, anchor, target) in entry_fixups {
            self.fixups.push(Fixup {
                instr: switch_idx,
                byte_offset,
                target,
                kind: FixupKind::RelativeWithinInstr(anchor),
            });
        }

        let default_label = self.fresh_label();
        self.emit_branch(Opcode::J, default_label);

        let exit_label = self.fresh_label();
        self.break_stack.push(exit_label);
        for ((_, body), &label) in cases.iter().zip(&case_labels) {
            self.bind_label(label);
            for s in body {
                self.emit_stmt(s)?;
            }
        }
        self.bind_label(default_label);
        if let Some(default_body) = default {
            for s in default_body {
                self.emit_stmt(s)?;
            }
        }
        self.bind_label(exit_label);
        self.break_stack.pop();
        Ok(())
    }

    fn emit_assign(&mut self, lhs: &BoundExpr, op: AssignOp, rhs: &BoundExpr) -> Result<(), EmitError> {
        match op {
            AssignOp::Assign => {
                self.emit_expr(rhs)?;
            }
            _ => {
                self.emit_expr(lhs)?;
                self.emit_expr(rhs)?;
                let binop = match op {
                    AssignOp::AddAssign => BinOp::Add,
                    AssignOp::SubAssign => BinOp::Sub,
                    AssignOp::MulAssign => BinOp::Mul,
                    AssignOp::DivAssign => BinOp::Div,
                    AssignOp::ModAssign => BinOp::Mod,
                    AssignOp::AndAssign => BinOp::BitAnd,
                    AssignOp::OrAssign => BinOp::BitOr,
                    AssignOp::XorAssign => BinOp::BitXor,
                    AssignOp::Assign => unreachable!("handled above"),
                };
                let opcode = self.binary_opcode(binop, lhs.ty)?;
                self.push_instr(vec![opcode as u8]);
            }
        }
        self.emit_store_lvalue(lhs)
    }

    fn emit_store_lvalue(&mut self, lhs: &BoundExpr) -> Result<(), EmitError> {
        match &lhs.kind {
            BoundExprKind::Ident(Some(sid), _) => self.emit_store_var(*sid),
            BoundExprKind::Ident(None, _) => Err(EmitError::UnresolvedIdent),
            BoundExprKind::Paren(inner) => self.emit_store_lvalue(inner),
            BoundExprKind::Member(base, field) => self.emit_member_store(base, *field, lhs.ty),
            BoundExprKind::Index(base, index) => self.emit_index_store(base, index, lhs.ty),
            _ => Err(EmitError::UnsupportedLvalue),
        }
    }

    // --- expressions ----------------------------------------------------

    /// Number of 8-byte cells `e` pushes when evaluated, used to balance the
    /// stack after an expression-statement. A bare `PROC` call pushes
    /// nothing even though its `BoundExpr::ty` (set by the second pass from
    /// `return_type.unwrap_or(error_ty)`) can't itself tell a void call
    /// apart from a type error, so calls are read off the callee's own
    /// function-typed signature instead.
    fn expr_push_slots(&self, e: &BoundExpr) -> u32 {
        if let BoundExprKind::Call(callee, _) = &e.kind {
            if let Type::Function(sig) = self.types.get(callee.ty) {
                return sig.return_type.map(|t| Type::slot_size(t, self.types)).unwrap_or(0);
            }
        }
        Type::slot_size(e.ty, self.types)
    }

    fn emit_expr(&mut self, e: &BoundExpr) -> Result<(), EmitError> {
        match &e.kind {
            BoundExprKind::Ident(Some(sid), _) => self.emit_load_var(*sid),
            BoundExprKind::Ident(None, _) => Err(EmitError::UnresolvedIdent),
            BoundExprKind::IntLit(v) => {
                self.emit_int_literal(*v);
                Ok(())
            }
            BoundExprKind::FloatLit(v) => {
                self.emit_float_literal(*v);
                Ok(())
            }
            BoundExprKind::BoolLit(b) => {
                self.emit_int_literal(*b as i64);
                Ok(())
            }
            BoundExprKind::StringLit(s) => {
                let text = self.interner.resolve(*s).to_string();
                let offset = self.intern_string(&text);
                self.emit_int_literal(offset as i64);
                self.push_instr(vec![Opcode::String as u8]);
                Ok(())
            }
            BoundExprKind::Paren(inner) => self.emit_expr(inner),
            BoundExprKind::Member(base, field) => self.emit_member_load(base, *field, e.ty),
            BoundExprKind::Index(base, index) => self.emit_index_load(base, index, e.ty),
            BoundExprKind::Call(callee, args) => self.emit_call(callee, args),
            BoundExprKind::Unary(op, inner) => self.emit_unary(*op, inner),
            BoundExprKind::Binary(op, lhs, rhs) => self.emit_binary(*op, lhs, rhs),
            BoundExprKind::Vector(elems) => {
                for el in elems {
                    self.emit_expr(el)?;
                }
                Ok(())
            }
        }
    }

    fn emit_unary(&mut self, op: UnOp, inner: &BoundExpr) -> Result<(), EmitError> {
        self.emit_expr(inner)?;
        let opcode = match (op, self.is_float(inner.ty)) {
            (UnOp::Not, _) => Opcode::INot,
            (UnOp::Neg, true) => Opcode::FNeg,
            (UnOp::Neg, false) => Opcode::INeg,
        };
        self.push_instr(vec![opcode as u8]);
        Ok(())
    }

    fn emit_binary(&mut self, op: BinOp, lhs: &BoundExpr, rhs: &BoundExpr) -> Result<(), EmitError> {
        match op {
            BinOp::And => {
                self.emit_expr(lhs)?;
                self.push_instr(vec![Opcode::Dup as u8]);
                let end = self.fresh_label();
                self.emit_branch(Opcode::Jz, end);
                self.push_instr(vec![Opcode::Drop as u8]);
                self.emit_expr(rhs)?;
                self.bind_label(end);
                Ok(())
            }
            BinOp::Or => {
                self.emit_expr(lhs)?;
                self.push_instr(vec![Opcode::Dup as u8]);
                let use_rhs = self.fresh_label();
                self.emit_branch(Opcode::Jz, use_rhs);
                let end = self.fresh_label();
                self.emit_branch(Opcode::J, end);
                self.bind_label(use_rhs);
                self.push_instr(vec![Opcode::Drop as u8]);
                self.emit_expr(rhs)?;
                self.bind_label(end);
                Ok(())
            }
            _ => {
                self.emit_expr(lhs)?;
                self.emit_expr(rhs)?;
                let opcode = self.binary_opcode(op, lhs.ty)?;
                self.push_instr(vec![opcode as u8]);
                Ok(())
            }
        }
    }

    fn arith_family(&self, ty: TypeId) -> ArithFamily {
        match self.types.get(ty) {
            Type::Basic(Basic::Float) => ArithFamily::Float,
            Type::Struct { .. } => ArithFamily::Vector,
            _ => ArithFamily::Int,
        }
    }

    fn is_float(&self, ty: TypeId) -> bool {
        matches!(self.types.get(ty), Type::Basic(Basic::Float))
    }

    fn binary_opcode(&self, op: BinOp, operand_ty: TypeId) -> Result<Opcode, EmitError> {
        use ArithFamily::*;
        use BinOp::*;
        let fam = self.arith_family(operand_ty);
        Ok(match (op, fam) {
            (Add, Int) => Opcode::IAdd,
            (Add, Float) => Opcode::FAdd,
            (Add, Vector) => Opcode::VAdd,
            (Sub, Int) => Opcode::ISub,
            (Sub, Float) => Opcode::FSub,
            (Sub, Vector) => Opcode::VSub,
            (Mul, Int) => Opcode::IMul,
            (Mul, Float) => Opcode::FMul,
            (Mul, Vector) => Opcode::VMul,
            (Div, Int) => Opcode::IDiv,
            (Div, Float) => Opcode::FDiv,
            (Div, Vector) => Opcode::VDiv,
            (Mod, Int) => Opcode::IMod,
            (Mod, Float) => Opcode::FMod,
            (BitAnd, _) => Opcode::IAnd,
            (BitOr, _) => Opcode::IOr,
            (BitXor, _) => Opcode::IXor,
            (Eq, Float) => Opcode::FEq,
            (Eq, _) => Opcode::IEq,
            (Ne, Float) => Opcode::FNe,
            (Ne, _) => Opcode::INe,
            (Gt, Float) => Opcode::FGt,
            (Gt, _) => Opcode::IGt,
            (Ge, Float) => Opcode::FGe,
            (Ge, _) => Opcode::IGe,
            (Lt, Float) => Opcode::FLt,
            (Lt, _) => Opcode::ILt,
            (Le, Float) => Opcode::FLe,
            (Le, _) => Opcode::ILe,
            (And, _) | (Or, _) => unreachable!("short-circuit ops never reach binary_opcode"),
            _ => return Err(EmitError::UnsupportedBinaryOp),
        })
    }

    /// Chooses a fused comparison-branch opcode when `cond` is directly an
    /// integer comparison, per §4.8; anything else (float comparisons,
    /// identifiers, `NOT`, nested `AND`/`OR`) falls back to evaluating the
    /// expression and branching on its 0/1 result with a plain `JZ`.
    fn emit_condition_jump_if_false(&mut self, cond: &BoundExpr, target: Label) -> Result<(), EmitError> {
        if let BoundExprKind::Binary(op, lhs, rhs) = &cond.kind {
            if !matches!(self.arith_family(lhs.ty), ArithFamily::Float) {
                let fused = match op {
                    BinOp::Eq => Some(Opcode::IEqJz),
                    BinOp::Ne => Some(Opcode::INeJz),
                    BinOp::Gt => Some(Opcode::IGtJz),
                    BinOp::Ge => Some(Opcode::IGeJz),
                    BinOp::Lt => Some(Opcode::ILtJz),
                    BinOp::Le => Some(Opcode::ILeJz),
                    _ => None,
                };
                if let Some(opcode) = fused {
                    self.emit_expr(lhs)?;
                    self.emit_expr(rhs)?;
                    self.emit_branch(opcode, target);
                    return Ok(());
                }
            }
        }
        self.emit_expr(cond)?;
        self.emit_branch(Opcode::Jz, target);
        Ok(())
    }

    fn emit_call(&mut self, callee: &BoundExpr, args: &[BoundExpr]) -> Result<(), EmitError> {
        let sid = match &callee.kind {
            BoundExprKind::Ident(Some(sid), _) => *sid,
            _ => return Err(EmitError::UnsupportedLvalue),
        };
        for a in args {
            self.emit_expr(a)?;
        }
        let fs = self.symbols.get(sid).as_function().expect("callee resolves to a function symbol").clone();
        match fs.body {
            FunctionBody::Native { hash } => {
                let index = self.native_slot(hash);
                let return_count = match self.types.get(fs.ty) {
                    Type::Function(sig) => sig.return_type.map(|t| Type::slot_size(t, self.types)).unwrap_or(0),
                    _ => 0,
                };
                if args.len() > 0x3f || return_count > 0x3 {
                    return Err(EmitError::NativeArgCountOutOfRange);
                }
                let packed = ((args.len() as u8) << 2) | return_count as u8;
                let idx_bytes = index.to_le_bytes();
                self.push_instr(vec![Opcode::Native as u8, packed, idx_bytes[0], idx_bytes[1]]);
                Ok(())
            }
            FunctionBody::Defined { .. } => {
                let label = self.func_label(sid);
                let idx = self.push_instr(vec![Opcode::Call as u8, 0, 0, 0]);
                self.fixups.push(Fixup { instr: idx, byte_offset: 1, target: label, kind: FixupKind::Absolute });
                Ok(())
            }
            FunctionBody::Prototype => Err(EmitError::UnresolvedCallTarget),
        }
    }

    fn native_slot(&mut self, hash: u64) -> u16 {
        if let Some(&i) = self.native_index.get(&hash) {
            return i;
        }
        let i = self.natives.len() as u16;
        self.natives.push(hash);
        self.native_index.insert(hash, i);
        i
    }

    fn intern_string(&mut self, s: &str) -> u32 {
        if let Some(&off) = self.string_offsets.get(s) {
            return off;
        }
        let off = self.string_cursor;
        self.string_offsets.insert(s.to_string(), off);
        self.string_cursor += s.len() as u32 + 1;
        self.strings.push(s.to_string());
        off
    }

    // --- variable and member/index access ------------------------------

    fn emit_int_literal(&mut self, v: i64) {
        let bytes = match v {
            0..=7 => {
                let opcode = match v {
                    0 => Opcode::PushConst0,
                    1 => Opcode::PushConst1,
                    2 => Opcode::PushConst2,
                    3 => Opcode::PushConst3,
                    4 => Opcode::PushConst4,
                    5 => Opcode::PushConst5,
                    6 => Opcode::PushConst6,
                    _ => Opcode::PushConst7,
                };
                vec![opcode as u8]
            }
            8..=255 => vec![Opcode::PushConstU8 as u8, v as u8],
            -32768..=32767 => {
                let mut b = vec![Opcode::PushConstS16 as u8];
                b.extend_from_slice(&(v as i16).to_le_bytes());
                b
            }
            0x100..=0xFF_FFFF => {
                let mut b = vec![Opcode::PushConstU24 as u8];
                b.extend_from_slice(&u24_bytes(v as u32));
                b
            }
            _ => {
                let mut b = vec![Opcode::PushConstU32 as u8];
                b.extend_from_slice(&(v as i32 as u32).to_le_bytes());
                b
            }
        };
        self.push_instr(bytes);
    }

    fn emit_float_literal(&mut self, v: f64) {
        let mut bytes = vec![Opcode::PushConstF as u8];
        bytes.extend_from_slice(&(v as f32).to_le_bytes());
        self.push_instr(bytes);
    }

    /// Pushes the address of `sid`'s first slot (for struct/array base
    /// addressing via `IOFFSET`/`ARRAY`), narrowed to the tightest opcode
    /// family the slot index fits.
    fn emit_var_addr(&mut self, sid: SymbolId) -> Result<(), EmitError> {
        let var = self.symbols.get(sid).as_variable().expect("variable symbol");
        let slot = var.frame_slot.expect("frame slot assigned by the second pass");
        let bytes = match var.kind {
            VariableKind::Local | VariableKind::LocalArgument => {
                self.tier_addr_bytes(slot, Opcode::LocalU8, Opcode::LocalU16, Opcode::LocalU24)?
            }
            VariableKind::Static => self.tier_addr_bytes(slot, Opcode::StaticU8, Opcode::StaticU16, Opcode::StaticU24)?,
            VariableKind::Global => self.tier_addr_bytes_no_u8(slot, Opcode::GlobalU16, Opcode::GlobalU24)?,
            VariableKind::Constant => unreachable!("constants are inlined to literals during binding"),
        };
        self.push_instr(bytes);
        Ok(())
    }

    fn tier_addr_bytes(&self, slot: u32, u8op: Opcode, u16op: Opcode, u24op: Opcode) -> Result<Vec<u8>, EmitError> {
        if slot <= u8::MAX as u32 {
            Ok(vec![u8op as u8, slot as u8])
        } else if slot <= u16::MAX as u32 {
            let mut b = vec![u16op as u8];
            b.extend_from_slice(&(slot as u16).to_le_bytes());
            Ok(b)
        } else if slot <= 0xFF_FFFF {
            let mut b = vec![u24op as u8];
            b.extend_from_slice(&u24_bytes(slot));
            Ok(b)
        } else {
            Err(EmitError::SlotOutOfRange(slot))
        }
    }

    fn tier_addr_bytes_no_u8(&self, slot: u32, u16op: Opcode, u24op: Opcode) -> Result<Vec<u8>, EmitError> {
        if slot <= u16::MAX as u32 {
            let mut b = vec![u16op as u8];
            b.extend_from_slice(&(slot as u16).to_le_bytes());
            Ok(b)
        } else if slot <= 0xFF_FFFF {
            let mut b = vec![u24op as u8];
            b.extend_from_slice(&u24_bytes(slot));
            Ok(b)
        } else {
            Err(EmitError::SlotOutOfRange(slot))
        }
    }

    /// Loads one slot at `slot` for `kind`, picking the narrowest opcode
    /// family the slot index fits.
    fn emit_load_slot(&mut self, kind: VariableKind, slot: u32) -> Result<(), EmitError> {
        let bytes = match kind {
            VariableKind::Local | VariableKind::LocalArgument => {
                self.tier_addr_bytes(slot, Opcode::LocalU8Load, Opcode::LocalU16Load, Opcode::LocalU24Load)?
            }
            VariableKind::Static => {
                self.tier_addr_bytes(slot, Opcode::StaticU8Load, Opcode::StaticU16Load, Opcode::StaticU24Load)?
            }
            VariableKind::Global => self.tier_addr_bytes_no_u8(slot, Opcode::GlobalU16Load, Opcode::GlobalU24Load)?,
            VariableKind::Constant => unreachable!("constants are inlined to literals during binding"),
        };
        self.push_instr(bytes);
        Ok(())
    }

    fn emit_store_slot(&mut self, kind: VariableKind, slot: u32) -> Result<(), EmitError> {
        let bytes = match kind {
            VariableKind::Local | VariableKind::LocalArgument => {
                self.tier_addr_bytes(slot, Opcode::LocalU8Store, Opcode::LocalU16Store, Opcode::LocalU24Store)?
            }
            VariableKind::Static => {
                self.tier_addr_bytes(slot, Opcode::StaticU8Store, Opcode::StaticU16Store, Opcode::StaticU24Store)?
            }
            VariableKind::Global => self.tier_addr_bytes_no_u8(slot, Opcode::GlobalU16Store, Opcode::GlobalU24Store)?,
            VariableKind::Constant => unreachable!("constants are inlined to literals during binding"),
        };
        self.push_instr(bytes);
        Ok(())
    }

    /// Loads every slot of a (possibly multi-slot, e.g. `VEC3`) variable in
    /// ascending order, leaving its last field on top of the stack - the
    /// same order a struct/vector literal would leave it in.
    fn emit_load_var(&mut self, sid: SymbolId) -> Result<(), EmitError> {
        let var = self.symbols.get(sid).as_variable().expect("variable symbol");
        let kind = var.kind;
        let base = var.frame_slot.expect("frame slot assigned by the second pass");
        let n = Type::slot_size(var.ty, self.types);
        for i in 0..n {
            self.emit_load_slot(kind, base + i)?;
        }
        Ok(())
    }

    /// Stores every slot of a (possibly multi-slot) variable, popping in
    /// descending field order to match ascending push order on the stack.
    fn emit_store_var(&mut self, sid: SymbolId) -> Result<(), EmitError> {
        let var = self.symbols.get(sid).as_variable().expect("variable symbol");
        let kind = var.kind;
        let base = var.frame_slot.expect("frame slot assigned by the second pass");
        let n = Type::slot_size(var.ty, self.types);
        for i in (0..n).rev() {
            self.emit_store_slot(kind, base + i)?;
        }
        Ok(())
    }

    fn ioffset_bytes(&self, offset: u32, u8op: Opcode, s16op: Opcode) -> Result<Vec<u8>, EmitError> {
        if offset <= u8::MAX as u32 {
            Ok(vec![u8op as u8, offset as u8])
        } else if offset <= i16::MAX as u32 {
            let mut b = vec![s16op as u8];
            b.extend_from_slice(&(offset as i16).to_le_bytes());
            Ok(b)
        } else {
            Err(EmitError::SlotOutOfRange(offset))
        }
    }

    /// Cumulative slot offset of `field` within the struct type `ty`.
    fn field_offset(&self, ty: TypeId, field: scriptlang_core::Symbol) -> Option<(u32, TypeId)> {
        match self.types.get(ty) {
            Type::Struct { fields, .. } => {
                let mut offset = 0;
                for f in fields {
                    if f.name == field {
                        return Some((offset, f.ty));
                    }
                    offset += Type::slot_size(f.ty, self.types);
                }
                None
            }
            _ => None,
        }
    }

    /// Only bases that are a plain identifier are supported: the common
    /// `struct.field` / `array[i]` shapes from end-to-end scripts. Deeper
    /// lvalue chains (a member of a member, an index of a member, ...) are
    /// a known, documented scope limitation rather than silently emitted
    /// wrong.
    fn ident_base(base: &BoundExpr) -> Option<SymbolId> {
        match &base.kind {
            BoundExprKind::Ident(Some(sid), _) => Some(*sid),
            BoundExprKind::Paren(inner) => Self::ident_base(inner),
            _ => None,
        }
    }

    fn emit_member_load(&mut self, base: &BoundExpr, field: scriptlang_core::Symbol, field_ty: TypeId) -> Result<(), EmitError> {
        let sid = Self::ident_base(base).ok_or(EmitError::UnsupportedLvalue)?;
        let base_ty = self.symbols.get(sid).as_variable().expect("variable symbol").ty;
        let (offset, resolved_field_ty) = self.field_offset(base_ty, field).ok_or(EmitError::UnsupportedLvalue)?;
        if Type::slot_size(resolved_field_ty, self.types) != 1 || Type::slot_size(field_ty, self.types) != 1 {
            return Err(EmitError::UnsupportedLvalue);
        }
        self.emit_var_addr(sid)?;
        let bytes = self.ioffset_bytes(offset, Opcode::IOffsetU8Load, Opcode::IOffsetS16Load)?;
        self.push_instr(bytes);
        Ok(())
    }

    fn emit_member_store(&mut self, base: &BoundExpr, field: scriptlang_core::Symbol, field_ty: TypeId) -> Result<(), EmitError> {
        let sid = Self::ident_base(base).ok_or(EmitError::UnsupportedLvalue)?;
        let base_ty = self.symbols.get(sid).as_variable().expect("variable symbol").ty;
        let (offset, resolved_field_ty) = self.field_offset(base_ty, field).ok_or(EmitError::UnsupportedLvalue)?;
        if Type::slot_size(resolved_field_ty, self.types) != 1 || Type::slot_size(field_ty, self.types) != 1 {
            return Err(EmitError::UnsupportedLvalue);
        }
        self.emit_var_addr(sid)?;
        let bytes = self.ioffset_bytes(offset, Opcode::IOffsetU8Store, Opcode::IOffsetS16Store)?;
        self.push_instr(bytes);
        Ok(())
    }

    fn array_elem_ty(&self, ty: TypeId) -> Option<TypeId> {
        match self.types.get(ty) {
            Type::Array(elem, _) => Some(*elem),
            _ => None,
        }
    }

    fn array_bytes(&self, elem_size: u32, u8op: Opcode, u16op: Opcode) -> Result<Vec<u8>, EmitError> {
        if elem_size <= u8::MAX as u32 {
            Ok(vec![u8op as u8, elem_size as u8])
        } else if elem_size <= u16::MAX as u32 {
            let mut b = vec![u16op as u8];
            b.extend_from_slice(&(elem_size as u16).to_le_bytes());
            Ok(b)
        } else {
            Err(EmitError::SlotOutOfRange(elem_size))
        }
    }

    fn emit_index_load(&mut self, base: &BoundExpr, index: &BoundExpr, elem_ty: TypeId) -> Result<(), EmitError> {
        let sid = Self::ident_base(base).ok_or(EmitError::UnsupportedLvalue)?;
        let base_ty = self.symbols.get(sid).as_variable().expect("variable symbol").ty;
        let array_elem_ty = self.array_elem_ty(base_ty).ok_or(EmitError::UnsupportedLvalue)?;
        if Type::slot_size(elem_ty, self.types) != 1 {
            return Err(EmitError::UnsupportedLvalue);
        }
        self.emit_var_addr(sid)?;
        self.emit_expr(index)?;
        let elem_size = Type::slot_size(array_elem_ty, self.types);
        let bytes = self.array_bytes(elem_size, Opcode::ArrayU8Load, Opcode::ArrayU16Load)?;
        self.push_instr(bytes);
        Ok(())
    }

    fn emit_index_store(&mut self, base: &BoundExpr, index: &BoundExpr, elem_ty: TypeId) -> Result<(), EmitError> {
        let sid = Self::ident_base(base).ok_or(EmitError::UnsupportedLvalue)?;
        let base_ty = self.symbols.get(sid).as_variable().expect("variable symbol").ty;
        let array_elem_ty = self.array_elem_ty(base_ty).ok_or(EmitError::UnsupportedLvalue)?;
        if Type::slot_size(elem_ty, self.types) != 1 {
            return Err(EmitError::UnsupportedLvalue);
        }
        self.emit_var_addr(sid)?;
        self.emit_expr(index)?;
        let elem_size = Type::slot_size(array_elem_ty, self.types);
        let bytes = self.array_bytes(elem_size, Opcode::ArrayU8Store, Opcode::ArrayU16Store)?;
        self.push_instr(bytes);
        Ok(())
    }

    // --- finalization ---------------------------------------------------

    fn const_image_cells(&self, init: Option<&BoundExpr>, n: usize) -> Vec<u64> {
        match init.map(|e| &e.kind) {
            Some(BoundExprKind::IntLit(v)) => vec![*v as u64],
            Some(BoundExprKind::BoolLit(b)) => vec![*b as u64],
            Some(BoundExprKind::FloatLit(v)) => vec![(*v as f32).to_bits() as u64],
            Some(BoundExprKind::Vector(elems)) => {
                let mut cells: Vec<u64> = elems
                    .iter()
                    .map(|e| match &e.kind {
                        BoundExprKind::FloatLit(v) => (*v as f32).to_bits() as u64,
                        BoundExprKind::IntLit(v) => *v as u64,
                        BoundExprKind::BoolLit(b) => *b as u64,
                        _ => 0,
                    })
                    .collect();
                cells.resize(n, 0);
                cells
            }
            // Non-literal initializers (anything computed rather than
            // written as a literal) are a documented limitation: the data
            // image zero-fills and the value is never actually computed,
            // since static/global initializers run as data, not code.
            _ => vec![0u64; n],
        }
    }

    fn build_data_images(&self, program: &BoundProgram) -> (Vec<u64>, Vec<u64>) {
        let mut globals = Vec::new();
        let mut statics = Vec::new();
        for (sid, init) in &program.statics {
            let var = self.symbols.get(*sid).as_variable().expect("static/global variable symbol");
            let n = Type::slot_size(var.ty, self.types) as usize;
            let cells = self.const_image_cells(init.as_ref(), n);
            match var.kind {
                VariableKind::Global => globals.extend(cells),
                _ => statics.extend(cells),
            }
        }
        (globals, statics)
    }

    fn finish(
        self,
        program: &BoundProgram,
        script_name: &str,
        script_hash: u64,
        globals_block_index: u32,
    ) -> Result<CompiledProgram, EmitError> {
        let lens: Vec<usize> = self.instrs.iter().map(|b| b.len()).collect();
        let starts = final_instr_starts(&lens);
        let code: Vec<u8> = self.instrs.iter().flat_map(|b| b.iter().copied()).collect();
        let pages = split_into_pages(&code, &lens);
        let mut patched: Vec<u8> = pages.into_iter().flatten().collect();

        for fx in &self.fixups {
            let instr_start = starts[fx.instr];
            let write_at = instr_start + fx.byte_offset;
            let target_instr = *self.labels.get(&fx.target).ok_or(EmitError::UnresolvedLabel)?;
            let target_addr = starts[target_instr];
            match fx.kind {
                FixupKind::Absolute => {
                    patched[write_at..write_at + 3].copy_from_slice(&u24_bytes(target_addr as u32));
                }
                FixupKind::RelativeToEndOfInstr => {
                    let anchor = instr_start + lens[fx.instr];
                    let delta = target_addr as i64 - anchor as i64;
                    let delta = i16::try_from(delta).map_err(|_| EmitError::BranchOutOfRange(delta))?;
                    patched[write_at..write_at + 2].copy_from_slice(&delta.to_le_bytes());
                }
                FixupKind::RelativeWithinInstr(local_anchor) => {
                    let anchor = instr_start + local_anchor;
                    let delta = target_addr as i64 - anchor as i64;
                    let delta = i16::try_from(delta).map_err(|_| EmitError::BranchOutOfRange(delta))?;
                    patched[write_at..write_at + 2].copy_from_slice(&delta.to_le_bytes());
                }
            }
        }

        let code_pages = patched
            .chunks(CODE_PAGE_SIZE)
            .map(|c| {
                let mut page = [0u8; CODE_PAGE_SIZE];
                page.copy_from_slice(c);
                page
            })
            .collect();

        let (globals_image, statics_image) = self.build_data_images(program);

        Ok(CompiledProgram {
            name: script_name.to_string(),
            hash: script_hash,
            globals_block_index,
            globals_image,
            statics_image,
            args_count: 0,
            strings: self.strings,
            natives: self.natives,
            code_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind;
    use crate::const_eval;
    use crate::first_pass;
    use crate::lexer::tokenize;
    use crate::parser::Parser;
    use crate::second_pass;
    use crate::symtab::SymbolTable;
    use scriptlang_core::{FileId, Interner};
    use std::collections::HashMap as Map;

    fn emit_source(src: &str) -> CompiledProgram {
        let mut interner = Interner::new();
        let (toks, _) = tokenize(FileId::from_raw(0), src);
        let parser = Parser::new(FileId::from_raw(0), toks, &mut interner);
        let (mut ast, mut diags) = parser.parse_program();
        let mut types = Arena::<Type>::new();
        let mut symbols = SymbolTable::new();
        let vec3_ty = first_pass::register_builtins(&mut types, &mut symbols, &mut interner);
        let fp_out = first_pass::register(&ast, &mut types, &mut symbols, &interner, &mut diags);
        first_pass::resolve_types(&mut types, &symbols, &interner, &Map::new(), &mut diags);
        const_eval::run(&mut ast, &mut symbols, &interner, fp_out.const_queue.clone(), &mut diags);
        let sp_out = second_pass::run(&ast, &mut types, &mut symbols, &interner, vec3_ty, &fp_out, &mut diags);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        let bound = bind::bind(&ast, &symbols, &fp_out, &sp_out);
        let name = fp_out.script_name.map(|s| interner.resolve(s).to_string()).unwrap_or_default();
        let hash = fp_out.script_hash.unwrap_or(0) as u64;
        let globals_block = fp_out.globals_block_index.unwrap_or(0);
        emit(&bound, &symbols, &types, &interner, &name, hash, globals_block).expect("emit should succeed")
    }

    #[test]
    fn minimal_program_emits_exact_enter_leave_bytes() {
        let prog = emit_source("SCRIPT_NAME t\nPROC MAIN()\nENDPROC\n");
        assert_eq!(prog.name, "t");
        let code = prog.code();
        // ENTER 0,2,'t' (6 bytes: opcode, argsSize, localsSize u16 LE, nameLen, name) then LEAVE 0,0 (3 bytes).
        assert_eq!(&code[0..9], &[0x64, 0x00, 0x02, 0x00, 0x01, b't', 0x65, 0x00, 0x00]);
        assert!(code[9..].iter().all(|&b| b == Opcode::Nop as u8));
    }

    #[test]
    fn mutual_recursion_binds_calls_to_each_others_entry() {
        let prog = emit_source(
            "FUNC INT A(INT n)\nRETURN B(n)\nENDFUNC\nFUNC INT B(INT n)\nRETURN A(n)\nENDFUNC\nPROC MAIN()\nENDPROC\n",
        );
        let code = prog.code();
        let call_positions: Vec<usize> =
            code.iter().enumerate().filter(|&(_, &b)| b == Opcode::Call as u8).map(|(i, _)| i).collect();
        assert_eq!(call_positions.len(), 2);
        for &pos in &call_positions {
            let target = u32::from_le_bytes([code[pos + 1], code[pos + 2], code[pos + 3], 0]);
            assert_eq!(code[target as usize], Opcode::Enter as u8);
        }
    }

    #[test]
    fn struct_global_vector_initializer_lands_in_globals_image() {
        let prog = emit_source(
            "STRUCT P\nFLOAT x\nFLOAT y\nFLOAT z\nENDSTRUCT\nGLOBAL 0 owner\nP p := <<1.0, 2.0, 3.0>>\nENDGLOBAL\nPROC MAIN()\nENDPROC\n",
        );
        assert_eq!(prog.globals_image.len(), 3);
        assert_eq!(prog.globals_image[1], (2.0f32).to_bits() as u64);
    }

    #[test]
    fn switch_emits_count_and_exact_entry_bytes() {
        let prog = emit_source(
            "PROC MAIN()\nINT x := 1\nSWITCH x\nCASE 1\nBREAK\nCASE 2\nBREAK\nCASE 3\nBREAK\nDEFAULT\nBREAK\nENDSWITCH\nENDPROC\n",
        );
        let code = prog.code();
        let switch_pos = code.iter().position(|&b| b == Opcode::Switch as u8).expect("a SWITCH instruction");
        assert_eq!(code[switch_pos + 1], 3);
        // count byte + 3 entries * (4-byte caseValue + 2-byte jumpOffset).
        let next = code[switch_pos + 2 + 3 * 6];
        assert_eq!(next, Opcode::J as u8, "SWITCH is followed immediately by the default jump");
    }

    #[test]
    fn string_literal_interns_once_and_pushes_its_pool_offset() {
        let prog = emit_source("PROC MAIN()\nSTRING s := \"hi\"\nSTRING t := \"hi\"\nENDPROC\n");
        assert_eq!(prog.strings, vec!["hi".to_string()]);
    }

    #[test]
    fn break_outside_any_loop_is_an_emit_error() {
        // second_pass never diagnoses this, so the emitter is the one
        // place that must refuse rather than panic on an empty stack.
        let mut interner = Interner::new();
        let src = "PROC MAIN()\nBREAK\nENDPROC\n";
        let (toks, _) = tokenize(FileId::from_raw(0), src);
        let parser = Parser::new(FileId::from_raw(0), toks, &mut interner);
        let (mut ast, mut diags) = parser.parse_program();
        let mut types = Arena::<Type>::new();
        let mut symbols = SymbolTable::new();
        let vec3_ty = first_pass::register_builtins(&mut types, &mut symbols, &mut interner);
        let fp_out = first_pass::register(&ast, &mut types, &mut symbols, &interner, &mut diags);
        first_pass::resolve_types(&mut types, &symbols, &interner, &Map::new(), &mut diags);
        const_eval::run(&mut ast, &mut symbols, &interner, fp_out.const_queue.clone(), &mut diags);
        let sp_out = second_pass::run(&ast, &mut types, &mut symbols, &interner, vec3_ty, &fp_out, &mut diags);
        assert!(diags.is_empty());
        let bound = bind::bind(&ast, &symbols, &fp_out, &sp_out);
        let err = emit(&bound, &symbols, &types, &interner, "t", 0, 0).unwrap_err();
        assert!(matches!(err, EmitError::BreakOutsideLoop));
    }
}

//! Hand-written recursive-descent parser. No token insertion/deletion
//! repair: on an unexpected token the parser reports `SyntaxError` and
//! skips to the next top-level keyword or statement terminator.

use scriptlang_core::{FileId, Interner, Span, Symbol};

use crate::ast::{
    Ast, AssignOp, BinOp, DeclStmt, ExprId, ExprKind, FunctionDecl, Item, Param, StmtId, StmtKind,
    StructDecl, TypeExpr, UnOp,
};
use crate::diagnostics::{DiagnosticMessage, Diagnostics, Kind};
use crate::lexer::{SpannedTok, Tok};

pub struct Parser<'src> {
    toks: Vec<SpannedTok>,
    pos: usize,
    file: FileId,
    interner: &'src mut Interner,
    diags: Diagnostics,
    ast: Ast,
}

impl<'src> Parser<'src> {
    pub fn new(file: FileId, toks: Vec<SpannedTok>, interner: &'src mut Interner) -> Self {
        Self { toks, pos: 0, file, interner, diags: Diagnostics::new(), ast: Ast::new() }
    }

    pub fn parse_program(mut self) -> (Ast, Diagnostics) {
        self.skip_newlines();
        while !self.at_end() {
            if let Some(item) = self.parse_item() {
                self.ast.items.push(item);
            }
            self.skip_newlines();
        }
        (self.ast, self.diags)
    }

    // --- token cursor helpers ---

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|t| &t.tok)
    }

    /// The current token's span, or the last token's span at end-of-input
    /// (never [`Span::unknown`] once at least one token has been seen, so
    /// `Span::to` never merges a real span with the unknown sentinel).
    fn peek_span(&self) -> Span {
        self.toks
            .get(self.pos)
            .or_else(|| self.toks.last())
            .map(|t| t.span)
            .unwrap_or_else(Span::unknown)
    }

    fn bump(&mut self) -> Option<SpannedTok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == Some(tok)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> bool {
        if self.eat(&tok) {
            true
        } else {
            self.error(format!("expected {what}"));
            false
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Tok::Newline) {}
    }

    fn error(&mut self, message: impl Into<String>) {
        self.diags.push(DiagnosticMessage::error(Kind::SyntaxError, self.peek_span(), message));
    }

    /// Interns identifier text as written. Keywords are matched
    /// case-insensitively by the lexer, but user-chosen names keep their
    /// original spelling so diagnostics and disassembly echo it back.
    fn intern_str(&mut self, s: &str) -> Symbol {
        self.interner.intern(s)
    }

    /// Recover from a parse error by skipping tokens until one that starts
    /// a new top-level form or a statement terminator.
    fn recover_to_top_level(&mut self) {
        while let Some(tok) = self.peek() {
            if starts_top_level(tok) {
                return;
            }
            if matches!(tok, Tok::Newline) {
                self.pos += 1;
                return;
            }
            self.pos += 1;
        }
    }

    // --- top-level items ---

    fn parse_item(&mut self) -> Option<Item> {
        let item = match self.peek()? {
            Tok::ScriptName => self.parse_script_name(),
            Tok::ScriptHash => self.parse_script_hash(),
            Tok::Using => self.parse_using(),
            Tok::Proc => self.parse_func_like(false),
            Tok::Func => self.parse_func_like(true),
            Tok::Proto => self.parse_proto(),
            Tok::Native => self.parse_native(),
            Tok::Struct => self.parse_struct(),
            Tok::Const => self.parse_const(),
            Tok::Global => self.parse_global(),
            _ => self.parse_bare_decl(),
        };
        if item.is_none() {
            self.recover_to_top_level();
        }
        item
    }

    fn parse_script_name(&mut self) -> Option<Item> {
        self.bump();
        let name = self.parse_ident()?;
        Some(Item::ScriptName(name))
    }

    fn parse_script_hash(&mut self) -> Option<Item> {
        self.bump();
        let v = self.parse_int_lit()?;
        Some(Item::ScriptHash(v))
    }

    fn parse_using(&mut self) -> Option<Item> {
        self.bump();
        match self.bump()?.tok {
            Tok::StringLit(s) => Some(Item::Using(s)),
            _ => {
                self.error("expected a string path after USING");
                None
            }
        }
    }

    fn parse_ident(&mut self) -> Option<Symbol> {
        match self.peek()?.clone() {
            Tok::Ident(s) => {
                self.bump();
                Some(self.intern_str(&s))
            }
            _ => {
                self.error("expected an identifier");
                None
            }
        }
    }

    fn parse_int_lit(&mut self) -> Option<i64> {
        let negative = self.eat(&Tok::Minus);
        match self.bump()?.tok {
            Tok::IntLit(v) => Some(if negative { -v } else { v }),
            _ => {
                self.error("expected an integer literal");
                None
            }
        }
    }

    // --- type expressions (declarators) ---

    fn parse_base_type(&mut self) -> Option<TypeExpr> {
        let name = match self.peek()?.clone() {
            Tok::IntType => {
                self.bump();
                self.intern_str("INT")
            }
            Tok::FloatType => {
                self.bump();
                self.intern_str("FLOAT")
            }
            Tok::BoolType => {
                self.bump();
                self.intern_str("BOOL")
            }
            Tok::StringType => {
                self.bump();
                self.intern_str("STRING")
            }
            Tok::AnyType => {
                self.bump();
                self.intern_str("ANY")
            }
            Tok::Ident(s) => {
                self.bump();
                self.intern_str(&s)
            }
            _ => {
                self.error("expected a type name");
                return None;
            }
        };
        Some(TypeExpr::Named(name))
    }

    /// Parses `base [ len ] ... ` and wraps `REF base` callers separately.
    fn parse_declared_type(&mut self) -> Option<TypeExpr> {
        let mut ty = self.parse_base_type()?;
        while self.eat(&Tok::LBracket) {
            let len = self.parse_int_lit()? as u32;
            self.expect(Tok::RBracket, "`]`");
            ty = TypeExpr::Array(Box::new(ty), len);
        }
        Some(ty)
    }

    fn parse_param_list(&mut self) -> Option<Vec<Param>> {
        self.expect(Tok::LParen, "`(`");
        let mut params = Vec::new();
        if !self.check(&Tok::RParen) {
            loop {
                let start = self.peek_span();
                let is_ref = self.eat(&Tok::Amp);
                let mut ty = self.parse_declared_type()?;
                if is_ref {
                    ty = TypeExpr::Ref(Box::new(ty));
                }
                let name = self.parse_ident()?;
                params.push(Param { name, ty, span: start.to(self.peek_span()) });
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen, "`)`");
        Some(params)
    }

    fn parse_func_like(&mut self, has_return: bool) -> Option<Item> {
        let start = self.peek_span();
        self.bump(); // PROC | FUNC
        let return_type = if has_return { Some(self.parse_declared_type()?) } else { None };
        let name = self.parse_ident()?;
        let params = self.parse_param_list()?;
        self.skip_newlines();
        let body = self.parse_block_until(if has_return { &Tok::EndFunc } else { &Tok::EndProc });
        let end_tok = if has_return { Tok::EndFunc } else { Tok::EndProc };
        self.expect(end_tok, "ENDFUNC/ENDPROC");
        let span = start.to(self.peek_span());
        let decl = FunctionDecl { name, params, return_type, body: Some(body), span };
        Some(if has_return { Item::Func(decl) } else { Item::Proc(decl) })
    }

    fn parse_proto(&mut self) -> Option<Item> {
        let start = self.peek_span();
        self.bump(); // PROTO
        let has_return = self.eat(&Tok::Func);
        if !has_return {
            self.expect(Tok::Proc, "PROC or FUNC after PROTO");
        }
        let return_type = if has_return { Some(self.parse_declared_type()?) } else { None };
        let name = self.parse_ident()?;
        let params = self.parse_param_list()?;
        let span = start.to(self.peek_span());
        let decl = FunctionDecl { name, params, return_type, body: None, span };
        Some(if has_return { Item::ProtoFunc(decl) } else { Item::ProtoProc(decl) })
    }

    fn parse_native(&mut self) -> Option<Item> {
        let start = self.peek_span();
        self.bump(); // NATIVE
        let has_return = self.eat(&Tok::Func);
        if !has_return {
            self.expect(Tok::Proc, "PROC or FUNC after NATIVE");
        }
        let return_type = if has_return { Some(self.parse_declared_type()?) } else { None };
        let name = self.parse_ident()?;
        let params = self.parse_param_list()?;
        let span = start.to(self.peek_span());
        let decl = FunctionDecl { name, params, return_type, body: None, span };
        Some(if has_return { Item::NativeFunc(decl) } else { Item::NativeProc(decl) })
    }

    fn parse_struct(&mut self) -> Option<Item> {
        let start = self.peek_span();
        self.bump(); // STRUCT
        let name = self.parse_ident()?;
        self.skip_newlines();
        let mut fields = Vec::new();
        while !self.check(&Tok::EndStruct) && !self.at_end() {
            let field_start = self.peek_span();
            let is_ref = self.eat(&Tok::Amp);
            let mut ty = self.parse_declared_type()?;
            if is_ref {
                ty = TypeExpr::Ref(Box::new(ty));
            }
            let fname = self.parse_ident()?;
            fields.push(Param { name: fname, ty, span: field_start.to(self.peek_span()) });
            self.skip_newlines();
        }
        self.expect(Tok::EndStruct, "ENDSTRUCT");
        let span = start.to(self.peek_span());
        Some(Item::Struct(StructDecl { name, fields, span }))
    }

    fn parse_bare_decl_stmt(&mut self) -> Option<DeclStmt> {
        let start = self.peek_span();
        let ty = self.parse_declared_type()?;
        let name = self.parse_ident()?;
        let initializer = if self.eat(&Tok::Assign) { Some(self.parse_expr()?) } else { None };
        let span = start.to(self.peek_span());
        Some(DeclStmt { name, ty, initializer, span })
    }

    fn parse_const(&mut self) -> Option<Item> {
        self.bump(); // CONST
        Some(Item::Const(self.parse_bare_decl_stmt()?))
    }

    fn parse_bare_decl(&mut self) -> Option<Item> {
        Some(Item::Static(self.parse_bare_decl_stmt()?))
    }

    fn parse_global(&mut self) -> Option<Item> {
        self.bump(); // GLOBAL
        let block = self.parse_int_lit()? as u32;
        let owner = self.parse_ident()?;
        self.skip_newlines();
        let mut decls = Vec::new();
        while !self.check(&Tok::EndGlobal) && !self.at_end() {
            decls.push(self.parse_bare_decl_stmt()?);
            self.skip_newlines();
        }
        self.expect(Tok::EndGlobal, "ENDGLOBAL");
        Some(Item::Global { block, owner, decls })
    }

    // --- statements ---

    fn parse_block_until(&mut self, terminator: &Tok) -> Vec<StmtId> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(terminator) || self.at_end() {
                break;
            }
            match self.parse_statement() {
                Some(id) => stmts.push(id),
                None => self.recover_to_statement_boundary(),
            }
        }
        stmts
    }

    fn recover_to_statement_boundary(&mut self) {
        while let Some(tok) = self.peek() {
            if matches!(tok, Tok::Newline) {
                self.pos += 1;
                return;
            }
            if starts_top_level(tok) || is_block_terminator(tok) {
                return;
            }
            self.pos += 1;
        }
    }

    fn parse_statement(&mut self) -> Option<StmtId> {
        let start = self.peek_span();
        match self.peek()?.clone() {
            Tok::If => self.parse_if(start),
            Tok::While => self.parse_while(start),
            Tok::Repeat => self.parse_repeat(start),
            Tok::Switch => self.parse_switch(start),
            Tok::Return => {
                self.bump();
                let value = if self.check(&Tok::Newline) || self.at_end() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                Some(self.ast.push_stmt(StmtKind::Return(value), start.to(self.peek_span())))
            }
            Tok::Break => {
                self.bump();
                Some(self.ast.push_stmt(StmtKind::Break, start.to(self.peek_span())))
            }
            Tok::Continue => {
                self.bump();
                Some(self.ast.push_stmt(StmtKind::Continue, start.to(self.peek_span())))
            }
            Tok::IntType | Tok::FloatType | Tok::BoolType | Tok::StringType | Tok::AnyType => {
                self.parse_local_decl(start)
            }
            Tok::Ident(_) if self.is_local_decl_lookahead() => self.parse_local_decl(start),
            _ => self.parse_assignment_or_expr_statement(start),
        }
    }

    /// Disambiguates `Foo x` (declaration of a struct-typed local) from a
    /// bare expression statement: only true when an identifier is directly
    /// followed by another identifier (the variable name).
    fn is_local_decl_lookahead(&self) -> bool {
        matches!(self.toks.get(self.pos + 1).map(|t| &t.tok), Some(Tok::Ident(_)))
    }

    fn parse_local_decl(&mut self, start: Span) -> Option<StmtId> {
        let ty = self.parse_declared_type()?;
        let name = self.parse_ident()?;
        let initializer = if self.eat(&Tok::Assign) { Some(self.parse_expr()?) } else { None };
        let span = start.to(self.peek_span());
        Some(self.ast.push_stmt(StmtKind::VarDecl { name, ty, initializer }, span))
    }

    fn parse_assignment_or_expr_statement(&mut self, start: Span) -> Option<StmtId> {
        let expr = self.parse_expr()?;
        let op = match self.peek() {
            Some(Tok::Assign) => Some(AssignOp::Assign),
            Some(Tok::PlusAssign) => Some(AssignOp::AddAssign),
            Some(Tok::MinusAssign) => Some(AssignOp::SubAssign),
            Some(Tok::StarAssign) => Some(AssignOp::MulAssign),
            Some(Tok::SlashAssign) => Some(AssignOp::DivAssign),
            Some(Tok::PercentAssign) => Some(AssignOp::ModAssign),
            Some(Tok::AmpAssign) => Some(AssignOp::AndAssign),
            Some(Tok::PipeAssign) => Some(AssignOp::OrAssign),
            Some(Tok::CaretAssign) => Some(AssignOp::XorAssign),
            _ => None,
        };
        let span = start.to(self.peek_span());
        if let Some(op) = op {
            self.bump();
            let rhs = self.parse_expr()?;
            Some(self.ast.push_stmt(StmtKind::Assign { lhs: expr, op, rhs }, span))
        } else {
            Some(self.ast.push_stmt(StmtKind::Expr(expr), span))
        }
    }

    fn parse_if(&mut self, start: Span) -> Option<StmtId> {
        self.bump(); // IF
        let cond = self.parse_expr()?;
        self.skip_newlines();
        let then_block = self.parse_block_until_any(&[Tok::Else, Tok::EndIf]);
        let else_block = if self.eat(&Tok::Else) {
            self.skip_newlines();
            Some(self.parse_block_until(&Tok::EndIf))
        } else {
            None
        };
        self.expect(Tok::EndIf, "ENDIF");
        let span = start.to(self.peek_span());
        Some(self.ast.push_stmt(StmtKind::If { cond, then_block, else_block }, span))
    }

    fn parse_block_until_any(&mut self, terminators: &[Tok]) -> Vec<StmtId> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_end() || terminators.iter().any(|t| self.check(t)) {
                break;
            }
            match self.parse_statement() {
                Some(id) => stmts.push(id),
                None => self.recover_to_statement_boundary(),
            }
        }
        stmts
    }

    fn parse_while(&mut self, start: Span) -> Option<StmtId> {
        self.bump(); // WHILE
        let cond = self.parse_expr()?;
        self.skip_newlines();
        let body = self.parse_block_until(&Tok::EndWhile);
        self.expect(Tok::EndWhile, "ENDWHILE");
        let span = start.to(self.peek_span());
        Some(self.ast.push_stmt(StmtKind::While { cond, body }, span))
    }

    fn parse_repeat(&mut self, start: Span) -> Option<StmtId> {
        self.bump(); // REPEAT
        let limit = self.parse_expr()?;
        self.expect(Tok::Comma, "`,`");
        let counter = self.parse_expr()?;
        self.skip_newlines();
        let body = self.parse_block_until(&Tok::EndRepeat);
        self.expect(Tok::EndRepeat, "ENDREPEAT");
        let span = start.to(self.peek_span());
        Some(self.ast.push_stmt(StmtKind::Repeat { limit, counter, body }, span))
    }

    fn parse_switch(&mut self, start: Span) -> Option<StmtId> {
        self.bump(); // SWITCH
        let value = self.parse_expr()?;
        self.skip_newlines();
        let mut cases = Vec::new();
        let mut default = None;
        while self.check(&Tok::Case) || self.check(&Tok::Default) {
            if self.eat(&Tok::Case) {
                let v = self.parse_int_lit()?;
                self.expect(Tok::Colon, "`:`");
                self.skip_newlines();
                let body = self.parse_block_until_any(&[Tok::Case, Tok::Default, Tok::EndSwitch]);
                cases.push((v, body));
            } else {
                self.bump(); // DEFAULT
                self.expect(Tok::Colon, "`:`");
                self.skip_newlines();
                default = Some(self.parse_block_until_any(&[Tok::Case, Tok::Default, Tok::EndSwitch]));
            }
            self.skip_newlines();
        }
        self.expect(Tok::EndSwitch, "ENDSWITCH");
        let span = start.to(self.peek_span());
        Some(self.ast.push_stmt(StmtKind::Switch { value, cases, default }, span))
    }

    // --- expressions (precedence climbing) ---

    fn parse_expr(&mut self) -> Option<ExprId> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let start = self.ast.expr(lhs).span;
            let rhs = self.parse_and()?;
            let span = start.to(self.ast.expr(rhs).span);
            lhs = self.ast.push_expr(ExprKind::Binary(BinOp::Or, lhs, rhs), span);
        }
        Some(lhs)
    }

    fn parse_and(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_comparison()?;
        while self.eat(&Tok::And) {
            let start = self.ast.expr(lhs).span;
            let rhs = self.parse_comparison()?;
            let span = start.to(self.ast.expr(rhs).span);
            lhs = self.ast.push_expr(ExprKind::Binary(BinOp::And, lhs, rhs), span);
        }
        Some(lhs)
    }

    fn parse_comparison(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_bitwise()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Eq) => BinOp::Eq,
                Some(Tok::Ne) => BinOp::Ne,
                Some(Tok::Gt) => BinOp::Gt,
                Some(Tok::Ge) => BinOp::Ge,
                Some(Tok::Lt) => BinOp::Lt,
                Some(Tok::Le) => BinOp::Le,
                _ => break,
            };
            self.bump();
            let start = self.ast.expr(lhs).span;
            let rhs = self.parse_bitwise()?;
            let span = start.to(self.ast.expr(rhs).span);
            lhs = self.ast.push_expr(ExprKind::Binary(op, lhs, rhs), span);
        }
        Some(lhs)
    }

    fn parse_bitwise(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Amp) => BinOp::BitAnd,
                Some(Tok::Pipe) => BinOp::BitOr,
                Some(Tok::Caret) => BinOp::BitXor,
                _ => break,
            };
            self.bump();
            let start = self.ast.expr(lhs).span;
            let rhs = self.parse_additive()?;
            let span = start.to(self.ast.expr(rhs).span);
            lhs = self.ast.push_expr(ExprKind::Binary(op, lhs, rhs), span);
        }
        Some(lhs)
    }

    fn parse_additive(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let start = self.ast.expr(lhs).span;
            let rhs = self.parse_multiplicative()?;
            let span = start.to(self.ast.expr(rhs).span);
            lhs = self.ast.push_expr(ExprKind::Binary(op, lhs, rhs), span);
        }
        Some(lhs)
    }

    fn parse_multiplicative(&mut self) -> Option<ExprId> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let start = self.ast.expr(lhs).span;
            let rhs = self.parse_unary()?;
            let span = start.to(self.ast.expr(rhs).span);
            lhs = self.ast.push_expr(ExprKind::Binary(op, lhs, rhs), span);
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<ExprId> {
        let start = self.peek_span();
        if self.eat(&Tok::Not) {
            let inner = self.parse_unary()?;
            let span = start.to(self.ast.expr(inner).span);
            return Some(self.ast.push_expr(ExprKind::Unary(UnOp::Not, inner), span));
        }
        if self.eat(&Tok::Minus) {
            let inner = self.parse_unary()?;
            let span = start.to(self.ast.expr(inner).span);
            return Some(self.ast.push_expr(ExprKind::Unary(UnOp::Neg, inner), span));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<ExprId> {
        let mut expr = self.parse_primary()?;
        loop {
            let start = self.ast.expr(expr).span;
            if self.eat(&Tok::Dot) {
                let field = self.parse_ident()?;
                let span = start.to(self.peek_span());
                expr = self.ast.push_expr(ExprKind::Member(expr, field), span);
            } else if self.eat(&Tok::LBracket) {
                let index = self.parse_expr()?;
                self.expect(Tok::RBracket, "`]`");
                let span = start.to(self.peek_span());
                expr = self.ast.push_expr(ExprKind::Index(expr, index), span);
            } else if self.eat(&Tok::LParen) {
                let mut args = Vec::new();
                if !self.check(&Tok::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Tok::RParen, "`)`");
                let span = start.to(self.peek_span());
                expr = self.ast.push_expr(ExprKind::Call(expr, args), span);
            } else {
                break;
            }
        }
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<ExprId> {
        let start = self.peek_span();
        match self.peek()?.clone() {
            Tok::IntLit(v) => {
                self.bump();
                Some(self.ast.push_expr(ExprKind::IntLit(v), start.to(self.peek_span())))
            }
            Tok::FloatLit(v) => {
                self.bump();
                Some(self.ast.push_expr(ExprKind::FloatLit(v), start.to(self.peek_span())))
            }
            Tok::True => {
                self.bump();
                Some(self.ast.push_expr(ExprKind::BoolLit(true), start.to(self.peek_span())))
            }
            Tok::False => {
                self.bump();
                Some(self.ast.push_expr(ExprKind::BoolLit(false), start.to(self.peek_span())))
            }
            Tok::StringLit(s) => {
                self.bump();
                let sym = self.interner.intern(&s);
                Some(self.ast.push_expr(ExprKind::StringLit(sym), start.to(self.peek_span())))
            }
            Tok::Ident(s) => {
                self.bump();
                let sym = self.intern_str(&s);
                Some(self.ast.push_expr(ExprKind::Ident(sym), start.to(self.peek_span())))
            }
            Tok::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(Tok::RParen, "`)`");
                Some(self.ast.push_expr(ExprKind::Paren(inner), start.to(self.peek_span())))
            }
            Tok::LShift => {
                self.bump();
                let mut components = Vec::new();
                loop {
                    components.push(self.parse_expr()?);
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(Tok::RShift, "`>>`");
                Some(self.ast.push_expr(ExprKind::Vector(components), start.to(self.peek_span())))
            }
            _ => {
                self.error("expected an expression");
                None
            }
        }
    }
}

fn starts_top_level(tok: &Tok) -> bool {
    matches!(
        tok,
        Tok::ScriptName
            | Tok::ScriptHash
            | Tok::Using
            | Tok::Proc
            | Tok::Func
            | Tok::Proto
            | Tok::Native
            | Tok::Struct
            | Tok::Const
            | Tok::Global
    )
}

fn is_block_terminator(tok: &Tok) -> bool {
    matches!(
        tok,
        Tok::EndProc
            | Tok::EndFunc
            | Tok::EndIf
            | Tok::Else
            | Tok::EndWhile
            | Tok::EndRepeat
            | Tok::EndSwitch
            | Tok::EndStruct
            | Tok::EndGlobal
            | Tok::Case
            | Tok::Default
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(src: &str) -> (Ast, Diagnostics, Interner) {
        let mut interner = Interner::new();
        let (toks, _) = tokenize(FileId::from_raw(0), src);
        let parser = Parser::new(FileId::from_raw(0), toks, &mut interner);
        let (ast, diags) = parser.parse_program();
        (ast, diags, interner)
    }

    #[test]
    fn parses_minimal_script() {
        let (ast, diags, _interner) = parse("SCRIPT_NAME t\nPROC MAIN()\nENDPROC\n");
        assert!(diags.is_empty());
        assert_eq!(ast.items.len(), 2);
        assert!(matches!(ast.items[0], Item::ScriptName(_)));
        match &ast.items[1] {
            Item::Proc(decl) => assert!(decl.params.is_empty()),
            _ => panic!("expected Proc"),
        }
    }

    #[test]
    fn parses_function_with_return_and_call() {
        let src = "FUNC INT ADD(INT a, INT b)\nRETURN a + b\nENDFUNC\n";
        let (ast, diags, _interner) = parse(src);
        assert!(diags.is_empty());
        match &ast.items[0] {
            Item::Func(decl) => {
                assert_eq!(decl.params.len(), 2);
                assert!(decl.return_type.is_some());
            }
            _ => panic!("expected Func"),
        }
    }

    #[test]
    fn parses_struct_with_fields() {
        let (ast, diags, _interner) = parse("STRUCT P\nFLOAT x\nFLOAT y\nFLOAT z\nENDSTRUCT\n");
        assert!(diags.is_empty());
        match &ast.items[0] {
            Item::Struct(s) => assert_eq!(s.fields.len(), 3),
            _ => panic!("expected Struct"),
        }
    }

    #[test]
    fn parses_vector_literal_and_declaration() {
        let (ast, diags, _interner) = parse("PROC MAIN()\nP p := <<1.0, 2.0, 3.0>>\nENDPROC\n");
        assert!(diags.is_empty());
        match &ast.items[0] {
            Item::Proc(decl) => {
                let body = decl.body.as_ref().unwrap();
                assert_eq!(body.len(), 1);
                match &ast.stmt(body[0]).kind {
                    StmtKind::VarDecl { initializer: Some(init), .. } => {
                        assert!(matches!(ast.expr(*init).kind, ExprKind::Vector(_)));
                    }
                    _ => panic!("expected VarDecl"),
                }
            }
            _ => panic!("expected Proc"),
        }
    }

    #[test]
    fn parses_if_while_switch() {
        let src = "PROC MAIN()\nIF a == 1\nRETURN\nENDIF\nWHILE a < 10\na += 1\nENDWHILE\nSWITCH a\nCASE 1:\nRETURN\nDEFAULT:\nRETURN\nENDSWITCH\nENDPROC\n";
        let (ast, diags, _interner) = parse(src);
        assert!(diags.is_empty());
        match &ast.items[0] {
            Item::Proc(decl) => assert_eq!(decl.body.as_ref().unwrap().len(), 3),
            _ => panic!("expected Proc"),
        }
    }

    #[test]
    fn syntax_error_recovers_to_next_top_level_form() {
        let src = "PROC MAIN()\n)))\nENDPROC\nPROC OTHER()\nENDPROC\n";
        let (ast, diags, _interner) = parse(src);
        assert!(diags.has_errors());
        assert_eq!(ast.items.len(), 2);
    }

    #[test]
    fn const_and_global_blocks_parse() {
        let src = "CONST INT X := 3\nGLOBAL 0 owner\nINT counter\nENDGLOBAL\n";
        let (ast, diags, _interner) = parse(src);
        assert!(diags.is_empty());
        assert!(matches!(ast.items[0], Item::Const(_)));
        match &ast.items[1] {
            Item::Global { decls, .. } => assert_eq!(decls.len(), 1),
            _ => panic!("expected Global"),
        }
    }
}

//! A `CompileSession` owns the arenas (AST, type graph, symbol table) for
//! one compile invocation. The AST is dropped at the end of the invocation;
//! the type graph and symbol table outlive it only until bytecode emission
//! completes.

use std::collections::HashMap;

use scriptlang_core::{Arena, FileId, Interner};

use crate::ast::Ast;
use crate::diagnostics::Diagnostics;
use crate::symtab::SymbolTable;
use crate::types::{Type, TypeId};

pub struct CompileSession {
    pub interner: Interner,
    pub types: Arena<Type>,
    pub symbols: SymbolTable,
    pub diagnostics: Diagnostics,
    pub file: FileId,
    /// The builtin `VEC3` type that `<<x,y,z>>` literals bind to.
    pub vec3_ty: TypeId,
}

impl CompileSession {
    pub fn new(file: FileId) -> Self {
        let mut interner = Interner::new();
        let mut types = Arena::new();
        let mut symbols = SymbolTable::new();
        let vec3_ty = crate::first_pass::register_builtins(&mut types, &mut symbols, &mut interner);
        Self {
            interner,
            types,
            symbols,
            diagnostics: Diagnostics::new(),
            file,
            vec3_ty,
        }
    }

    /// Lexes and parses `source`, folding any syntax diagnostics into the
    /// session and returning the resulting AST.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse(&mut self, source: &str) -> Ast {
        let (toks, lex_errors) = crate::lexer::tokenize(self.file, source);
        for (offset, slice) in lex_errors {
            self.diagnostics.push(crate::diagnostics::DiagnosticMessage::error(
                crate::diagnostics::Kind::SyntaxError,
                scriptlang_core::Span::unknown(),
                format!("unrecognized token `{slice}` at byte offset {offset}"),
            ));
        }
        let parser = crate::parser::Parser::new(self.file, toks, &mut self.interner);
        let (ast, parse_diags) = parser.parse_program();
        tracing::debug!(item_count = ast.items.len(), "parsed");
        self.diagnostics.extend(parse_diags);
        ast
    }

    /// Runs lex, parse, first pass, constant folding, and second pass over
    /// `source`, folding every diagnostic into `self.diagnostics`, then
    /// stops - no binding or bytecode emission. This is everything `compile`
    /// does short of producing a program, for callers that only want the
    /// full semantic diagnostic set (e.g. `scriptlangc check`).
    pub fn check(&mut self, source: &str) {
        let span = tracing::info_span!("check");
        let _enter = span.enter();

        let mut ast = self.parse(source);

        tracing::debug!("first pass");
        let first_pass = crate::first_pass::register(
            &ast,
            &mut self.types,
            &mut self.symbols,
            &self.interner,
            &mut self.diagnostics,
        );
        crate::first_pass::resolve_types(
            &mut self.types,
            &self.symbols,
            &self.interner,
            &HashMap::new(),
            &mut self.diagnostics,
        );

        tracing::debug!(constants = first_pass.const_queue.len(), "const eval");
        crate::const_eval::run(
            &mut ast,
            &mut self.symbols,
            &self.interner,
            first_pass.const_queue.clone(),
            &mut self.diagnostics,
        );

        tracing::debug!("second pass");
        crate::second_pass::run(
            &ast,
            &mut self.types,
            &mut self.symbols,
            &self.interner,
            self.vec3_ty,
            &first_pass,
            &mut self.diagnostics,
        );

        tracing::info!(errors = self.diagnostics.error_count(), "checked");
    }

    /// Runs the whole front end over `source` - lex, parse, first pass,
    /// constant folding, second pass, binding, and bytecode emission - and
    /// returns the packaged program. Diagnostics accumulate on `self`
    /// throughout; emission is refused once any of them is an error.
    pub fn compile(mut self, source: &str) -> crate::Result<scriptlang_bytecode::CompiledProgram> {
        let span = tracing::info_span!("compile");
        let _enter = span.enter();

        let mut ast = self.parse(source);

        tracing::debug!("first pass");
        let first_pass = crate::first_pass::register(
            &ast,
            &mut self.types,
            &mut self.symbols,
            &self.interner,
            &mut self.diagnostics,
        );
        crate::first_pass::resolve_types(
            &mut self.types,
            &self.symbols,
            &self.interner,
            &HashMap::new(),
            &mut self.diagnostics,
        );

        tracing::debug!(constants = first_pass.const_queue.len(), "const eval");
        crate::const_eval::run(
            &mut ast,
            &mut self.symbols,
            &self.interner,
            first_pass.const_queue.clone(),
            &mut self.diagnostics,
        );

        tracing::debug!("second pass");
        let second_pass = crate::second_pass::run(
            &ast,
            &mut self.types,
            &mut self.symbols,
            &self.interner,
            self.vec3_ty,
            &first_pass,
            &mut self.diagnostics,
        );

        if self.diagnostics.error_count() > 0 {
            return Err(crate::Error::HasDiagnosticErrors(self.diagnostics));
        }

        tracing::debug!("binding");
        let bound = crate::bind::bind(&ast, &self.symbols, &first_pass, &second_pass);

        tracing::debug!("emitting bytecode");
        let name = first_pass
            .script_name
            .map(|s| self.interner.resolve(s).to_string())
            .unwrap_or_default();
        let hash = first_pass.script_hash.unwrap_or(0) as u64;
        let globals_block_index = first_pass.globals_block_index.unwrap_or(0);
        let program = crate::emitter::emit(
            &bound,
            &self.symbols,
            &self.types,
            &self.interner,
            &name,
            hash,
            globals_block_index,
        )?;
        tracing::info!(pages = program.code_pages.len(), "compiled");
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_populates_ast_and_leaves_diagnostics_empty_on_valid_source() {
        let mut session = CompileSession::new(FileId::from_raw(0));
        let ast = session.parse("SCRIPT_NAME t\nPROC MAIN()\nENDPROC\n");
        assert!(session.diagnostics.is_empty());
        assert_eq!(ast.items.len(), 2);
    }

    #[test]
    fn compile_runs_the_full_pipeline_to_bytecode() {
        let session = CompileSession::new(FileId::from_raw(0));
        let program = session.compile("SCRIPT_NAME t\nPROC MAIN()\nENDPROC\n").unwrap();
        assert_eq!(program.name, "t");
        assert_eq!(&program.code()[0..9], &[0x64, 0x00, 0x02, 0x00, 0x01, b't', 0x65, 0x00, 0x00]);
    }

    #[test]
    fn compile_refuses_to_emit_when_diagnostics_contain_errors() {
        let session = CompileSession::new(FileId::from_raw(0));
        let err = session.compile("PROC MAIN()\nx := 1\nENDPROC\n").unwrap_err();
        assert!(matches!(err, crate::Error::HasDiagnosticErrors(_)));
    }

    #[test]
    fn check_surfaces_undeclared_name_without_emitting() {
        let mut session = CompileSession::new(FileId::from_raw(0));
        session.check("PROC MAIN()\nx := 1\nENDPROC\n");
        assert!(session.diagnostics.error_count() > 0);
    }

    #[test]
    fn check_is_clean_on_well_formed_source() {
        let mut session = CompileSession::new(FileId::from_raw(0));
        session.check("SCRIPT_NAME t\nPROC MAIN()\nENDPROC\n");
        assert!(session.diagnostics.is_empty());
    }
}

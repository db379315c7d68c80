//! Lexing: a `logos`-generated token enum plus a thin wrapper that attaches
//! line/column and byte-offset spans to each token.

use logos::Logos;
use scriptlang_core::{FileId, Position, Span};

#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"//[^\n]*")]
pub enum Tok {
    #[token("\n")]
    Newline,

    #[token("script_name", ignore(case))]
    ScriptName,
    #[token("script_hash", ignore(case))]
    ScriptHash,
    #[token("using", ignore(case))]
    Using,
    #[token("proc", ignore(case))]
    Proc,
    #[token("endproc", ignore(case))]
    EndProc,
    #[token("func", ignore(case))]
    Func,
    #[token("endfunc", ignore(case))]
    EndFunc,
    #[token("proto", ignore(case))]
    Proto,
    #[token("native", ignore(case))]
    Native,
    #[token("struct", ignore(case))]
    Struct,
    #[token("endstruct", ignore(case))]
    EndStruct,
    #[token("const", ignore(case))]
    Const,
    #[token("global", ignore(case))]
    Global,
    #[token("endglobal", ignore(case))]
    EndGlobal,
    #[token("if", ignore(case))]
    If,
    #[token("else", ignore(case))]
    Else,
    #[token("endif", ignore(case))]
    EndIf,
    #[token("while", ignore(case))]
    While,
    #[token("endwhile", ignore(case))]
    EndWhile,
    #[token("repeat", ignore(case))]
    Repeat,
    #[token("endrepeat", ignore(case))]
    EndRepeat,
    #[token("switch", ignore(case))]
    Switch,
    #[token("endswitch", ignore(case))]
    EndSwitch,
    #[token("case", ignore(case))]
    Case,
    #[token("default", ignore(case))]
    Default,
    #[token("break", ignore(case))]
    Break,
    #[token("continue", ignore(case))]
    Continue,
    #[token("return", ignore(case))]
    Return,
    #[token("true", ignore(case))]
    True,
    #[token("false", ignore(case))]
    False,
    #[token("and", ignore(case))]
    And,
    #[token("or", ignore(case))]
    Or,
    #[token("not", ignore(case))]
    Not,

    #[token("int", ignore(case))]
    IntType,
    #[token("float", ignore(case))]
    FloatType,
    #[token("bool", ignore(case))]
    BoolType,
    #[token("string", ignore(case))]
    StringType,
    #[token("any", ignore(case))]
    AnyType,

    #[regex(r"[A-Za-z_][A-Za-z_0-9]*", |lex| lex.slice().to_owned())]
    Ident(String),

    #[regex(r"0x[0-9A-Fa-f]+", |lex| i64::from_str_radix(&lex.slice()[2..], 16).ok())]
    #[regex(r"[0-9]+", |lex| lex.slice().parse().ok())]
    IntLit(i64),

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse().ok())]
    FloatLit(f64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    StringLit(String),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    #[token("<<")]
    LShift,
    #[token(">>")]
    RShift,

    #[token(":=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("&=")]
    AmpAssign,
    #[token("^=")]
    CaretAssign,
    #[token("|=")]
    PipeAssign,

    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token(">=")]
    Ge,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token("<")]
    Lt,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("^")]
    Caret,
    #[token("|")]
    Pipe,

    #[token(":")]
    Colon,
}

fn unescape(raw: &str) -> Option<String> {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                '\\' => out.push('\\'),
                '"' => out.push('"'),
                '\'' => out.push('\''),
                other => out.push(other),
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// A single lexed token with its source span.
#[derive(Clone, Debug)]
pub struct SpannedTok {
    pub tok: Tok,
    pub span: Span,
}

/// Tokenizes the entire input up front, tracking line/column alongside
/// byte offsets so later diagnostics need only the [`Span`] already
/// attached to each token.
pub fn tokenize(file: FileId, source: &str) -> (Vec<SpannedTok>, Vec<(usize, String)>) {
    let mut out = Vec::new();
    let mut errors = Vec::new();
    let mut line = 1u32;
    let mut col = 1u32;
    let mut last_byte = 0usize;

    let mut lexer = Tok::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        advance_position(source, last_byte, span.start, &mut line, &mut col);
        let begin = Position::new(line, col);
        advance_position(source, span.start, span.end, &mut line, &mut col);
        let end = Position::new(line, col);
        last_byte = span.end;

        match result {
            Ok(tok) => {
                let is_newline = matches!(tok, Tok::Newline);
                out.push(SpannedTok {
                    tok,
                    span: Span::new(file, begin, end, (span.start as u32, span.end as u32)),
                });
                if is_newline {
                    line += 1;
                    col = 1;
                }
            }
            Err(()) => errors.push((span.start, lexer.slice().to_string())),
        }
    }

    (out, errors)
}

fn advance_position(source: &str, from: usize, to: usize, line: &mut u32, col: &mut u32) {
    for b in source[from..to].bytes() {
        if b == b'\n' {
            *line += 1;
            *col = 1;
        } else {
            *col += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(FileId::from_raw(0), src).0.into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(toks("PROC"), vec![Tok::Proc]);
        assert_eq!(toks("proc"), vec![Tok::Proc]);
        assert_eq!(toks("Proc"), vec![Tok::Proc]);
    }

    #[test]
    fn identifiers_are_not_confused_with_keywords() {
        assert_eq!(toks("procedure"), vec![Tok::Ident("procedure".to_string())]);
    }

    #[test]
    fn integer_and_float_literals() {
        assert_eq!(toks("42"), vec![Tok::IntLit(42)]);
        assert_eq!(toks("-7"), vec![Tok::Minus, Tok::IntLit(7)]);
        assert_eq!(toks("0x1A"), vec![Tok::IntLit(26)]);
        assert_eq!(toks("3.14"), vec![Tok::FloatLit(3.14)]);
    }

    #[test]
    fn string_literal_with_escapes() {
        assert_eq!(toks(r#""a\nb""#), vec![Tok::StringLit("a\nb".to_string())]);
        assert_eq!(toks("'hi'"), vec![Tok::StringLit("hi".to_string())]);
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        assert_eq!(toks("  // comment\n  PROC"), vec![Tok::Newline, Tok::Proc]);
    }

    #[test]
    fn compound_assignment_operators() {
        assert_eq!(toks("+="), vec![Tok::PlusAssign]);
        assert_eq!(toks(":="), vec![Tok::Assign]);
    }

    #[test]
    fn spans_track_line_and_column() {
        let lexed = tokenize(FileId::from_raw(0), "PROC\nMAIN").0;
        assert_eq!(lexed[0].span.begin(), Position::new(1, 1));
        assert_eq!(lexed[2].span.begin(), Position::new(2, 1));
    }
}

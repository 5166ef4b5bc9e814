//! minicc
//!
//! 小さな C 風言語のフロントエンド。
//! 行指向プリプロセッサ、スキャナ、宣言パーサーで構成し、宣言木を構築する。

pub mod decl_tree;
pub mod error;
pub mod lexer;
pub mod macro_def;
pub mod parser;
pub mod pipeline;
pub mod pp_expr;
pub mod preprocessor;
pub mod sexp;
pub mod source;
pub mod token;

// 主要な型を再エクスポート
pub use decl_tree::{AttrValue, ConstValue, DeclTree, Node, NodeId, PrimitiveKind, TypeSpec};
pub use error::{CompileError, LexError, LexErrors, PPError, ParseError, Result};
pub use lexer::{tokenize, Lexer};
pub use macro_def::{MacroDef, MacroTable};
pub use parser::{FuncDecl, ParseOutcome, Parser, VarDecl};
pub use pipeline::{CompileOptions, FileResult, OutputType, Pipeline, PipelineBuilder, PipelineError};
pub use preprocessor::{LogicalLine, PPConfig, PreprocessedSource, Preprocessor};
pub use sexp::{to_sexp_string, SexpPrinter};
pub use source::{DisplayLocation, FileId, FileRegistry, Pos, SourceLocation};
pub use token::{Literal, Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_lexer_integration() {
        let tokens = tokenize("int main() { }").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::KwInt,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn test_basic_parser_integration() {
        let tokens = tokenize("int main() { }").unwrap();
        let outcome = Parser::new(&tokens).parse();
        assert!(outcome.success());
        assert!(outcome.tree.find("Unit/Body/main/Body").is_some());
    }
}

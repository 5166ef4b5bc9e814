use std::fmt;

use crate::source::Pos;

/// トークン種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // === リテラル ===
    /// 整数リテラル（値は `Token::literal`）
    Number,
    /// 小数リテラル
    Fractional,
    /// 文字列リテラル
    StringLit,
    /// 文字リテラル
    CharLit,

    // === 識別子 ===
    Ident,

    // === キーワード ===
    // 型指定子
    KwInt,
    KwShort,
    KwChar,
    KwBool,
    KwFloat,
    KwVoid,
    KwSigned,
    KwUnsigned,
    // ストレージクラス・修飾子
    KwStatic,
    KwConst,
    // 制御フロー（字句解析のみ、文法規則では使わない）
    KwReturn,
    KwIf,
    KwElse,
    KwFor,
    KwWhile,
    // 定数
    KwTrue,
    KwFalse,
    KwNull,
    // インラインアセンブリ
    KwAsm,

    // === 演算子 ===
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %
    Bang,    // !
    BangEq,  // !=
    Eq,      // =
    EqEq,    // ==
    Lt,      // <
    LtEq,    // <=
    Gt,      // >
    GtEq,    // >=
    Dot,     // .

    // === 区切り記号 ===
    Comma,    // ,
    Semi,     // ;
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }
}

impl TokenKind {
    /// キーワード文字列からTokenKindへの変換
    pub fn from_keyword(s: &str) -> Option<TokenKind> {
        match s {
            "return" => Some(TokenKind::KwReturn),
            "else" => Some(TokenKind::KwElse),
            "false" => Some(TokenKind::KwFalse),
            "for" => Some(TokenKind::KwFor),
            "void" => Some(TokenKind::KwVoid),
            "if" => Some(TokenKind::KwIf),
            "null" => Some(TokenKind::KwNull),
            "true" => Some(TokenKind::KwTrue),
            "while" => Some(TokenKind::KwWhile),
            "int" => Some(TokenKind::KwInt),
            "bool" => Some(TokenKind::KwBool),
            "float" => Some(TokenKind::KwFloat),
            "char" => Some(TokenKind::KwChar),
            "short" => Some(TokenKind::KwShort),
            "signed" => Some(TokenKind::KwSigned),
            "unsigned" => Some(TokenKind::KwUnsigned),
            "static" => Some(TokenKind::KwStatic),
            "const" => Some(TokenKind::KwConst),
            "__asm__" => Some(TokenKind::KwAsm),
            _ => None,
        }
    }

    /// キーワードかどうか
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::KwInt
                | TokenKind::KwShort
                | TokenKind::KwChar
                | TokenKind::KwBool
                | TokenKind::KwFloat
                | TokenKind::KwVoid
                | TokenKind::KwSigned
                | TokenKind::KwUnsigned
                | TokenKind::KwStatic
                | TokenKind::KwConst
                | TokenKind::KwReturn
                | TokenKind::KwIf
                | TokenKind::KwElse
                | TokenKind::KwFor
                | TokenKind::KwWhile
                | TokenKind::KwTrue
                | TokenKind::KwFalse
                | TokenKind::KwNull
                | TokenKind::KwAsm
        )
    }

    /// 診断メッセージ用の表記
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Number => "number",
            TokenKind::Fractional => "fractional number",
            TokenKind::StringLit => "string literal",
            TokenKind::CharLit => "character literal",
            TokenKind::Ident => "identifier",
            TokenKind::KwInt => "int",
            TokenKind::KwShort => "short",
            TokenKind::KwChar => "char",
            TokenKind::KwBool => "bool",
            TokenKind::KwFloat => "float",
            TokenKind::KwVoid => "void",
            TokenKind::KwSigned => "signed",
            TokenKind::KwUnsigned => "unsigned",
            TokenKind::KwStatic => "static",
            TokenKind::KwConst => "const",
            TokenKind::KwReturn => "return",
            TokenKind::KwIf => "if",
            TokenKind::KwElse => "else",
            TokenKind::KwFor => "for",
            TokenKind::KwWhile => "while",
            TokenKind::KwTrue => "true",
            TokenKind::KwFalse => "false",
            TokenKind::KwNull => "null",
            TokenKind::KwAsm => "__asm__",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::BangEq => "!=",
            TokenKind::Eq => "=",
            TokenKind::EqEq => "==",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Semi => ";",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// デコード済みリテラル値
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    /// 整数（文字リテラルの文字コードも含む）
    Whole(u64),
    /// 小数
    Fractional(f64),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Whole(n) => write!(f, "{}", n),
            Literal::Fractional(x) => write!(f, "{}", x),
        }
    }
}

/// 位置情報付きトークン
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// ソース上の字句（文字列リテラルは引用符を除いた中身）
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub pos: Pos,
}

impl Token {
    /// 新しいトークンを作成
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, pos: Pos) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            literal: None,
            pos,
        }
    }

    /// リテラル値付きでトークンを作成
    pub fn with_literal(kind: TokenKind, lexeme: impl Into<String>, literal: Literal, pos: Pos) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            literal: Some(literal),
            pos,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}({})", self.pos, self.kind, self.lexeme)?;
        if let Some(lit) = &self.literal {
            write!(f, " = {}", lit)?;
        }
        Ok(())
    }
}

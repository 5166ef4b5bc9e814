use crate::source::{DisplayLocation, FileRegistry, Pos, SourceLocation};
use crate::token::TokenKind;
use std::fmt;
use std::path::PathBuf;

/// 字句解析エラー
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    /// 閉じられていない文字列リテラル
    UnterminatedString,
    /// 閉じられていない文字リテラル
    UnterminatedChar,
    /// 空の文字リテラル
    EmptyCharLit,
    /// 2文字以上を含む文字リテラル
    MultiCharLiteral,
    /// 不正な文字
    InvalidChar(char),
    /// 不正なエスケープシーケンス
    InvalidEscape(char),
    /// 不正な数値リテラル
    InvalidNumber(String),
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnterminatedString => write!(f, "unterminated string literal"),
            LexError::UnterminatedChar => write!(f, "unterminated character literal"),
            LexError::EmptyCharLit => write!(f, "empty character literal"),
            LexError::MultiCharLiteral => {
                write!(f, "character literal can only contain a single value")
            }
            LexError::InvalidChar(c) => write!(f, "unexpected character: {:?}", c),
            LexError::InvalidEscape(c) => write!(f, "invalid escape sequence: \\{}", c),
            LexError::InvalidNumber(s) => write!(f, "invalid number: {}", s),
        }
    }
}

/// プリプロセッサエラー
#[derive(Debug, Clone, PartialEq)]
pub enum PPError {
    /// 不正なディレクティブ
    InvalidDirective(String),
    /// インクルードファイルが見つからない
    IncludeNotFound(PathBuf),
    /// インクルードのネストが深すぎる（循環インクルード）
    IncludeDepthExceeded(PathBuf),
    /// 対応する#ifがない#endif
    UnmatchedEndif,
    /// 対応する#endifがない
    MissingEndif,
    /// 対応する#ifがない#else
    UnmatchedElse,
    /// #elifが#elseの後に出現
    ElifAfterElse,
    /// 不正なマクロ引数
    InvalidMacroArgs(String),
    /// #if の条件式エラー
    InvalidCondition(String),
    /// ファイル読み込みエラー
    IoError(PathBuf, String),
}

impl fmt::Display for PPError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PPError::InvalidDirective(s) => write!(f, "invalid directive: {}", s),
            PPError::IncludeNotFound(p) => write!(f, "include file not found: {}", p.display()),
            PPError::IncludeDepthExceeded(p) => {
                write!(f, "include nested too deeply (cycle?): {}", p.display())
            }
            PPError::UnmatchedEndif => write!(f, "#endif without matching #if"),
            PPError::MissingEndif => write!(f, "missing #endif"),
            PPError::UnmatchedElse => write!(f, "#else without matching #if"),
            PPError::ElifAfterElse => write!(f, "#elif after #else"),
            PPError::InvalidMacroArgs(s) => write!(f, "invalid macro arguments: {}", s),
            PPError::InvalidCondition(s) => write!(f, "invalid preprocessor condition: {}", s),
            PPError::IoError(p, e) => write!(f, "I/O error reading {}: {}", p.display(), e),
        }
    }
}

/// パースエラー
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// 予期しないトークン
    UnexpectedToken { expected: String, found: TokenKind },
    /// 予期しない入力終端
    UnexpectedEof { expected: String },
    /// 宣言を開始できないトークン
    UnknownDeclaration { found: TokenKind, lexeme: String },
    /// 同名関数の再宣言
    DuplicateFunction(String),
    /// プロトタイプと定義のシグネチャ不一致
    ConflictingDeclaration(String),
    /// 仮引数名の重複
    DuplicateParameter(String),
    /// 同一スコープでの変数の重複
    DuplicateVariable(String),
    /// void 型の変数
    IncompleteVariable(String),
    /// ポインタへの小数初期化子
    FractionalPointer(String),
    /// void* への初期化子
    VoidPointerInitializer(String),
    /// 初期化子がリテラルでない
    MissingInitializer(String),
    /// 対応する '{' のない '}'
    UnmatchedBrace,
    /// 入力終端で閉じられていない本体
    UnclosedBody(String),
    /// 木の同一親の下で子の名前が重複
    DuplicateNode(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken { expected, found } => {
                write!(f, "expected {}, found '{}'", expected, found)
            }
            ParseError::UnexpectedEof { expected } => {
                write!(f, "unexpected end of input, expected {}", expected)
            }
            ParseError::UnknownDeclaration { found, lexeme } => {
                write!(f, "unrecognized token: {:?}({})", found, lexeme)
            }
            ParseError::DuplicateFunction(name) => {
                write!(f, "duplicate function: {} already exists", name)
            }
            ParseError::ConflictingDeclaration(name) => {
                write!(f, "conflicting declaration of function: {}", name)
            }
            ParseError::DuplicateParameter(name) => {
                write!(f, "function argument {} is already defined", name)
            }
            ParseError::DuplicateVariable(name) => {
                write!(f, "variable {} is already declared in this scope", name)
            }
            ParseError::IncompleteVariable(name) => {
                write!(f, "incomplete variable not allowed: void {}", name)
            }
            ParseError::FractionalPointer(name) => {
                write!(f, "pointer {} cannot have a fractional value", name)
            }
            ParseError::VoidPointerInitializer(name) => {
                write!(f, "void pointer {} cannot have an initial value", name)
            }
            ParseError::MissingInitializer(name) => {
                write!(f, "missing constant initializer for variable {}", name)
            }
            ParseError::UnmatchedBrace => write!(f, "'}}' without an open body"),
            ParseError::UnclosedBody(name) => write!(f, "missing '}}' for body of {}", name),
            ParseError::DuplicateNode(name) => write!(f, "duplicate tree node: {}", name),
        }
    }
}

/// 統合エラー型
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// 字句解析エラー
    Lex { pos: Pos, kind: LexError },
    /// プリプロセッサエラー
    Preprocess { loc: SourceLocation, kind: PPError },
    /// パースエラー
    Parse { pos: Pos, kind: ParseError },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex { pos, kind } => write!(f, "{}: {}", pos, kind),
            CompileError::Preprocess { loc, kind } => {
                write!(f, "{}:{}: preprocessor error: {}", loc.file_id.as_u32(), loc.line, kind)
            }
            CompileError::Parse { pos, kind } => write!(f, "{}: {}", pos, kind),
        }
    }
}

impl std::error::Error for CompileError {}

impl CompileError {
    /// パック位置を取得（プリプロセッサエラーは行のみ）
    pub fn pos(&self) -> Pos {
        match self {
            CompileError::Lex { pos, .. } | CompileError::Parse { pos, .. } => *pos,
            CompileError::Preprocess { loc, .. } => Pos::saturating(loc.line, loc.column),
        }
    }

    /// ファイル名を解決してエラーメッセージをフォーマット
    pub fn format_with_files(&self, files: &FileRegistry) -> String {
        match self {
            CompileError::Preprocess { loc, kind } => {
                let disp = DisplayLocation { loc, files };
                format!("{}: preprocessor error: {}", disp, kind)
            }
            other => other.to_string(),
        }
    }
}

/// 字句解析で収集した全エラー
///
/// 1 つでもエラーがあればそのファイルのトークン列はパーサーに渡さない。
#[derive(Debug, Clone)]
pub struct LexErrors {
    pub errors: Vec<CompileError>,
    /// 参照用に表示するスキャン対象テキスト
    pub source: String,
}

impl fmt::Display for LexErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in &self.errors {
            writeln!(f, "{}", err)?;
        }
        write!(f, "Reference source:\n{}", self.source)
    }
}

impl std::error::Error for LexErrors {}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, CompileError>;

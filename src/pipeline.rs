//! Pipeline API for minicc
//!
//! 1 ファイルごとに 3 段階を順に実行する:
//! 1. Preprocess: 論理行の組み立て（インクルード・条件コンパイル）
//! 2. Lex: トークン列への変換（エラーはすべて収集してから中断）
//! 3. Parse: 宣言木の構築（エラーを記録しながら最後まで続行）
//!
//! # 使用例
//!
//! ```ignore
//! use minicc::Pipeline;
//!
//! let mut pipeline = Pipeline::builder()
//!     .with_include("include")
//!     .with_define("DEBUG", None::<String>)
//!     .build();
//!
//! let result = pipeline.run_file("bios.c")?;
//! if !result.outcome.success() { /* ... */ }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{CompileError, LexErrors};
use crate::lexer::tokenize;
use crate::parser::{ParseOutcome, Parser};
use crate::preprocessor::{PPConfig, PreprocessedSource, Preprocessor};
use crate::source::{DisplayLocation, Pos};
use crate::token::Token;

// ============================================================================
// Error types
// ============================================================================

/// Pipeline 実行時のエラー
#[derive(Debug)]
pub enum PipelineError {
    /// プリプロセスエラー
    Compile(CompileError),
    /// 字句解析エラー（収集済みの全エラー）
    Lex(LexErrors),
    /// I/O エラー
    Io(std::io::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Compile(e) => write!(f, "Compile error: {}", e),
            PipelineError::Lex(e) => write!(f, "Lex error:\n{}", e),
            PipelineError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Compile(e) => Some(e),
            PipelineError::Lex(e) => Some(e),
            PipelineError::Io(e) => Some(e),
        }
    }
}

impl From<CompileError> for PipelineError {
    fn from(e: CompileError) -> Self {
        PipelineError::Compile(e)
    }
}

impl From<LexErrors> for PipelineError {
    fn from(e: LexErrors) -> Self {
        PipelineError::Lex(e)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e)
    }
}

// ============================================================================
// Options
// ============================================================================

/// 出力の種類（記録のみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputType {
    #[default]
    Executable,
    Library,
}

/// コンパイルオプション（プリプロセッサ設定以外）
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// 木の JSON を書き出すディレクトリ (-o)
    pub out_dir: Option<PathBuf>,
    /// 出力の種類 (-t)
    pub output_type: OutputType,
    /// リンクするライブラリ (-l)
    pub link: Vec<String>,
}

// ============================================================================
// Builder
// ============================================================================

/// Pipeline ビルダー
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    pp_config: PPConfig,
    options: CompileOptions,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// インクルードパスを追加 (-I)
    pub fn with_include(mut self, path: impl Into<PathBuf>) -> Self {
        self.pp_config.include_paths.push(path.into());
        self
    }

    /// マクロを事前定義 (-D)
    pub fn with_define(mut self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.pp_config
            .predefined
            .push((name.into(), value.map(Into::into)));
        self
    }

    /// インクルードのネスト上限を設定
    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.pp_config.max_include_depth = depth;
        self
    }

    /// コンパイルオプションを設定
    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            pp: Preprocessor::new(self.pp_config),
            options: self.options,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// 1 ファイル分の処理結果
#[derive(Debug)]
pub struct FileResult {
    pub source: PreprocessedSource,
    pub tokens: Vec<Token>,
    pub outcome: ParseOutcome,
}

impl FileResult {
    /// トークン位置に対応する元のファイル位置（`path:line`）
    pub fn origin(&self, pos: Pos) -> Option<String> {
        let loc = self.source.origin(u32::from(pos.line()))?;
        Some(
            DisplayLocation {
                loc: &loc,
                files: &self.source.files,
            }
            .to_string(),
        )
    }

    /// 木を `<dir>/<stem>.tree.json` に書き出す
    pub fn write_tree_json(&self, dir: &Path, input: &Path) -> Result<PathBuf, PipelineError> {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out".to_string());
        let path = dir.join(format!("{}.tree.json", stem));
        let json = self
            .outcome
            .tree
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&path, json)?;
        debug!("wrote {}", path.display());
        Ok(path)
    }
}

/// Pipeline 本体
///
/// プリプロセッサを保持し、複数のファイルに順に適用する。
pub struct Pipeline {
    pp: Preprocessor,
    options: CompileOptions,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.pp
    }

    /// プリプロセスのみ実行
    pub fn preprocess(&mut self, path: impl AsRef<Path>) -> Result<PreprocessedSource, PipelineError> {
        Ok(self.pp.run(path.as_ref())?)
    }

    /// 3 段階をすべて実行
    ///
    /// パースエラーは `FileResult::outcome` に入る。
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<FileResult, PipelineError> {
        let path = path.as_ref();
        let source = self.preprocess(path)?;
        let text = source.text();
        let tokens = tokenize(&text)?;
        debug!("{}: {} tokens", path.display(), tokens.len());
        let outcome = Parser::new(&tokens).parse();
        Ok(FileResult {
            source,
            tokens,
            outcome,
        })
    }

    /// エラーメッセージをファイル名付きでフォーマット
    pub fn format_error(&self, e: &PipelineError) -> String {
        match e {
            PipelineError::Compile(e) => e.format_with_files(self.pp.files()),
            other => other.to_string(),
        }
    }
}

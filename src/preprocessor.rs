//! 行指向プリプロセッサ
//!
//! 入力ファイルを論理行の列として読み込み、ディレクティブ行を空行に置き換えながら
//! `#include` の展開（行の挿入）、`#define` の記録、条件コンパイルを処理する。
//! マクロは記録するだけで、後続のテキストには一切展開しない。

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};

use crate::error::{CompileError, PPError, Result};
use crate::macro_def::{MacroDef, MacroTable};
use crate::pp_expr::PPExprEvaluator;
use crate::source::{FileId, FileRegistry, SourceLocation};

/// インクルードパスの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// <...> システムヘッダ
    System,
    /// "..." ローカルヘッダ
    Local,
}

/// プリプロセッサ設定
#[derive(Debug, Clone)]
pub struct PPConfig {
    /// インクルードパス (-I)
    pub include_paths: Vec<PathBuf>,
    /// 事前定義マクロ (-D)
    pub predefined: Vec<(String, Option<String>)>,
    /// インクルードのネスト上限（循環インクルードの検出用）
    pub max_include_depth: usize,
}

impl Default for PPConfig {
    fn default() -> Self {
        Self {
            include_paths: Vec::new(),
            predefined: Vec::new(),
            max_include_depth: 64,
        }
    }
}

/// 論理行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 行テキスト（ディレクティブ行・無効ブランチの行は空）
    pub text: String,
    /// 元のファイル
    pub file_id: FileId,
    /// 元のファイル内の行番号（1始まり）
    pub line: u32,
    /// インクルードのネスト深さ（入力ファイルは 0）
    pub depth: usize,
}

/// プリプロセス結果
#[derive(Debug, Clone, Default)]
pub struct PreprocessedSource {
    pub lines: Vec<LogicalLine>,
    pub files: FileRegistry,
}

impl PreprocessedSource {
    /// 全論理行を改行付きで連結したテキスト
    pub fn text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }

    /// 論理行番号（1始まり）から元のファイル位置を求める
    pub fn origin(&self, logical_line: u32) -> Option<SourceLocation> {
        let index = usize::try_from(logical_line).ok()?.checked_sub(1)?;
        self.lines
            .get(index)
            .map(|l| SourceLocation::new(l.file_id, l.line, 1))
    }
}

/// 条件コンパイル状態
#[derive(Debug, Clone)]
struct CondState {
    /// 現在のブランチが有効か
    active: bool,
    /// いずれかのブランチが有効だったか
    seen_active: bool,
    /// #else を見たか
    seen_else: bool,
    /// 開始位置（#endif 欠落の報告用）
    loc: SourceLocation,
}

/// ディレクティブ行のトークン
#[derive(Debug, Clone, PartialEq)]
pub enum DirToken {
    Ident(String),
    /// 数字で始まる英数字列（解釈は使う側で行う）
    Number(String),
    Str(String),
    Punct(&'static str),
    Other(char),
}

/// ディレクティブ行（'#' 以降）をトークン化する
///
/// 各トークンは行内のバイトオフセットと組で返す。
pub fn tokenize_directive(line: &str) -> Vec<(usize, DirToken)> {
    const PUNCTS: [&str; 26] = [
        "...", "&&", "||", "==", "!=", "<=", ">=", "<<", ">>", "(", ")", ",", "!", "~", "+",
        "-", "*", "/", "%", "<", ">", "&", "|", "^", "?", ":",
    ];

    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push((start, DirToken::Ident(line[start..i].to_string())));
        } else if c.is_ascii_digit() {
            while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
                i += 1;
            }
            tokens.push((start, DirToken::Number(line[start..i].to_string())));
        } else if c == b'"' || c == b'\'' {
            i += 1;
            while i < bytes.len() && bytes[i] != c {
                i += 1;
            }
            tokens.push((start, DirToken::Str(line[start + 1..i].to_string())));
            if i < bytes.len() {
                i += 1;
            }
        } else if let Some(p) = PUNCTS.iter().find(|p| line[i..].starts_with(**p)) {
            i += p.len();
            tokens.push((start, DirToken::Punct(p)));
        } else {
            let ch = line[i..].chars().next().unwrap_or('\u{FFFD}');
            i += ch.len_utf8();
            tokens.push((start, DirToken::Other(ch)));
        }
    }

    tokens
}

/// 文字列の外にある `//` コメントを取り除く
fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut quote: Option<u8> = None;
    for i in 0..bytes.len() {
        match (quote, bytes[i]) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(bytes[i]),
            (None, b'/') if bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// プリプロセッサ
///
/// 同じインスタンスを複数ファイルに順に使える。状態は `run` の先頭で毎回リセットする。
pub struct Preprocessor {
    /// 設定
    config: PPConfig,
    /// ファイルレジストリ
    files: FileRegistry,
    /// マクロテーブル
    macros: MacroTable,
    /// 論理行バッファ
    lines: Vec<LogicalLine>,
    /// 条件コンパイルスタック
    cond_stack: Vec<CondState>,
    /// 現在の条件が有効かどうかのキャッシュ
    cond_active: bool,
}

impl Preprocessor {
    /// 新しいプリプロセッサを作成
    pub fn new(config: PPConfig) -> Self {
        Self {
            config,
            files: FileRegistry::new(),
            macros: MacroTable::new(),
            lines: Vec::new(),
            cond_stack: Vec::new(),
            cond_active: true,
        }
    }

    /// 設定を取得
    pub fn config(&self) -> &PPConfig {
        &self.config
    }

    /// 直近の実行で定義されたマクロ
    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// 直近の実行で読み込んだファイル
    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    /// ファイルをプリプロセスする
    pub fn run(&mut self, path: &Path) -> Result<PreprocessedSource> {
        self.reset();

        let file_id = self.files.register(path.to_path_buf());
        self.lines = self.read_lines(path, file_id, 0, &SourceLocation::default())?;

        let mut index = 0;
        while index < self.lines.len() {
            self.process_line(index)?;
            index += 1;
        }

        if let Some(open) = self.cond_stack.last() {
            return Err(CompileError::Preprocess {
                loc: open.loc.clone(),
                kind: PPError::MissingEndif,
            });
        }

        debug!(
            "preprocessed {}: {} logical lines, {} files, {} macros ({} from source)",
            path.display(),
            self.lines.len(),
            self.files.len(),
            self.macros.len(),
            self.macros.user_defined().count()
        );

        Ok(PreprocessedSource {
            lines: std::mem::take(&mut self.lines),
            files: self.files.clone(),
        })
    }

    /// 実行ごとの状態を初期化し、事前定義マクロを登録する
    fn reset(&mut self) {
        self.files.clear();
        self.macros.clear();
        self.lines.clear();
        self.cond_stack.clear();
        self.cond_active = true;

        for (name, value) in &self.config.predefined {
            let body = value.clone().unwrap_or_else(|| "1".to_string());
            let def = MacroDef::object(name.clone(), body, SourceLocation::default()).as_builtin();
            self.macros.define(def);
        }
    }

    /// ファイルを論理行として読み込む
    fn read_lines(
        &self,
        path: &Path,
        file_id: FileId,
        depth: usize,
        loc: &SourceLocation,
    ) -> Result<Vec<LogicalLine>> {
        let source = fs::read_to_string(path).map_err(|e| CompileError::Preprocess {
            loc: loc.clone(),
            kind: PPError::IoError(path.to_path_buf(), e.to_string()),
        })?;

        Ok(source
            .lines()
            .enumerate()
            .map(|(i, text)| LogicalLine {
                text: text.to_string(),
                file_id,
                line: i as u32 + 1,
                depth,
            })
            .collect())
    }

    fn blank(&mut self, index: usize) {
        self.lines[index].text.clear();
    }

    fn location(&self, index: usize) -> SourceLocation {
        let line = &self.lines[index];
        SourceLocation::new(line.file_id, line.line, 1)
    }

    /// 1 論理行を処理
    fn process_line(&mut self, index: usize) -> Result<()> {
        let trimmed = self.lines[index].text.trim_start();
        let Some(rest) = trimmed.strip_prefix('#') else {
            if !self.cond_active {
                self.blank(index);
            }
            return Ok(());
        };

        let directive = strip_line_comment(rest).to_string();
        let tokens = tokenize_directive(&directive);
        let name = match tokens.first() {
            // 空のディレクティブ（許可）
            None => {
                self.blank(index);
                return Ok(());
            }
            Some((_, DirToken::Ident(name))) => name.clone(),
            Some(_) => String::new(),
        };

        trace!("{}:{}: #{}", self.lines[index].file_id.as_u32(), self.lines[index].line, name);
        self.process_directive_by_name(index, &name, &directive, &tokens)
    }

    /// ディレクティブ名に基づいて処理
    fn process_directive_by_name(
        &mut self,
        index: usize,
        name: &str,
        directive: &str,
        tokens: &[(usize, DirToken)],
    ) -> Result<()> {
        let loc = self.location(index);
        let args = &tokens[1..];

        match name {
            "define" => {
                if self.cond_active {
                    self.process_define(directive, args, loc)?;
                }
            }
            "undef" => {
                if self.cond_active {
                    self.process_undef(args, loc)?;
                }
            }
            "include" => {
                if self.cond_active {
                    self.blank(index);
                    let target = directive[tokens[0].0 + name.len()..].trim();
                    self.process_include(index, target, loc)?;
                    return Ok(());
                }
            }
            "ifdef" => self.process_ifdef(args, loc, false)?,
            "ifndef" => self.process_ifdef(args, loc, true)?,
            "if" => self.process_if(args, loc)?,
            "elif" => self.process_elif(args, loc)?,
            "else" => self.process_else(loc)?,
            "endif" => self.process_endif(loc)?,
            _ => {
                if self.cond_active {
                    // 未知のディレクティブはそのまま残す（後段のスキャナが '#' を拒否する）
                    warn!(
                        "{}:{}: ignoring unknown directive #{}",
                        loc.file_id.as_u32(),
                        loc.line,
                        name
                    );
                    return Ok(());
                }
            }
        }

        self.blank(index);
        Ok(())
    }

    /// #define を処理
    fn process_define(
        &mut self,
        directive: &str,
        args: &[(usize, DirToken)],
        loc: SourceLocation,
    ) -> Result<()> {
        let Some((name_offset, DirToken::Ident(name))) = args.first() else {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::InvalidDirective("expected macro name".to_string()),
            });
        };
        let name_end = name_offset + name.len();

        // マクロ名の直後に '(' がある場合のみ関数マクロとして扱う
        let def = match args.get(1) {
            Some((offset, DirToken::Punct("("))) if *offset == name_end => {
                let (params, body_start) = Self::parse_macro_params(&args[2..], directive.len(), &loc)?;
                MacroDef::function(name.clone(), params, directive[body_start..].trim(), loc)
            }
            _ => MacroDef::object(name.clone(), directive[name_end..].trim(), loc),
        };

        trace!("define {} ({} params) = {:?}", def.name, def.param_count(), def.body);
        self.macros.define(def);
        Ok(())
    }

    /// 関数マクロのパラメータをパース
    ///
    /// 戻り値は仮引数名と、本体が始まるバイトオフセット。
    fn parse_macro_params(
        tokens: &[(usize, DirToken)],
        line_len: usize,
        loc: &SourceLocation,
    ) -> Result<(Vec<String>, usize)> {
        let err = |msg: &str| CompileError::Preprocess {
            loc: loc.clone(),
            kind: PPError::InvalidMacroArgs(msg.to_string()),
        };

        let mut params = Vec::new();
        let mut iter = tokens.iter();
        let mut expect_param = true;

        loop {
            match iter.next() {
                Some((offset, DirToken::Punct(")"))) if !expect_param || params.is_empty() => {
                    let body_start = offset + 1;
                    return Ok((params, body_start.min(line_len)));
                }
                Some((_, DirToken::Ident(p))) if expect_param => {
                    params.push(p.clone());
                    expect_param = false;
                }
                Some((_, DirToken::Punct("..."))) if expect_param => {
                    params.push("__VA_ARGS__".to_string());
                    expect_param = false;
                }
                Some((_, DirToken::Punct(","))) if !expect_param => expect_param = true,
                Some(_) if expect_param => return Err(err("expected parameter name")),
                Some(_) => return Err(err("expected ',' or ')'")),
                None => return Err(err("missing ')' in parameter list")),
            }
        }
    }

    /// #undef を処理
    fn process_undef(&mut self, args: &[(usize, DirToken)], loc: SourceLocation) -> Result<()> {
        match args.first() {
            Some((_, DirToken::Ident(name))) => {
                self.macros.undefine(name);
                Ok(())
            }
            _ => Err(CompileError::Preprocess {
                loc,
                kind: PPError::InvalidDirective("expected macro name after #undef".to_string()),
            }),
        }
    }

    /// #include を処理（対象ファイルの行を次の位置に挿入する）
    fn process_include(&mut self, index: usize, target: &str, loc: SourceLocation) -> Result<()> {
        let (path, kind) = if let Some(rest) = target.strip_prefix('"') {
            (rest.split('"').next().unwrap_or_default(), IncludeKind::Local)
        } else if let Some(rest) = target.strip_prefix('<') {
            (rest.split('>').next().unwrap_or_default(), IncludeKind::System)
        } else {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::InvalidDirective("include path missing".to_string()),
            });
        };
        if path.is_empty() {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::InvalidDirective("include path missing".to_string()),
            });
        }

        let resolved = self.resolve_include(path, kind, index, &loc)?;

        let depth = self.lines[index].depth + 1;
        if depth > self.config.max_include_depth {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::IncludeDepthExceeded(resolved),
            });
        }

        let file_id = self.files.register(resolved.clone());
        let new_lines = self.read_lines(&resolved, file_id, depth, &loc)?;
        debug!("include {} ({} lines)", resolved.display(), new_lines.len());
        self.lines.splice(index + 1..index + 1, new_lines);
        Ok(())
    }

    /// インクルードパスを解決
    ///
    /// "..." はインクルード元ファイルのディレクトリ、インクルードパス、指定されたパスの順。
    /// <...> はインクルードパスのみ。
    fn resolve_include(
        &self,
        path: &str,
        kind: IncludeKind,
        index: usize,
        loc: &SourceLocation,
    ) -> Result<PathBuf> {
        let path = Path::new(path);

        if kind == IncludeKind::Local {
            let current = self.files.get_path(self.lines[index].file_id);
            if let Some(parent) = current.parent() {
                let candidate = parent.join(path);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        for dir in &self.config.include_paths {
            let candidate = dir.join(path);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        if kind == IncludeKind::Local && path.is_file() {
            return Ok(path.to_path_buf());
        }

        Err(CompileError::Preprocess {
            loc: loc.clone(),
            kind: PPError::IncludeNotFound(path.to_path_buf()),
        })
    }

    /// 無効な親の中で開かれた条件を積む（どのブランチも有効にならない）
    fn push_dead(&mut self, loc: SourceLocation) {
        self.cond_stack.push(CondState {
            active: false,
            seen_active: true,
            seen_else: false,
            loc,
        });
    }

    fn push_cond(&mut self, active: bool, loc: SourceLocation) {
        self.cond_stack.push(CondState {
            active,
            seen_active: active,
            seen_else: false,
            loc,
        });
        self.update_cond_active();
    }

    /// #ifdef / #ifndef を処理
    fn process_ifdef(&mut self, args: &[(usize, DirToken)], loc: SourceLocation, negate: bool) -> Result<()> {
        if !self.cond_active {
            self.push_dead(loc);
            return Ok(());
        }

        let defined = match args.first() {
            Some((_, DirToken::Ident(name))) => self.macros.is_defined(name),
            _ => {
                return Err(CompileError::Preprocess {
                    loc,
                    kind: PPError::InvalidDirective("expected macro name".to_string()),
                });
            }
        };

        let active = if negate { !defined } else { defined };
        self.push_cond(active, loc);
        Ok(())
    }

    /// #if を処理
    fn process_if(&mut self, args: &[(usize, DirToken)], loc: SourceLocation) -> Result<()> {
        if !self.cond_active {
            self.push_dead(loc);
            return Ok(());
        }

        let active = self.evaluate(args, &loc)?;
        self.push_cond(active, loc);
        Ok(())
    }

    fn evaluate(&self, args: &[(usize, DirToken)], loc: &SourceLocation) -> Result<bool> {
        let tokens: Vec<DirToken> = args.iter().map(|(_, t)| t.clone()).collect();
        let mut eval = PPExprEvaluator::new(&tokens, &self.macros, loc.clone());
        Ok(eval.evaluate()? != 0)
    }

    /// 親の条件がすべて有効かどうか（スタック最上段を除く）
    fn parent_active(&self) -> bool {
        let n = self.cond_stack.len();
        self.cond_stack[..n.saturating_sub(1)].iter().all(|s| s.active)
    }

    /// #elif を処理
    fn process_elif(&mut self, args: &[(usize, DirToken)], loc: SourceLocation) -> Result<()> {
        let Some(state) = self.cond_stack.last() else {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::InvalidDirective("#elif without matching #if".to_string()),
            });
        };
        if state.seen_else {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::ElifAfterElse,
            });
        }

        let active = if state.seen_active || !self.parent_active() {
            false
        } else {
            self.evaluate(args, &loc)?
        };

        if let Some(state) = self.cond_stack.last_mut() {
            state.active = active;
            state.seen_active |= active;
        }
        self.update_cond_active();
        Ok(())
    }

    /// #else を処理
    fn process_else(&mut self, loc: SourceLocation) -> Result<()> {
        let parent_active = self.parent_active();
        let Some(state) = self.cond_stack.last_mut() else {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::UnmatchedElse,
            });
        };
        if state.seen_else {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::UnmatchedElse,
            });
        }

        state.seen_else = true;
        state.active = parent_active && !state.seen_active;
        state.seen_active |= state.active;
        self.update_cond_active();
        Ok(())
    }

    /// #endif を処理
    fn process_endif(&mut self, loc: SourceLocation) -> Result<()> {
        if self.cond_stack.pop().is_none() {
            return Err(CompileError::Preprocess {
                loc,
                kind: PPError::UnmatchedEndif,
            });
        }
        self.update_cond_active();
        Ok(())
    }

    fn update_cond_active(&mut self) {
        self.cond_active = self.cond_stack.iter().all(|s| s.active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn preprocess(content: &str) -> (Preprocessor, PreprocessedSource) {
        let file = create_temp_file(content);
        let mut pp = Preprocessor::new(PPConfig::default());
        let out = pp.run(file.path()).unwrap();
        (pp, out)
    }

    fn texts(out: &PreprocessedSource) -> Vec<&str> {
        out.lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn test_tokenize_directive() {
        let tokens = tokenize_directive("define ADD(a, b) a + b");
        let kinds: Vec<_> = tokens.into_iter().map(|(_, t)| t).collect();
        assert_eq!(
            kinds,
            vec![
                DirToken::Ident("define".into()),
                DirToken::Ident("ADD".into()),
                DirToken::Punct("("),
                DirToken::Ident("a".into()),
                DirToken::Punct(","),
                DirToken::Ident("b".into()),
                DirToken::Punct(")"),
                DirToken::Ident("a".into()),
                DirToken::Punct("+"),
                DirToken::Ident("b".into()),
            ]
        );
    }

    #[test]
    fn test_strip_line_comment() {
        assert_eq!(strip_line_comment("endif // FOO"), "endif ");
        assert_eq!(strip_line_comment("include \"a//b.h\""), "include \"a//b.h\"");
    }

    #[test]
    fn test_plain_lines_kept() {
        let (_, out) = preprocess("int x;\nint y;");
        assert_eq!(texts(&out), vec!["int x;", "int y;"]);
        assert_eq!(out.text(), "int x;\nint y;\n");
    }

    #[test]
    fn test_define_records_without_expansion() {
        let (pp, out) = preprocess("#define VALUE 42\nint x = VALUE;");
        assert_eq!(texts(&out), vec!["", "int x = VALUE;"]);
        let def = pp.macros().get("VALUE").unwrap();
        assert_eq!(def.body, "42");
        assert!(def.params.is_empty());
    }

    #[test]
    fn test_function_macro_params() {
        let (pp, _) = preprocess("#define ADD(a, b) ((a) + (b))");
        let def = pp.macros().get("ADD").unwrap();
        assert!(def.is_function);
        assert_eq!(def.params, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(def.body, "((a) + (b))");
    }

    #[test]
    fn test_object_macro_with_paren_body() {
        // 名前と '(' の間に空白があればオブジェクトマクロ
        let (pp, _) = preprocess("#define WRAP (1 + 2)");
        let def = pp.macros().get("WRAP").unwrap();
        assert!(!def.is_function);
        assert_eq!(def.body, "(1 + 2)");
    }

    #[test]
    fn test_ifdef_nested_in_dead_branch() {
        let (_, out) = preprocess("#ifdef A\n#ifdef B\nint b;\n#endif\nint a;\n#endif\nint c;");
        assert_eq!(texts(&out), vec!["", "", "", "", "", "", "int c;"]);
    }

    #[test]
    fn test_missing_endif() {
        let file = create_temp_file("#ifndef GUARD\nint x;");
        let mut pp = Preprocessor::new(PPConfig::default());
        let err = pp.run(file.path()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Preprocess { kind: PPError::MissingEndif, .. }
        ));
    }

    #[test]
    fn test_origin_lookup() {
        let (_, out) = preprocess("a\nb");
        let loc = out.origin(2).unwrap();
        assert_eq!(loc.line, 2);
        assert!(out.origin(0).is_none());
        assert!(out.origin(3).is_none());
    }
}

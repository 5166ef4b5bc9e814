//! マクロ定義と管理
//!
//! `#define` で定義されたマクロを記録する。展開は行わない。

use std::collections::HashMap;

use crate::source::SourceLocation;

/// マクロ定義
#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    /// マクロ名
    pub name: String,
    /// 仮引数名（オブジェクトマクロなら空）
    pub params: Vec<String>,
    /// 関数マクロかどうか（`FOO()` のように引数 0 個でも true）
    pub is_function: bool,
    /// 置換テキスト（前後の空白は除去済み）
    pub body: String,
    /// 定義された位置
    pub def_loc: SourceLocation,
    /// -D などで事前定義されたマクロかどうか
    pub is_builtin: bool,
}

impl MacroDef {
    /// 新しいオブジェクトマクロを作成
    pub fn object(name: impl Into<String>, body: impl Into<String>, def_loc: SourceLocation) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            is_function: false,
            body: body.into(),
            def_loc,
            is_builtin: false,
        }
    }

    /// 新しい関数マクロを作成
    pub fn function(
        name: impl Into<String>,
        params: Vec<String>,
        body: impl Into<String>,
        def_loc: SourceLocation,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            is_function: true,
            body: body.into(),
            def_loc,
            is_builtin: false,
        }
    }

    /// ビルトインとしてマーク
    pub fn as_builtin(mut self) -> Self {
        self.is_builtin = true;
        self
    }

    /// パラメータ数を取得（オブジェクトマクロなら0）
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// 本体を整数として解釈できればその値
    pub fn int_value(&self) -> Option<i64> {
        let body = self.body.trim();
        if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16).ok()
        } else {
            body.parse().ok()
        }
    }
}

/// マクロテーブル
///
/// 名前ごとに 1 件。同名の再定義は上書きする。
#[derive(Debug, Default, Clone)]
pub struct MacroTable {
    macros: HashMap<String, MacroDef>,
}

impl MacroTable {
    /// 新しいマクロテーブルを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// マクロを定義（既存の定義があれば返す）
    pub fn define(&mut self, def: MacroDef) -> Option<MacroDef> {
        self.macros.insert(def.name.clone(), def)
    }

    /// マクロを削除（削除された定義があれば返す）
    pub fn undefine(&mut self, name: &str) -> Option<MacroDef> {
        self.macros.remove(name)
    }

    /// マクロ定義を取得
    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }

    /// マクロが定義されているかどうか
    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// 全マクロをイテレート
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MacroDef)> {
        self.macros.iter()
    }

    /// マクロ数を返す
    pub fn len(&self) -> usize {
        self.macros.len()
    }

    /// テーブルが空かどうか
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// 全定義を消去
    pub fn clear(&mut self) {
        self.macros.clear();
    }

    /// 非ビルトインマクロのみをイテレート
    pub fn user_defined(&self) -> impl Iterator<Item = &MacroDef> {
        self.macros.values().filter(|def| !def.is_builtin)
    }
}

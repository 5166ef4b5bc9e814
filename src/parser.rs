//! 宣言パーサー
//!
//! トークン列から関数・変数・インラインアセンブリの宣言を読み取り、宣言木を構築する。
//! 宣言ごとに独立して処理し、エラーは記録して次の未消費トークンから再開する。

use std::collections::HashMap;

use log::debug;

use crate::decl_tree::{AttrValue, ConstValue, DeclTree, NodeId, PrimitiveKind, TypeSpec};
use crate::error::{CompileError, ParseError, Result};
use crate::source::Pos;
use crate::token::{Token, TokenKind};

/// 関数宣言
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    /// 仮引数（順序 = 引数スロット順）
    pub params: Vec<(String, TypeSpec)>,
    /// 戻り値型（void なら None）
    pub ret: Option<TypeSpec>,
    /// 本体ノード（プロトタイプのみなら None）
    pub body: Option<NodeId>,
    pub pos: Pos,
}

impl FuncDecl {
    /// 戻り値型と仮引数の型列が一致するか（仮引数名は比較しない）
    pub fn signature_matches(&self, other: &FuncDecl) -> bool {
        self.ret == other.ret
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|((_, a), (_, b))| a == b)
    }
}

/// 変数宣言（宣言した本体のスコープ表にのみ存在する）
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub spec: TypeSpec,
    pub value: Option<ConstValue>,
}

/// パース結果
#[derive(Debug)]
pub struct ParseOutcome {
    /// 構築された木（エラーがあっても途中までの木を返す）
    pub tree: DeclTree,
    /// 宣言された関数（宣言順）
    pub functions: Vec<FuncDecl>,
    pub diagnostics: Vec<CompileError>,
}

impl ParseOutcome {
    pub fn success(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// 名前で関数を探す
    pub fn function(&self, name: &str) -> Option<&FuncDecl> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// パーサー
///
/// 1 回のパースごとに作り直す。
pub struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    tree: DeclTree,
    /// 現在宣言を追加している本体ノード
    active_body: NodeId,
    functions: Vec<FuncDecl>,
    function_index: HashMap<String, usize>,
    /// スコープ表（添字 = 本体のネスト深さ、0 はグローバル）
    scopes: Vec<HashMap<String, VarDecl>>,
    diagnostics: Vec<CompileError>,
}

impl<'a> Parser<'a> {
    /// 新しいパーサーを作成
    pub fn new(tokens: &'a [Token]) -> Self {
        let tree = DeclTree::new();
        let active_body = tree.unit_body();
        Self {
            tokens,
            current: 0,
            tree,
            active_body,
            functions: Vec::new(),
            function_index: HashMap::new(),
            scopes: vec![HashMap::new()],
            diagnostics: Vec::new(),
        }
    }

    /// 全トークンをパース
    pub fn parse(mut self) -> ParseOutcome {
        while !self.is_eof() {
            let start = self.current;
            if let Err(e) = self.parse_declaration() {
                self.diagnostics.push(e);
                // 少なくとも 1 トークンは消費して再開
                if self.current == start {
                    self.current += 1;
                }
            }
        }

        if self.depth() > 0 {
            let owner = self
                .tree
                .parent(self.active_body)
                .map(|p| self.tree.name(p).to_string())
                .unwrap_or_default();
            self.diagnostics.push(CompileError::Parse {
                pos: self.last_pos(),
                kind: ParseError::UnclosedBody(owner),
            });
        }

        debug!(
            "parsed {} tokens: {} nodes, {} functions, {} errors",
            self.tokens.len(),
            self.tree.len(),
            self.functions.len(),
            self.diagnostics.len()
        );

        ParseOutcome {
            tree: self.tree,
            functions: self.functions,
            diagnostics: self.diagnostics,
        }
    }

    // ==================== トークン操作 ====================

    fn is_eof(&self) -> bool {
        self.current >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.current)
    }

    fn last_pos(&self) -> Pos {
        self.tokens.last().map(|t| t.pos).unwrap_or_default()
    }

    /// 現在のトークンを消費して返す
    fn next_token(&mut self, expected: &str) -> Result<&'a Token> {
        match self.tokens.get(self.current) {
            Some(token) => {
                self.current += 1;
                Ok(token)
            }
            None => Err(CompileError::Parse {
                pos: self.last_pos(),
                kind: ParseError::UnexpectedEof {
                    expected: expected.to_string(),
                },
            }),
        }
    }

    /// 指定の種別のトークンを消費（違っていても消費した上でエラー）
    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<&'a Token> {
        let token = self.next_token(expected)?;
        if token.kind != kind {
            return Err(unexpected(token, expected));
        }
        Ok(token)
    }

    fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    // ==================== 宣言 ====================

    /// 宣言を 1 つパース
    fn parse_declaration(&mut self) -> Result<()> {
        let token = self.next_token("declaration")?;
        match token.kind {
            kind if PrimitiveKind::from_token(kind).is_some() => {
                self.current -= 1;
                self.parse_typed_declaration()
            }
            TokenKind::KwAsm => self.parse_assembly(),
            TokenKind::RBrace => self.end_active_body(token),
            found => Err(CompileError::Parse {
                pos: token.pos,
                kind: ParseError::UnknownDeclaration {
                    found,
                    lexeme: token.lexeme.clone(),
                },
            }),
        }
    }

    /// 型で始まる宣言（関数か変数）
    fn parse_typed_declaration(&mut self) -> Result<()> {
        let spec = self.parse_type_spec()?;
        let ident = self.expect(TokenKind::Ident, "identifier")?;

        if self.peek().map(|t| t.kind) == Some(TokenKind::LParen) {
            self.current += 1;
            self.parse_function(spec, ident)
        } else {
            self.parse_variable(spec, ident)
        }
    }

    /// 型指定: PrimitiveKeyword '*'?
    fn parse_type_spec(&mut self) -> Result<TypeSpec> {
        let token = self.next_token("type specifier")?;
        let Some(kind) = PrimitiveKind::from_token(token.kind) else {
            return Err(unexpected(token, "type specifier"));
        };

        let is_pointer = self.peek().map(|t| t.kind) == Some(TokenKind::Star);
        if is_pointer {
            self.current += 1;
        }
        Ok(TypeSpec::new(kind, is_pointer))
    }

    // ==================== 関数 ====================

    /// 関数宣言（'(' の直後から）
    fn parse_function(&mut self, spec: TypeSpec, ident: &'a Token) -> Result<()> {
        let (params, param_error) = self.parse_param_list()?;

        let terminator = self.next_token("';' or '{'")?;
        let has_body = match terminator.kind {
            TokenKind::Semi => false,
            TokenKind::LBrace => true,
            _ => return Err(unexpected(terminator, "';' or '{'")),
        };

        let decl = FuncDecl {
            name: ident.lexeme.clone(),
            params,
            // void（非ポインタ）以外は戻り値を持つ
            ret: if spec.is_void() { None } else { Some(spec) },
            body: None,
            pos: ident.pos,
        };

        // 木を変更する前に検査する
        let checked = match param_error {
            Some(e) => Err(e),
            None => self.check_function_table(&decl, has_body),
        };
        let prototype = match checked {
            Ok(prototype) => prototype,
            Err(e) => {
                // 受け付けなかった定義の本体は外側のスコープに流さない
                if has_body {
                    self.skip_body();
                }
                return Err(e);
            }
        };

        if has_body {
            self.define_function_body(decl, prototype)
        } else {
            self.function_index.insert(decl.name.clone(), self.functions.len());
            self.functions.push(decl);
            Ok(())
        }
    }

    /// 関数表を検査
    ///
    /// 本体のないプロトタイプを同じシグネチャの定義で完成させる場合はその添字を返す。
    fn check_function_table(&self, decl: &FuncDecl, has_body: bool) -> Result<Option<usize>> {
        let Some(&index) = self.function_index.get(&decl.name) else {
            return Ok(None);
        };

        let prev = &self.functions[index];
        let kind = if prev.body.is_some() || !has_body {
            ParseError::DuplicateFunction(decl.name.clone())
        } else if !prev.signature_matches(decl) {
            ParseError::ConflictingDeclaration(decl.name.clone())
        } else {
            return Ok(Some(index));
        };
        Err(CompileError::Parse { pos: decl.pos, kind })
    }

    /// '{' の直後から対応する '}' までを読み飛ばす
    fn skip_body(&mut self) {
        let mut depth = 1usize;
        while let Some(token) = self.peek() {
            self.current += 1;
            match token.kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                _ => {}
            }
            if depth == 0 {
                break;
            }
        }
    }

    /// 仮引数リスト（')' まで消費）
    ///
    /// 名前の重複はリストを最後まで読んでから返す（最初の 1 件）。
    fn parse_param_list(&mut self) -> Result<(Vec<(String, TypeSpec)>, Option<CompileError>)> {
        let mut params: Vec<(String, TypeSpec)> = Vec::new();
        let mut duplicate = None;

        if self.peek().map(|t| t.kind) == Some(TokenKind::RParen) {
            self.current += 1;
            return Ok((params, duplicate));
        }

        loop {
            let spec = self.parse_type_spec()?;
            let ident = self.expect(TokenKind::Ident, "parameter name")?;

            let clash = params.iter().any(|(name, _)| *name == ident.lexeme) || self.is_visible(&ident.lexeme);
            if clash && duplicate.is_none() {
                duplicate = Some(CompileError::Parse {
                    pos: ident.pos,
                    kind: ParseError::DuplicateParameter(ident.lexeme.clone()),
                });
            }
            params.push((ident.lexeme.clone(), spec));

            let sep = self.next_token("',' or ')'")?;
            match sep.kind {
                TokenKind::RParen => return Ok((params, duplicate)),
                TokenKind::Comma => continue,
                _ => return Err(unexpected(sep, "',' or ')'")),
            }
        }
    }

    /// 現在の深さまでのいずれかのスコープで宣言済みか
    fn is_visible(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains_key(name))
    }

    /// 関数本体を開く
    ///
    /// 関数ノード（引数と本体を子に持つ）を作り、本体を現在の追加先にする。
    fn define_function_body(&mut self, mut decl: FuncDecl, prototype: Option<usize>) -> Result<()> {
        let pos = decl.pos;
        let wrap = |kind| CompileError::Parse { pos, kind };

        let func = self.tree.add_child(self.active_body, &decl.name).map_err(wrap)?;
        let args = self.tree.add_child(func, "Arguments").map_err(wrap)?;
        for (i, (name, spec)) in decl.params.iter().enumerate() {
            let arg = self.tree.add_child(args, &format!("Argument{}", i)).map_err(wrap)?;
            self.tree.set_attribute(arg, "Name", AttrValue::Text(name.clone()));
            self.tree.set_attribute(arg, "Type", AttrValue::Kind(spec.kind));
            self.tree.set_attribute(arg, "Ptr", AttrValue::Flag(spec.is_pointer));
        }
        let body = self.tree.add_child(func, "Body").map_err(wrap)?;

        let scope = decl
            .params
            .iter()
            .map(|(name, spec)| {
                let var = VarDecl {
                    name: name.clone(),
                    spec: *spec,
                    value: None,
                };
                (name.clone(), var)
            })
            .collect();
        self.scopes.push(scope);
        self.active_body = body;

        decl.body = Some(body);
        match prototype {
            Some(index) => self.functions[index] = decl,
            None => {
                self.function_index.insert(decl.name.clone(), self.functions.len());
                self.functions.push(decl);
            }
        }
        Ok(())
    }

    /// '}' で現在の本体を閉じる
    fn end_active_body(&mut self, token: &Token) -> Result<()> {
        if self.depth() == 0 {
            return Err(CompileError::Parse {
                pos: token.pos,
                kind: ParseError::UnmatchedBrace,
            });
        }
        self.scopes.pop();

        let parent = self.tree.parent(self.active_body).unwrap_or(self.tree.root());
        let next = if self.function_index.contains_key(self.tree.name(parent)) {
            self.tree.parent(parent).unwrap_or(self.tree.root())
        } else {
            parent
        };
        self.active_body = next;
        Ok(())
    }

    // ==================== 変数 ====================

    /// 変数宣言（識別子の直後から）
    fn parse_variable(&mut self, spec: TypeSpec, ident: &'a Token) -> Result<()> {
        let mut follower = self.next_token("';'")?;
        let mut init = None;
        if follower.kind == TokenKind::Eq {
            let literal = self.next_token("constant initializer")?;
            init = Some(literal);
            follower = self.next_token("';'")?;
        }
        if follower.kind != TokenKind::Semi {
            return Err(unexpected(follower, "';'"));
        }

        let name = ident.lexeme.clone();
        let var_err = |pos, kind| Err(CompileError::Parse { pos, kind });

        if spec.is_void() {
            return var_err(ident.pos, ParseError::IncompleteVariable(name));
        }
        if self.scopes[self.depth()].contains_key(&name) {
            return var_err(ident.pos, ParseError::DuplicateVariable(name));
        }

        let value = match init {
            None => None,
            Some(token) => {
                let literal = match (token.kind, token.literal) {
                    (TokenKind::Number | TokenKind::Fractional | TokenKind::CharLit, Some(lit)) => lit,
                    _ => return var_err(token.pos, ParseError::MissingInitializer(name)),
                };
                if spec.is_pointer && token.kind == TokenKind::Fractional {
                    return var_err(token.pos, ParseError::FractionalPointer(name));
                }
                if spec.is_pointer && spec.kind == PrimitiveKind::Void {
                    return var_err(token.pos, ParseError::VoidPointerInitializer(name));
                }
                ConstValue::coerce(spec.kind, literal)
            }
        };

        let node_name = format!("Variable{}", self.tree.children(self.active_body).len());
        let node = self
            .tree
            .add_child(self.active_body, &node_name)
            .map_err(|kind| CompileError::Parse { pos: ident.pos, kind })?;
        self.tree.set_attribute(node, "Type", AttrValue::Kind(spec.kind));
        self.tree.set_attribute(node, "Ptr", AttrValue::Flag(spec.is_pointer));
        if let Some(v) = value {
            self.tree.set_attribute(node, "Value", AttrValue::Const(v));
        }

        let depth = self.depth();
        self.scopes[depth].insert(name.clone(), VarDecl { name, spec, value });
        Ok(())
    }

    // ==================== インラインアセンブリ ====================

    /// `__asm__ { "..." ... }`（'__asm__' の直後から）
    fn parse_assembly(&mut self) -> Result<()> {
        self.expect(TokenKind::LBrace, "'{' after __asm__")?;

        let mut sources = Vec::new();
        loop {
            let token = self.next_token("string literal or '}'")?;
            match token.kind {
                TokenKind::RBrace => break,
                TokenKind::StringLit => sources.push(token),
                _ => return Err(unexpected(token, "string literal or '}'")),
            }
        }

        let pos = sources.first().map(|t| t.pos).unwrap_or_default();
        let wrap = |kind| CompileError::Parse { pos, kind };
        let name = format!("Assembly{}", self.tree.children(self.active_body).len());
        let asm = self.tree.add_child(self.active_body, &name).map_err(wrap)?;
        for (i, token) in sources.iter().enumerate() {
            let block = self.tree.add_child(asm, &format!("SourceBlock{}", i)).map_err(wrap)?;
            self.tree.set_attribute(block, "Source", AttrValue::Text(token.lexeme.clone()));
        }
        Ok(())
    }
}

fn unexpected(token: &Token, expected: &str) -> CompileError {
    CompileError::Parse {
        pos: token.pos,
        kind: ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: token.kind,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_str(source: &str) -> ParseOutcome {
        let tokens = tokenize(source).unwrap();
        Parser::new(&tokens).parse()
    }

    fn messages(outcome: &ParseOutcome) -> Vec<String> {
        outcome.diagnostics.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_global_variable() {
        let out = parse_str("int x = 5;");
        assert!(out.success(), "{:?}", messages(&out));
        let var = out.tree.find("Unit/Body/Variable0").unwrap();
        assert_eq!(out.tree.attribute(var, "Type"), Some(&AttrValue::Kind(PrimitiveKind::Int)));
        assert_eq!(out.tree.attribute(var, "Ptr"), Some(&AttrValue::Flag(false)));
        assert_eq!(out.tree.attribute(var, "Value"), Some(&AttrValue::Const(ConstValue::Int(5))));
    }

    #[test]
    fn test_uninitialized_has_no_value() {
        let out = parse_str("short s;");
        assert!(out.success());
        let var = out.tree.find("Unit/Body/Variable0").unwrap();
        assert_eq!(out.tree.attribute(var, "Value"), None);
    }

    #[test]
    fn test_function_shape() {
        let out = parse_str("int foo(int a, char* b) { int y = 5; }");
        assert!(out.success(), "{:?}", messages(&out));
        let tree = &out.tree;
        let a = tree.find("Unit/Body/foo/Arguments/Argument0").unwrap();
        let b = tree.find("Unit/Body/foo/Arguments/Argument1").unwrap();
        assert_eq!(tree.attribute(a, "Name"), Some(&AttrValue::Text("a".into())));
        assert_eq!(tree.attribute(b, "Name"), Some(&AttrValue::Text("b".into())));
        assert_eq!(tree.attribute(b, "Ptr"), Some(&AttrValue::Flag(true)));
        assert!(tree.find("Unit/Body/foo/Body/Variable0").is_some());

        let foo = out.function("foo").unwrap();
        assert_eq!(foo.ret, Some(TypeSpec::new(PrimitiveKind::Int, false)));
        assert_eq!(foo.params.len(), 2);
    }

    #[test]
    fn test_void_function_has_no_return() {
        let out = parse_str("void f(); void* g();");
        assert!(out.success());
        assert_eq!(out.function("f").unwrap().ret, None);
        assert_eq!(
            out.function("g").unwrap().ret,
            Some(TypeSpec::new(PrimitiveKind::Void, true))
        );
    }

    #[test]
    fn test_body_returns_to_outer_scope() {
        let out = parse_str("void f() { int a; } int b;");
        assert!(out.success(), "{:?}", messages(&out));
        // f の後の変数はトップレベル本体に追加される（子は f と Variable1）
        assert!(out.tree.find("Unit/Body/Variable1").is_some());
    }

    #[test]
    fn test_incomplete_variable() {
        let out = parse_str("void v;");
        assert!(!out.success());
        assert_eq!(messages(&out), vec!["[1:6]: incomplete variable not allowed: void v"]);
    }

    #[test]
    fn test_recovery_continues() {
        let out = parse_str("return; int ok;");
        assert_eq!(out.diagnostics.len(), 2);
        assert!(out.tree.find("Unit/Body/Variable0").is_some());
    }

    #[test]
    fn test_unclosed_body() {
        let out = parse_str("int main() { int x;");
        assert!(matches!(
            out.diagnostics.last(),
            Some(CompileError::Parse { kind: ParseError::UnclosedBody(name), .. }) if name == "main"
        ));
    }

    #[test]
    fn test_unmatched_brace() {
        let out = parse_str("}");
        assert!(matches!(
            out.diagnostics[0],
            CompileError::Parse { kind: ParseError::UnmatchedBrace, .. }
        ));
    }
}

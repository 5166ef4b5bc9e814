//! 宣言木
//!
//! パーサーが構築する名前付きノードの木。ノードはアリーナ (`Vec<Node>`) に格納し、
//! `NodeId` で参照する。親へのリンクはスコープを抜けるときの移動にだけ使う。

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::ParseError;
use crate::token::{Literal, TokenKind};

/// ノードID（アリーナ内のインデックス）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// 基本型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Int,
    Float,
    Bool,
    Char,
    Short,
    Void,
}

impl PrimitiveKind {
    /// 型キーワードから変換（signed/unsigned などは型として扱わない）
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::KwInt => Some(PrimitiveKind::Int),
            TokenKind::KwFloat => Some(PrimitiveKind::Float),
            TokenKind::KwBool => Some(PrimitiveKind::Bool),
            TokenKind::KwChar => Some(PrimitiveKind::Char),
            TokenKind::KwShort => Some(PrimitiveKind::Short),
            TokenKind::KwVoid => Some(PrimitiveKind::Void),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Int => "int",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Void => "void",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 型指定（基本型 + ポインタか否か）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeSpec {
    pub kind: PrimitiveKind,
    pub is_pointer: bool,
}

impl TypeSpec {
    pub fn new(kind: PrimitiveKind, is_pointer: bool) -> Self {
        Self { kind, is_pointer }
    }

    /// void（非ポインタ）かどうか
    pub fn is_void(&self) -> bool {
        self.kind == PrimitiveKind::Void && !self.is_pointer
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_pointer {
            write!(f, "{}*", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// 型に合わせて縮小済みの定数値
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConstValue {
    Int(i32),
    Float(f32),
    Char(u8),
    Short(i16),
    Bool(bool),
}

impl ConstValue {
    /// リテラルを型に合わせて変換する
    ///
    /// 小数は偶数丸めの後に縮小する。bool は常に 0。void には値を持たせられないので None。
    pub fn coerce(kind: PrimitiveKind, literal: Literal) -> Option<ConstValue> {
        let whole = match literal {
            Literal::Whole(n) => n as i64,
            Literal::Fractional(x) => x.round_ties_even() as i64,
        };
        match kind {
            PrimitiveKind::Int => Some(ConstValue::Int(whole as i32)),
            PrimitiveKind::Char => Some(ConstValue::Char(whole as u8)),
            PrimitiveKind::Short => Some(ConstValue::Short(whole as i16)),
            PrimitiveKind::Float => Some(ConstValue::Float(match literal {
                Literal::Whole(n) => n as f32,
                Literal::Fractional(x) => x.round_ties_even() as f32,
            })),
            PrimitiveKind::Bool => Some(ConstValue::Bool(false)),
            PrimitiveKind::Void => None,
        }
    }

    /// 整数として取り出す（float は切り捨て）
    pub fn as_i64(&self) -> i64 {
        match *self {
            ConstValue::Int(v) => i64::from(v),
            ConstValue::Float(v) => v as i64,
            ConstValue::Char(v) => i64::from(v),
            ConstValue::Short(v) => i64::from(v),
            ConstValue::Bool(v) => i64::from(v),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{}", v),
            ConstValue::Float(v) => write!(f, "{}", v),
            ConstValue::Char(v) => write!(f, "{}", v),
            ConstValue::Short(v) => write!(f, "{}", v),
            ConstValue::Bool(v) => write!(f, "{}", i32::from(*v)),
        }
    }
}

/// ノード属性値
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Kind(PrimitiveKind),
    Flag(bool),
    Const(ConstValue),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(s) => write!(f, "{:?}", s),
            AttrValue::Kind(k) => write!(f, "{}", k),
            AttrValue::Flag(b) => write!(f, "{}", b),
            AttrValue::Const(v) => write!(f, "{}", v),
        }
    }
}

/// 木のノード
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub attributes: BTreeMap<String, AttrValue>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

/// 宣言木
#[derive(Debug, Clone)]
pub struct DeclTree {
    nodes: Vec<Node>,
}

impl Default for DeclTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DeclTree {
    /// ルート `Unit` とその子 `Body` だけを持つ木を作成
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: vec![Node {
                name: "Unit".to_string(),
                attributes: BTreeMap::new(),
                children: Vec::new(),
                parent: None,
            }],
        };
        tree.push_node(NodeId(0), "Body");
        tree
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// コンパイル単位のトップレベル本体
    pub fn unit_body(&self) -> NodeId {
        NodeId(1)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&AttrValue> {
        self.nodes[id.0].attributes.get(key)
    }

    /// 名前で子ノードを探す
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.name(c) == name)
    }

    /// ルートからの `/` 区切りパスでノードを探す（例: `Unit/Body/main`）
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let mut parts = path.split('/');
        if parts.next()? != self.name(self.root()) {
            return None;
        }
        parts.try_fold(self.root(), |id, name| self.child(id, name))
    }

    /// ノード数
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push_node(&mut self, parent: NodeId, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            parent: Some(parent),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// 子ノードを追加（同じ親の下で名前が重複していればエラー）
    pub fn add_child(&mut self, parent: NodeId, name: &str) -> Result<NodeId, ParseError> {
        if self.child(parent, name).is_some() {
            return Err(ParseError::DuplicateNode(name.to_string()));
        }
        Ok(self.push_node(parent, name))
    }

    pub fn set_attribute(&mut self, id: NodeId, key: &str, value: AttrValue) {
        self.nodes[id.0].attributes.insert(key.to_string(), value);
    }

    /// JSON 文字列に変換
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.view(self.root()))
    }

    /// JSON 値に変換
    pub fn to_json_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self.view(self.root()))
    }

    fn view(&self, id: NodeId) -> NodeView<'_> {
        let node = self.node(id);
        NodeView {
            name: &node.name,
            attributes: &node.attributes,
            children: node.children.iter().map(|&c| self.view(c)).collect(),
        }
    }
}

/// シリアライズ用のノード表現
#[derive(Serialize)]
struct NodeView<'a> {
    name: &'a str,
    attributes: &'a BTreeMap<String, AttrValue>,
    children: Vec<NodeView<'a>>,
}

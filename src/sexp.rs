//! S-expression形式での宣言木出力
//!
//! 宣言木を `(Name (attr value) ... children...)` の形で出力する。デバッグや差分比較に便利。

use std::io::{Result, Write};

use crate::decl_tree::{DeclTree, NodeId};

/// S-expression出力プリンター
pub struct SexpPrinter<W: Write> {
    writer: W,
    indent: usize,
    pretty: bool,
}

impl<W: Write> SexpPrinter<W> {
    /// 新しいプリンターを作成
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            indent: 0,
            pretty: true,
        }
    }

    /// 整形出力の有無を設定
    pub fn set_pretty(&mut self, pretty: bool) {
        self.pretty = pretty;
    }

    /// 木全体を出力
    pub fn print_tree(&mut self, tree: &DeclTree) -> Result<()> {
        self.print_node(tree, tree.root())?;
        if self.pretty {
            writeln!(self.writer)?;
        }
        Ok(())
    }

    /// ノードとその子孫を出力
    pub fn print_node(&mut self, tree: &DeclTree, id: NodeId) -> Result<()> {
        let node = tree.node(id);
        self.write_open(&node.name)?;
        for (key, value) in &node.attributes {
            self.write_atom(&format!("({} {})", key, value))?;
        }
        for &child in &node.children {
            self.print_node(tree, child)?;
        }
        self.write_close()
    }

    /// ライターを取り出す
    pub fn into_inner(self) -> W {
        self.writer
    }

    // ==================== ヘルパー ====================

    fn write_open(&mut self, name: &str) -> Result<()> {
        if self.indent > 0 {
            if self.pretty {
                writeln!(self.writer)?;
                for _ in 0..self.indent {
                    write!(self.writer, "  ")?;
                }
            } else {
                write!(self.writer, " ")?;
            }
        }
        write!(self.writer, "({}", name)?;
        self.indent += 1;
        Ok(())
    }

    fn write_close(&mut self) -> Result<()> {
        self.indent = self.indent.saturating_sub(1);
        write!(self.writer, ")")?;
        Ok(())
    }

    fn write_atom(&mut self, name: &str) -> Result<()> {
        if self.pretty {
            writeln!(self.writer)?;
            for _ in 0..self.indent {
                write!(self.writer, "  ")?;
            }
        } else {
            write!(self.writer, " ")?;
        }
        write!(self.writer, "{}", name)?;
        Ok(())
    }
}

/// 木を 1 行の S-expression 文字列にする
pub fn to_sexp_string(tree: &DeclTree) -> String {
    let mut printer = SexpPrinter::new(Vec::new());
    printer.set_pretty(false);
    // Vec への書き込みは失敗しない
    let _ = printer.print_tree(tree);
    String::from_utf8_lossy(&printer.into_inner()).into_owned()
}

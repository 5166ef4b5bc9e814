//! プリプロセッサ条件式の評価
//!
//! #if / #elif ディレクティブの条件式を評価する。
//! マクロ名は本体が整数ならその値、そうでなければ 0 として扱う。

use crate::error::{CompileError, PPError};
use crate::macro_def::MacroTable;
use crate::preprocessor::DirToken;
use crate::source::SourceLocation;

/// プリプロセッサ式評価器
pub struct PPExprEvaluator<'a> {
    tokens: &'a [DirToken],
    pos: usize,
    macros: &'a MacroTable,
    loc: SourceLocation,
}

impl<'a> PPExprEvaluator<'a> {
    /// 新しい評価器を作成
    pub fn new(tokens: &'a [DirToken], macros: &'a MacroTable, loc: SourceLocation) -> Self {
        Self {
            tokens,
            pos: 0,
            macros,
            loc,
        }
    }

    /// 条件式を評価（式の後に余分なトークンがあればエラー）
    pub fn evaluate(&mut self) -> Result<i64, CompileError> {
        let result = self.expr()?;
        if self.current().is_some() {
            return Err(self.error("extra tokens after expression"));
        }
        Ok(result)
    }

    fn current(&self) -> Option<&DirToken> {
        self.tokens.get(self.pos)
    }

    /// 現在のトークンが指定の記号か
    fn at(&self, punct: &str) -> bool {
        matches!(self.current(), Some(DirToken::Punct(p)) if *p == punct)
    }

    /// 指定の記号なら読み進める
    fn eat(&mut self, punct: &str) -> bool {
        if self.at(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// エラーを生成
    fn error(&self, msg: &str) -> CompileError {
        CompileError::Preprocess {
            loc: self.loc.clone(),
            kind: PPError::InvalidCondition(msg.to_string()),
        }
    }

    /// 条件式 (ternary)
    fn expr(&mut self) -> Result<i64, CompileError> {
        let cond = self.logical_or()?;

        if self.eat("?") {
            let then_val = self.expr()?;
            if !self.eat(":") {
                return Err(self.error("expected ':' in ternary expression"));
            }
            let else_val = self.expr()?;
            Ok(if cond != 0 { then_val } else { else_val })
        } else {
            Ok(cond)
        }
    }

    /// 論理OR
    fn logical_or(&mut self) -> Result<i64, CompileError> {
        let mut left = self.logical_and()?;
        while self.eat("||") {
            let right = self.logical_and()?;
            left = i64::from(left != 0 || right != 0);
        }
        Ok(left)
    }

    /// 論理AND
    fn logical_and(&mut self) -> Result<i64, CompileError> {
        let mut left = self.bitwise_or()?;
        while self.eat("&&") {
            let right = self.bitwise_or()?;
            left = i64::from(left != 0 && right != 0);
        }
        Ok(left)
    }

    fn bitwise_or(&mut self) -> Result<i64, CompileError> {
        let mut left = self.bitwise_xor()?;
        while self.eat("|") {
            left |= self.bitwise_xor()?;
        }
        Ok(left)
    }

    fn bitwise_xor(&mut self) -> Result<i64, CompileError> {
        let mut left = self.bitwise_and()?;
        while self.eat("^") {
            left ^= self.bitwise_and()?;
        }
        Ok(left)
    }

    fn bitwise_and(&mut self) -> Result<i64, CompileError> {
        let mut left = self.equality()?;
        while self.eat("&") {
            left &= self.equality()?;
        }
        Ok(left)
    }

    /// 等価比較
    fn equality(&mut self) -> Result<i64, CompileError> {
        let mut left = self.relational()?;
        loop {
            if self.eat("==") {
                let right = self.relational()?;
                left = i64::from(left == right);
            } else if self.eat("!=") {
                let right = self.relational()?;
                left = i64::from(left != right);
            } else {
                break;
            }
        }
        Ok(left)
    }

    /// 関係比較
    fn relational(&mut self) -> Result<i64, CompileError> {
        let mut left = self.shift()?;
        loop {
            if self.eat("<") {
                let right = self.shift()?;
                left = i64::from(left < right);
            } else if self.eat(">") {
                let right = self.shift()?;
                left = i64::from(left > right);
            } else if self.eat("<=") {
                let right = self.shift()?;
                left = i64::from(left <= right);
            } else if self.eat(">=") {
                let right = self.shift()?;
                left = i64::from(left >= right);
            } else {
                break;
            }
        }
        Ok(left)
    }

    /// シフト演算
    fn shift(&mut self) -> Result<i64, CompileError> {
        let mut left = self.additive()?;
        loop {
            if self.eat("<<") {
                let right = self.additive()?;
                left = left.wrapping_shl(right as u32);
            } else if self.eat(">>") {
                let right = self.additive()?;
                left = left.wrapping_shr(right as u32);
            } else {
                break;
            }
        }
        Ok(left)
    }

    /// 加減算
    fn additive(&mut self) -> Result<i64, CompileError> {
        let mut left = self.multiplicative()?;
        loop {
            if self.eat("+") {
                left = left.wrapping_add(self.multiplicative()?);
            } else if self.eat("-") {
                left = left.wrapping_sub(self.multiplicative()?);
            } else {
                break;
            }
        }
        Ok(left)
    }

    /// 乗除算
    fn multiplicative(&mut self) -> Result<i64, CompileError> {
        let mut left = self.unary()?;
        loop {
            if self.eat("*") {
                left = left.wrapping_mul(self.unary()?);
            } else if self.eat("/") {
                let right = self.unary()?;
                if right == 0 {
                    return Err(self.error("division by zero"));
                }
                left = left.wrapping_div(right);
            } else if self.eat("%") {
                let right = self.unary()?;
                if right == 0 {
                    return Err(self.error("modulo by zero"));
                }
                left = left.wrapping_rem(right);
            } else {
                break;
            }
        }
        Ok(left)
    }

    /// 単項演算
    fn unary(&mut self) -> Result<i64, CompileError> {
        if self.eat("+") {
            self.unary()
        } else if self.eat("-") {
            Ok(self.unary()?.wrapping_neg())
        } else if self.eat("!") {
            Ok(i64::from(self.unary()? == 0))
        } else if self.eat("~") {
            Ok(!self.unary()?)
        } else {
            self.primary()
        }
    }

    /// 一次式
    fn primary(&mut self) -> Result<i64, CompileError> {
        match self.current().cloned() {
            Some(DirToken::Number(text)) => {
                self.advance();
                parse_int(&text).ok_or_else(|| self.error(&format!("invalid number: {}", text)))
            }
            Some(DirToken::Punct("(")) => {
                self.advance();
                let val = self.expr()?;
                if !self.eat(")") {
                    return Err(self.error("expected ')'"));
                }
                Ok(val)
            }
            Some(DirToken::Ident(name)) => {
                self.advance();
                if name == "defined" {
                    return self.parse_defined();
                }
                // 整数として読めないマクロと未定義の識別子は 0
                Ok(self
                    .macros
                    .get(&name)
                    .and_then(|def| def.int_value())
                    .unwrap_or(0))
            }
            Some(_) => Err(self.error("unexpected token in preprocessor expression")),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    /// defined演算子をパース
    fn parse_defined(&mut self) -> Result<i64, CompileError> {
        let has_paren = self.eat("(");

        let name = match self.current() {
            Some(DirToken::Ident(name)) => name.clone(),
            _ => return Err(self.error("expected identifier after 'defined'")),
        };
        self.advance();

        if has_paren && !self.eat(")") {
            return Err(self.error("expected ')' after identifier in 'defined'"));
        }

        Ok(i64::from(self.macros.is_defined(&name)))
    }
}

/// 整数リテラルを解釈（u/l サフィックスは無視）
fn parse_int(text: &str) -> Option<i64> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok().map(|v| v as i64)
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8).ok().map(|v| v as i64)
    } else {
        digits.parse::<u64>().ok().map(|v| v as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macro_def::MacroDef;
    use crate::preprocessor::tokenize_directive;

    fn eval_str(expr: &str, macros: &MacroTable) -> Result<i64, CompileError> {
        let tokens: Vec<DirToken> = tokenize_directive(expr).into_iter().map(|(_, t)| t).collect();
        let mut eval = PPExprEvaluator::new(&tokens, macros, SourceLocation::default());
        eval.evaluate()
    }

    fn eval(expr: &str) -> i64 {
        eval_str(expr, &MacroTable::new()).unwrap()
    }

    #[test]
    fn test_simple_number() {
        assert_eq!(eval("42"), 42);
        assert_eq!(eval("0x10"), 16);
        assert_eq!(eval("010"), 8);
        assert_eq!(eval("10UL"), 10);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("2 + 3"), 5);
        assert_eq!(eval("10 - 4 * 2"), 2);
        assert_eq!(eval("(2 + 3) * 4"), 20);
        assert_eq!(eval("7 % 4"), 3);
    }

    #[test]
    fn test_comparison_and_logical() {
        assert_eq!(eval("5 > 3"), 1);
        assert_eq!(eval("2 == 3"), 0);
        assert_eq!(eval("1 && 0"), 0);
        assert_eq!(eval("1 || 0"), 1);
        assert_eq!(eval("!0"), 1);
        assert_eq!(eval("-5"), -5);
        assert_eq!(eval("1 ? 10 : 20"), 10);
    }

    #[test]
    fn test_defined_and_macro_values() {
        let mut macros = MacroTable::new();
        macros.define(MacroDef::object("FOO", "", SourceLocation::default()));
        macros.define(MacroDef::object("LEVEL", "3", SourceLocation::default()));
        macros.define(MacroDef::object("NAME", "\"bios\"", SourceLocation::default()));

        assert_eq!(eval_str("defined(FOO)", &macros).unwrap(), 1);
        assert_eq!(eval_str("defined FOO", &macros).unwrap(), 1);
        assert_eq!(eval_str("defined(BAR)", &macros).unwrap(), 0);
        assert_eq!(eval_str("LEVEL >= 2", &macros).unwrap(), 1);
        // 整数でないマクロと未定義の識別子は 0
        assert_eq!(eval_str("NAME", &macros).unwrap(), 0);
        assert_eq!(eval_str("UNKNOWN", &macros).unwrap(), 0);
    }

    #[test]
    fn test_errors() {
        let macros = MacroTable::new();
        assert!(eval_str("1 / 0", &macros).is_err());
        assert!(eval_str("(1", &macros).is_err());
        assert!(eval_str("", &macros).is_err());
        assert!(eval_str("1 2", &macros).is_err());
        assert!(eval_str("defined(", &macros).is_err());
    }
}

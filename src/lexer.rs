//! 字句解析器（スキャナ）
//!
//! プリプロセス済みテキストを左から右へ 1 文字ずつ読み、トークン列に変換する。
//! 1 トークンの走査で起きたエラーは位置付きで収集し、失敗位置の直後から走査を続ける。
//! 最後に 1 件でもエラーがあれば、全エラーをまとめて `LexErrors` として返す。

use log::debug;

use crate::error::{CompileError, LexError, LexErrors, Result};
use crate::source::Pos;
use crate::token::{Literal, Token, TokenKind};

/// テキスト全体をトークン化する
pub fn tokenize(source: &str) -> std::result::Result<Vec<Token>, LexErrors> {
    Lexer::new(source).tokenize()
}

/// Lexer
///
/// 1 回の走査ごとに新しく作る。状態を持ち越さない。
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    errors: Vec<CompileError>,
}

impl<'a> Lexer<'a> {
    /// 新しいLexerを作成
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// ソース全体を走査してトークン列を返す
    pub fn tokenize(mut self) -> std::result::Result<Vec<Token>, LexErrors> {
        while self.peek().is_some() {
            if let Err(e) = self.scan_token() {
                self.errors.push(e);
            }
        }

        debug!(
            "scanned {} tokens, {} errors",
            self.tokens.len(),
            self.errors.len()
        );

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(LexErrors {
                errors: self.errors,
                source: self.source.to_string(),
            })
        }
    }

    /// 現在位置を取得
    fn current_pos(&self) -> Pos {
        Pos::saturating(self.line, self.column)
    }

    /// 現在の文字をピーク
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// n文字先をピーク
    fn peek_n(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos + n).copied()
    }

    /// 現在位置の（UTF-8）文字をピーク
    fn peek_char(&self) -> Option<char> {
        self.source.get(self.pos..).and_then(|s| s.chars().next())
    }

    /// 1文字進める
    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if c & 0xC0 != 0x80 {
            // UTF-8 の継続バイトは桁に数えない
            self.column += 1;
        }
        Some(c)
    }

    /// 1つのUTF-8文字を進める
    fn advance_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        for _ in 0..c.len_utf8() {
            self.advance();
        }
        Some(c)
    }

    /// 次が `expected` なら消費して true
    fn matches(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, pos: Pos) {
        let lexeme = &self.source[start..self.pos];
        self.tokens.push(Token::new(kind, lexeme, pos));
    }

    fn error(pos: Pos, kind: LexError) -> CompileError {
        CompileError::Lex { pos, kind }
    }

    /// トークンを1つ走査（空白・コメントは何も積まない）
    fn scan_token(&mut self) -> Result<()> {
        let start = self.pos;
        let pos = self.current_pos();
        let Some(c) = self.peek() else {
            return Ok(());
        };

        match c {
            b' ' | b'\t' | b'\r' | b'\n' | b'\0' => {
                self.advance();
            }
            b'(' | b')' | b'[' | b']' | b'{' | b'}' | b',' | b'.' | b'-' | b'+' | b';' | b'*'
            | b'%' => {
                self.advance();
                let kind = match c {
                    b'(' => TokenKind::LParen,
                    b')' => TokenKind::RParen,
                    b'[' => TokenKind::LBracket,
                    b']' => TokenKind::RBracket,
                    b'{' => TokenKind::LBrace,
                    b'}' => TokenKind::RBrace,
                    b',' => TokenKind::Comma,
                    b'.' => TokenKind::Dot,
                    b'-' => TokenKind::Minus,
                    b'+' => TokenKind::Plus,
                    b';' => TokenKind::Semi,
                    b'*' => TokenKind::Star,
                    _ => TokenKind::Percent,
                };
                self.push(kind, start, pos);
            }
            b'!' | b'=' | b'<' | b'>' => {
                self.advance();
                let with_eq = self.matches(b'=');
                let kind = match (c, with_eq) {
                    (b'!', true) => TokenKind::BangEq,
                    (b'!', false) => TokenKind::Bang,
                    (b'=', true) => TokenKind::EqEq,
                    (b'=', false) => TokenKind::Eq,
                    (b'<', true) => TokenKind::LtEq,
                    (b'<', false) => TokenKind::Lt,
                    (_, true) => TokenKind::GtEq,
                    (_, false) => TokenKind::Gt,
                };
                self.push(kind, start, pos);
            }
            b'/' => {
                if self.peek_n(1) == Some(b'/') {
                    self.skip_line_comment();
                } else {
                    self.advance();
                    self.push(TokenKind::Slash, start, pos);
                }
            }
            b'"' => self.scan_string(pos)?,
            b'\'' => self.scan_char(start, pos)?,
            b'0'..=b'9' => self.scan_number(start, pos)?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_identifier(start, pos),
            _ => {
                let ch = self.advance_char().unwrap_or(c as char);
                return Err(Self::error(pos, LexError::InvalidChar(ch)));
            }
        }

        Ok(())
    }

    /// 行コメントを読み飛ばす（改行は残す）
    fn skip_line_comment(&mut self) {
        while self.peek().is_some_and(|c| c != b'\n') {
            self.advance();
        }
    }

    /// 識別子またはキーワードをスキャン
    fn scan_identifier(&mut self, start: usize, pos: Pos) {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.advance();
        }

        let text = &self.source[start..self.pos];
        let kind = TokenKind::from_keyword(text).unwrap_or(TokenKind::Ident);
        self.push(kind, start, pos);
    }

    /// 数値リテラルをスキャン
    ///
    /// 数字列。'.' があれば小数として続く数字列も読む。
    fn scan_number(&mut self, start: usize, pos: Pos) -> Result<()> {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        let whole = !self.matches(b'.');
        if !whole {
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.source[start..self.pos];
        let invalid = || Self::error(pos, LexError::InvalidNumber(text.to_string()));
        let token = if whole {
            let value: u64 = text.parse().map_err(|_| invalid())?;
            Token::with_literal(TokenKind::Number, text, Literal::Whole(value), pos)
        } else {
            let value: f64 = text.parse().map_err(|_| invalid())?;
            Token::with_literal(TokenKind::Fractional, text, Literal::Fractional(value), pos)
        };
        self.tokens.push(token);
        Ok(())
    }

    /// 文字列リテラルをスキャン
    ///
    /// エスケープはなく、改行をまたいでもよい。閉じ引用符がなければトークンを積まない。
    fn scan_string(&mut self, pos: Pos) -> Result<()> {
        self.advance(); // "
        let content_start = self.pos;

        loop {
            match self.peek() {
                Some(b'"') => break,
                Some(_) => {
                    self.advance();
                }
                None => return Err(Self::error(pos, LexError::UnterminatedString)),
            }
        }

        let content = &self.source[content_start..self.pos];
        self.advance(); // "
        self.tokens.push(Token::new(TokenKind::StringLit, content, pos));
        Ok(())
    }

    /// 文字リテラルをスキャン
    ///
    /// 1 文字またはバックスラッシュエスケープを 1 つだけ含む。値は文字コード。
    fn scan_char(&mut self, start: usize, pos: Pos) -> Result<()> {
        self.advance(); // '

        let value = match self.peek() {
            None | Some(b'\n') => return Err(Self::error(pos, LexError::UnterminatedChar)),
            Some(b'\'') => {
                self.advance();
                return Err(Self::error(pos, LexError::EmptyCharLit));
            }
            Some(b'\\') => {
                self.advance();
                self.scan_escape_sequence(pos)?
            }
            Some(_) => match self.advance_char() {
                Some(ch) => u64::from(u32::from(ch)),
                None => return Err(Self::error(pos, LexError::UnterminatedChar)),
            },
        };

        match self.peek() {
            Some(b'\'') => {
                self.advance();
            }
            None | Some(b'\n') => return Err(Self::error(pos, LexError::UnterminatedChar)),
            Some(_) => {
                // 同じ行の閉じ引用符まで読み飛ばして回復する
                while self.peek().is_some_and(|c| c != b'\'' && c != b'\n') {
                    self.advance();
                }
                self.matches(b'\'');
                return Err(Self::error(pos, LexError::MultiCharLiteral));
            }
        }

        let lexeme = &self.source[start..self.pos];
        self.tokens
            .push(Token::with_literal(TokenKind::CharLit, lexeme, Literal::Whole(value), pos));
        Ok(())
    }

    /// エスケープシーケンスをスキャン
    fn scan_escape_sequence(&mut self, pos: Pos) -> Result<u64> {
        let Some(c) = self.peek() else {
            return Err(Self::error(pos, LexError::UnterminatedChar));
        };
        let value = match c {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'0' => 0,
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            b'\n' => return Err(Self::error(pos, LexError::UnterminatedChar)),
            _ => {
                let ch = self.advance_char().unwrap_or(c as char);
                return Err(Self::error(pos, LexError::InvalidEscape(ch)));
            }
        };
        self.advance();
        Ok(u64::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn lex_errors(source: &str) -> Vec<LexError> {
        tokenize(source)
            .unwrap_err()
            .errors
            .into_iter()
            .map(|e| match e {
                CompileError::Lex { kind, .. } => kind,
                other => panic!("unexpected error: {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_operators() {
        let tokens = lex("! != = == < <= > >= + - * / % . , ;");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Bang,
                TokenKind::BangEq,
                TokenKind::Eq,
                TokenKind::EqEq,
                TokenKind::Lt,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtEq,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Dot,
                TokenKind::Comma,
                TokenKind::Semi,
            ]
        );
    }

    #[test]
    fn test_brackets() {
        assert_eq!(
            lex("(){}[]"),
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LBracket,
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = tokenize("42 3.75 7.").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].literal, Some(Literal::Whole(42)));
        assert_eq!(tokens[1].kind, TokenKind::Fractional);
        assert_eq!(tokens[1].literal, Some(Literal::Fractional(3.75)));
        assert_eq!(tokens[2].kind, TokenKind::Fractional);
        assert_eq!(tokens[2].literal, Some(Literal::Fractional(7.0)));
    }

    #[test]
    fn test_number_overflow() {
        let errors = lex_errors("99999999999999999999999");
        assert!(matches!(errors[0], LexError::InvalidNumber(_)));
    }

    #[test]
    fn test_comment_skipped() {
        assert_eq!(
            lex("int // trailing comment\nx"),
            vec![TokenKind::KwInt, TokenKind::Ident]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("int x;\n  float y;").unwrap();
        assert_eq!(tokens[0].pos, Pos::new(1, 1));
        assert_eq!(tokens[1].pos, Pos::new(1, 5));
        assert_eq!(tokens[2].pos, Pos::new(1, 6));
        assert_eq!(tokens[3].pos, Pos::new(2, 3));
        assert_eq!(tokens[4].pos, Pos::new(2, 9));
    }

    #[test]
    fn test_char_literals() {
        let tokens = tokenize(r"'a' '\n' '\''").unwrap();
        assert_eq!(tokens.len(), 3);
        assert!(tokens.iter().all(|t| t.kind == TokenKind::CharLit));
        assert_eq!(tokens[0].literal, Some(Literal::Whole(97)));
        assert_eq!(tokens[0].lexeme, "'a'");
        assert_eq!(tokens[1].literal, Some(Literal::Whole(10)));
        assert_eq!(tokens[2].literal, Some(Literal::Whole(39)));
    }

    #[test]
    fn test_bad_char_literals() {
        assert_eq!(lex_errors("'ab'"), vec![LexError::MultiCharLiteral]);
        assert_eq!(lex_errors("''"), vec![LexError::EmptyCharLit]);
        assert_eq!(lex_errors("'a"), vec![LexError::UnterminatedChar]);
        assert_eq!(lex_errors(r"'\q'"), vec![LexError::InvalidEscape('q'), LexError::UnterminatedChar]);
    }

    #[test]
    fn test_string_spans_lines() {
        let tokens = tokenize("\"a\nb\" x").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::StringLit);
        assert_eq!(tokens[0].lexeme, "a\nb");
        // 改行を含む文字列の後も行番号は進む
        assert_eq!(tokens[1].pos, Pos::new(2, 4));
    }

    #[test]
    fn test_errors_are_collected() {
        let err = tokenize("int $ x; @").unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert_eq!(err.errors[0].pos(), Pos::new(1, 5));
        assert_eq!(err.errors[1].pos(), Pos::new(1, 10));
        assert_eq!(err.source, "int $ x; @");
    }
}

//! ソース位置の管理
//!
//! スキャナとパーサが使う 32bit パック位置 (`Pos`) と、
//! プリプロセッサが使うファイル単位の位置 (`SourceLocation`) を提供する。

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// 行番号と桁番号を 1 つの 32bit 値にパックする
///
/// 上位 16bit が行、下位 16bit が桁。
pub fn encode_position(line: u16, column: u16) -> u32 {
    (u32::from(line) << 16) | u32::from(column)
}

/// パック位置から行番号を取り出す（シフトしてからマスク）
pub fn decode_line(packed: u32) -> u16 {
    ((packed >> 16) & 0xFFFF) as u16
}

/// パック位置から桁番号を取り出す
pub fn decode_column(packed: u32) -> u16 {
    (packed & 0xFFFF) as u16
}

/// トークン位置（パック済み）
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct Pos(u32);

impl Pos {
    /// 行・桁から作成
    pub fn new(line: u16, column: u16) -> Self {
        Pos(encode_position(line, column))
    }

    /// 行・桁カウンタから作成（u16 を超える値は飽和させる）
    pub fn saturating(line: u32, column: u32) -> Self {
        let line = u16::try_from(line).unwrap_or(u16::MAX);
        let column = u16::try_from(column).unwrap_or(u16::MAX);
        Pos::new(line, column)
    }

    /// パック済みの値から作成
    pub fn from_packed(packed: u32) -> Self {
        Pos(packed)
    }

    /// パック済みの値を取得
    pub fn packed(self) -> u32 {
        self.0
    }

    pub fn line(self) -> u16 {
        decode_line(self.0)
    }

    pub fn column(self) -> u16 {
        decode_column(self.0)
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.line(), self.column())
    }
}

/// ファイル識別子
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct FileId(u32);

impl FileId {
    /// 内部IDを取得（デバッグ用）
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// ファイル内のソース位置（プリプロセッサ用）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub file_id: FileId,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    /// 新しいソース位置を作成
    pub fn new(file_id: FileId, line: u32, column: u32) -> Self {
        Self {
            file_id,
            line,
            column,
        }
    }
}

/// ファイルレジストリ
///
/// プリプロセッサが読み込んだファイル（入力ファイルとインクルード先）を記録する。
#[derive(Debug, Default, Clone)]
pub struct FileRegistry {
    paths: Vec<PathBuf>,
    path_to_id: HashMap<PathBuf, FileId>,
}

impl FileRegistry {
    /// 新しいレジストリを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// パスを登録してIDを返す
    pub fn register(&mut self, path: PathBuf) -> FileId {
        if let Some(&id) = self.path_to_id.get(&path) {
            return id;
        }
        let id = FileId(self.paths.len() as u32);
        self.path_to_id.insert(path.clone(), id);
        self.paths.push(path);
        id
    }

    /// IDからパスを取得
    pub fn get_path(&self, id: FileId) -> &Path {
        &self.paths[id.0 as usize]
    }

    /// 登録されているファイル数を返す
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// レジストリが空かどうか
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// 全登録を消去
    pub fn clear(&mut self) {
        self.paths.clear();
        self.path_to_id.clear();
    }

    /// 登録されたファイルをイテレート
    pub fn iter(&self) -> impl Iterator<Item = (FileId, &Path)> {
        self.paths
            .iter()
            .enumerate()
            .map(|(i, p)| (FileId(i as u32), p.as_path()))
    }
}

/// エラー表示用のロケーション（ファイル名解決付き）
pub struct DisplayLocation<'a> {
    pub loc: &'a SourceLocation,
    pub files: &'a FileRegistry,
}

impl<'a> fmt::Display for DisplayLocation<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if (self.loc.file_id.0 as usize) < self.files.len() {
            let path = self.files.get_path(self.loc.file_id);
            write!(f, "{}:{}", path.display(), self.loc.line)
        } else {
            write!(f, "<unknown>:{}", self.loc.line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_round_trip_edges() {
        let samples = [0u16, 1, 2, 255, 256, 0x7FFF, 0x8000, 0xFFFE, 0xFFFF];
        for &line in &samples {
            for &column in &samples {
                let packed = encode_position(line, column);
                assert_eq!(decode_line(packed), line);
                assert_eq!(decode_column(packed), column);
            }
        }
    }

    #[test]
    fn test_position_round_trip_sweep() {
        // 行・桁を独立に全域走査する（もう一方は固定の非対称な値）
        for v in 0..=u16::MAX {
            let p = encode_position(v, 0x1234);
            assert_eq!(decode_line(p), v);
            assert_eq!(decode_column(p), 0x1234);

            let p = encode_position(0x4321, v);
            assert_eq!(decode_line(p), 0x4321);
            assert_eq!(decode_column(p), v);
        }
    }

    #[test]
    fn test_line_is_not_column() {
        // 行のデコードが桁の値を返さないこと
        let p = encode_position(7, 42);
        assert_eq!(decode_line(p), 7);
        assert_ne!(decode_line(p), 42);
    }

    #[test]
    fn test_pos_display() {
        let pos = Pos::new(3, 14);
        assert_eq!(pos.to_string(), "[3:14]");
        assert_eq!(Pos::from_packed(pos.packed()), pos);
    }

    #[test]
    fn test_pos_saturating() {
        let pos = Pos::saturating(70_000, 12);
        assert_eq!(pos.line(), u16::MAX);
        assert_eq!(pos.column(), 12);
    }

    #[test]
    fn test_file_registry_same_path() {
        let mut registry = FileRegistry::new();
        let id1 = registry.register(PathBuf::from("/path/to/file.c"));
        let id2 = registry.register(PathBuf::from("/path/to/file.c"));
        let id3 = registry.register(PathBuf::from("/path/to/other.h"));

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_path(id3), Path::new("/path/to/other.h"));
    }
}

//! ホストが提供する能力のトレイト定義
//!
//! エンジンは停止中のターゲットに対して、ここで定義されたトレイト越しに
//! のみアクセスします。ブロッキングはすべてホスト実装側で発生し、
//! エンジンからは不透明です。

use crate::value::Value;
use crate::Result;

/// ターゲットメモリ上のアドレス
pub type Addr = u64;

/// ソースコード上の位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    /// ファイル名
    pub file: String,
    /// 正規化されたフルパス
    pub fullname: String,
    /// 行番号
    pub line: u32,
}

/// ターゲットアクセス能力
///
/// メモリ読み取り・レジスタ読み書き・シンボル解決・型付きフィールドアクセスを
/// 提供します。失敗はすべて `anyhow::Error` で返します。
pub trait TargetHost {
    /// 指定アドレスからバイト列を読み取る
    fn read_memory(&self, addr: Addr, len: usize) -> Result<Vec<u8>>;

    /// 名前付きCPUレジスタを読み取る
    fn read_register(&self, name: &str) -> Result<u64>;

    /// 名前付きCPUレジスタへ書き込む
    fn write_register(&self, name: &str, value: u64) -> Result<()>;

    /// シンボル名からアドレスを解決する
    fn lookup_symbol(&self, name: &str) -> Option<Addr>;

    /// 名前付きグローバル値を型付きで評価する
    fn eval_global(&self, name: &str) -> Result<Value>;

    /// 指定アドレスの構造体を型付きで評価する
    fn eval_struct_at(&self, type_name: &str, addr: Addr) -> Result<Value>;

    /// ターゲットのアーキテクチャ記述文字列を取得する
    fn arch_description(&self) -> Option<String>;

    /// アドレスを含む関数の名前を取得する
    fn function_at(&self, addr: Addr) -> Option<String>;

    /// アドレスに対応するソース位置を取得する
    fn source_at(&self, addr: Addr) -> Option<SourceLoc>;

    /// ターゲットのポインタ幅（バイト数）
    ///
    /// 対象のRTOSターゲットはほとんどが32bitなので、デフォルトは4です。
    fn pointer_width(&self) -> usize {
        4
    }

    /// u8値を読み取る
    fn read_u8(&self, addr: Addr) -> Result<u8> {
        let bytes = self.read_memory(addr, 1)?;
        Ok(bytes[0])
    }

    /// u32値を読み取る（リトルエンディアン）
    fn read_u32(&self, addr: Addr) -> Result<u32> {
        let bytes = self.read_memory(addr, 4)?;
        let array: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("short read at 0x{:x} (expected 4 bytes)", addr))?;
        Ok(u32::from_le_bytes(array))
    }

    /// ポインタ値を読み取る（リトルエンディアン、幅は `pointer_width`）
    fn read_ptr(&self, addr: Addr) -> Result<Addr> {
        match self.pointer_width() {
            8 => {
                let bytes = self.read_memory(addr, 8)?;
                let array: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("short read at 0x{:x} (expected 8 bytes)", addr))?;
                Ok(u64::from_le_bytes(array))
            }
            _ => Ok(self.read_u32(addr)? as Addr),
        }
    }

    /// NUL終端文字列を読み取る（最大 `max_len` バイト）
    fn read_cstring(&self, addr: Addr, max_len: usize) -> Result<String> {
        let bytes = self.read_memory(addr, max_len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// ライブレジスタ上のフレーム
///
/// `depth` はホストがフレームチェーンを辿るために使う不透明な深さです。
#[derive(Debug, Clone, PartialEq)]
pub struct HostFrame {
    /// プログラムカウンタ
    pub pc: Addr,
    /// このフレームを含む関数名
    pub function: Option<String>,
    /// ソース位置
    pub source: Option<SourceLoc>,
    /// フレームのアーキテクチャ名
    pub arch: Option<String>,
    /// チェーン内の深さ（ホスト内部用）
    pub depth: usize,
}

/// フレームウォーク能力
///
/// 現在のライブレジスタが指す実行コンテキストのコールチェーンを、
/// 最内フレームから一段ずつ外側へ辿ります。レジスタを差し替えれば
/// 別スレッドの保存コンテキストも同じ仕組みで辿れます。
pub trait FrameWalker {
    /// 最内（レベル0）フレームを取得する
    fn innermost_frame(&self) -> Result<Option<HostFrame>>;

    /// 一段外側のフレームを取得する
    fn older_frame(&self, frame: &HostFrame) -> Result<Option<HostFrame>>;
}

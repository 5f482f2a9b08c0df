//! 構造体オフセットの発見
//!
//! カーネル／スレッド構造体のレイアウトを決定する2つの戦略を提供します。
//! ひとつはターゲットバイナリ自身がエクスポートするオフセット表を読む戦略、
//! もうひとつは数値演算をやめてホストの型システムによる名前付きフィールド
//! アクセスへ委ねるセンチネルです。解決結果は不変で、再解決時には
//! まるごと置き換えられます。

use std::fmt;
use std::str::FromStr;

use azami_host::TargetHost;
use tracing::debug;

use crate::error::EngineError;
use crate::Result;

/// エクスポートされたオフセット表のシンボル名
pub const OFFSET_EXPORT_SYMBOL: &str = "_kernel_thread_info_offsets";

/// オフセット表のエントリ数シンボル名
pub const OFFSET_COUNT_SYMBOL: &str = "_kernel_thread_info_num_offsets";

/// エントリ数シンボルが無い場合のデフォルト
const DEFAULT_OFFSET_COUNT: usize = 13;

/// オフセット表のインデックスに対応するフィールド名（固定順）
const OFFSET_FIELDS: [&str; 13] = [
    "version",
    "k_curr_thread",
    "k_threads",
    "t_entry",
    "t_next_thread",
    "t_state",
    "t_user_options",
    "t_prio",
    "t_stack_pointer",
    "t_name",
    "t_arch",
    "t_preempt_float",
    "t_coop_float",
];

/// オフセット発見モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryMode {
    /// シンボルベースを試し、失敗したらフィールドアクセスへフォールバック
    #[default]
    Auto,
    /// シンボルベースのみ（失敗はエラー）
    Symbols,
    /// 常にフィールドアクセス（シンボルテーブルには触れない）
    Hardcoded,
}

impl FromStr for DiscoveryMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DiscoveryMode::Auto),
            "symbols" => Ok(DiscoveryMode::Symbols),
            "hardcoded" => Ok(DiscoveryMode::Hardcoded),
            other => Err(EngineError::Configuration(format!(
                "unknown discovery mode '{}' (valid: auto, symbols, hardcoded)",
                other
            ))),
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryMode::Auto => "auto",
            DiscoveryMode::Symbols => "symbols",
            DiscoveryMode::Hardcoded => "hardcoded",
        };
        f.write_str(s)
    }
}

/// カーネルアンカーからのオフセット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelOffsets {
    /// スレッドリスト先頭ポインタ
    pub threads: u32,
    /// 実行中スレッドポインタ
    pub current: u32,
}

/// スレッド構造体内のオフセット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadOffsets {
    /// 次スレッドポインタ
    pub next: u32,
    /// スレッド状態
    pub state: u32,
    /// 優先度
    pub prio: u32,
    /// スレッド名
    pub name: u32,
    /// スタックポインタ
    pub stack_pointer: u32,
    /// エントリ情報
    pub entry: u32,
}

/// エクスポートされたオフセット表から構築した数値オフセット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportedOffsets {
    /// 表のフォーマットバージョン
    pub version: Option<u32>,
    pub kernel: KernelOffsets,
    pub thread: ThreadOffsets,
}

/// 解決済みのオフセット表
///
/// 一度解決したら不変です。部分的に書き換えられることはなく、
/// 再解決時にはまるごと置き換えます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetTable {
    /// エクスポートされた表から得た数値オフセット
    Exported(ExportedOffsets),
    /// 名前付きフィールドアクセスへ委ねるセンチネル
    FieldAccess,
}

/// 指定モードでオフセット表を解決する
///
/// ターゲット読み取り以外の副作用はなく、何度でも呼び出せます。
pub fn resolve(mode: DiscoveryMode, host: &dyn TargetHost) -> Result<OffsetTable> {
    match mode {
        DiscoveryMode::Hardcoded => {
            debug!("using field-access offsets (hardcoded mode)");
            Ok(OffsetTable::FieldAccess)
        }
        DiscoveryMode::Symbols => read_exported(host).map(OffsetTable::Exported),
        DiscoveryMode::Auto => match read_exported(host) {
            Ok(table) => Ok(OffsetTable::Exported(table)),
            Err(e) => {
                debug!(error = %e, "symbol-based discovery failed, falling back to field access");
                Ok(OffsetTable::FieldAccess)
            }
        },
    }
}

/// エクスポートされたオフセット表を読み取る
///
/// 読み取りに一部でも失敗した場合は全体を失敗とし、部分的な表は
/// 決して返しません。
fn read_exported(host: &dyn TargetHost) -> Result<ExportedOffsets> {
    let table_addr = host.lookup_symbol(OFFSET_EXPORT_SYMBOL).ok_or_else(|| {
        EngineError::Configuration(format!("symbol '{}' not found", OFFSET_EXPORT_SYMBOL))
    })?;

    // エントリ数。シンボルが無い・読めない場合はデフォルトを使う
    let count = match host.lookup_symbol(OFFSET_COUNT_SYMBOL) {
        Some(addr) => match host.read_u32(addr) {
            Ok(v) => v as usize,
            Err(e) => {
                debug!(error = %e, "offset count unreadable, assuming {}", DEFAULT_OFFSET_COUNT);
                DEFAULT_OFFSET_COUNT
            }
        },
        None => DEFAULT_OFFSET_COUNT,
    };

    // 宣言されたエントリ数ぶんだけフィールドを埋める
    let filled = count.min(OFFSET_FIELDS.len());
    let raw = host.read_memory(table_addr, filled * 4).map_err(|e| {
        EngineError::Configuration(format!("failed to read offset table: {}", e))
    })?;

    let mut entries = [None::<u32>; OFFSET_FIELDS.len()];
    for (i, chunk) in raw.chunks_exact(4).enumerate() {
        entries[i] = Some(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    let get = |name: &str| -> u32 {
        OFFSET_FIELDS
            .iter()
            .position(|&n| n == name)
            .and_then(|i| entries[i])
            .unwrap_or(0)
    };

    Ok(ExportedOffsets {
        version: entries[0],
        kernel: KernelOffsets {
            threads: get("k_threads"),
            current: get("k_curr_thread"),
        },
        thread: ThreadOffsets {
            next: get("t_next_thread"),
            state: get("t_state"),
            prio: get("t_prio"),
            name: get("t_name"),
            stack_pointer: get("t_stack_pointer"),
            entry: get("t_entry"),
        },
    })
}

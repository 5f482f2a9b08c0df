//! カーネル構造体へのアクセス戦略
//!
//! 解決済みの `OffsetTable` とホストを束ね、数値オフセット演算と
//! 名前付きフィールドアクセスのどちらが使われているかを隠蔽します。
//! スレッド単位の読み取り失敗はフィールドごとに `None` へ劣化させ、
//! 列挙サイクル全体には波及させません。

use azami_host::{Addr, TargetHost, Value, ValueRecord};
use tracing::debug;

use crate::error::EngineError;
use crate::offsets::OffsetTable;
use crate::Result;

/// カーネルアンカーオブジェクトのシンボル名
pub const KERNEL_ANCHOR_SYMBOL: &str = "_kernel";

/// スレッド制御構造の型名（型付きアクセス用）
const THREAD_TYPE_NAME: &str = "k_thread";

/// スレッド名の最大読み取り長
const THREAD_NAME_MAX: usize = 32;

/// カーネルアンカーから得た出発点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelAnchor {
    /// スレッドリストの先頭
    pub list_head: Addr,
    /// 実行中スレッドの制御構造アドレス（0 = 不明）
    pub current: Addr,
}

/// トラバーサル中に1ノードから読み取った生の情報
///
/// `next` の `None` はリンク自体が読めなかったことを意味し、
/// トラバーサルはそこで停止します。他のフィールドの `None` は
/// そのスレッドのフィールドだけをデフォルト値へ劣化させます。
#[derive(Debug, Clone, Default)]
pub struct ThreadSample {
    pub next: Option<Addr>,
    pub name: Option<String>,
    pub state: Option<u8>,
    pub prio: Option<i8>,
    pub saved_regs: Option<ValueRecord>,
}

/// カーネル構造体ビュー
pub struct KernelView<'a> {
    host: &'a dyn TargetHost,
    table: OffsetTable,
}

impl<'a> KernelView<'a> {
    /// ホストと解決済みオフセット表からビューを作成する
    pub fn new(host: &'a dyn TargetHost, table: OffsetTable) -> Self {
        Self { host, table }
    }

    /// カーネルアンカーを読み取り、トラバーサルの出発点を得る
    ///
    /// アンカーが読めない、またはリスト先頭がヌルの場合は
    /// `TargetUnavailable` で中断します。実行中スレッドポインタの
    /// 読み取り失敗は中断せず 0（不明）になります。
    pub fn anchor(&self) -> Result<KernelAnchor> {
        let anchor = match self.table {
            OffsetTable::Exported(off) => {
                let base = self.host.lookup_symbol(KERNEL_ANCHOR_SYMBOL).ok_or_else(|| {
                    EngineError::TargetUnavailable(format!(
                        "kernel anchor symbol '{}' not found",
                        KERNEL_ANCHOR_SYMBOL
                    ))
                })?;
                let list_head = self
                    .host
                    .read_ptr(base + off.kernel.threads as Addr)
                    .map_err(|e| {
                        EngineError::TargetUnavailable(format!(
                            "cannot read thread list head: {}",
                            e
                        ))
                    })?;
                let current = self
                    .host
                    .read_ptr(base + off.kernel.current as Addr)
                    .unwrap_or(0);
                KernelAnchor { list_head, current }
            }
            OffsetTable::FieldAccess => {
                let kernel = self.host.eval_global(KERNEL_ANCHOR_SYMBOL).map_err(|e| {
                    EngineError::TargetUnavailable(format!(
                        "cannot read kernel anchor '{}': {}",
                        KERNEL_ANCHOR_SYMBOL, e
                    ))
                })?;
                let list_head = kernel
                    .field("threads")
                    .and_then(Value::as_scalar)
                    .ok_or_else(|| {
                        EngineError::TargetUnavailable(
                            "kernel anchor has no readable thread list".to_string(),
                        )
                    })?;
                // 実行中スレッドはコアごとのフィールドを優先し、
                // 単一コアのフィールドへフォールバックする
                let current = kernel
                    .field("cpus")
                    .and_then(|cpus| cpus.index(0))
                    .and_then(|cpu| cpu.field("current"))
                    .and_then(Value::as_scalar)
                    .or_else(|| kernel.field("current").and_then(Value::as_scalar))
                    .unwrap_or(0);
                KernelAnchor { list_head, current }
            }
        };

        if anchor.list_head == 0 {
            return Err(EngineError::TargetUnavailable(
                "thread list head is null".to_string(),
            ));
        }
        Ok(anchor)
    }

    /// 1スレッドぶんの情報を読み取る
    pub fn sample_thread(&self, addr: Addr) -> ThreadSample {
        match self.table {
            OffsetTable::Exported(off) => {
                let saved_regs = self.read_saved_regs(addr);
                ThreadSample {
                    next: self.host.read_ptr(addr + off.thread.next as Addr).ok(),
                    name: self
                        .host
                        .read_cstring(addr + off.thread.name as Addr, THREAD_NAME_MAX)
                        .ok()
                        .filter(|name| !name.is_empty()),
                    state: self.host.read_u8(addr + off.thread.state as Addr).ok(),
                    prio: self
                        .host
                        .read_u8(addr + off.thread.prio as Addr)
                        .ok()
                        .map(|v| v as i8),
                    saved_regs,
                }
            }
            OffsetTable::FieldAccess => {
                let record = match self.host.eval_struct_at(THREAD_TYPE_NAME, addr) {
                    Ok(value) => value,
                    Err(e) => {
                        debug!(addr = format_args!("0x{:x}", addr), error = %e,
                               "thread record unreadable");
                        return ThreadSample::default();
                    }
                };
                ThreadSample {
                    next: record.field("next_thread").and_then(Value::as_scalar),
                    name: record
                        .field("name")
                        .and_then(Value::as_str)
                        .filter(|name| !name.is_empty())
                        .map(str::to_owned),
                    state: record
                        .field("base")
                        .and_then(|base| base.field("thread_state"))
                        .and_then(Value::as_scalar)
                        .map(|v| v as u8),
                    prio: record
                        .field("base")
                        .and_then(|base| base.field("prio"))
                        .and_then(Value::as_scalar)
                        .map(|v| v as u8 as i8),
                    saved_regs: record
                        .field("callee_saved")
                        .and_then(Value::as_record)
                        .cloned(),
                }
            }
        }
    }

    /// 保存レジスタレコードを読み取る
    ///
    /// レコード内部のレイアウトはアーキテクチャ依存でオフセット表にも
    /// 含まれないため、どちらの戦略でも型付きアクセスで取得します。
    fn read_saved_regs(&self, addr: Addr) -> Option<ValueRecord> {
        match self.host.eval_struct_at(THREAD_TYPE_NAME, addr) {
            Ok(record) => record
                .field("callee_saved")
                .and_then(Value::as_record)
                .cloned(),
            Err(_) => None,
        }
    }
}

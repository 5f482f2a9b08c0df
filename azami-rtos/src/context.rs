//! デバッグ時コンテキストスイッチ
//!
//! サスペンド中スレッドの保存コンテキストをライブCPUレジスタへ一時的に
//! 書き込み、ハードウェア実行中スレッドへ戻るときに元の値をビット単位で
//! 復元します。実CPUレジスタのスナップショットは常に高々1つで、
//! 「ライブレジスタが差し替え済みである」こととスナップショットの存在は
//! 厳密に一致します。

use azami_host::TargetHost;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::thread::RtosThread;
use crate::Result;

/// スタックポインタレジスタ名
const REG_SP: &str = "sp";

/// プログラムカウンタレジスタ名
const REG_PC: &str = "pc";

/// 実CPUレジスタのスナップショット
///
/// 最初にサスペンド中スレッドへ切り替える直前のSP/PCです。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwRegisterSnapshot {
    pub sp: u64,
    pub pc: u64,
}

/// コンテキストスイッチャ
#[derive(Debug, Default)]
pub struct ContextSwitcher {
    snapshot: Option<HwRegisterSnapshot>,
}

impl ContextSwitcher {
    /// 新しいコンテキストスイッチャを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在のスナップショットを取得する
    pub fn snapshot(&self) -> Option<HwRegisterSnapshot> {
        self.snapshot
    }

    /// 指定スレッドのコンテキストへ切り替える
    ///
    /// ハードウェア実行中スレッドが対象なら、スナップショットがあれば
    /// 復元してクリアし、なければ何もしません。サスペンド中スレッドが
    /// 対象なら、保存PC/SPのどちらかが不明（0）の場合はレジスタに
    /// 触れず黙って中断します。スナップショットの取得は最初の差し替え時
    /// のみで、サスペンド中スレッド間を何度切り替えても再保存しません。
    pub fn switch_to(&mut self, host: &dyn TargetHost, thread: &RtosThread) -> Result<()> {
        if thread.hw_active {
            return self.restore(host);
        }

        let pc = thread.saved_pc(host);
        let sp = thread.saved_sp();
        if pc == 0 || sp == 0 {
            debug!(
                id = thread.session_id,
                "saved context unresolved, leaving live registers untouched"
            );
            return Ok(());
        }

        if self.snapshot.is_none() {
            let live_sp = read_reg(host, REG_SP)?;
            let live_pc = read_reg(host, REG_PC)?;
            self.snapshot = Some(HwRegisterSnapshot {
                sp: live_sp,
                pc: live_pc,
            });
        }

        write_reg(host, REG_SP, sp)?;
        write_reg(host, REG_PC, pc)?;
        Ok(())
    }

    /// スナップショットがあればライブレジスタへ書き戻してクリアする
    ///
    /// 停止イベントごとに無条件で呼び出されます。
    pub fn restore(&mut self, host: &dyn TargetHost) -> Result<()> {
        if let Some(snap) = self.snapshot.take() {
            write_reg(host, REG_SP, snap.sp)?;
            write_reg(host, REG_PC, snap.pc)?;
        }
        Ok(())
    }

    /// レジスタに触れずスナップショットを破棄する（ターゲット終了時用）
    pub fn reset(&mut self) {
        self.snapshot = None;
    }
}

/// ライブレジスタを一時的に差し替え、スコープ終了時に必ず元へ戻すガード
///
/// フレームウォークが途中で失敗しても復元が保証されるよう、
/// 書き込みの前に元の値を取得してからガードを構築します。
pub struct RegisterGuard<'a> {
    host: &'a dyn TargetHost,
    orig_sp: u64,
    orig_pc: u64,
}

impl<'a> RegisterGuard<'a> {
    /// 現在のSP/PCを退避してから指定値へ差し替える
    pub fn swap(host: &'a dyn TargetHost, sp: u64, pc: u64) -> azami_host::Result<Self> {
        let orig_sp = host.read_register(REG_SP)?;
        let orig_pc = host.read_register(REG_PC)?;
        let guard = Self {
            host,
            orig_sp,
            orig_pc,
        };
        // ガード構築後に書き込む。片方だけ成功してもDropで復元される
        guard.host.write_register(REG_SP, sp)?;
        guard.host.write_register(REG_PC, pc)?;
        Ok(guard)
    }
}

impl Drop for RegisterGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.host.write_register(REG_SP, self.orig_sp) {
            warn!(error = %e, "failed to restore stack pointer");
        }
        if let Err(e) = self.host.write_register(REG_PC, self.orig_pc) {
            warn!(error = %e, "failed to restore program counter");
        }
    }
}

fn read_reg(host: &dyn TargetHost, name: &str) -> Result<u64> {
    host.read_register(name)
        .map_err(|e| EngineError::TargetUnavailable(format!("cannot read register {}: {}", name, e)))
}

fn write_reg(host: &dyn TargetHost, name: &str, value: u64) -> Result<()> {
    host.write_register(name, value)
        .map_err(|e| EngineError::TargetUnavailable(format!("cannot write register {}: {}", name, e)))
}

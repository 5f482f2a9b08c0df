//! RTOSスレッドの表現

use azami_host::{Addr, TargetHost, ValueRecord};

use crate::arch::ArchProfile;

/// セッションローカルなスレッドID
///
/// 初回発見順に1から単調増加で割り当てられ、スレッドが存続する限り
/// リフレッシュをまたいで安定です。
pub type SessionId = u32;

/// 発見されたRTOSスレッド
///
/// 同一性はスレッド制御構造のターゲットメモリアドレスです。
/// レジストリが排他的に所有します。
#[derive(Debug, Clone)]
pub struct RtosThread {
    /// 制御構造のアドレス（同一性）
    pub addr: Addr,
    /// セッションローカルID
    pub session_id: SessionId,
    /// 表示名
    pub name: String,
    /// 優先度
    pub prio: i8,
    /// 状態コード
    pub state: u8,
    /// 保存レジスタレコード（アーキテクチャプロファイルが解釈する）
    pub saved_regs: Option<ValueRecord>,
    /// CPU上で物理的に実行中のスレッドか（レジストリ内で高々1つ）
    pub hw_active: bool,
    /// 最後に判明した実行位置の文字列
    pub location: String,
    /// 付与されたアーキテクチャプロファイル
    pub arch: ArchProfile,
}

impl RtosThread {
    /// 名前が読めなかったスレッドのデフォルト表示名
    pub fn default_name(addr: Addr) -> String {
        format!("thread_0x{:x}", addr)
    }

    /// 保存コンテキストからPCを復元する（0 = 不明）
    pub fn saved_pc(&self, host: &dyn TargetHost) -> Addr {
        self.saved_regs
            .as_ref()
            .map(|regs| self.arch.saved_pc(host, regs))
            .unwrap_or(0)
    }

    /// 保存コンテキストからSPを復元する（0 = 不明）
    pub fn saved_sp(&self) -> Addr {
        self.saved_regs
            .as_ref()
            .map(|regs| self.arch.saved_sp(regs))
            .unwrap_or(0)
    }
}

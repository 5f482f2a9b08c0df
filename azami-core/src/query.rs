//! 構造化クエリ結果
//!
//! アダプタ層（MIやCLIなど）へ返すフィールド集合です。ワイヤエンコードは
//! アダプタ側の責務なので、ここではプレーンな構造体に留めます。

use azami_rtos::{Frame, RtosThread, SessionId};

/// スレッド一覧の1行ぶんの要約
#[derive(Debug, Clone)]
pub struct ThreadSummary {
    pub id: SessionId,
    pub name: String,
    pub prio: i8,
    pub state: u8,
    /// ホストが表示用に選択中のスレッドか
    pub selected: bool,
    /// CPU上で物理的に実行中のスレッドか
    pub hw_active: bool,
    /// 最後に判明した実行位置
    pub location: String,
}

impl ThreadSummary {
    pub(crate) fn from_thread(thread: &RtosThread, selected: Option<SessionId>) -> Self {
        Self {
            id: thread.session_id,
            name: thread.name.clone(),
            prio: thread.prio,
            state: thread.state,
            selected: selected == Some(thread.session_id),
            hw_active: thread.hw_active,
            location: thread.location.clone(),
        }
    }
}

/// thread-info クエリの1スレッドぶんのレコード
#[derive(Debug, Clone)]
pub struct ThreadInfoRecord {
    pub id: SessionId,
    /// 表示用のターゲットID文字列
    pub target_id: String,
    pub name: String,
    /// 停止中のターゲットに対するクエリなので常に "stopped"
    pub state: &'static str,
    /// レベル0フレーム
    pub frame: Frame,
}

/// thread-info クエリの結果
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub threads: Vec<ThreadInfoRecord>,
    /// 実行中スレッドのID（不明なら選択中スレッドへフォールバック）
    pub current_thread_id: Option<SessionId>,
}

/// list-ids クエリの結果
#[derive(Debug, Clone)]
pub struct ThreadIdList {
    pub thread_ids: Vec<SessionId>,
    pub current_thread_id: Option<SessionId>,
    pub number_of_threads: usize,
}

/// select クエリの結果
#[derive(Debug, Clone)]
pub struct ThreadSelection {
    pub new_thread_id: SessionId,
    /// 選択したスレッドのレベル0フレーム
    pub frame: Frame,
}

/// ターゲットID文字列を構築する
pub(crate) fn target_id(id: SessionId, name: &str) -> String {
    format!("azami thread {} ({})", id, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_id_format() {
        assert_eq!(target_id(3, "worker"), "azami thread 3 (worker)");
    }
}

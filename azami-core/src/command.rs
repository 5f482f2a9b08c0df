//! REPLコマンド

use azami_rtos::{DiscoveryMode, SessionId};

/// REPLコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// スレッド一覧表示
    Threads,
    /// 現在のスレッド表示、またはIDで選択
    Thread(Option<SessionId>),
    /// 指定スレッドのバックトレース表示（レベル範囲は省略可能）
    Backtrace {
        id: SessionId,
        low: Option<u32>,
        high: Option<u32>,
    },
    /// 構造化 thread-info 表示
    ThreadInfo(Option<SessionId>),
    /// 構造化 list-ids 表示
    ListIds,
    /// 発見モードの表示または変更
    Discovery(Option<DiscoveryMode>),
    /// スレッドリストを明示的にリフレッシュ
    Refresh,
    /// ターゲット停止イベントを注入
    Stop,
    /// ターゲット再開イベントを注入
    Continue,
    /// ターゲット終了イベントを注入
    ExitEvent,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.trim().split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        match parts[0] {
            "threads" => Some(Command::Threads),
            "info" if parts.get(1) == Some(&"threads") => Some(Command::Threads),
            "thread" | "t" => match parts.get(1) {
                Some(arg) => arg.parse().ok().map(|id| Command::Thread(Some(id))),
                None => Some(Command::Thread(None)),
            },
            "backtrace" | "bt" => {
                let id = parts.get(1)?.parse().ok()?;
                let low = match parts.get(2) {
                    Some(arg) => Some(arg.parse().ok()?),
                    None => None,
                };
                let high = match parts.get(3) {
                    Some(arg) => Some(arg.parse().ok()?),
                    None => None,
                };
                Some(Command::Backtrace { id, low, high })
            }
            "thread-info" | "ti" => match parts.get(1) {
                Some(arg) => arg.parse().ok().map(|id| Command::ThreadInfo(Some(id))),
                None => Some(Command::ThreadInfo(None)),
            },
            "ids" | "list-ids" => Some(Command::ListIds),
            "discovery" => match parts.get(1) {
                Some(arg) => arg.parse().ok().map(|mode| Command::Discovery(Some(mode))),
                None => Some(Command::Discovery(None)),
            },
            "refresh" => Some(Command::Refresh),
            "stop" => Some(Command::Stop),
            "continue" | "c" => Some(Command::Continue),
            "exit-event" => Some(Command::ExitEvent),
            "help" | "h" => Some(Command::Help),
            "quit" | "exit" | "q" => Some(Command::Quit),
            _ => None,
        }
    }
}

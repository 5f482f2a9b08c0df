//! エンジンのエラー型
//!
//! パイプラインレベルの失敗だけをエラーとして表現します。スレッド単位の
//! 読み取り失敗はそのスレッドのフィールドをデフォルト値へ劣化させるだけで、
//! 列挙サイクル全体を中断しません。未知のアーキテクチャは警告つきで
//! デフォルトプロファイルへ劣化し、トラバーサル上限到達は打ち切りであって
//! 失敗ではありません。

use crate::thread::SessionId;
use thiserror::Error;

/// エンジンのエラー
#[derive(Debug, Error)]
pub enum EngineError {
    /// オフセットが未解決、または symbols モード強制時にシンボルが存在しない
    #[error("offset discovery failed: {0}")]
    Configuration(String),

    /// カーネルアンカー・スレッドリスト・レジスタなどターゲット側が読めない
    #[error("target unavailable: {0}")]
    TargetUnavailable(String),

    /// 指定されたセッションIDのスレッドが存在しない
    #[error("thread id {0} not known")]
    UnknownThread(SessionId),
}

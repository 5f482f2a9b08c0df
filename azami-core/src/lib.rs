//! Azami デバッグセッションのコア機能
//!
//! このクレートは、エンジン（azami-rtos）とホスト能力（azami-host）を束ねた
//! 明示的なセッションオブジェクトと、アダプタ層が消費する構造化クエリ結果・
//! テキスト整形を提供します。

pub mod command;
pub mod fmt;
pub mod query;
pub mod session;

pub use command::Command;
pub use query::{ThreadIdList, ThreadInfo, ThreadInfoRecord, ThreadSelection, ThreadSummary};
pub use session::{Session, DISCOVERY_MODE_ENV};

// 他のクレートから使用するために再エクスポート
pub use azami_host::{FrameWalker, TargetHost};
pub use azami_rtos::{DiscoveryMode, Frame, RtosThread, SessionId};

/// セッションの結果型
pub type Result<T> = anyhow::Result<T>;

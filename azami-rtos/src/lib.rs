//! Azami RTOSスレッド認識エンジン
//!
//! このクレートは、停止中のターゲットからカーネルのスレッドリストを発見し、
//! セッションローカルなIDを割り当て、各スレッドの実行位置を復元し、
//! 保存レジスタコンテキストの一時差し替えによって非実行スレッドの
//! スタックを巻き戻すためのコア機能を提供します。

pub mod arch;
pub mod context;
pub mod error;
pub mod kernel;
pub mod offsets;
pub mod registry;
pub mod thread;
pub mod unwind;

pub use arch::{ArchProfile, CORTEX_M_SYSTEM_REGION};
pub use context::{ContextSwitcher, HwRegisterSnapshot, RegisterGuard};
pub use error::EngineError;
pub use kernel::{KernelAnchor, KernelView, ThreadSample, KERNEL_ANCHOR_SYMBOL};
pub use offsets::{DiscoveryMode, ExportedOffsets, OffsetTable};
pub use registry::{RefreshOutcome, ThreadRegistry, MAX_TRAVERSED_THREADS};
pub use thread::{RtosThread, SessionId};
pub use unwind::{top_frame, unwind_thread, Frame};

/// エンジンの結果型
pub type Result<T> = std::result::Result<T, EngineError>;

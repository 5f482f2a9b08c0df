//! Azami ホスト機能レイヤ
//!
//! このクレートは、エンジンが消費するホスト（デバッガ本体）側の能力を
//! トレイトとして定義します。ターゲットメモリ・レジスタ・シンボルへの
//! アクセス、型付きフィールドアクセス、ライブレジスタ上のフレームウォークを
//! 提供します。テスト用のシミュレートターゲットも含みます。

pub mod host;
pub mod sim;
pub mod value;

pub use host::{Addr, FrameWalker, HostFrame, SourceLoc, TargetHost};
pub use sim::{SimFrame, SimTarget};
pub use value::{Value, ValueRecord};

/// ホスト機能の結果型
pub type Result<T> = anyhow::Result<T>;

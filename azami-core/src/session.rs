//! デバッグセッション
//!
//! かつてモジュール変数に散らばりがちな状態（レジストリ・解決済みオフセット・
//! 発見モード・レジスタスナップショット・選択中スレッド）を、ひとつの明示的な
//! セッションオブジェクトへ集約します。ライフサイクルはターゲットの
//! 停止／再開／終了イベントで駆動されます。

use std::str::FromStr;

use azami_host::{FrameWalker, TargetHost};
use azami_rtos::{
    offsets, unwind, ArchProfile, ContextSwitcher, DiscoveryMode, EngineError, Frame, KernelView,
    OffsetTable, RefreshOutcome, RtosThread, SessionId, ThreadRegistry,
};
use tracing::{debug, info, warn};

use crate::query::{
    self, ThreadIdList, ThreadInfo, ThreadInfoRecord, ThreadSelection, ThreadSummary,
};
use crate::Result;

/// 発見モードの初期値を与える環境変数名
pub const DISCOVERY_MODE_ENV: &str = "AZAMI_DISCOVERY_MODE";

/// デバッグセッション
///
/// ホストを排他的に所有し、すべての操作はこのオブジェクト経由で行います。
pub struct Session<H: TargetHost + FrameWalker> {
    host: H,
    mode: DiscoveryMode,
    offsets: Option<OffsetTable>,
    arch: ArchProfile,
    registry: ThreadRegistry,
    switcher: ContextSwitcher,
    selected: Option<SessionId>,
}

impl<H: TargetHost + FrameWalker> Session<H> {
    /// セッションを作成する
    ///
    /// 発見モードは環境変数 `AZAMI_DISCOVERY_MODE` から読み、
    /// 無効な値は警告のうえ auto になります。
    pub fn new(host: H) -> Self {
        let mode = match std::env::var(DISCOVERY_MODE_ENV) {
            Ok(raw) => match DiscoveryMode::from_str(&raw) {
                Ok(mode) => mode,
                Err(e) => {
                    warn!(error = %e, "ignoring invalid {}", DISCOVERY_MODE_ENV);
                    DiscoveryMode::Auto
                }
            },
            Err(_) => DiscoveryMode::Auto,
        };
        Self::with_mode(host, mode)
    }

    /// 発見モードを指定してセッションを作成する
    pub fn with_mode(host: H, mode: DiscoveryMode) -> Self {
        // アーキテクチャ検出はセッション中に一度だけ
        let arch = ArchProfile::detect(host.arch_description().as_deref());
        info!(arch = arch.name(), mode = %mode, "session created");
        Self {
            host,
            mode,
            offsets: None,
            arch,
            registry: ThreadRegistry::new(),
            switcher: ContextSwitcher::new(),
            selected: None,
        }
    }

    /// ホストへの参照を取得する
    pub fn host(&self) -> &H {
        &self.host
    }

    /// 検出されたアーキテクチャプロファイル
    pub fn arch(&self) -> ArchProfile {
        self.arch
    }

    /// 現在の発見モード
    pub fn discovery_mode(&self) -> DiscoveryMode {
        self.mode
    }

    /// 解決済みのオフセット表（未解決なら None）
    pub fn offset_table(&self) -> Option<OffsetTable> {
        self.offsets
    }

    /// 発見モードを変更し、オフセット表をその場で再解決する
    ///
    /// ユーザー起点の操作なので、解決の失敗はそのまま返します。失敗しても
    /// モード自体は変更されたままで、オフセット表は未解決（次の解決で
    /// リトライ）になります。
    pub fn set_discovery_mode(&mut self, mode: DiscoveryMode) -> Result<OffsetTable> {
        if mode != self.mode {
            info!(from = %self.mode, to = %mode, "discovery mode changed");
        }
        self.mode = mode;
        self.offsets = None;
        self.resolve_offsets()
    }

    /// 現在のモードでオフセット表を解決し、キャッシュする
    ///
    /// 解決済みならキャッシュをそのまま返します。何度でも呼び出せます。
    pub fn resolve_offsets(&mut self) -> Result<OffsetTable> {
        self.ensure_offsets()
    }

    fn ensure_offsets(&mut self) -> Result<OffsetTable> {
        if let Some(table) = self.offsets {
            return Ok(table);
        }
        let table = offsets::resolve(self.mode, &self.host)?;
        match table {
            OffsetTable::Exported(off) => {
                info!(version = ?off.version, "resolved offsets from exported table")
            }
            OffsetTable::FieldAccess => info!("resolved offsets: named field access"),
        }
        self.offsets = Some(table);
        Ok(table)
    }

    /// スレッドリストをリフレッシュする
    ///
    /// 必要ならオフセット表を先に解決します。失敗時は前回のスナップショットが
    /// そのまま残ります。
    pub fn refresh_threads(&mut self) -> Result<RefreshOutcome> {
        let table = self.ensure_offsets()?;
        let view = KernelView::new(&self.host, table);
        let outcome = self
            .registry
            .refresh(&self.host, &view, &self.host, self.arch)?;
        // 消えたスレッドの選択は外す
        if let Some(id) = self.selected {
            if self.registry.get(id).is_none() {
                debug!(id, "selected thread departed");
                self.selected = None;
            }
        }
        Ok(outcome)
    }

    /// レジストリが空ならリフレッシュを試みる（静かに失敗する）
    fn ensure_threads(&mut self) {
        if self.registry.is_empty() {
            if let Err(e) = self.refresh_threads() {
                debug!(error = %e, "thread refresh skipped");
            }
        }
    }

    /// ターゲット停止イベント
    ///
    /// 差し替え中のレジスタを無条件に復元してから、スレッドリストを
    /// リフレッシュします。リフレッシュの失敗はセッションを止めません。
    pub fn on_stop(&mut self) {
        if let Err(e) = self.switcher.restore(&self.host) {
            warn!(error = %e, "failed to restore hardware registers on stop");
        }
        match self.refresh_threads() {
            Ok(outcome) => {
                if outcome.truncated {
                    warn!("thread list was truncated at the traversal safety cap");
                }
            }
            Err(e) => debug!(error = %e, "thread refresh on stop failed"),
        }
    }

    /// ターゲット再開イベント
    ///
    /// 何もしません。差し替えたレジスタの後始末は次の停止イベントが
    /// 無条件に行います。
    pub fn on_continue(&mut self) {}

    /// ターゲット終了イベント
    ///
    /// レジスタには触れず、セッション状態を初期化します。IDカウンタも
    /// 初期値へ戻ります。
    pub fn on_exit(&mut self) {
        self.switcher.reset();
        self.registry.clear();
        self.offsets = None;
        self.selected = None;
        info!("target exited, session state cleared");
    }

    /// 現在のスナップショットを取得する
    pub fn threads(&self) -> &[RtosThread] {
        self.registry.threads()
    }

    /// セッションIDでスレッドを取得する
    pub fn thread(&self, id: SessionId) -> Result<&RtosThread> {
        self.registry
            .get(id)
            .ok_or_else(|| EngineError::UnknownThread(id).into())
    }

    /// 選択中スレッドのID
    pub fn selected_thread(&self) -> Option<SessionId> {
        self.selected
    }

    /// 実行中スレッドのID
    ///
    /// CPU上で物理的に実行中のスレッドを優先し、不明なら選択中スレッドへ
    /// フォールバックします。
    pub fn current_thread_id(&self) -> Option<SessionId> {
        self.registry
            .hw_active()
            .map(|t| t.session_id)
            .or(self.selected)
    }

    /// スレッドを選択し、コンテキストを切り替える
    ///
    /// サスペンド中スレッドを選べばそのスレッドの保存SP/PCがライブレジスタへ
    /// 書き込まれ、以後のネイティブなスタック操作が正しいコンテキストで
    /// 動作します。
    pub fn select_thread(&mut self, id: SessionId) -> Result<ThreadSelection> {
        self.ensure_threads();
        let thread = self
            .registry
            .get(id)
            .ok_or(EngineError::UnknownThread(id))?;
        self.switcher.switch_to(&self.host, thread)?;
        self.selected = Some(id);
        Ok(ThreadSelection {
            new_thread_id: id,
            frame: unwind::top_frame(&self.host, &self.host, thread),
        })
    }

    /// スレッド一覧の要約を取得する
    pub fn thread_summaries(&self) -> Vec<ThreadSummary> {
        self.registry
            .threads()
            .iter()
            .map(|t| ThreadSummary::from_thread(t, self.selected))
            .collect()
    }

    /// 構造化 thread-info クエリ
    ///
    /// `filter` を与えるとそのスレッドだけに絞り込みます（未知のIDは
    /// 空の一覧になります）。各レコードのフレームはレジスタを差し替えずに
    /// 構築されます。
    pub fn thread_info(&mut self, filter: Option<SessionId>) -> ThreadInfo {
        self.ensure_threads();
        let threads = self
            .registry
            .threads()
            .iter()
            .filter(|t| filter.map_or(true, |id| t.session_id == id))
            .map(|t| ThreadInfoRecord {
                id: t.session_id,
                target_id: query::target_id(t.session_id, &t.name),
                name: t.name.clone(),
                state: "stopped",
                frame: unwind::top_frame(&self.host, &self.host, t),
            })
            .collect();
        ThreadInfo {
            threads,
            current_thread_id: self.current_thread_id(),
        }
    }

    /// 構造化 list-ids クエリ
    pub fn thread_ids(&mut self) -> ThreadIdList {
        self.ensure_threads();
        let thread_ids: Vec<SessionId> = self
            .registry
            .threads()
            .iter()
            .map(|t| t.session_id)
            .collect();
        ThreadIdList {
            number_of_threads: thread_ids.len(),
            thread_ids,
            current_thread_id: self.current_thread_id(),
        }
    }

    /// 指定スレッドのコールフレーム列を取得する
    ///
    /// `low`/`high` は実体化するフレームレベルの範囲（両端含む）です。
    /// サスペンド中スレッドでは一時的なレジスタ差し替えが発生しますが、
    /// 戻るときには必ず元のライブレジスタへ復元されています。
    pub fn stack_frames(
        &mut self,
        id: SessionId,
        low: Option<u32>,
        high: Option<u32>,
    ) -> Result<Vec<Frame>> {
        self.ensure_threads();
        let thread = self
            .registry
            .get(id)
            .ok_or(EngineError::UnknownThread(id))?;
        Ok(unwind::unwind_thread(
            &self.host, &self.host, thread, low, high,
        ))
    }
}

//! スレッドレジストリと列挙
//!
//! カーネルのスレッドリストをリフレッシュサイクルごとに一度トラバースし、
//! 既知スレッドのスナップショットを再構築します。セッションIDは初回発見順に
//! 単調増加で割り当てられ、前回のスナップショットに存在した同一性は
//! 同じIDを保持します。サイクルの前提条件が満たされない場合は、直前の
//! スナップショットを無傷のまま安全に中断します（fail-soft）。

use std::collections::HashMap;

use azami_host::{Addr, FrameWalker, TargetHost};
use tracing::{debug, info, warn};

use crate::arch::ArchProfile;
use crate::kernel::KernelView;
use crate::thread::{RtosThread, SessionId};
use crate::Result;

/// 1サイクルで辿るノード数の安全上限
///
/// 破損した・終端しないリストでも有限時間で打ち切るための上限です。
pub const MAX_TRAVERSED_THREADS: usize = 100;

/// リフレッシュサイクルの結果
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    /// 今回初めて発見されたスレッドの (ID, 名前)
    pub discovered: Vec<(SessionId, String)>,
    /// 安全上限に達して打ち切られたか
    pub truncated: bool,
}

/// スレッドレジストリ
///
/// 既知スレッドの現在のスナップショットを保持し、セッションIDを
/// 割り当て・回収します。スナップショットはトラバーサル完了時に
/// まるごと置き換えられ、途中状態が見えることはありません。
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    threads: Vec<RtosThread>,
    next_session_id: SessionId,
}

impl ThreadRegistry {
    /// 空のレジストリを作成する
    pub fn new() -> Self {
        Self {
            threads: Vec::new(),
            next_session_id: 1,
        }
    }

    /// 現在のスナップショットを取得する（トラバーサル順）
    pub fn threads(&self) -> &[RtosThread] {
        &self.threads
    }

    /// セッションIDでスレッドを取得する
    pub fn get(&self, id: SessionId) -> Option<&RtosThread> {
        self.threads.iter().find(|t| t.session_id == id)
    }

    /// ハードウェア実行中のスレッドを取得する
    pub fn hw_active(&self) -> Option<&RtosThread> {
        self.threads.iter().find(|t| t.hw_active)
    }

    /// スレッド数を取得する
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// レジストリが空かどうか
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// 次に割り当てられるセッションID
    pub fn next_session_id(&self) -> SessionId {
        self.next_session_id
    }

    /// レジストリを空にし、IDカウンタを初期値へ戻す
    pub fn clear(&mut self) {
        self.threads.clear();
        self.next_session_id = 1;
    }

    /// スレッドリストをトラバースしてスナップショットを再構築する
    ///
    /// 前提条件（アンカーが読める・リスト先頭が非ヌル）を満たさない場合は
    /// 直前のスナップショットを保ったままエラーで中断します。スレッド単位の
    /// 読み取り失敗はそのスレッドのフィールドだけを劣化させます。
    pub fn refresh(
        &mut self,
        host: &dyn TargetHost,
        view: &KernelView<'_>,
        walker: &dyn FrameWalker,
        arch: ArchProfile,
    ) -> Result<RefreshOutcome> {
        let anchor = view.anchor()?;

        let mut assigned: HashMap<Addr, SessionId> = self
            .threads
            .iter()
            .map(|t| (t.addr, t.session_id))
            .collect();

        let mut visited: Vec<RtosThread> = Vec::new();
        let mut discovered: Vec<(SessionId, String)> = Vec::new();
        let mut truncated = false;
        let mut current = anchor.list_head;

        loop {
            if visited.len() >= MAX_TRAVERSED_THREADS {
                truncated = true;
                warn!(
                    cap = MAX_TRAVERSED_THREADS,
                    "thread list traversal reached safety cap, truncating"
                );
                break;
            }

            let sample = view.sample_thread(current);
            let name = sample
                .name
                .unwrap_or_else(|| RtosThread::default_name(current));

            // 既知の同一性（前回のスナップショット、または今回既に訪問済み）は
            // IDを保持する
            let session_id = match assigned.get(&current) {
                Some(&id) => id,
                None => {
                    let id = self.next_session_id;
                    self.next_session_id += 1;
                    assigned.insert(current, id);
                    discovered.push((id, name.clone()));
                    id
                }
            };

            visited.push(RtosThread {
                addr: current,
                session_id,
                name,
                prio: sample.prio.unwrap_or(0),
                state: sample.state.unwrap_or(0),
                saved_regs: sample.saved_regs,
                hw_active: false,
                location: "??".to_string(),
                arch,
            });

            match sample.next {
                // リンクが読めない、またはリスト終端
                None => {
                    debug!(
                        addr = format_args!("0x{:x}", current),
                        "next link unreadable, stopping traversal"
                    );
                    break;
                }
                Some(0) => break,
                // 先頭へ循環した
                Some(next) if next == anchor.list_head => break,
                Some(next) => current = next,
            }
        }

        // 完了したトラバーサルに対して実行中スレッドポインタを照合する
        if anchor.current != 0 {
            if let Some(thread) = visited.iter_mut().find(|t| t.addr == anchor.current) {
                thread.hw_active = true;
            }
        }

        for thread in visited.iter_mut() {
            thread.location = thread_location(host, walker, thread);
        }

        for (id, name) in &discovered {
            info!(id, name = %name, "new thread discovered");
        }

        // スナップショットをアトミックに置き換える
        self.threads = visited;
        Ok(RefreshOutcome {
            discovered,
            truncated,
        })
    }
}

/// スレッドの実行位置文字列を構築する
fn thread_location(
    host: &dyn TargetHost,
    walker: &dyn FrameWalker,
    thread: &RtosThread,
) -> String {
    if thread.hw_active {
        // 実行中スレッドは実CPU状態から
        match walker.innermost_frame() {
            Ok(Some(frame)) => format!(
                "0x{:x} in {}()",
                frame.pc,
                frame.function.as_deref().unwrap_or("??")
            ),
            _ => "??".to_string(),
        }
    } else {
        // 非実行スレッドは保存コンテキストから復元
        let pc = thread.saved_pc(host);
        if pc == 0 {
            return "??".to_string();
        }
        format!(
            "0x{:x} in {}()",
            pc,
            host.function_at(pc).as_deref().unwrap_or("??")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KERNEL_ANCHOR_SYMBOL;
    use crate::offsets::OffsetTable;
    use azami_host::{SimTarget, Value, ValueRecord};

    const THREAD_BASE: Addr = 0x3000;

    fn thread_addr(i: usize) -> Addr {
        THREAD_BASE + i as Addr * 0x100
    }

    fn thread_record(name: &str, next: Addr, ra: u64, sp: u64) -> Value {
        let mut rec = ValueRecord::new()
            .with_field("name", Value::Str(name.to_string()))
            .with_field(
                "base",
                Value::Record(
                    ValueRecord::new()
                        .with_field("thread_state", Value::Scalar(4))
                        .with_field("prio", Value::Scalar(7)),
                ),
            )
            .with_field("next_thread", Value::Scalar(next));
        let mut saved = ValueRecord::new();
        if ra != 0 {
            saved.insert("ra", Value::Scalar(ra));
        }
        if sp != 0 {
            saved.insert("sp", Value::Scalar(sp));
        }
        rec.insert("callee_saved", Value::Record(saved));
        Value::Record(rec)
    }

    /// n個のスレッドを持つフィールドアクセス型ターゲットを構築する
    ///
    /// `cycle_to_head` が真なら末尾の next はリスト先頭を指す。
    fn linked_target(n: usize, cycle_to_head: bool, current: Addr) -> SimTarget {
        let mut sim = SimTarget::new();
        sim.set_arch_description("riscv:rv32");
        sim.set_register("sp", 0x2000_0000);
        sim.set_register("pc", 0x0800_0100);

        let mut kernel = ValueRecord::new().with_field("threads", Value::Scalar(thread_addr(0)));
        if current != 0 {
            let cpu = Value::Record(ValueRecord::new().with_field("current", Value::Scalar(current)));
            kernel.insert("cpus", Value::Array(vec![cpu]));
        }
        sim.define_global(KERNEL_ANCHOR_SYMBOL, Value::Record(kernel));

        for i in 0..n {
            let next = if i + 1 < n {
                thread_addr(i + 1)
            } else if cycle_to_head {
                thread_addr(0)
            } else {
                0
            };
            sim.define_record_at(
                thread_addr(i),
                thread_record(
                    &format!("thread{}", i),
                    next,
                    0x0800_0200 + i as u64 * 0x10,
                    0x2000_1000 + i as u64 * 0x100,
                ),
            );
        }
        sim
    }

    fn refresh(sim: &SimTarget, registry: &mut ThreadRegistry) -> Result<RefreshOutcome> {
        let view = KernelView::new(sim, OffsetTable::FieldAccess);
        registry.refresh(sim, &view, sim, ArchProfile::RiscV)
    }

    #[test]
    fn test_ids_assigned_in_first_seen_order() {
        let sim = linked_target(3, false, thread_addr(0));
        let mut registry = ThreadRegistry::new();
        let outcome = refresh(&sim, &mut registry).unwrap();

        assert_eq!(registry.len(), 3);
        let ids: Vec<_> = registry.threads().iter().map(|t| t.session_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(outcome.discovered.len(), 3);
        assert_eq!(outcome.discovered[0].1, "thread0");
        assert!(!outcome.truncated);
    }

    #[test]
    fn test_unchanged_target_reuses_ids_and_reports_nothing() {
        let sim = linked_target(3, false, thread_addr(0));
        let mut registry = ThreadRegistry::new();
        refresh(&sim, &mut registry).unwrap();
        let before: Vec<_> = registry.threads().iter().map(|t| t.session_id).collect();

        let outcome = refresh(&sim, &mut registry).unwrap();
        let after: Vec<_> = registry.threads().iter().map(|t| t.session_id).collect();
        assert_eq!(before, after);
        assert!(outcome.discovered.is_empty());
        assert_eq!(registry.next_session_id(), 4);
    }

    #[test]
    fn test_departed_thread_dropped_and_id_not_reused() {
        let mut sim = linked_target(3, false, thread_addr(0));
        let mut registry = ThreadRegistry::new();
        refresh(&sim, &mut registry).unwrap();

        // thread1 が消えたリストに差し替える
        sim.define_record_at(
            thread_addr(0),
            thread_record("thread0", thread_addr(2), 0x0800_0200, 0x2000_1000),
        );
        refresh(&sim, &mut registry).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get(2).is_none());

        // 新しいスレッドが現れたら次のカウンタ値を得る
        sim.define_record_at(
            thread_addr(2),
            thread_record("thread2", thread_addr(3), 0x0800_0220, 0x2000_1200),
        );
        sim.define_record_at(
            thread_addr(3),
            thread_record("late", 0, 0x0800_0230, 0x2000_1300),
        );
        let outcome = refresh(&sim, &mut registry).unwrap();
        assert_eq!(outcome.discovered, vec![(4, "late".to_string())]);
    }

    #[test]
    fn test_cyclic_list_stops_at_head_without_cap() {
        let sim = linked_target(5, true, 0);
        let mut registry = ThreadRegistry::new();
        let outcome = refresh(&sim, &mut registry).unwrap();
        assert_eq!(registry.len(), 5);
        assert!(!outcome.truncated);
    }

    #[test]
    fn test_self_looping_node_hits_safety_cap() {
        let mut sim = linked_target(1, false, 0);
        // 自分自身を指す next: 先頭へは戻らないので上限で打ち切られる
        sim.define_record_at(
            thread_addr(0),
            thread_record("looper", thread_addr(0), 0, 0),
        );
        // ただし next == list_head なので即停止するはず。先頭以外での自己ループを作る
        sim.define_record_at(
            thread_addr(0),
            thread_record("head", thread_addr(1), 0, 0),
        );
        sim.define_record_at(
            thread_addr(1),
            thread_record("looper", thread_addr(1), 0, 0),
        );
        let mut registry = ThreadRegistry::new();
        let outcome = refresh(&sim, &mut registry).unwrap();
        assert!(outcome.truncated);
        assert_eq!(registry.len(), MAX_TRAVERSED_THREADS);
    }

    #[test]
    fn test_at_most_one_hw_active() {
        let sim = linked_target(3, false, thread_addr(1));
        let mut registry = ThreadRegistry::new();
        refresh(&sim, &mut registry).unwrap();

        let active: Vec<_> = registry.threads().iter().filter(|t| t.hw_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, 2);
        assert_eq!(registry.hw_active().unwrap().name, "thread1");
    }

    #[test]
    fn test_unresolved_current_means_no_hw_active() {
        let sim = linked_target(3, false, 0);
        let mut registry = ThreadRegistry::new();
        refresh(&sim, &mut registry).unwrap();
        assert!(registry.hw_active().is_none());
    }

    #[test]
    fn test_failed_cycle_preserves_previous_snapshot() {
        let sim = linked_target(2, false, thread_addr(0));
        let mut registry = ThreadRegistry::new();
        refresh(&sim, &mut registry).unwrap();
        assert_eq!(registry.len(), 2);

        // アンカーの無いターゲットではサイクルが中断され、前回の状態が残る
        let empty = SimTarget::new();
        let view = KernelView::new(&empty, OffsetTable::FieldAccess);
        let result = registry.refresh(&empty, &view, &empty, ArchProfile::RiscV);
        assert!(result.is_err());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.next_session_id(), 3);
    }

    #[test]
    fn test_per_thread_degradation_does_not_abort() {
        let mut sim = linked_target(3, false, 0);
        // thread1 のレコードを消す: リンクも読めなくなり、そこで停止する
        sim.remove_record_at(thread_addr(1));
        let mut registry = ThreadRegistry::new();
        refresh(&sim, &mut registry).unwrap();

        assert_eq!(registry.len(), 2);
        let degraded = registry.get(2).unwrap();
        assert_eq!(degraded.name, RtosThread::default_name(thread_addr(1)));
        assert_eq!(degraded.state, 0);
        assert_eq!(degraded.prio, 0);
        assert!(degraded.saved_regs.is_none());
        assert_eq!(degraded.location, "??");
    }

    #[test]
    fn test_clear_resets_id_counter() {
        let sim = linked_target(2, false, 0);
        let mut registry = ThreadRegistry::new();
        refresh(&sim, &mut registry).unwrap();
        assert_eq!(registry.next_session_id(), 3);

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.next_session_id(), 1);

        let outcome = refresh(&sim, &mut registry).unwrap();
        assert_eq!(outcome.discovered[0].0, 1);
    }

    #[test]
    fn test_location_strings() {
        let mut sim = linked_target(2, false, thread_addr(0));
        sim.define_function(0x0800_0100, 0x0800_0180, "main_loop");
        sim.define_function(0x0800_0210, 0x0800_0280, "k_sleep");
        // thread1 の保存PC (ra=0x0800_0210) が k_sleep に入るようにする
        sim.define_record_at(
            thread_addr(1),
            thread_record("thread1", 0, 0x0800_0210, 0x2000_2000),
        );
        let mut registry = ThreadRegistry::new();
        refresh(&sim, &mut registry).unwrap();

        let active = registry.get(1).unwrap();
        assert_eq!(active.location, "0x8000100 in main_loop()");
        let suspended = registry.get(2).unwrap();
        assert_eq!(suspended.location, "0x8000210 in k_sleep()");
    }
}

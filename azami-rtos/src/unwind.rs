//! フレームアンウィンダ
//!
//! スレッドのコールフレーム列を構築します。ハードウェア実行中スレッドは
//! ライブのフレームチェーンをそのまま辿り、サスペンド中スレッドは
//! `RegisterGuard` によるスコープ付きコンテキスト差し替えの下で同じ
//! チェーンを辿ります。差し替えたレジスタは、ウォークが失敗しても
//! 必ず元へ戻されます。

use azami_host::{Addr, FrameWalker, HostFrame, TargetHost};
use tracing::debug;

use crate::arch::ArchProfile;
use crate::context::RegisterGuard;
use crate::thread::RtosThread;

/// コールフレーム
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// フレームレベル（0 = 最内）
    pub level: u32,
    /// フレームのアドレス
    pub addr: Addr,
    /// 関数名（不明なら None）
    pub function: Option<String>,
    /// ソースファイル名
    pub file: Option<String>,
    /// 正規化されたフルパス
    pub fullname: Option<String>,
    /// 行番号
    pub line: Option<u32>,
    /// フレームのアーキテクチャ名
    pub arch: Option<String>,
}

/// スレッドのコールフレーム列を構築する
///
/// 有限で再開不能な列を毎回計算し直します。`low`/`high` は実体化される
/// レベルの範囲（両端含む）を絞り込みます。サスペンド中スレッドの
/// アンウィンドが1フレームも生まなかった場合、要求範囲にレベル0が
/// 含まれていれば保存PCから合成した1フレームを返します。
pub fn unwind_thread(
    host: &dyn TargetHost,
    walker: &dyn FrameWalker,
    thread: &RtosThread,
    low: Option<u32>,
    high: Option<u32>,
) -> Vec<Frame> {
    if thread.hw_active {
        return walk_live(walker, thread.arch, low, high);
    }

    // サスペンド中スレッド: 保存コンテキストへ差し替えてライブチェーンを辿る
    let pc = thread.saved_pc(host);
    let sp = thread.saved_sp();
    let mut frames = Vec::new();
    if pc != 0 && sp != 0 {
        match RegisterGuard::swap(host, sp, pc) {
            Ok(_guard) => {
                frames = walk_live(walker, thread.arch, low, high);
            }
            Err(e) => {
                debug!(id = thread.session_id, error = %e, "context swap for unwind failed");
            }
        }
    }

    // 合成フレームへのフォールバック（要求範囲にレベル0が含まれる場合のみ）
    if frames.is_empty() && low.unwrap_or(0) == 0 {
        frames.push(synthetic_frame(host, thread, pc));
    }
    frames
}

/// スレッド情報表示用のレベル0フレームを構築する
///
/// サスペンド中スレッドではレジスタ差し替えを行わず、保存PCからの
/// 合成フレームを返します。
pub fn top_frame(host: &dyn TargetHost, walker: &dyn FrameWalker, thread: &RtosThread) -> Frame {
    if thread.hw_active {
        if let Ok(Some(live)) = walker.innermost_frame() {
            return from_host_frame(&live, 0);
        }
    }
    let pc = thread.saved_pc(host);
    synthetic_frame(host, thread, pc)
}

/// ライブレジスタが指すフレームチェーンを辿る
fn walk_live(
    walker: &dyn FrameWalker,
    arch: ArchProfile,
    low: Option<u32>,
    high: Option<u32>,
) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut level: u32 = 0;
    let mut current = match walker.innermost_frame() {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "frame walk could not start");
            None
        }
    };

    while let Some(frame) = current {
        // 候補アドレスの妥当性チェックで打ち切る
        if !arch.is_plausible_code_addr(frame.pc) {
            break;
        }
        if let Some(high) = high {
            if level > high {
                break;
            }
        }
        if low.map_or(true, |l| level >= l) {
            frames.push(from_host_frame(&frame, level));
        }
        level += 1;
        current = match walker.older_frame(&frame) {
            Ok(older) => older,
            Err(_) => None,
        };
    }
    frames
}

/// 保存PCと関数名のベストエフォート解決による合成フレーム
fn synthetic_frame(host: &dyn TargetHost, thread: &RtosThread, pc: Addr) -> Frame {
    let source = host.source_at(pc);
    Frame {
        level: 0,
        addr: pc,
        function: host.function_at(pc),
        file: source.as_ref().map(|s| s.file.clone()),
        fullname: source.as_ref().map(|s| s.fullname.clone()),
        line: source.as_ref().map(|s| s.line),
        arch: None,
    }
}

fn from_host_frame(frame: &HostFrame, level: u32) -> Frame {
    Frame {
        level,
        addr: frame.pc,
        function: frame.function.clone(),
        file: frame.source.as_ref().map(|s| s.file.clone()),
        fullname: frame.source.as_ref().map(|s| s.fullname.clone()),
        line: frame.source.as_ref().map(|s| s.line),
        arch: frame.arch.clone(),
    }
}

//! デモターゲット
//!
//! Cortex-M4上で3スレッド（実行中の main、k_sleep中の shell、アイドルの
//! idle）が停止した瞬間を模したシミュレートターゲットを構築します。
//! エクスポートされたオフセット表・生のカーネルメモリ・型付きレコードを
//! すべて備えているため、どの発見モードでも同じスレッドが見えます。

use azami_host::{SimFrame, SimTarget, Value, ValueRecord};

const KERNEL_ADDR: u64 = 0x2000_0100;
const OFFSET_TABLE_ADDR: u64 = 0x0802_0000;
const OFFSET_COUNT_ADDR: u64 = 0x0802_0040;

const MAIN_THREAD: u64 = 0x2000_1000;
const SHELL_THREAD: u64 = 0x2000_1200;
const IDLE_THREAD: u64 = 0x2000_1400;

const LIVE_SP: u64 = 0x2000_7F00;
const LIVE_PC: u64 = 0x0800_1234;
const SHELL_PSP: u64 = 0x2000_5000;
const SHELL_PC: u64 = 0x0800_2000;
const IDLE_PSP: u64 = 0x2000_6000;
const IDLE_PC: u64 = 0x0800_3000;

/// スレッド制御構造を生メモリと型付きレコードの両方で配置する
fn place_thread(sim: &mut SimTarget, addr: u64, next: u64, state: u8, prio: u8, name: &str, psp: u64) {
    sim.write_u32_at(addr, next as u32);
    sim.write_bytes(addr + 4, &[state]);
    sim.write_bytes(addr + 5, &[prio]);
    let mut buf = [0u8; 32];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    sim.write_bytes(addr + 8, &buf);

    let mut saved = ValueRecord::new();
    if psp != 0 {
        saved.insert("psp", Value::Scalar(psp));
    }
    sim.define_record_at(
        addr,
        Value::Record(
            ValueRecord::new()
                .with_field("name", Value::Str(name.to_string()))
                .with_field(
                    "base",
                    Value::Record(
                        ValueRecord::new()
                            .with_field("thread_state", Value::Scalar(state as u64))
                            .with_field("prio", Value::Scalar(prio as u64)),
                    ),
                )
                .with_field("next_thread", Value::Scalar(next))
                .with_field("callee_saved", Value::Record(saved)),
        ),
    );
}

/// デモターゲットを構築する
pub fn build_demo_target() -> SimTarget {
    let mut sim = SimTarget::new();
    sim.set_arch_description("armv7e-m (cortex-m4)");
    sim.set_register("sp", LIVE_SP);
    sim.set_register("pc", LIVE_PC);

    // エクスポートされたオフセット表
    // [version, k_curr_thread, k_threads, t_entry, t_next_thread, t_state,
    //  t_user_options, t_prio, t_stack_pointer, t_name, ...]
    let entries: [u32; 13] = [1, 0, 4, 0, 0, 4, 0, 5, 0, 8, 0, 0, 0];
    sim.define_symbol("_kernel_thread_info_offsets", OFFSET_TABLE_ADDR);
    for (i, &v) in entries.iter().enumerate() {
        sim.write_u32_at(OFFSET_TABLE_ADDR + 4 * i as u64, v);
    }
    sim.define_symbol("_kernel_thread_info_num_offsets", OFFSET_COUNT_ADDR);
    sim.write_u32_at(OFFSET_COUNT_ADDR, 13);

    // カーネルアンカー
    sim.define_symbol("_kernel", KERNEL_ADDR);
    sim.write_u32_at(KERNEL_ADDR, MAIN_THREAD as u32); // current
    sim.write_u32_at(KERNEL_ADDR + 4, MAIN_THREAD as u32); // list head
    let cpu = Value::Record(ValueRecord::new().with_field("current", Value::Scalar(MAIN_THREAD)));
    sim.define_global(
        "_kernel",
        Value::Record(
            ValueRecord::new()
                .with_field("threads", Value::Scalar(MAIN_THREAD))
                .with_field("cpus", Value::Array(vec![cpu])),
        ),
    );

    // スレッドリスト: main -> shell -> idle
    place_thread(&mut sim, MAIN_THREAD, SHELL_THREAD, 0, 0, "main", 0);
    place_thread(&mut sim, SHELL_THREAD, IDLE_THREAD, 4, 14, "shell", SHELL_PSP);
    place_thread(&mut sim, IDLE_THREAD, 0, 1, 15, "idle", IDLE_PSP);

    // Cortex-Mの例外フレーム: 戻りアドレスは保存PSP+24
    sim.write_u32_at(SHELL_PSP + 24, SHELL_PC as u32);
    sim.write_u32_at(IDLE_PSP + 24, IDLE_PC as u32);

    // フレームチェーン
    sim.define_frame_chain(
        LIVE_PC,
        vec![
            SimFrame::new(LIVE_PC, "main_loop").with_source("main.c", "/src/app/main.c", 87),
            SimFrame::new(0x0800_1200, "main"),
        ],
    );
    sim.define_frame_chain(
        SHELL_PC,
        vec![
            SimFrame::new(SHELL_PC, "k_sleep").with_source("sched.c", "/src/kernel/sched.c", 432),
            SimFrame::new(0x0800_2100, "shell_entry"),
            SimFrame::new(0x0800_2200, "z_thread_entry"),
        ],
    );
    sim.define_frame_chain(
        IDLE_PC,
        vec![
            SimFrame::new(IDLE_PC, "k_cpu_idle").with_source("idle.c", "/src/kernel/idle.c", 33),
            SimFrame::new(0x0800_3100, "idle_entry"),
        ],
    );

    // 関数範囲とソース位置（位置文字列と合成フレームの解決用）
    sim.define_function(0x0800_1200, 0x0800_1300, "main_loop");
    sim.define_function(SHELL_PC, SHELL_PC + 0x80, "k_sleep");
    sim.define_function(IDLE_PC, IDLE_PC + 0x40, "k_cpu_idle");
    sim.define_source(SHELL_PC, "sched.c", "/src/kernel/sched.c", 432);
    sim.define_source(IDLE_PC, "idle.c", "/src/kernel/idle.c", 33);

    sim
}

#[cfg(test)]
mod tests {
    use super::*;
    use azami_core::{DiscoveryMode, Session};

    #[test]
    fn test_demo_target_discovers_three_threads() {
        for mode in [
            DiscoveryMode::Auto,
            DiscoveryMode::Symbols,
            DiscoveryMode::Hardcoded,
        ] {
            let mut session = Session::with_mode(build_demo_target(), mode);
            session.refresh_threads().unwrap();
            let names: Vec<_> = session.threads().iter().map(|t| t.name.clone()).collect();
            assert_eq!(names, vec!["main", "shell", "idle"], "mode {}", mode);
            assert_eq!(session.current_thread_id(), Some(1));
        }
    }

    #[test]
    fn test_demo_shell_unwinds_through_exception_frame() {
        let mut session = Session::with_mode(build_demo_target(), DiscoveryMode::Auto);
        let frames = session.stack_frames(2, None, None).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].function.as_deref(), Some("k_sleep"));
        assert_eq!(frames[2].function.as_deref(), Some("z_thread_entry"));
    }
}

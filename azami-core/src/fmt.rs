//! テキスト整形
//!
//! CLIコマンドが印字するスレッド一覧・フレーム表記を組み立てます。

use std::fmt::Write;

use azami_rtos::Frame;

use crate::query::ThreadSummary;

/// スレッド一覧テーブルを整形する
pub fn render_thread_table(summaries: &[ThreadSummary]) -> String {
    if summaries.is_empty() {
        return "No threads.".to_string();
    }
    let mut out = String::from("  Id   Target Id            Prio State Frame\n");
    for t in summaries {
        let marker = if t.selected { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "{} {:<4} {:<20} {:>4} {:>5} {}",
            marker, t.id, t.name, t.prio, t.state, t.location
        );
    }
    // 末尾の改行は落とす
    out.pop();
    out
}

/// 1フレームを整形する
///
/// 例: `#0  0x08000200 in k_sleep () at kernel/sched.c:432`
pub fn render_frame(frame: &Frame) -> String {
    let mut out = format!(
        "#{}  0x{:08x} in {} ()",
        frame.level,
        frame.addr,
        frame.function.as_deref().unwrap_or("??")
    );
    if let (Some(file), Some(line)) = (frame.file.as_deref(), frame.line) {
        let _ = write!(out, " at {}:{}", file, line);
    }
    out
}

/// バックトレース全体を整形する
pub fn render_backtrace(frames: &[Frame]) -> String {
    if frames.is_empty() {
        return "No stack.".to_string();
    }
    frames
        .iter()
        .map(render_frame)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(level: u32, addr: u64, function: &str) -> Frame {
        Frame {
            level,
            addr,
            function: Some(function.to_string()),
            file: None,
            fullname: None,
            line: None,
            arch: None,
        }
    }

    #[test]
    fn test_render_frame_with_source() {
        let mut f = frame(0, 0x0800_0200, "k_sleep");
        f.file = Some("sched.c".to_string());
        f.fullname = Some("/src/kernel/sched.c".to_string());
        f.line = Some(432);
        assert_eq!(render_frame(&f), "#0  0x08000200 in k_sleep () at sched.c:432");
    }

    #[test]
    fn test_render_frame_without_function() {
        let mut f = frame(2, 0x1000, "x");
        f.function = None;
        assert_eq!(render_frame(&f), "#2  0x00001000 in ?? ()");
    }

    #[test]
    fn test_render_backtrace_order() {
        let frames = vec![frame(0, 0x100, "inner"), frame(1, 0x200, "outer")];
        let text = render_backtrace(&frames);
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with("#0 "));
    }

    #[test]
    fn test_thread_table_marks_selected() {
        let summaries = vec![
            ThreadSummary {
                id: 1,
                name: "main".to_string(),
                prio: 0,
                state: 0,
                selected: false,
                hw_active: true,
                location: "0x8000100 in main_loop()".to_string(),
            },
            ThreadSummary {
                id: 2,
                name: "worker".to_string(),
                prio: 5,
                state: 4,
                selected: true,
                hw_active: false,
                location: "??".to_string(),
            },
        ];
        let table = render_thread_table(&summaries);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("  1"));
        assert!(lines[2].starts_with("* 2"));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(render_thread_table(&[]), "No threads.");
        assert_eq!(render_backtrace(&[]), "No stack.");
    }
}

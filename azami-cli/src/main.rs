//! Azami CLI - コマンドラインインターフェース
//!
//! シミュレートしたRTOSターゲットに対して、スレッド発見・選択・
//! スタックアンウィンドを対話的に試せるREPLです。

use anyhow::Result;
use azami_core::{fmt, Command, DiscoveryMode, Session};
use azami_host::{SimTarget, TargetHost};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

mod demo;

/// Azami - RTOS thread awareness engine
#[derive(Parser)]
#[command(name = "azami")]
#[command(version = "0.1.0")]
#[command(about = "RTOS thread-awareness engine demo", long_about = None)]
struct Cli {
    /// Offset discovery mode (auto, symbols, hardcoded)
    #[arg(long)]
    discovery_mode: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Azami - RTOS thread awareness demo");
    println!("Version 0.1.0");
    println!();

    let cli = Cli::parse();
    let target = demo::build_demo_target();
    let mut session = match cli.discovery_mode {
        Some(raw) => Session::with_mode(target, raw.parse::<DiscoveryMode>()?),
        None => Session::new(target),
    };

    // ターゲットは停止状態で始まる
    println!("Simulated target attached (stopped, Cortex-M4).");
    session.on_stop();
    println!("{} threads discovered.", session.threads().len());
    println!();

    run_repl(&mut session)?;
    Ok(())
}

/// REPLループを実行する
fn run_repl(session: &mut Session<SimTarget>) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(azami) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                if let Err(e) = handle_command(session, line) {
                    eprintln!("Error: {}", e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn handle_command(session: &mut Session<SimTarget>, line: &str) -> Result<()> {
    match Command::parse(line) {
        Some(Command::Threads) => handle_threads(session),
        Some(Command::Thread(arg)) => handle_thread(session, arg)?,
        Some(Command::Backtrace { id, low, high }) => {
            let frames = session.stack_frames(id, low, high)?;
            println!("{}", fmt::render_backtrace(&frames));
        }
        Some(Command::ThreadInfo(filter)) => handle_thread_info(session, filter),
        Some(Command::ListIds) => handle_list_ids(session),
        Some(Command::Discovery(mode)) => handle_discovery(session, mode)?,
        Some(Command::Refresh) => {
            let outcome = session.refresh_threads()?;
            println!(
                "Refreshed: {} threads, {} new.",
                session.threads().len(),
                outcome.discovered.len()
            );
        }
        Some(Command::Stop) => {
            session.on_stop();
            println!("Stop event: registers restored, thread list refreshed.");
        }
        Some(Command::Continue) => {
            session.on_continue();
            println!("Continue event: nothing to do until the next stop.");
        }
        Some(Command::ExitEvent) => {
            session.on_exit();
            println!("Exit event: session state cleared.");
        }
        Some(Command::Help) => print_help(),
        Some(Command::Quit) => {
            println!("Goodbye!");
            std::process::exit(0);
        }
        None => {
            println!("Unknown command: {}", line);
            println!("Type 'help' for available commands.");
        }
    }

    Ok(())
}

/// スレッド一覧を表示する
fn handle_threads(session: &mut Session<SimTarget>) {
    let _ = session.thread_info(None); // 空なら静かにリフレッシュ
    println!("{}", fmt::render_thread_table(&session.thread_summaries()));
}

/// 現在のスレッドを表示、またはIDで選択する
fn handle_thread(session: &mut Session<SimTarget>, arg: Option<u32>) -> Result<()> {
    match arg {
        None => match session.selected_thread().or(session.current_thread_id()) {
            Some(id) => {
                let thread = session.thread(id)?;
                println!("[Current thread is {} ({})]", id, thread.name);
            }
            None => println!("No current thread"),
        },
        Some(id) => {
            let selection = session.select_thread(id)?;
            let name = session.thread(id)?.name.clone();
            println!("[Switching to thread {} ({})]", id, name);
            println!("{}", fmt::render_frame(&selection.frame));
            println!(
                "Live registers now: sp=0x{:x} pc=0x{:x}",
                session.host().read_register("sp")?,
                session.host().read_register("pc")?,
            );
        }
    }
    Ok(())
}

/// 構造化 thread-info を表示する
fn handle_thread_info(session: &mut Session<SimTarget>, filter: Option<u32>) {
    let info = session.thread_info(filter);
    for t in &info.threads {
        println!("id={} target-id=\"{}\" state={}", t.id, t.target_id, t.state);
        println!("  {}", fmt::render_frame(&t.frame));
    }
    match info.current_thread_id {
        Some(id) => println!("current-thread-id={}", id),
        None => println!("current-thread-id=<none>"),
    }
}

/// 構造化 list-ids を表示する
fn handle_list_ids(session: &mut Session<SimTarget>) {
    let ids = session.thread_ids();
    let rendered: Vec<String> = ids.thread_ids.iter().map(|id| id.to_string()).collect();
    println!("thread-ids=[{}]", rendered.join(","));
    println!("number-of-threads={}", ids.number_of_threads);
    if let Some(id) = ids.current_thread_id {
        println!("current-thread-id={}", id);
    }
}

/// 発見モードを表示または変更する
fn handle_discovery(session: &mut Session<SimTarget>, mode: Option<DiscoveryMode>) -> Result<()> {
    match mode {
        None => {
            println!("Discovery mode: {}", session.discovery_mode());
            match session.offset_table() {
                Some(_) => println!("Offsets: resolved (change mode to re-discover)"),
                None => println!("Offsets: not yet resolved"),
            }
        }
        Some(mode) => {
            // 失敗はREPLのエラー表示へそのまま届ける
            session.set_discovery_mode(mode)?;
            println!("Discovery mode set to {}.", mode);
        }
    }
    Ok(())
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help                 - Show this help message");
    println!("  quit/exit/q          - Exit");
    println!();
    println!("Thread commands:");
    println!("  threads              - List all threads");
    println!("  thread [id]          - Show or select the current thread");
    println!("  bt <id> [low high]   - Backtrace for a thread (optional level range)");
    println!("  thread-info [id]     - Structured thread-info query");
    println!("  ids                  - Structured list-ids query");
    println!();
    println!("Session commands:");
    println!("  discovery [mode]     - Show or set discovery mode (auto/symbols/hardcoded)");
    println!("  refresh              - Re-traverse the kernel thread list");
    println!("  stop                 - Inject a target stop event");
    println!("  continue (c)         - Inject a target resume event");
    println!("  exit-event           - Inject a target exit event");
    println!();
    println!("Examples:");
    println!("  thread 2");
    println!("  bt 2 0 19");
    println!("  discovery hardcoded");
}

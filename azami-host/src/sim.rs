//! シミュレートターゲット
//!
//! テストとCLIデモで使う、プロセス内の偽ターゲットです。疎なバイトメモリ・
//! 名前付きレジスタ・シンボルテーブル・型付きレコード・PCごとのフレーム
//! チェーンを持ちます。フレームチェーンはライブの `pc` レジスタで選択される
//! ため、レジスタを差し替えると別スレッドのチェーンが見えます。

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

use crate::host::{Addr, FrameWalker, HostFrame, SourceLoc, TargetHost};
use crate::value::Value;
use crate::Result;

/// シミュレートターゲット上のフレーム定義
#[derive(Debug, Clone)]
pub struct SimFrame {
    pub pc: Addr,
    pub function: Option<String>,
    pub source: Option<SourceLoc>,
    pub arch: Option<String>,
}

impl SimFrame {
    /// PCと関数名だけのフレームを作成する
    pub fn new(pc: Addr, function: &str) -> Self {
        Self {
            pc,
            function: Some(function.to_string()),
            source: None,
            arch: None,
        }
    }

    /// ソース位置を設定する
    pub fn with_source(mut self, file: &str, fullname: &str, line: u32) -> Self {
        self.source = Some(SourceLoc {
            file: file.to_string(),
            fullname: fullname.to_string(),
            line,
        });
        self
    }

    /// アーキテクチャ名を設定する
    pub fn with_arch(mut self, arch: &str) -> Self {
        self.arch = Some(arch.to_string());
        self
    }
}

/// シミュレートターゲット
#[derive(Debug, Default)]
pub struct SimTarget {
    memory: BTreeMap<Addr, u8>,
    registers: RefCell<HashMap<String, u64>>,
    symbols: HashMap<String, Addr>,
    globals: HashMap<String, Value>,
    records: HashMap<Addr, Value>,
    functions: Vec<(Addr, Addr, String)>,
    sources: HashMap<Addr, SourceLoc>,
    frame_chains: HashMap<Addr, Vec<SimFrame>>,
    arch_desc: Option<String>,
    symbol_lookups: Cell<usize>,
}

impl SimTarget {
    /// 空のターゲットを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// アーキテクチャ記述文字列を設定する
    pub fn set_arch_description(&mut self, desc: &str) {
        self.arch_desc = Some(desc.to_string());
    }

    /// バイト列をメモリへ配置する
    pub fn write_bytes(&mut self, addr: Addr, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.memory.insert(addr + i as Addr, b);
        }
    }

    /// u32値をメモリへ配置する（リトルエンディアン）
    pub fn write_u32_at(&mut self, addr: Addr, value: u32) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    /// NUL終端文字列をメモリへ配置する
    pub fn write_cstring(&mut self, addr: Addr, s: &str) {
        self.write_bytes(addr, s.as_bytes());
        self.memory.insert(addr + s.len() as Addr, 0);
    }

    /// シンボルを定義する
    pub fn define_symbol(&mut self, name: &str, addr: Addr) {
        self.symbols.insert(name.to_string(), addr);
    }

    /// 型付きグローバル値を定義する
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    /// 指定アドレスの型付きレコードを定義する
    pub fn define_record_at(&mut self, addr: Addr, value: Value) {
        self.records.insert(addr, value);
    }

    /// 指定アドレスの型付きレコードを削除する
    pub fn remove_record_at(&mut self, addr: Addr) {
        self.records.remove(&addr);
    }

    /// アドレス範囲に関数名を割り当てる
    pub fn define_function(&mut self, start: Addr, end: Addr, name: &str) {
        self.functions.push((start, end, name.to_string()));
    }

    /// アドレスにソース位置を割り当てる
    pub fn define_source(&mut self, addr: Addr, file: &str, fullname: &str, line: u32) {
        self.sources.insert(
            addr,
            SourceLoc {
                file: file.to_string(),
                fullname: fullname.to_string(),
                line,
            },
        );
    }

    /// レジスタ値を設定する
    pub fn set_register(&mut self, name: &str, value: u64) {
        self.registers.borrow_mut().insert(name.to_string(), value);
    }

    /// ライブPCが `pc` のときに見えるフレームチェーンを定義する
    pub fn define_frame_chain(&mut self, pc: Addr, frames: Vec<SimFrame>) {
        self.frame_chains.insert(pc, frames);
    }

    /// これまでのシンボル解決回数を取得する
    pub fn symbol_lookup_count(&self) -> usize {
        self.symbol_lookups.get()
    }
}

impl TargetHost for SimTarget {
    fn read_memory(&self, addr: Addr, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            match self.memory.get(&(addr + i as Addr)) {
                Some(&b) => out.push(b),
                None => {
                    return Err(anyhow::anyhow!(
                        "unmapped memory at 0x{:x}",
                        addr + i as Addr
                    ))
                }
            }
        }
        Ok(out)
    }

    fn read_register(&self, name: &str) -> Result<u64> {
        self.registers
            .borrow()
            .get(name)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no register named '{}'", name))
    }

    fn write_register(&self, name: &str, value: u64) -> Result<()> {
        self.registers.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    fn lookup_symbol(&self, name: &str) -> Option<Addr> {
        self.symbol_lookups.set(self.symbol_lookups.get() + 1);
        self.symbols.get(name).copied()
    }

    fn eval_global(&self, name: &str) -> Result<Value> {
        self.globals
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no global named '{}'", name))
    }

    fn eval_struct_at(&self, type_name: &str, addr: Addr) -> Result<Value> {
        self.records.get(&addr).cloned().ok_or_else(|| {
            anyhow::anyhow!("no {} record at 0x{:x}", type_name, addr)
        })
    }

    fn arch_description(&self) -> Option<String> {
        self.arch_desc.clone()
    }

    fn function_at(&self, addr: Addr) -> Option<String> {
        self.functions
            .iter()
            .find(|(start, end, _)| addr >= *start && addr < *end)
            .map(|(_, _, name)| name.clone())
    }

    fn source_at(&self, addr: Addr) -> Option<SourceLoc> {
        self.sources.get(&addr).cloned()
    }
}

impl FrameWalker for SimTarget {
    fn innermost_frame(&self) -> Result<Option<HostFrame>> {
        let pc = self.read_register("pc")?;
        match self.frame_chains.get(&pc) {
            Some(chain) => Ok(chain.first().map(|f| host_frame(f, 0))),
            // チェーン未定義のPCでは、ライブPCだけからなる1フレームを合成する
            None => Ok(Some(HostFrame {
                pc,
                function: self.function_at(pc),
                source: self.source_at(pc),
                arch: self.arch_desc.clone(),
                depth: 0,
            })),
        }
    }

    fn older_frame(&self, frame: &HostFrame) -> Result<Option<HostFrame>> {
        let pc = self.read_register("pc")?;
        let Some(chain) = self.frame_chains.get(&pc) else {
            return Ok(None);
        };
        let depth = frame.depth + 1;
        Ok(chain.get(depth).map(|f| host_frame(f, depth)))
    }
}

fn host_frame(f: &SimFrame, depth: usize) -> HostFrame {
    HostFrame {
        pc: f.pc,
        function: f.function.clone(),
        source: f.source.clone(),
        arch: f.arch.clone(),
        depth,
    }
}

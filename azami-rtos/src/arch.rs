//! アーキテクチャプロファイル
//!
//! 保存レジスタレコードからPC／SPを取り出す、アーキテクチャごとの能力です。
//! 検出はセッション中に一度だけ行われ、構築されるすべてのスレッドに
//! 同じプロファイルが付与されます。値0は「不明／非対応」を意味します。

use azami_host::{Addr, TargetHost, ValueRecord};
use tracing::warn;

/// Cortex-M例外フレーム内で戻りアドレスが置かれる、保存PSPからのオフセット
const CORTEX_M_FRAME_PC_OFFSET: Addr = 24;

/// Cortex-Mのシステム／PPB領域の先頭。これ以上のアドレスはコードではない
pub const CORTEX_M_SYSTEM_REGION: Addr = 0xE000_0000;

/// アーキテクチャプロファイル
///
/// 検出された族ごとにひとつの戦略です。状態は持ちません。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchProfile {
    /// ARM Cortex-M
    ArmCortexM,
    /// x86 / x86-64（保存PCの復元は非対応）
    X86,
    /// ARCプロセッサファミリ
    Arc,
    /// RISC-V
    RiscV,
}

impl ArchProfile {
    /// ターゲットのアーキテクチャ記述文字列からプロファイルを検出する
    ///
    /// 大文字小文字を無視した部分文字列マッチです。未知の記述や記述なしは
    /// 警告を出してARM Cortex-Mへフォールバックします（能力は制限されます）。
    pub fn detect(desc: Option<&str>) -> Self {
        let Some(desc) = desc else {
            warn!("no architecture description available, defaulting to ARM Cortex-M");
            return ArchProfile::ArmCortexM;
        };
        let lower = desc.to_ascii_lowercase();
        if lower.contains("arm") || lower.contains("cortex") {
            ArchProfile::ArmCortexM
        } else if lower.contains("i386") || lower.contains("x86-64") {
            ArchProfile::X86
        } else if lower.contains("arc") {
            ArchProfile::Arc
        } else if lower.contains("riscv") {
            ArchProfile::RiscV
        } else {
            warn!(
                arch = %desc,
                "unknown architecture, thread awareness may be limited (defaulting to ARM Cortex-M)"
            );
            ArchProfile::ArmCortexM
        }
    }

    /// 表示用のプロファイル名
    pub fn name(&self) -> &'static str {
        match self {
            ArchProfile::ArmCortexM => "arm-cortex-m",
            ArchProfile::X86 => "x86",
            ArchProfile::Arc => "arc",
            ArchProfile::RiscV => "riscv",
        }
    }

    /// 保存レジスタレコードからサスペンド中スレッドのPCを復元する
    ///
    /// 復元できない場合は0を返します。
    pub fn saved_pc(&self, host: &dyn TargetHost, regs: &ValueRecord) -> Addr {
        match self {
            ArchProfile::ArmCortexM => {
                // 戻りアドレスはハードウェア例外フレーム内、PSP+24 に積まれる
                let Some(psp) = regs.scalar("psp") else {
                    return 0;
                };
                match host.read_u32(psp + CORTEX_M_FRAME_PC_OFFSET) {
                    Ok(pc) => pc as Addr,
                    Err(_) => 0,
                }
            }
            ArchProfile::X86 => 0,
            ArchProfile::Arc => probe_first(regs, &["blink", "pc", "ilink"]),
            ArchProfile::RiscV => probe_first(regs, &["ra", "mepc", "pc"]),
        }
    }

    /// 保存レジスタレコードからサスペンド中スレッドのSPを復元する
    pub fn saved_sp(&self, regs: &ValueRecord) -> Addr {
        match self {
            ArchProfile::ArmCortexM => probe_first(regs, &["psp", "sp"]),
            ArchProfile::RiscV => probe_first(regs, &["sp"]),
            ArchProfile::X86 | ArchProfile::Arc => 0,
        }
    }

    /// コードアドレスとして妥当かどうか判定する
    pub fn is_plausible_code_addr(&self, pc: Addr) -> bool {
        if pc == 0 {
            return false;
        }
        if *self == ArchProfile::ArmCortexM && pc >= CORTEX_M_SYSTEM_REGION {
            return false;
        }
        true
    }
}

/// 候補名リストの順に探し、最初に存在したフィールドの整数値を返す
fn probe_first(regs: &ValueRecord, candidates: &[&str]) -> Addr {
    candidates
        .iter()
        .find_map(|name| regs.scalar(name))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use azami_host::{SimTarget, Value};

    #[test]
    fn test_detect_known_families() {
        assert_eq!(ArchProfile::detect(Some("armv7e-m")), ArchProfile::ArmCortexM);
        assert_eq!(ArchProfile::detect(Some("Cortex-M4")), ArchProfile::ArmCortexM);
        assert_eq!(ArchProfile::detect(Some("i386:x86-64")), ArchProfile::X86);
        assert_eq!(ArchProfile::detect(Some("ARCv2")), ArchProfile::Arc);
        assert_eq!(ArchProfile::detect(Some("riscv:rv32")), ArchProfile::RiscV);
    }

    #[test]
    fn test_detect_unknown_defaults_to_cortex_m() {
        assert_eq!(ArchProfile::detect(Some("xtensa")), ArchProfile::ArmCortexM);
        assert_eq!(ArchProfile::detect(None), ArchProfile::ArmCortexM);
    }

    #[test]
    fn test_cortex_m_pc_from_exception_frame() {
        let mut sim = SimTarget::new();
        sim.write_u32_at(0x2000_1000 + 24, 0x0800_1234);
        let regs = ValueRecord::new().with_field("psp", Value::Scalar(0x2000_1000));

        let arch = ArchProfile::ArmCortexM;
        assert_eq!(arch.saved_pc(&sim, &regs), 0x0800_1234);
        assert_eq!(arch.saved_sp(&regs), 0x2000_1000);
    }

    #[test]
    fn test_cortex_m_unreadable_frame_is_unknown() {
        let sim = SimTarget::new();
        let regs = ValueRecord::new().with_field("psp", Value::Scalar(0x2000_1000));
        assert_eq!(ArchProfile::ArmCortexM.saved_pc(&sim, &regs), 0);
    }

    #[test]
    fn test_x86_pc_always_unknown() {
        let sim = SimTarget::new();
        let regs = ValueRecord::new()
            .with_field("pc", Value::Scalar(0x1234))
            .with_field("sp", Value::Scalar(0x5678));
        assert_eq!(ArchProfile::X86.saved_pc(&sim, &regs), 0);
        assert_eq!(ArchProfile::X86.saved_sp(&regs), 0);
    }

    #[test]
    fn test_riscv_probe_order() {
        let sim = SimTarget::new();
        let regs = ValueRecord::new()
            .with_field("mepc", Value::Scalar(0x2000))
            .with_field("ra", Value::Scalar(0x1000))
            .with_field("sp", Value::Scalar(0x8000));
        // ra が存在すれば mepc より優先される
        assert_eq!(ArchProfile::RiscV.saved_pc(&sim, &regs), 0x1000);
        assert_eq!(ArchProfile::RiscV.saved_sp(&regs), 0x8000);

        let no_ra = ValueRecord::new().with_field("mepc", Value::Scalar(0x2000));
        assert_eq!(ArchProfile::RiscV.saved_pc(&sim, &no_ra), 0x2000);
    }

    #[test]
    fn test_arc_probe_order() {
        let sim = SimTarget::new();
        let regs = ValueRecord::new()
            .with_field("ilink", Value::Scalar(0x30))
            .with_field("blink", Value::Scalar(0x10));
        assert_eq!(ArchProfile::Arc.saved_pc(&sim, &regs), 0x10);
        assert_eq!(ArchProfile::Arc.saved_pc(&sim, &ValueRecord::new()), 0);
    }

    #[test]
    fn test_code_addr_plausibility() {
        let m = ArchProfile::ArmCortexM;
        assert!(!m.is_plausible_code_addr(0));
        assert!(m.is_plausible_code_addr(0x0800_0000));
        assert!(!m.is_plausible_code_addr(CORTEX_M_SYSTEM_REGION));
        assert!(!m.is_plausible_code_addr(0xFFFF_FFFF));
        // システム領域チェックは Cortex-M のみ
        assert!(ArchProfile::RiscV.is_plausible_code_addr(0xF000_0000));
    }
}

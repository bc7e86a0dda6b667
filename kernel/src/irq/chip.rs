//! Shared interrupt-controller chip vtable (C16).
//!
//! Every concrete controller (ARM GICv2/GICv3, RISC-V INTC/PLIC/APLIC)
//! implements this trait once and is stored as `&'static dyn IrqChip` in the
//! descriptor it serves, selected at probe time (§9: "avoid dynamic dispatch
//! in the hot IRQ path by selecting the chip once... and calling through a
//! stored concrete reference" — one vtable call per dispatch is that
//! reference).

use bitflags::bitflags;

use crate::error::KernelResult;

/// Edge/level trigger type, shared across every chip (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqTriggerType {
    EdgeRising,
    EdgeFalling,
    EdgeBoth,
    LevelHigh,
    LevelLow,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChipFlags: u32 {
        /// Chip has no explicit EOI register; dispatch must mask, ack,
        /// run handlers, then unmask instead of calling `irq_eoi`.
        const NO_EOI = 1 << 0;
        /// `compose_msi_msg`/`write_msi_msg` are implemented.
        const MSI_CAPABLE = 1 << 1;
    }
}

/// A simple bitmask of up to 64 CPUs, sufficient for this single-hart-class
/// core (SMP affinity programming is out of scope; the mask is still
/// threaded through so the vtable shape matches a real multi-hart chip).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuMask(pub u64);

impl CpuMask {
    pub const CPU0: Self = Self(1);
}

/// Composed MSI message, filled in by `compose_msi_msg` and handed to the
/// device by `write_msi_msg` (descriptor bookkeeping only — actually wiring
/// MSI/ITS hardware is out of scope per spec §1).
#[derive(Debug, Clone, Copy, Default)]
pub struct MsiMessage {
    pub address: u64,
    pub data: u32,
}

/// Chip vtable. `hwirq` is always the hardware IRQ id as this specific chip
/// sees it (already translated out of any parent hierarchy layer).
pub trait IrqChip: Send + Sync {
    fn name(&self) -> &'static str;
    fn flags(&self) -> ChipFlags {
        ChipFlags::empty()
    }

    fn irq_mask(&self, hwirq: u32);
    fn irq_unmask(&self, hwirq: u32);
    /// Acknowledge and return the hwirq actually pending, or `None` if
    /// spurious (GIC 1023, PLIC/APLIC claim == 0).
    fn irq_ack(&self, hwirq: u32) -> Option<u32> {
        let _ = hwirq;
        None
    }
    fn irq_eoi(&self, hwirq: u32);

    fn irq_enable(&self, hwirq: u32) {
        self.irq_unmask(hwirq);
    }
    fn irq_disable(&self, hwirq: u32) {
        self.irq_mask(hwirq);
    }

    fn irq_set_type(&self, hwirq: u32, trigger: IrqTriggerType) -> KernelResult<()>;
    fn irq_set_affinity(&self, hwirq: u32, cpu_mask: CpuMask) -> KernelResult<()> {
        let _ = (hwirq, cpu_mask);
        Ok(())
    }

    fn compose_msi_msg(&self, hwirq: u32) -> Option<MsiMessage> {
        let _ = hwirq;
        None
    }
    fn write_msi_msg(&self, hwirq: u32, msg: MsiMessage) {
        let _ = (hwirq, msg);
    }

    /// Claim the next pending hwirq for controllers (PLIC/APLIC) whose
    /// dispatch model is "claim in a loop" rather than "one IAR per IRQ
    /// entry"; GIC-style chips leave this unimplemented and rely on the
    /// exception-entry path reading IAR directly.
    fn claim(&self) -> Option<u32> {
        None
    }
    fn complete(&self, hwirq: u32) {
        self.irq_eoi(hwirq);
    }
}

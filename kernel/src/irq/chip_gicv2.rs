//! ARM GICv2 `IrqChip` implementation (C16). Distributor (GICD) routes and
//! gates SPIs/PPIs; the per-CPU interface (GICC) acknowledges and EOIs.
//!
//! Interrupt ID ranges: SGIs 0-15, PPIs 16-31, SPIs 32-1019.

use core::ptr;

use spin::Mutex;

use super::chip::{IrqChip, IrqTriggerType};
use crate::error::{KernelError, KernelResult};

const GICD_CTLR: usize = 0x000;
const GICD_TYPER: usize = 0x004;
const GICD_IGROUPR: usize = 0x080;
const GICD_ISENABLER: usize = 0x100;
const GICD_ICENABLER: usize = 0x180;
const GICD_IPRIORITYR: usize = 0x400;
const GICD_ITARGETSR: usize = 0x800;
const GICD_ICFGR: usize = 0xC00;

const GICC_CTLR: usize = 0x000;
const GICC_PMR: usize = 0x004;
const GICC_BPR: usize = 0x008;
const GICC_IAR: usize = 0x00C;
const GICC_EOIR: usize = 0x010;

const GIC_MAX_IRQS: u32 = 1020;
const GIC_SPURIOUS_IRQ: u32 = 1023;
const DEFAULT_SPI_PRIORITY: u8 = 0xA0;

/// Physical timer PPI on the QEMU virt machine.
pub const TIMER_PPI: u32 = 30;

struct Regs {
    gicd_base: usize,
    gicc_base: usize,
}

impl Regs {
    fn gicd_read(&self, offset: usize) -> u32 {
        // SAFETY: offset is a valid GICD register, gicd_base is the GIC
        // distributor MMIO window handed to `GicV2::new`.
        unsafe { ptr::read_volatile((self.gicd_base + offset) as *const u32) }
    }
    fn gicd_write(&self, offset: usize, value: u32) {
        // SAFETY: see `gicd_read`.
        unsafe { ptr::write_volatile((self.gicd_base + offset) as *mut u32, value) }
    }
    fn gicc_read(&self, offset: usize) -> u32 {
        // SAFETY: offset is a valid GICC register, gicc_base is the GIC
        // CPU interface MMIO window handed to `GicV2::new`.
        unsafe { ptr::read_volatile((self.gicc_base + offset) as *const u32) }
    }
    fn gicc_write(&self, offset: usize, value: u32) {
        // SAFETY: see `gicc_read`.
        unsafe { ptr::write_volatile((self.gicc_base + offset) as *mut u32, value) }
    }
}

fn barrier() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: DSB/ISB are non-destructive architectural barriers.
    unsafe {
        core::arch::asm!("dsb sy", options(nostack, preserves_flags));
        core::arch::asm!("isb", options(nostack, preserves_flags));
    }
}

struct State {
    regs: Regs,
    num_irqs: u32,
}

/// GICv2 distributor + CPU interface driver.
pub struct GicV2 {
    state: Mutex<State>,
}

impl GicV2 {
    /// `gicd_base`/`gicc_base` are the MMIO windows found via FDT
    /// `reg` properties on the `arm,gic-400`/`arm,cortex-a15-gic` node.
    pub fn new(gicd_base: usize, gicc_base: usize) -> Self {
        let chip = Self {
            state: Mutex::new(State {
                regs: Regs { gicd_base, gicc_base },
                num_irqs: 0,
            }),
        };
        chip.init_distributor();
        chip.init_cpu_interface();
        chip
    }

    fn init_distributor(&self) {
        let mut st = self.state.lock();
        st.regs.gicd_write(GICD_CTLR, 0);
        barrier();

        let typer = st.regs.gicd_read(GICD_TYPER);
        let it_lines_number = typer & 0x1F;
        st.num_irqs = ((it_lines_number + 1) * 32).min(GIC_MAX_IRQS);
        let num_irqs = st.num_irqs;

        let num_regs = (num_irqs / 32) as usize;
        for i in 1..num_regs {
            st.regs.gicd_write(GICD_IGROUPR + i * 4, 0x0000_0000);
        }
        for i in 1..num_regs {
            st.regs.gicd_write(GICD_ICENABLER + i * 4, 0xFFFF_FFFF);
        }
        let priority_word = u32::from_be_bytes([DEFAULT_SPI_PRIORITY; 4]);
        for i in 8..(num_irqs as usize / 4) {
            st.regs.gicd_write(GICD_IPRIORITYR + i * 4, priority_word);
        }
        let target_word: u32 = 0x0101_0101;
        for i in 8..(num_irqs as usize / 4) {
            st.regs.gicd_write(GICD_ITARGETSR + i * 4, target_word);
        }
        for i in 2..(num_irqs as usize / 16) {
            st.regs.gicd_write(GICD_ICFGR + i * 4, 0x0000_0000);
        }
        barrier();
        st.regs.gicd_write(GICD_CTLR, 1);
        barrier();
    }

    fn init_cpu_interface(&self) {
        let st = self.state.lock();
        st.regs.gicc_write(GICC_PMR, 0xFF);
        st.regs.gicc_write(GICC_BPR, 0);
        st.regs.gicc_write(GICC_CTLR, 1);
        barrier();
    }
}

impl IrqChip for GicV2 {
    fn name(&self) -> &'static str {
        "gicv2"
    }

    fn irq_mask(&self, hwirq: u32) {
        let st = self.state.lock();
        if hwirq >= st.num_irqs {
            return;
        }
        let reg = (hwirq / 32) as usize;
        st.regs.gicd_write(GICD_ICENABLER + reg * 4, 1u32 << (hwirq % 32));
        barrier();
    }

    fn irq_unmask(&self, hwirq: u32) {
        let st = self.state.lock();
        if hwirq >= st.num_irqs {
            return;
        }
        let reg = (hwirq / 32) as usize;
        st.regs.gicd_write(GICD_ISENABLER + reg * 4, 1u32 << (hwirq % 32));
        barrier();
    }

    fn irq_ack(&self, _hwirq: u32) -> Option<u32> {
        let st = self.state.lock();
        let iar = st.regs.gicc_read(GICC_IAR);
        let id = iar & 0x3FF;
        if id == GIC_SPURIOUS_IRQ {
            None
        } else {
            Some(id)
        }
    }

    fn irq_eoi(&self, hwirq: u32) {
        let st = self.state.lock();
        st.regs.gicc_write(GICC_EOIR, hwirq);
        barrier();
    }

    fn irq_set_type(&self, hwirq: u32, trigger: IrqTriggerType) -> KernelResult<()> {
        let st = self.state.lock();
        if hwirq >= st.num_irqs {
            return Err(KernelError::InvalidArgument { name: "hwirq", value: "out of range" });
        }
        let reg = (hwirq / 16) as usize;
        let shift = (hwirq % 16) * 2;
        let edge = matches!(trigger, IrqTriggerType::EdgeRising | IrqTriggerType::EdgeFalling | IrqTriggerType::EdgeBoth);
        let mut val = st.regs.gicd_read(GICD_ICFGR + reg * 4);
        if edge {
            val |= 1 << (shift + 1);
        } else {
            val &= !(1 << (shift + 1));
        }
        st.regs.gicd_write(GICD_ICFGR + reg * 4, val);
        barrier();
        Ok(())
    }
}

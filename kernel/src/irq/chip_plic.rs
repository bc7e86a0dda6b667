//! RISC-V Platform-Level Interrupt Controller `IrqChip` implementation
//! (C16), per the SiFive PLIC specification. Unlike GIC, the PLIC has no
//! single IAR register; dispatch claims in a loop via [`IrqChip::claim`].

use core::sync::atomic::{fence, Ordering};

use spin::Mutex;

use super::chip::{ChipFlags, IrqChip, IrqTriggerType};
use crate::error::KernelResult;

const PLIC_PRIORITY_OFFSET: usize = 0x00_0000;
const PLIC_ENABLE_OFFSET: usize = 0x00_2000;
const PLIC_ENABLE_STRIDE: usize = 0x80;
const PLIC_THRESHOLD_OFFSET: usize = 0x20_0000;
const PLIC_CLAIM_OFFSET: usize = 0x20_0004;
const PLIC_CONTEXT_STRIDE: usize = 0x1000;

struct State {
    base: usize,
    max_irq: u32,
    /// S-mode context for the boot hart: `hart_id * 2 + 1`.
    s_context: u32,
}

impl State {
    fn priority_addr(&self, irq: u32) -> *mut u32 {
        (self.base + PLIC_PRIORITY_OFFSET + (irq as usize) * 4) as *mut u32
    }
    fn enable_addr(&self, irq: u32) -> *mut u32 {
        (self.base + PLIC_ENABLE_OFFSET + (self.s_context as usize) * PLIC_ENABLE_STRIDE + ((irq as usize) / 32) * 4)
            as *mut u32
    }
    fn threshold_addr(&self) -> *mut u32 {
        (self.base + PLIC_THRESHOLD_OFFSET + (self.s_context as usize) * PLIC_CONTEXT_STRIDE) as *mut u32
    }
    fn claim_addr(&self) -> *mut u32 {
        (self.base + PLIC_CLAIM_OFFSET + (self.s_context as usize) * PLIC_CONTEXT_STRIDE) as *mut u32
    }
}

/// Platform-Level Interrupt Controller driver.
pub struct Plic {
    state: Mutex<State>,
}

impl Plic {
    /// `base` is the PLIC MMIO window from the `riscv,plic0`/`sifive,plic-1.0.0`
    /// FDT node; `max_irq` is its highest valid source (`riscv,ndev` property).
    pub fn new(base: usize, max_irq: u32, hart_id: u32) -> Self {
        let chip = Self {
            state: Mutex::new(State { base, max_irq, s_context: hart_id * 2 + 1 }),
        };
        chip.reset();
        chip
    }

    fn reset(&self) {
        let st = self.state.lock();
        for irq in 1..=st.max_irq {
            // SAFETY: priority register for each source in [1, max_irq] lies
            // in the PLIC MMIO window passed to `new`.
            unsafe { core::ptr::write_volatile(st.priority_addr(irq), 0) };
        }
        let enable_words = ((st.max_irq as usize) + 32) / 32;
        for word in 0..enable_words {
            let addr = (st.base + PLIC_ENABLE_OFFSET + (st.s_context as usize) * PLIC_ENABLE_STRIDE + word * 4)
                as *mut u32;
            // SAFETY: within the S-mode context's enable word range.
            unsafe { core::ptr::write_volatile(addr, 0) };
        }
        // SAFETY: threshold register for this context, in range.
        unsafe { core::ptr::write_volatile(st.threshold_addr(), 0) };
        loop {
            // SAFETY: claim register read either returns a pending source or 0.
            let claimed = unsafe { core::ptr::read_volatile(st.claim_addr()) };
            if claimed == 0 {
                break;
            }
            // SAFETY: completing a stale claim from before our reset.
            unsafe { core::ptr::write_volatile(st.claim_addr(), claimed) };
        }
        fence(Ordering::SeqCst);
    }
}

impl IrqChip for Plic {
    fn name(&self) -> &'static str {
        "plic"
    }

    fn flags(&self) -> ChipFlags {
        ChipFlags::NO_EOI
    }

    fn irq_mask(&self, hwirq: u32) {
        let st = self.state.lock();
        if hwirq == 0 || hwirq > st.max_irq {
            return;
        }
        let addr = st.enable_addr(hwirq);
        let bit = 1u32 << (hwirq % 32);
        // SAFETY: read-modify-write of this hart's enable word; addr is in range.
        unsafe {
            let cur = core::ptr::read_volatile(addr);
            core::ptr::write_volatile(addr, cur & !bit);
        }
        fence(Ordering::SeqCst);
    }

    fn irq_unmask(&self, hwirq: u32) {
        let st = self.state.lock();
        if hwirq == 0 || hwirq > st.max_irq {
            return;
        }
        // SAFETY: same as `irq_mask`.
        unsafe {
            core::ptr::write_volatile(st.priority_addr(hwirq), 1);
        }
        let addr = st.enable_addr(hwirq);
        let bit = 1u32 << (hwirq % 32);
        // SAFETY: same as `irq_mask`.
        unsafe {
            let cur = core::ptr::read_volatile(addr);
            core::ptr::write_volatile(addr, cur | bit);
        }
        fence(Ordering::SeqCst);
    }

    fn irq_eoi(&self, hwirq: u32) {
        self.complete(hwirq);
    }

    fn irq_set_type(&self, _hwirq: u32, _trigger: IrqTriggerType) -> KernelResult<()> {
        // The PLIC has no per-source trigger-type register; sources are
        // fixed edge/level by wiring, not software-configurable.
        Ok(())
    }

    fn claim(&self) -> Option<u32> {
        let st = self.state.lock();
        // SAFETY: claim register read atomically claims the
        // highest-priority pending source for this hart's S-mode context.
        let irq = unsafe { core::ptr::read_volatile(st.claim_addr()) };
        if irq == 0 {
            None
        } else {
            Some(irq)
        }
    }

    fn complete(&self, hwirq: u32) {
        let st = self.state.lock();
        // SAFETY: writing back a source previously returned by `claim`.
        unsafe { core::ptr::write_volatile(st.claim_addr(), hwirq) };
        fence(Ordering::SeqCst);
    }
}

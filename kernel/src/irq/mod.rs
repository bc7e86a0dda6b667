//! Architecture-abstracted IRQ layer (C13/C14/C15/C16): hwirq<->virq
//! domains, the virq/descriptor bookkeeping they sit on, and the chip
//! vtable each controller driver implements.

pub mod chip;
#[cfg(target_arch = "aarch64")]
pub mod chip_gicv2;
#[cfg(target_arch = "riscv64")]
pub mod chip_plic;
pub mod descriptor;
pub mod domain;
pub mod radix;
pub mod virq;

pub use chip::{ChipFlags, CpuMask, IrqChip, IrqTriggerType, MsiMessage};
pub use descriptor::{
    disable_irq, enable_irq, free_irq, generic_handle_irq, request_irq, with_desc, IrqAction,
    IrqDesc, IrqFlags, IrqStatus,
};
pub use domain::{
    default_domain, find_domain, leak_domain, register_domain, set_default_domain, DomainType,
    DomainXlate, IrqDomain,
};
pub use radix::{RadixTree, Tag as RadixTag};
pub use virq::{
    get_allocated_count, get_max_allocated, virq_alloc, virq_alloc_range, virq_free,
    virq_free_range, virq_is_allocated, INVALID as IRQ_INVALID,
};

/// Dispatch a hardware interrupt that arrived on `domain` as `hwirq`: look
/// up (or fail to find) the virq mapping and run `generic_handle_irq`.
/// Called from the per-arch exception entry (C17) after the chip's own
/// ack/claim step has produced a hwirq.
pub fn dispatch_hwirq(domain: &IrqDomain, hwirq: u32) {
    let v = domain.find_mapping(hwirq);
    if v == IRQ_INVALID {
        crate::log_service::klog(
            crate::log_service::LogLevel::Warn,
            "irq",
            "dispatch_hwirq: no mapping for hwirq",
        );
        return;
    }
    generic_handle_irq(v);
}

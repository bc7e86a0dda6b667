//! Per-virq IRQ descriptor, action chain, and dispatch (C13).

use alloc::{boxed::Box, string::String};

use bitflags::bitflags;
use spin::Mutex;

use super::{
    chip::{ChipFlags, IrqChip, IrqTriggerType},
    virq::{self, INVALID},
};
use crate::{
    config::MAX_VIRQ,
    error::{KernelError, KernelResult},
    log_service::{klog, LogLevel},
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqFlags: u32 {
        const SHARED    = 1 << 0;
        const TRIGGER_RISING  = 1 << 1;
        const TRIGGER_FALLING = 1 << 2;
        const TRIGGER_HIGH    = 1 << 3;
        const TRIGGER_LOW     = 1 << 4;
        const ONESHOT   = 1 << 5;
        const NO_THREAD = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqStatus: u32 {
        const DISABLED  = 1 << 0;
        const PENDING   = 1 << 1;
        const INPROGRESS = 1 << 2;
        const MASKED    = 1 << 3;
        const PER_CPU   = 1 << 4;
        const NOPROBE   = 1 << 5;
        const NOREQUEST = 1 << 6;
        const NOAUTOEN  = 1 << 7;
    }
}

pub type IrqHandler = fn(virq: u32, dev_token: usize);

/// One registered handler on a descriptor's action chain.
pub struct IrqAction {
    pub handler: IrqHandler,
    pub dev_token: usize,
    pub flags: IrqFlags,
    pub name: String,
    pub next: Option<Box<IrqAction>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IrqCounters {
    pub fires: u64,
    pub spurious: u64,
    pub last_ts: u64,
}

/// Per-virq descriptor: owns its action chain, tracks nested enable/disable
/// depth, and remembers which chip + domain it was mapped through.
pub struct IrqDesc {
    pub virq: u32,
    pub hwirq: u32,
    pub chip: Option<&'static dyn IrqChip>,
    pub trigger_type: Option<IrqTriggerType>,
    pub status: IrqStatus,
    /// Zero iff the interrupt is logically enabled.
    pub depth: u32,
    pub action: Option<Box<IrqAction>>,
    pub counters: IrqCounters,
    pub name: String,
}

impl IrqDesc {
    fn new(virq: u32) -> Self {
        Self {
            virq,
            hwirq: INVALID,
            chip: None,
            trigger_type: None,
            status: IrqStatus::DISABLED,
            depth: 1,
            action: None,
            counters: IrqCounters::default(),
            name: String::new(),
        }
    }
}

struct DescTable {
    descs: [Option<Box<Mutex<IrqDesc>>>; MAX_VIRQ],
}

impl DescTable {
    const fn new() -> Self {
        Self {
            descs: [const { None }; MAX_VIRQ],
        }
    }
}

static DESC_TABLE: Mutex<DescTable> = Mutex::new(DescTable::new());

/// Allocate (or return the existing) descriptor for `virq`. Used by
/// [`super::domain`] when mapping a hwirq.
pub(super) fn alloc_desc(virq: u32, hwirq: u32, chip: &'static dyn IrqChip) -> KernelResult<()> {
    if virq as usize >= MAX_VIRQ {
        return Err(KernelError::VirqExhausted);
    }
    let mut table = DESC_TABLE.lock();
    let mut desc = IrqDesc::new(virq);
    desc.hwirq = hwirq;
    desc.chip = Some(chip);
    table.descs[virq as usize] = Some(Box::new(Mutex::new(desc)));
    Ok(())
}

pub(super) fn free_desc(virq: u32) {
    if (virq as usize) < MAX_VIRQ {
        DESC_TABLE.lock().descs[virq as usize] = None;
    }
}

/// `irq_to_desc`: run `f` with the descriptor's lock held, if it exists.
pub fn with_desc<R>(virq: u32, f: impl FnOnce(&mut IrqDesc) -> R) -> Option<R> {
    if virq as usize >= MAX_VIRQ {
        return None;
    }
    let table = DESC_TABLE.lock();
    let slot = table.descs[virq as usize].as_ref()?;
    let result = f(&mut slot.lock());
    Some(result)
}

/// Register `handler` on `virq`. Rejects an unmapped virq (per §4.13).
pub fn request_irq(
    virq: u32,
    handler: IrqHandler,
    flags: IrqFlags,
    name: &str,
    dev_token: usize,
) -> KernelResult<()> {
    with_desc(virq, |desc| {
        let shared_ok = desc.action.is_none()
            || (flags.contains(IrqFlags::SHARED)
                && desc
                    .action
                    .as_deref()
                    .is_some_and(|a| a.flags.contains(IrqFlags::SHARED)));
        if !shared_ok {
            return Err(KernelError::DomainError(
                crate::error::DomainError::AlreadyMapped,
            ));
        }
        let mut action = Box::new(IrqAction {
            handler,
            dev_token,
            flags,
            name: String::from(name),
            next: None,
        });
        action.next = desc.action.take();
        desc.action = Some(action);

        if let Some(chip) = desc.chip {
            if let Some(trig) = desc.trigger_type {
                let _ = chip.irq_set_type(desc.hwirq, trig);
            }
        }
        if desc.depth > 0 {
            desc.depth = 0;
            desc.status.remove(IrqStatus::DISABLED | IrqStatus::MASKED);
            if let Some(chip) = desc.chip {
                chip.irq_unmask(desc.hwirq);
            }
        }
        Ok(())
    })
    .ok_or(KernelError::DomainError(
        crate::error::DomainError::NotMapped,
    ))?
}

fn remove_action(node: Option<Box<IrqAction>>, dev_token: usize) -> Option<Box<IrqAction>> {
    match node {
        None => None,
        Some(mut n) => {
            let rest = remove_action(n.next.take(), dev_token);
            if n.dev_token == dev_token {
                rest
            } else {
                n.next = rest;
                Some(n)
            }
        }
    }
}

/// Remove the action matching `dev_token`. Unknown token is ignored (§4.13).
pub fn free_irq(virq: u32, dev_token: usize) {
    with_desc(virq, |desc| {
        desc.action = remove_action(desc.action.take(), dev_token);
        if desc.action.is_none() {
            if let Some(chip) = desc.chip {
                chip.irq_mask(desc.hwirq);
            }
            desc.status.insert(IrqStatus::MASKED);
        }
    });
}

/// `disable_irq[_nosync]`: increment nested depth; mask on 0->1 transition.
pub fn disable_irq(virq: u32) {
    with_desc(virq, |desc| {
        if desc.depth == 0 {
            if let Some(chip) = desc.chip {
                chip.irq_mask(desc.hwirq);
            }
            desc.status.insert(IrqStatus::MASKED);
        }
        desc.depth += 1;
    });
}

/// `enable_irq`: decrement nested depth, clamped at zero; unmask on 1->0.
pub fn enable_irq(virq: u32) {
    with_desc(virq, |desc| {
        if desc.depth == 0 {
            return;
        }
        desc.depth -= 1;
        if desc.depth == 0 {
            if let Some(chip) = desc.chip {
                chip.irq_unmask(desc.hwirq);
            }
            desc.status.remove(IrqStatus::MASKED);
        }
    });
}

/// Walk the action chain for `virq`, then EOI (or mask/ack/unmask for
/// NO_EOI chips). Called from the per-arch exception entry (C17).
pub fn generic_handle_irq(virq: u32) {
    let dispatched = with_desc(virq, |desc| {
        desc.counters.fires += 1;
        let mut action = desc.action.as_deref();
        while let Some(a) = action {
            (a.handler)(virq, a.dev_token);
            action = a.next.as_deref();
        }
        (desc.chip, desc.hwirq, desc.action.is_none())
    });

    match dispatched {
        Some((Some(chip), hwirq, no_handlers)) => {
            if no_handlers {
                with_desc(virq, |desc| desc.counters.spurious += 1);
            }
            if chip.flags().contains(ChipFlags::NO_EOI) {
                chip.irq_mask(hwirq);
                chip.irq_ack(hwirq);
                chip.irq_unmask(hwirq);
            } else {
                chip.irq_eoi(hwirq);
            }
        }
        Some((None, _, _)) => {}
        None => {
            klog(LogLevel::Warn, "irq", "generic_handle_irq: no descriptor");
        }
    }
}

/// Allocate a virq and its descriptor together — used by domains that do
/// not yet have a virq (LINEAR/TREE mapping path); returns the new virq.
pub(super) fn alloc_virq_and_desc(hwirq: u32, chip: &'static dyn IrqChip) -> KernelResult<u32> {
    let v = virq::virq_alloc()?;
    if let Err(e) = alloc_desc(v, hwirq, chip) {
        virq::virq_free(v);
        return Err(e);
    }
    Ok(v)
}

pub(super) fn dispose_virq_and_desc(virq_num: u32) {
    free_desc(virq_num);
    virq::virq_free(virq_num);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irq::chip::IrqTriggerType as Trig;

    struct DummyChip;
    impl IrqChip for DummyChip {
        fn name(&self) -> &'static str {
            "dummy"
        }
        fn irq_mask(&self, _hwirq: u32) {}
        fn irq_unmask(&self, _hwirq: u32) {}
        fn irq_eoi(&self, _hwirq: u32) {}
        fn irq_set_type(&self, _hwirq: u32, _t: Trig) -> KernelResult<()> {
            Ok(())
        }
    }
    static DUMMY: DummyChip = DummyChip;

    static mut HITS: u32 = 0;
    fn handler(_v: u32, _t: usize) {
        unsafe { HITS += 1 };
    }

    #[test]
    fn request_then_dispatch_then_free() {
        let v = alloc_virq_and_desc(5, &DUMMY).unwrap();
        request_irq(v, handler, IrqFlags::empty(), "test", 0xABCD).unwrap();
        generic_handle_irq(v);
        assert_eq!(unsafe { HITS }, 1);
        with_desc(v, |d| assert_eq!(d.counters.fires, 1));
        free_irq(v, 0xABCD);
        with_desc(v, |d| assert!(d.action.is_none()));
        dispose_virq_and_desc(v);
    }

    #[test]
    fn nested_disable_enable() {
        let v = alloc_virq_and_desc(6, &DUMMY).unwrap();
        request_irq(v, handler, IrqFlags::empty(), "test2", 1).unwrap();
        disable_irq(v);
        disable_irq(v);
        with_desc(v, |d| assert_eq!(d.depth, 2));
        enable_irq(v);
        with_desc(v, |d| assert_eq!(d.depth, 1));
        enable_irq(v);
        with_desc(v, |d| assert_eq!(d.depth, 0));
        enable_irq(v); // clamps
        with_desc(v, |d| assert_eq!(d.depth, 0));
        free_irq(v, 1);
        dispose_virq_and_desc(v);
    }
}

//! IRQ domains: hwirq <-> virq mapping per controller (C14).

use alloc::{boxed::Box, string::String, vec::Vec};

use spin::Mutex;

use super::{
    chip::IrqChip,
    descriptor::{self, IrqDesc},
    radix::{RadixTree, Tag},
    virq::INVALID,
};
use crate::error::{DomainError, KernelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainType {
    Linear,
    Tree,
    Hierarchy,
}

/// Storage backing the hwirq -> virq lookup; the variant matches the
/// domain's `DomainType`.
enum Mapping {
    Linear(Vec<u32>),
    Tree(RadixTree<u32>),
}

impl Mapping {
    fn get(&self, hwirq: u32) -> Option<u32> {
        match self {
            Mapping::Linear(v) => v.get(hwirq as usize).copied().filter(|&x| x != INVALID),
            Mapping::Tree(t) => t.lookup(hwirq as u64).copied(),
        }
    }

    fn set(&mut self, hwirq: u32, virq: u32) -> KernelResult<()> {
        match self {
            Mapping::Linear(v) => {
                let idx = hwirq as usize;
                if idx >= v.len() {
                    return Err(DomainError::HwirqOutOfRange {
                        hwirq,
                        size: v.len() as u32,
                    }
                    .into());
                }
                v[idx] = virq;
                Ok(())
            }
            Mapping::Tree(t) => {
                t.insert(hwirq as u64, virq)?;
                t.tag_set(hwirq as u64, Tag::Allocated)?;
                Ok(())
            }
        }
    }

    fn clear(&mut self, hwirq: u32) {
        match self {
            Mapping::Linear(v) => {
                if let Some(slot) = v.get_mut(hwirq as usize) {
                    *slot = INVALID;
                }
            }
            Mapping::Tree(t) => {
                t.delete(hwirq as u64);
            }
        }
    }
}

/// A domain's hwirq -> "controller-specific translation" for FDT interrupt
/// specifiers (§4.14). GIC uses 3 cells, APLIC 2, PLIC 1.
pub trait DomainXlate: Send + Sync {
    /// `intspec` is the raw big-endian-decoded u32 cell array from the
    /// `interrupts` property for this domain's `#interrupt-cells`.
    fn xlate(&self, intspec: &[u32]) -> KernelResult<(u32, super::chip::IrqTriggerType)>;
}

struct Inner {
    mapping: Mapping,
}

pub struct IrqDomain {
    pub name: String,
    pub domain_type: DomainType,
    pub chip: &'static dyn IrqChip,
    pub xlate: &'static dyn DomainXlate,
    /// Hierarchy domains forward `alloc`/`activate` to this parent.
    pub parent: Option<&'static IrqDomain>,
    inner: Mutex<Inner>,
}

impl IrqDomain {
    pub fn new_linear(
        name: &str,
        size: usize,
        chip: &'static dyn IrqChip,
        xlate: &'static dyn DomainXlate,
    ) -> Self {
        Self {
            name: String::from(name),
            domain_type: DomainType::Linear,
            chip,
            xlate,
            parent: None,
            inner: Mutex::new(Inner {
                mapping: Mapping::Linear({
                    let mut v = Vec::with_capacity(size);
                    v.resize(size, INVALID);
                    v
                }),
            }),
        }
    }

    pub fn new_tree(name: &str, chip: &'static dyn IrqChip, xlate: &'static dyn DomainXlate) -> Self {
        Self {
            name: String::from(name),
            domain_type: DomainType::Tree,
            chip,
            xlate,
            parent: None,
            inner: Mutex::new(Inner {
                mapping: Mapping::Tree(RadixTree::new()),
            }),
        }
    }

    pub fn new_hierarchy(
        name: &str,
        chip: &'static dyn IrqChip,
        xlate: &'static dyn DomainXlate,
        parent: &'static IrqDomain,
        size: usize,
    ) -> Self {
        Self {
            name: String::from(name),
            domain_type: DomainType::Hierarchy,
            chip,
            xlate,
            parent: Some(parent),
            inner: Mutex::new(Inner {
                mapping: Mapping::Linear({
                    let mut v = Vec::with_capacity(size);
                    v.resize(size, INVALID);
                    v
                }),
            }),
        }
    }

    fn check_hwirq(&self, hwirq: u32) -> KernelResult<()> {
        if hwirq == 0 {
            return Err(DomainError::HwirqZero.into());
        }
        Ok(())
    }

    /// Idempotent: returns the existing virq if `hwirq` is already mapped.
    pub fn create_mapping(&self, hwirq: u32) -> KernelResult<u32> {
        self.check_hwirq(hwirq)?;
        {
            let inner = self.inner.lock();
            if let Some(existing) = inner.mapping.get(hwirq) {
                return Ok(existing);
            }
        }
        let virq = descriptor::alloc_virq_and_desc(hwirq, self.chip)?;
        {
            let mut inner = self.inner.lock();
            if let Err(e) = inner.mapping.set(hwirq, virq) {
                drop(inner);
                descriptor::dispose_virq_and_desc(virq);
                return Err(e);
            }
        }
        if let Some(parent) = self.parent {
            // Hierarchy: the parent's hwirq space is the controller's own
            // "external" cascade line; callers pass the already-translated
            // parent hwirq in via `activate_hierarchy`.
            let _ = parent;
        }
        descriptor::with_desc(virq, |desc: &mut IrqDesc| {
            desc.status.remove(super::descriptor::IrqStatus::DISABLED);
        });
        Ok(virq)
    }

    pub fn find_mapping(&self, hwirq: u32) -> u32 {
        self.inner.lock().mapping.get(hwirq).unwrap_or(INVALID)
    }

    /// Mask, drop the descriptor, free the virq. Double-dispose is ignored.
    pub fn dispose_mapping(&self, virq: u32) {
        let hwirq = descriptor::with_desc(virq, |desc| desc.hwirq);
        let Some(hwirq) = hwirq else { return };
        self.chip.irq_mask(hwirq);
        self.inner.lock().mapping.clear(hwirq);
        descriptor::dispose_virq_and_desc(virq);
    }

    /// Allocate `nr` consecutive virqs (MSI-style bulk path).
    pub fn alloc_irqs(&self, nr: usize) -> KernelResult<u32> {
        let base = super::virq::virq_alloc_range(nr)?;
        for i in 0..nr as u32 {
            if let Err(e) = descriptor::alloc_desc(base + i, INVALID, self.chip) {
                super::virq::virq_free_range(base, nr);
                return Err(e);
            }
        }
        Ok(base)
    }

    pub fn free_irqs(&self, base: u32, nr: usize) {
        for i in 0..nr as u32 {
            descriptor::dispose_virq_and_desc(base + i);
        }
    }

    /// Parse an `interrupts` cell group via this domain's `xlate`, then map it.
    pub fn of_parse_and_map(&self, intspec: &[u32]) -> KernelResult<u32> {
        let (hwirq, trigger) = self.xlate.xlate(intspec)?;
        let virq = self.create_mapping(hwirq)?;
        descriptor::with_desc(virq, |desc| desc.trigger_type = Some(trigger));
        Ok(virq)
    }
}

/// Registry of every domain created during driver probing, so
/// `find_by_name`-style lookups and the default-domain pointer can be
/// resolved without every call site threading a reference through.
static DOMAINS: Mutex<Vec<&'static IrqDomain>> = Mutex::new(Vec::new());
static DEFAULT_DOMAIN: Mutex<Option<&'static IrqDomain>> = Mutex::new(None);

pub fn register_domain(domain: &'static IrqDomain) {
    DOMAINS.lock().push(domain);
}

pub fn set_default_domain(domain: &'static IrqDomain) {
    *DEFAULT_DOMAIN.lock() = Some(domain);
}

pub fn default_domain() -> Option<&'static IrqDomain> {
    *DEFAULT_DOMAIN.lock()
}

pub fn find_domain(name: &str) -> Option<&'static IrqDomain> {
    DOMAINS.lock().iter().find(|d| d.name == name).copied()
}

/// Leak a heap-allocated domain to `'static` so it can be registered; this
/// mirrors the source's process-wide singleton domains (`gic_primary`,
/// `plic_primary`, ...) which live for the remainder of the kernel's
/// lifetime by construction.
pub fn leak_domain(domain: IrqDomain) -> &'static IrqDomain {
    Box::leak(Box::new(domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irq::chip::{ChipFlags, IrqTriggerType};

    struct DummyChip;
    impl IrqChip for DummyChip {
        fn name(&self) -> &'static str {
            "dummy"
        }
        fn flags(&self) -> ChipFlags {
            ChipFlags::empty()
        }
        fn irq_mask(&self, _h: u32) {}
        fn irq_unmask(&self, _h: u32) {}
        fn irq_eoi(&self, _h: u32) {}
        fn irq_set_type(&self, _h: u32, _t: IrqTriggerType) -> KernelResult<()> {
            Ok(())
        }
    }
    static DUMMY: DummyChip = DummyChip;

    struct ThreeCellXlate;
    impl DomainXlate for ThreeCellXlate {
        fn xlate(&self, intspec: &[u32]) -> KernelResult<(u32, IrqTriggerType)> {
            let ty = intspec[0];
            let num = intspec[1];
            let hwirq = if ty == 0 { num + 32 } else { num + 16 };
            Ok((hwirq, IrqTriggerType::LevelHigh))
        }
    }
    static XLATE: ThreeCellXlate = ThreeCellXlate;

    #[test]
    fn linear_mapping_is_idempotent() {
        let d = IrqDomain::new_linear("test-linear", 64, &DUMMY, &XLATE);
        let v1 = d.create_mapping(5).unwrap();
        let v2 = d.create_mapping(5).unwrap();
        assert_eq!(v1, v2);
        assert_eq!(d.find_mapping(5), v1);
        d.dispose_mapping(v1);
        assert_eq!(d.find_mapping(5), INVALID);
    }

    #[test]
    fn linear_rejects_hwirq_zero_and_oob() {
        let d = IrqDomain::new_linear("test-linear2", 4, &DUMMY, &XLATE);
        assert!(d.create_mapping(0).is_err());
        assert!(d.create_mapping(100).is_err());
    }

    #[test]
    fn tree_domain_sparse_mapping() {
        let d = IrqDomain::new_tree("test-tree", &DUMMY, &XLATE);
        let v = d.create_mapping(9000).unwrap();
        assert_eq!(d.find_mapping(9000), v);
    }

    #[test]
    fn xlate_gic_three_cell() {
        let d = IrqDomain::new_linear("gic-like", 300, &DUMMY, &XLATE);
        // SPI 1 -> hwirq 33
        let v = d.of_parse_and_map(&[0, 1, 4]).unwrap();
        assert_eq!(d.find_mapping(33), v);
    }
}

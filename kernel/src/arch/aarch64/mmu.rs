//! ARMv8-A VMSAv8-64 page-table backend (4 KiB granule, 3 walked levels:
//! 1 GiB / 2 MiB / 4 KiB), implementing the architecture-neutral
//! [`crate::mm::ArchMmuOps`] vtable the VMM walks through.

use crate::mm::{ArchMmuOps, PteAttrs};

const ADDR_MASK: u64 = 0x0000_FFFF_FFFF_F000;

const PTE_VALID: u64 = 1 << 0;
const PTE_TABLE_OR_PAGE: u64 = 1 << 1;
const PTE_AF: u64 = 1 << 10;
const PTE_NG: u64 = 1 << 11;
const PTE_AP_RO: u64 = 1 << 7;
const PTE_AP_EL0: u64 = 1 << 6;
const PTE_UXN: u64 = 1 << 54;
const PTE_PXN: u64 = 1 << 53;
const PTE_SH_INNER: u64 = 0b11 << 8;

const ATTRINDX_NORMAL: u64 = 0 << 2;
const ATTRINDX_DEVICE: u64 = 1 << 2;
const ATTRINDX_NONCACHE: u64 = 2 << 2;

/// MAIR_EL1 encoding matching `ATTRINDX_*` above: index 0 normal
/// write-back cacheable, index 1 device-nGnRnE, index 2 normal
/// non-cacheable.
pub const MAIR_EL1_VALUE: u64 = 0x04_00_FF;

fn level_shift(level: u32) -> u32 {
    match level {
        0 => 30,
        1 => 21,
        _ => 12,
    }
}

pub struct Aarch64Mmu;

impl ArchMmuOps for Aarch64Mmu {
    fn pt_levels(&self) -> u32 {
        3
    }

    fn pt_index(&self, va: u64, level: u32) -> usize {
        ((va >> level_shift(level)) & 0x1FF) as usize
    }

    fn is_pte_valid(&self, pte: u64) -> bool {
        pte & PTE_VALID != 0
    }

    fn is_pte_table(&self, pte: u64, level: u32) -> bool {
        level < 2 && self.is_pte_valid(pte) && pte & PTE_TABLE_OR_PAGE != 0
    }

    fn is_pte_block(&self, pte: u64, level: u32) -> bool {
        if !self.is_pte_valid(pte) {
            return false;
        }
        if level < 2 {
            pte & PTE_TABLE_OR_PAGE == 0
        } else {
            true
        }
    }

    fn make_table_pte(&self, next_level_phys: u64) -> u64 {
        (next_level_phys & ADDR_MASK) | PTE_VALID | PTE_TABLE_OR_PAGE
    }

    fn make_block_pte(&self, phys: u64, attrs: PteAttrs, level: u32) -> u64 {
        let leaf_bit = if level == 2 { PTE_TABLE_OR_PAGE } else { 0 };
        (phys & ADDR_MASK) | PTE_VALID | leaf_bit | PTE_AF | self.attrs_to_pte(attrs)
    }

    fn pte_to_phys(&self, pte: u64) -> u64 {
        pte & ADDR_MASK
    }

    fn attrs_to_pte(&self, attrs: PteAttrs) -> u64 {
        let mut pte = PTE_SH_INNER;

        pte |= if attrs.contains(PteAttrs::DEVICE) {
            ATTRINDX_DEVICE
        } else if attrs.contains(PteAttrs::NOCACHE) {
            ATTRINDX_NONCACHE
        } else {
            ATTRINDX_NORMAL
        };

        if !attrs.contains(PteAttrs::WRITE) {
            pte |= PTE_AP_RO;
        }
        if attrs.contains(PteAttrs::USER) {
            pte |= PTE_AP_EL0;
        }
        if !attrs.contains(PteAttrs::GLOBAL) {
            pte |= PTE_NG;
        }
        if !attrs.contains(PteAttrs::EXECUTE) {
            pte |= PTE_UXN | PTE_PXN;
        } else if !attrs.contains(PteAttrs::USER) {
            pte |= PTE_UXN;
        }
        pte
    }

    fn pte_to_attrs(&self, pte: u64) -> PteAttrs {
        let mut attrs = PteAttrs::READ;
        if pte & PTE_AP_RO == 0 {
            attrs |= PteAttrs::WRITE;
        }
        if pte & PTE_AP_EL0 != 0 {
            attrs |= PteAttrs::USER;
        }
        if pte & PTE_NG == 0 {
            attrs |= PteAttrs::GLOBAL;
        }
        if pte & PTE_UXN == 0 {
            attrs |= PteAttrs::EXECUTE;
        }
        match pte & (0b11 << 2) {
            x if x == ATTRINDX_DEVICE => attrs |= PteAttrs::DEVICE,
            x if x == ATTRINDX_NONCACHE => attrs |= PteAttrs::NOCACHE,
            _ => {}
        }
        attrs
    }

    fn block_size(&self, level: u32) -> u64 {
        1u64 << level_shift(level)
    }

    fn get_pt_base(&self) -> u64 {
        let ttbr0: u64;
        // SAFETY: reading TTBR0_EL1 has no side effects.
        unsafe { core::arch::asm!("mrs {}, ttbr0_el1", out(reg) ttbr0) };
        ttbr0 & ADDR_MASK
    }

    unsafe fn set_pt_base(&self, base: u64) {
        // SAFETY: caller guarantees `base` points at a valid root table.
        unsafe {
            core::arch::asm!(
                "msr ttbr0_el1, {0}",
                "isb",
                in(reg) base & ADDR_MASK,
            );
        }
    }

    fn flush_tlb_page(&self, va: u64) {
        // SAFETY: TLB maintenance instructions are always permitted at EL1.
        unsafe {
            core::arch::asm!(
                "dsb ishst",
                "tlbi vaae1is, {0}",
                "dsb ish",
                "isb",
                in(reg) va >> 12,
            );
        }
    }

    fn flush_tlb_all(&self) {
        // SAFETY: TLB maintenance instructions are always permitted at EL1.
        unsafe {
            core::arch::asm!("dsb ishst", "tlbi vmalle1is", "dsb ish", "isb");
        }
    }

    fn barrier(&self) {
        // SAFETY: DSB is always permitted.
        unsafe { core::arch::asm!("dsb ishst") };
    }
}

pub static AARCH64_MMU: Aarch64Mmu = Aarch64Mmu;

/// Configure MAIR_EL1 so the attribute indices `Aarch64Mmu` encodes into
/// each PTE resolve to the intended memory types. Call once before any
/// mapping is installed.
pub fn init_mair() {
    // SAFETY: writing MAIR_EL1 before any page table using it is installed.
    unsafe {
        core::arch::asm!("msr mair_el1, {0}", "isb", in(reg) MAIR_EL1_VALUE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes_match_granule_hierarchy() {
        let ops = Aarch64Mmu;
        assert_eq!(ops.block_size(0), 1 << 30);
        assert_eq!(ops.block_size(1), 1 << 21);
        assert_eq!(ops.block_size(2), 1 << 12);
    }

    #[test]
    fn attrs_round_trip_rw_kernel() {
        let ops = Aarch64Mmu;
        let attrs = PteAttrs::READ | PteAttrs::WRITE | PteAttrs::GLOBAL;
        let pte = ops.make_block_pte(0x1000_0000, attrs, 2);
        let back = ops.pte_to_attrs(pte);
        assert!(back.contains(PteAttrs::WRITE));
        assert!(back.contains(PteAttrs::GLOBAL));
        assert!(!back.contains(PteAttrs::USER));
    }
}

//! Virtual memory manager (C6): walks and builds page tables entirely
//! through the `ArchMmuOps` vtable so this module stays architecture-neutral.

#![allow(dead_code)]

use spin::Mutex;

use super::page_table::{ArchMmuOps, PteAttrs};
use crate::{
    config::{DMAP_BASE, PAGE_SIZE},
    error::{KernelError, KernelResult},
};

static ARCH_OPS: Mutex<Option<&'static dyn ArchMmuOps>> = Mutex::new(None);

/// Select the arch MMU backend. Called once at boot after CPU feature
/// detection; every later walk goes through this vtable.
pub fn set_arch_ops(ops: &'static dyn ArchMmuOps) {
    *ARCH_OPS.lock() = Some(ops);
}

fn ops() -> &'static dyn ArchMmuOps {
    ARCH_OPS.lock().expect("arch MMU ops not selected")
}

fn slot_ptr(table_phys: u64, idx: usize) -> *mut u64 {
    (table_phys + (idx * 8) as u64) as *mut u64
}

fn read_pte(table_phys: u64, idx: usize) -> u64 {
    // SAFETY: `table_phys` is a live page-table page owned by this address
    // space; `idx` is bounds-checked by the arch's `pt_index`.
    unsafe { *slot_ptr(table_phys, idx) }
}

fn write_pte(table_phys: u64, idx: usize, val: u64) {
    // SAFETY: see `read_pte`.
    unsafe { *slot_ptr(table_phys, idx) = val };
}

/// A single address space's root page table.
pub struct AddressSpace {
    root_phys: u64,
}

impl AddressSpace {
    pub fn new() -> KernelResult<Self> {
        let root_phys = super::pmm::alloc_page_table().ok_or(KernelError::OutOfMemory {
            requested: PAGE_SIZE,
            available: 0,
        })?;
        Ok(Self { root_phys })
    }

    pub fn root_phys(&self) -> u64 {
        self.root_phys
    }

    pub fn map_page(&mut self, va: u64, pa: u64, attrs: PteAttrs) -> KernelResult<()> {
        let ops = ops();
        let levels = ops.pt_levels();
        let mut table = self.root_phys;
        for level in 0..levels {
            let idx = ops.pt_index(va, level);
            if level == levels - 1 {
                let pte = read_pte(table, idx);
                if ops.is_pte_valid(pte) {
                    return Err(KernelError::InvalidAddress { addr: va as usize });
                }
                write_pte(table, idx, ops.make_block_pte(pa, attrs, level));
                ops.flush_tlb_page(va);
                return Ok(());
            }
            let pte = read_pte(table, idx);
            if !ops.is_pte_valid(pte) {
                let next = super::pmm::alloc_page_table().ok_or(KernelError::OutOfMemory {
                    requested: PAGE_SIZE,
                    available: 0,
                })?;
                write_pte(table, idx, ops.make_table_pte(next));
                table = next;
            } else {
                table = ops.pte_to_phys(pte);
            }
        }
        unreachable!("pt_levels() must be >= 1")
    }

    pub fn map_range(&mut self, va: u64, pa: u64, len: u64, attrs: PteAttrs) -> KernelResult<()> {
        let pages = len.div_ceil(PAGE_SIZE as u64);
        for i in 0..pages {
            self.map_page(va + i * PAGE_SIZE as u64, pa + i * PAGE_SIZE as u64, attrs)?;
        }
        Ok(())
    }

    pub fn unmap_page(&mut self, va: u64) -> KernelResult<()> {
        let ops = ops();
        let levels = ops.pt_levels();
        let mut table = self.root_phys;
        for level in 0..levels {
            let idx = ops.pt_index(va, level);
            let pte = read_pte(table, idx);
            if !ops.is_pte_valid(pte) {
                return Err(KernelError::UnmappedMemory { addr: va as usize });
            }
            if level == levels - 1 {
                write_pte(table, idx, 0);
                ops.flush_tlb_page(va);
                return Ok(());
            }
            table = ops.pte_to_phys(pte);
        }
        unreachable!("pt_levels() must be >= 1")
    }

    pub fn unmap_range(&mut self, va: u64, len: u64) -> KernelResult<()> {
        let pages = len.div_ceil(PAGE_SIZE as u64);
        for i in 0..pages {
            self.unmap_page(va + i * PAGE_SIZE as u64)?;
        }
        Ok(())
    }

    pub fn virt_to_phys(&self, va: u64) -> Option<u64> {
        let ops = ops();
        let levels = ops.pt_levels();
        let mut table = self.root_phys;
        for level in 0..levels {
            let idx = ops.pt_index(va, level);
            let pte = read_pte(table, idx);
            if !ops.is_pte_valid(pte) {
                return None;
            }
            if level == levels - 1 {
                return Some(ops.pte_to_phys(pte));
            }
            table = ops.pte_to_phys(pte);
        }
        None
    }

    /// Map `len` bytes of RAM starting at `phys_base` into the direct map
    /// window. Used once at boot to give the kernel a linear view of all RAM.
    pub fn create_dmap(&mut self, phys_base: u64, len: u64, attrs: PteAttrs) -> KernelResult<()> {
        self.map_range(dmap::phys_to_dmap(phys_base).unwrap_or(DMAP_BASE + phys_base), phys_base, len, attrs)
    }
}

/// The kernel's own direct-mapped view of physical RAM.
pub mod dmap {
    use crate::config::DMAP_BASE;

    /// `None` only before the direct map is installed; thereafter every
    /// physical address used by the kernel has a DMAP alias.
    pub fn phys_to_dmap(phys: u64) -> Option<u64> {
        Some(DMAP_BASE.wrapping_add(phys))
    }
}

pub mod tlb {
    #[cfg(target_arch = "aarch64")]
    pub fn flush_address(va: u64) {
        unsafe {
            let page = va >> 12;
            core::arch::asm!("tlbi vae1, {}", in(reg) page);
            core::arch::asm!("dsb sy");
            core::arch::asm!("isb");
        }
    }

    #[cfg(target_arch = "riscv64")]
    pub fn flush_address(va: u64) {
        unsafe {
            core::arch::asm!("sfence.vma {}, zero", in(reg) va);
        }
    }

    #[cfg(not(any(target_arch = "aarch64", target_arch = "riscv64")))]
    pub fn flush_address(_va: u64) {}

    #[cfg(target_arch = "aarch64")]
    pub fn flush_all() {
        unsafe {
            core::arch::asm!("tlbi vmalle1");
            core::arch::asm!("dsb sy");
            core::arch::asm!("isb");
        }
    }

    #[cfg(target_arch = "riscv64")]
    pub fn flush_all() {
        unsafe {
            core::arch::asm!("sfence.vma");
        }
    }

    #[cfg(not(any(target_arch = "aarch64", target_arch = "riscv64")))]
    pub fn flush_all() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::{bootstrap, pmm};

    struct TestOps;
    impl ArchMmuOps for TestOps {
        fn pt_levels(&self) -> u32 {
            2
        }
        fn pt_index(&self, va: u64, level: u32) -> usize {
            ((va >> (12 + (1 - level) * 9)) & 0x1FF) as usize
        }
        fn is_pte_valid(&self, pte: u64) -> bool {
            pte & 1 != 0
        }
        fn is_pte_table(&self, pte: u64, _level: u32) -> bool {
            self.is_pte_valid(pte)
        }
        fn is_pte_block(&self, pte: u64, _level: u32) -> bool {
            self.is_pte_valid(pte)
        }
        fn make_table_pte(&self, next_level_phys: u64) -> u64 {
            next_level_phys | 1
        }
        fn make_block_pte(&self, phys: u64, _attrs: PteAttrs, _level: u32) -> u64 {
            phys | 1
        }
        fn pte_to_phys(&self, pte: u64) -> u64 {
            pte & !0xFFF
        }
        fn attrs_to_pte(&self, _attrs: PteAttrs) -> u64 {
            1
        }
        fn pte_to_attrs(&self, _pte: u64) -> PteAttrs {
            PteAttrs::READ
        }
        fn block_size(&self, _level: u32) -> u64 {
            PAGE_SIZE as u64
        }
        fn get_pt_base(&self) -> u64 {
            0
        }
        unsafe fn set_pt_base(&self, _base: u64) {}
        fn flush_tlb_page(&self, _va: u64) {}
        fn flush_tlb_all(&self) {}
        fn barrier(&self) {}
    }
    static TEST_OPS: TestOps = TestOps;

    fn setup() -> spin::MutexGuard<'static, ()> {
        let guard = super::super::TEST_LOCK.lock();
        pmm::test_reset();
        let win_size = 64 * 1024 * 1024u64;
        let layout = core::alloc::Layout::from_size_align(win_size as usize, 4096).unwrap();
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        let base = ptr as u64;
        bootstrap::init(base + win_size - 4096, base + win_size);
        let banks = [pmm::RamBank { base, size: win_size }];
        pmm::init(base, base + 4096, &banks).unwrap();
        set_arch_ops(&TEST_OPS);
        guard
    }

    #[test]
    fn map_then_translate_then_unmap() {
        let _guard = setup();
        let mut space = AddressSpace::new().unwrap();
        let pa = pmm::alloc_page().unwrap();
        space.map_page(0x2000_0000, pa, PteAttrs::READ | PteAttrs::WRITE).unwrap();
        assert_eq!(space.virt_to_phys(0x2000_0000), Some(pa));
        space.unmap_page(0x2000_0000).unwrap();
        assert_eq!(space.virt_to_phys(0x2000_0000), None);
    }
}

//! Architecture-neutral page-table mapping attributes and the per-arch
//! MMU vtable (§4.6) the virtual memory manager walks through.

bitflags::bitflags! {
    /// Architecture-neutral mapping attributes. Each `ArchMmuOps`
    /// implementation folds this into its own PTE encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteAttrs: u32 {
        const READ    = 1 << 0;
        const WRITE   = 1 << 1;
        const EXECUTE = 1 << 2;
        const USER    = 1 << 3;
        const DEVICE  = 1 << 4;
        const NOCACHE = 1 << 5;
        const GLOBAL  = 1 << 6;
    }
}

/// Per-architecture page-table backend selected once at boot. The VMM
/// walks and builds mappings entirely through this vtable so `mm` itself
/// stays architecture-neutral.
pub trait ArchMmuOps: Send + Sync {
    /// Number of page table levels the arch walker descends (e.g. 3 for
    /// ARM64 4 KiB granule start-level-1, 3 for RISC-V Sv39).
    fn pt_levels(&self) -> u32;
    /// Table index extracted from `va` at `level` (0 = root).
    fn pt_index(&self, va: u64, level: u32) -> usize;
    fn is_pte_valid(&self, pte: u64) -> bool;
    fn is_pte_table(&self, pte: u64, level: u32) -> bool;
    fn is_pte_block(&self, pte: u64, level: u32) -> bool;
    fn make_table_pte(&self, next_level_phys: u64) -> u64;
    fn make_block_pte(&self, phys: u64, attrs: PteAttrs, level: u32) -> u64;
    fn pte_to_phys(&self, pte: u64) -> u64;
    fn attrs_to_pte(&self, attrs: PteAttrs) -> u64;
    fn pte_to_attrs(&self, pte: u64) -> PteAttrs;
    fn block_size(&self, level: u32) -> u64;
    fn get_pt_base(&self) -> u64;
    /// # Safety
    /// `base` must be the physical address of a valid, fully-populated
    /// root table for this architecture's MMU.
    unsafe fn set_pt_base(&self, base: u64);
    fn flush_tlb_page(&self, va: u64);
    fn flush_tlb_all(&self);
    fn barrier(&self);
}

//! Memory management: memory map registry, bootstrap bump allocator,
//! physical frame allocator, buddy page allocator, kernel heap, and the
//! architecture-neutral virtual memory manager. Modules are layered in the
//! order they come online during boot: `bootstrap` carves scratch space
//! before the real allocators exist, `pmm` hands out frames from FDT-
//! reported RAM, `buddy` groups pages into orders, `kmalloc` serves small
//! objects out of `buddy` pages, and `vmm` builds the page tables that map
//! all of it.

pub mod bootstrap;
pub mod buddy;
pub mod kmalloc;
pub mod memmap;
pub mod page_table;
pub mod pmm;
pub mod vmm;

pub use memmap::{MemoryRegion, RegionAttrs, RegionType};
pub use page_table::{ArchMmuOps, PteAttrs};
pub use pmm::RamBank;

use crate::error::KernelResult;

/// `pmm`/`buddy`/`kmalloc`/`vmm` each guard real kernel-wide singletons
/// (there is exactly one physical address space to allocate from). Their
/// host unit tests reinitialize those singletons against heap-backed stand-in
/// windows, so tests must not run concurrently with each other; each test's
/// `setup()` takes this lock for the duration of the test.
#[cfg(test)]
pub(crate) static TEST_LOCK: spin::Mutex<()> = spin::Mutex::new(());

/// Bring up the memory subsystem in boot order: reserve a bootstrap
/// scratch window, initialize the PMM over the reported RAM banks, and
/// install the architecture's MMU backend so the VMM can start building
/// address spaces. Called once from the kernel entry point after the FDT
/// has been parsed and memory banks are known.
pub fn init(
    bootstrap_start: u64,
    bootstrap_end: u64,
    kernel_start_phys: u64,
    kernel_end_phys: u64,
    banks: &[RamBank],
    arch_ops: &'static dyn ArchMmuOps,
) -> KernelResult<()> {
    bootstrap::init(bootstrap_start, bootstrap_end);
    pmm::init(kernel_start_phys, kernel_end_phys, banks)?;
    vmm::set_arch_ops(arch_ops);
    Ok(())
}

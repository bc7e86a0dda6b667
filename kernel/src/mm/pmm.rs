//! Physical Memory Manager (C5): a per-RAM-region bitmap allocator of
//! 4 KiB frames. Bit clear = free, bit set = allocated-or-reserved.

use spin::Mutex;

use super::bootstrap;
use crate::{config::PAGE_SIZE, error::KernelError};

const MAX_REGIONS: usize = 8;

/// One physical RAM window reported by the FDT memory nodes.
pub struct PmmRegion {
    base: u64,
    total_frames: usize,
    free_frames: usize,
    /// Raw pointer to a `ceil(total_frames/8)`-byte bitmap, carved from the
    /// bootstrap allocator. SAFETY: the window is exclusively owned by this
    /// region for the kernel's lifetime; no other code touches these bytes.
    bitmap: *mut u8,
}

unsafe impl Send for PmmRegion {}

impl PmmRegion {
    fn frame_of(&self, phys: u64) -> Option<usize> {
        if phys < self.base {
            return None;
        }
        let idx = ((phys - self.base) / PAGE_SIZE as u64) as usize;
        if idx < self.total_frames {
            Some(idx)
        } else {
            None
        }
    }

    fn bit(&self, idx: usize) -> bool {
        // SAFETY: idx < total_frames <= bitmap_bytes * 8, bitmap is a valid
        // owned buffer of bitmap_bytes bytes for the region's lifetime.
        unsafe { (*self.bitmap.add(idx / 8) & (1 << (idx % 8))) != 0 }
    }

    fn set_bit(&mut self, idx: usize) {
        // SAFETY: see `bit`.
        unsafe { *self.bitmap.add(idx / 8) |= 1 << (idx % 8) };
    }

    fn clear_bit(&mut self, idx: usize) {
        // SAFETY: see `bit`.
        unsafe { *self.bitmap.add(idx / 8) &= !(1 << (idx % 8)) };
    }

    fn phys_of(&self, idx: usize) -> u64 {
        self.base + (idx as u64) * PAGE_SIZE as u64
    }

    fn reserve(&mut self, start_idx: usize, count: usize) {
        for idx in start_idx..(start_idx + count).min(self.total_frames) {
            if !self.bit(idx) {
                self.set_bit(idx);
                self.free_frames -= 1;
            }
        }
    }

    fn alloc_one(&mut self) -> Option<u64> {
        for idx in 0..self.total_frames {
            if !self.bit(idx) {
                self.set_bit(idx);
                self.free_frames -= 1;
                return Some(self.phys_of(idx));
            }
        }
        None
    }

    fn alloc_contig(&mut self, n: usize) -> Option<u64> {
        if n == 0 {
            return None;
        }
        let mut run_start = None;
        let mut run_len = 0;
        for idx in 0..self.total_frames {
            if !self.bit(idx) {
                if run_start.is_none() {
                    run_start = Some(idx);
                }
                run_len += 1;
                if run_len == n {
                    let start = run_start.unwrap();
                    for i in start..start + n {
                        self.set_bit(i);
                    }
                    self.free_frames -= n;
                    return Some(self.phys_of(start));
                }
            } else {
                run_start = None;
                run_len = 0;
            }
        }
        None
    }

    fn free_one(&mut self, phys: u64) {
        match self.frame_of(phys) {
            Some(idx) if self.bit(idx) => {
                self.clear_bit(idx);
                self.free_frames += 1;
            }
            Some(_) => {
                crate::log_service::klog(
                    crate::log_service::LogLevel::Error,
                    "pmm",
                    "double free of physical frame",
                );
            }
            None => {}
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PmmStats {
    pub total_frames: usize,
    pub free_frames: usize,
    pub page_table_pages: usize,
}

struct Pmm {
    regions: [Option<PmmRegion>; MAX_REGIONS],
    region_count: usize,
    page_table_pages: usize,
    initialized: bool,
}

impl Pmm {
    const fn new() -> Self {
        Self {
            regions: [const { None }; MAX_REGIONS],
            region_count: 0,
            page_table_pages: 0,
            initialized: false,
        }
    }

    fn region_for(&mut self, phys: u64) -> Option<&mut PmmRegion> {
        self.regions[..self.region_count]
            .iter_mut()
            .flatten()
            .find(|r| r.frame_of(phys).is_some())
    }
}

static PMM: Mutex<Pmm> = Mutex::new(Pmm::new());

/// One RAM bank as reported by the FDT memory nodes (§4.3 `get_memory_info`).
#[derive(Debug, Clone, Copy)]
pub struct RamBank {
    pub base: u64,
    pub size: u64,
}

/// Initialize the PMM: for each bank, reserve the kernel image footprint
/// (in the first bank only) and any prefix below it, carve a bitmap from
/// the bootstrap allocator, and mark that bitmap window used too.
pub fn init(kernel_start_phys: u64, kernel_end_phys: u64, banks: &[RamBank]) -> Result<(), KernelError> {
    let mut pmm = PMM.lock();
    if banks.is_empty() {
        panic!("PMM init with no RAM banks reported by FDT");
    }
    for bank in banks.iter().take(MAX_REGIONS) {
        let total_frames = (bank.size / PAGE_SIZE as u64) as usize;
        let bitmap_bytes = total_frames.div_ceil(8).max(1);
        let bitmap_phys = bootstrap::alloc(bitmap_bytes as u64, 8)?;
        let bitmap = bitmap_phys as *mut u8;
        // SAFETY: bootstrap::alloc hands back a unique, writable window of
        // at least `bitmap_bytes` bytes that nothing else references yet.
        unsafe { core::ptr::write_bytes(bitmap, 0, bitmap_bytes) };
        let mut region = PmmRegion {
            base: bank.base,
            total_frames,
            free_frames: total_frames,
            bitmap,
        };
        if bank.base <= kernel_start_phys && kernel_start_phys < bank.base + bank.size {
            let prefix_frames = ((kernel_start_phys - bank.base) / PAGE_SIZE as u64) as usize;
            let kernel_frames =
                ((kernel_end_phys - kernel_start_phys).div_ceil(PAGE_SIZE as u64)) as usize;
            region.reserve(0, prefix_frames);
            region.reserve(prefix_frames, kernel_frames);
        }
        let idx = pmm.region_count;
        pmm.regions[idx] = Some(region);
        pmm.region_count += 1;
    }
    pmm.initialized = true;
    Ok(())
}

pub fn alloc_page() -> Option<u64> {
    let mut pmm = PMM.lock();
    let count = pmm.region_count;
    for r in pmm.regions[..count].iter_mut().flatten() {
        if let Some(p) = r.alloc_one() {
            return Some(p);
        }
    }
    None
}

/// Like `alloc_page`, but zeroes the frame through the DMAP (when live) and
/// accounts it as a page-table page.
pub fn alloc_page_table() -> Option<u64> {
    let p = alloc_page()?;
    PMM.lock().page_table_pages += 1;
    if let Some(va) = super::vmm::dmap::phys_to_dmap(p) {
        // SAFETY: `va` is a live DMAP mapping of a frame this call just
        // exclusively allocated.
        unsafe { core::ptr::write_bytes(va as *mut u8, 0, PAGE_SIZE) };
    }
    Some(p)
}

pub fn alloc_pages(n: usize) -> Option<u64> {
    let mut pmm = PMM.lock();
    let count = pmm.region_count;
    for r in pmm.regions[..count].iter_mut().flatten() {
        if let Some(p) = r.alloc_contig(n) {
            return Some(p);
        }
    }
    None
}

pub fn free_page(phys: u64) {
    let mut pmm = PMM.lock();
    if let Some(r) = pmm.region_for(phys) {
        r.free_one(phys);
    }
}

pub fn free_pages(phys: u64, n: usize) {
    for i in 0..n {
        free_page(phys + (i as u64) * PAGE_SIZE as u64);
    }
}

pub fn reserve_region(base: u64, size: u64, _name: &str) {
    let mut pmm = PMM.lock();
    if let Some(r) = pmm.region_for(base) {
        let start_idx = ((base - r.base) / PAGE_SIZE as u64) as usize;
        let count = (size.div_ceil(PAGE_SIZE as u64)) as usize;
        r.reserve(start_idx, count);
    }
}

pub fn is_available(phys: u64) -> bool {
    let mut pmm = PMM.lock();
    match pmm.region_for(phys) {
        Some(r) => !r.bit(r.frame_of(phys).unwrap()),
        None => false,
    }
}

pub fn get_memory_start() -> u64 {
    PMM.lock().regions.iter().flatten().map(|r| r.base).min().unwrap_or(0)
}

pub fn get_memory_end() -> u64 {
    PMM.lock()
        .regions
        .iter()
        .flatten()
        .map(|r| r.base + (r.total_frames as u64) * PAGE_SIZE as u64)
        .max()
        .unwrap_or(0)
}

pub fn get_stats() -> PmmStats {
    let pmm = PMM.lock();
    let mut stats = PmmStats {
        page_table_pages: pmm.page_table_pages,
        ..Default::default()
    };
    for r in pmm.regions.iter().flatten() {
        stats.total_frames += r.total_frames;
        stats.free_frames += r.free_frames;
    }
    stats
}

pub fn is_initialized() -> bool {
    PMM.lock().initialized
}

/// Reset the singleton to its pre-init state. Test-only: lets each test in
/// this crate reinitialize the PMM against its own stand-in memory window
/// instead of accumulating regions across tests.
#[cfg(test)]
pub(crate) fn test_reset() {
    *PMM.lock() = Pmm::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (u64, spin::MutexGuard<'static, ()>) {
        // A real heap-backed window stands in for "physical memory" so the
        // data-structure semantics are host-testable; see DESIGN.md. The PMM
        // is a kernel-wide singleton, so tests hold `TEST_LOCK` and reset it
        // fresh rather than letting state leak between tests.
        let guard = super::super::TEST_LOCK.lock();
        *PMM.lock() = Pmm::new();
        let win_size = 4 * 1024 * 1024u64;
        let layout = core::alloc::Layout::from_size_align(win_size as usize, 4096).unwrap();
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        let base = ptr as u64;
        bootstrap::init(base + win_size - 4096, base + win_size);
        let banks = [RamBank { base, size: win_size }];
        init(base, base + 4096, &banks).unwrap();
        (base, guard)
    }

    #[test]
    fn alloc_free_roundtrip() {
        let (base, _guard) = setup();
        let p = alloc_page().unwrap();
        assert_eq!(p % PAGE_SIZE as u64, 0);
        assert!(!is_available(p));
        free_page(p);
        assert!(is_available(p));
        let _ = base;
    }

    #[test]
    fn contiguous_alloc_succeeds() {
        let _guard = setup();
        let p = alloc_pages(4).unwrap();
        for i in 0..4 {
            assert!(!is_available(p + i * PAGE_SIZE as u64));
        }
        free_pages(p, 4);
    }
}

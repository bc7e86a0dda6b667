//! Memory-map registry (C2): an address-sorted catalog of physical regions.

use bitflags::bitflags;
use spin::Mutex;

use crate::config::MEMMAP_STATIC_POOL_CAPACITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionType {
    Free,
    Reserved,
    KernelCode,
    KernelData,
    KernelBss,
    DeviceMmio,
    Framebuffer,
    AcpiReclaim,
    AcpiNvs,
    BootData,
    DmaCoherent,
    PageTables,
    Secure,
}

impl RegionType {
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Reserved => "reserved",
            Self::KernelCode => "kernel-code",
            Self::KernelData => "kernel-data",
            Self::KernelBss => "kernel-bss",
            Self::DeviceMmio => "device-mmio",
            Self::Framebuffer => "framebuffer",
            Self::AcpiReclaim => "acpi-reclaim",
            Self::AcpiNvs => "acpi-nvs",
            Self::BootData => "boot-data",
            Self::DmaCoherent => "dma-coherent",
            Self::PageTables => "page-tables",
            Self::Secure => "secure",
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionAttrs: u32 {
        const CACHEABLE      = 1 << 0;
        const WRITE_BACK     = 1 << 1;
        const WRITE_THROUGH  = 1 << 2;
        const WRITE_COMBINE  = 1 << 3;
        const EXECUTABLE     = 1 << 4;
        const DMA_CAPABLE    = 1 << 5;
        const SECURE         = 1 << 6;
    }
}

#[derive(Clone, Copy)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: u64,
    pub region_type: RegionType,
    pub attrs: RegionAttrs,
    pub name: [u8; 24],
    pub name_len: u8,
}

impl MemoryRegion {
    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.base + self.size
    }

    pub fn is_device(&self) -> bool {
        matches!(self.region_type, RegionType::DeviceMmio | RegionType::Framebuffer)
    }

    pub fn is_secure(&self) -> bool {
        self.attrs.contains(RegionAttrs::SECURE)
    }

    pub fn is_dma_capable(&self) -> bool {
        self.attrs.contains(RegionAttrs::DMA_CAPABLE)
    }
}

fn pack_name(name: &str) -> ([u8; 24], u8) {
    let mut buf = [0u8; 24];
    let len = name.len().min(24);
    buf[..len].copy_from_slice(&name.as_bytes()[..len]);
    (buf, len as u8)
}

struct Registry {
    regions: [Option<MemoryRegion>; MEMMAP_STATIC_POOL_CAPACITY],
    count: usize,
}

impl Registry {
    const fn new() -> Self {
        Self {
            regions: [None; MEMMAP_STATIC_POOL_CAPACITY],
            count: 0,
        }
    }

    /// Insertion keeps the populated prefix sorted by base (§4.2 invariant).
    fn add(&mut self, region: MemoryRegion) -> bool {
        if self.count >= MEMMAP_STATIC_POOL_CAPACITY {
            return false;
        }
        let mut insert_at = self.count;
        for i in 0..self.count {
            if self.regions[i].unwrap().base > region.base {
                insert_at = i;
                break;
            }
        }
        for i in (insert_at..self.count).rev() {
            self.regions[i + 1] = self.regions[i];
        }
        self.regions[insert_at] = Some(region);
        self.count += 1;
        true
    }

    fn find(&self, addr: u64) -> Option<MemoryRegion> {
        self.regions[..self.count]
            .iter()
            .find_map(|r| r.filter(|r| r.contains(addr)))
    }
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry::new());

pub fn add(base: u64, size: u64, region_type: RegionType, attrs: RegionAttrs, name: &str) -> bool {
    let (packed, len) = pack_name(name);
    REGISTRY.lock().add(MemoryRegion {
        base,
        size,
        region_type,
        attrs,
        name: packed,
        name_len: len,
    })
}

pub fn find(addr: u64) -> Option<MemoryRegion> {
    REGISTRY.lock().find(addr)
}

pub fn type_name(t: RegionType) -> &'static str {
    t.type_name()
}

pub fn count() -> usize {
    REGISTRY.lock().count
}

/// Attribute word consumed by the VMM when mapping a region: memory-type
/// index, access permission, execute-never, shareability, folded into the
/// generic `PteAttrs` bitset used by the arch ops (§4.6).
pub fn pte_attrs_for(region: &MemoryRegion) -> crate::mm::page_table::PteAttrs {
    use crate::mm::page_table::PteAttrs;
    let mut attrs = PteAttrs::READ;
    if !matches!(region.region_type, RegionType::KernelCode) {
        attrs |= PteAttrs::WRITE;
    }
    if region.attrs.contains(RegionAttrs::EXECUTABLE) {
        attrs |= PteAttrs::EXECUTE;
    }
    if region.is_device() {
        attrs |= PteAttrs::DEVICE;
    }
    if !region.attrs.contains(RegionAttrs::CACHEABLE) {
        attrs |= PteAttrs::NOCACHE;
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_keeps_sorted_order() {
        add(0x1000, 0x1000, RegionType::Free, RegionAttrs::CACHEABLE, "b");
        add(0x0, 0x1000, RegionType::Reserved, RegionAttrs::empty(), "a");
        let r = find(0x1500).unwrap();
        assert_eq!(r.name_str(), "b");
        let r = find(0x500).unwrap();
        assert_eq!(r.name_str(), "a");
    }
}

//! Kernel-wide tunable constants.
//!
//! Every numeric constant that more than one subsystem needs to agree on
//! (an allocator and the code that tests it, a domain and the chip it talks
//! to) lives here so the two copies cannot drift apart.

/// Size, in bytes, of a physical/virtual page on every supported target.
pub const PAGE_SIZE: usize = 4096;
pub const PAGE_SHIFT: usize = 12;

/// Maximum number of virtual IRQ numbers the virq bitmap pool can hand out.
pub const MAX_VIRQ: usize = 4096;
/// Sentinel returned by lookups that found no mapping.
pub const IRQ_INVALID: u32 = 0xFFFF_FFFF;

/// Radix tree shape (C15): 6 bits per level, 64-way fan-out, 6 levels deep.
pub const RADIX_TREE_BITS_PER_LEVEL: u32 = 6;
pub const RADIX_TREE_MAP_SIZE: usize = 1 << RADIX_TREE_BITS_PER_LEVEL;
pub const RADIX_TREE_MAP_MASK: u64 = (RADIX_TREE_MAP_SIZE as u64) - 1;
pub const RADIX_TREE_MAX_LEVELS: u32 = 6;
/// Free-list depth before falling back to `kmalloc`.
pub const RADIX_TREE_NODE_POOL: usize = 32;

/// Buddy allocator (C7): highest order, 2^12 pages == 16 MiB.
pub const BUDDY_MAX_ORDER: usize = 12;
pub const PAGE_ALLOC_MIN_CHUNK_SIZE: usize = 2 * 1024 * 1024;
pub const PAGE_ALLOC_MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;
/// Chunk count above which an emptied chunk becomes eligible for return to the PMM.
pub const CLEANUP_THRESHOLD: usize = 4;
/// Minimum order of a chunk's sole free block for that chunk to be reclaimed.
pub const CLEANUP_MIN_ORDER: usize = 8;
/// Floor on live chunks regardless of how little of them is in use.
pub const MIN_CHUNKS_TO_KEEP: usize = 2;
/// Orders at/above this prefer a freshly sized chunk instead of carving an
/// existing one ("large" policy, §4.7).
pub const BUDDY_LARGE_ORDER: usize = 10;
/// Orders at/above this but below `BUDDY_LARGE_ORDER` prefer a 4 MiB chunk
/// ("medium" policy, §4.7).
pub const BUDDY_MEDIUM_ORDER: usize = 7;
pub const BUDDY_MEDIUM_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// kmalloc size classes (C9), smallest to largest.
pub const KMALLOC_SIZE_CLASSES: [usize; 14] = [
    16, 32, 64, 128, 256, 384, 512, 1024, 2048, 4096, 8192, 16384, 32768, 65536,
];
pub const KMALLOC_LARGE_THRESHOLD: usize = 65536;
pub const KMALLOC_LARGE_HEADER_SIZE: usize = 16;
pub const KMALLOC_MAGIC_LIVE: u32 = 0x4B4D_414C; // "KMAL"
pub const KMALLOC_MAGIC_FREE: u32 = 0x4B4D_4652; // "KMFR"

/// Maximum accepted DTB size (§4.3); oversize blobs are a warning, not a
/// hard failure, since some emulators emit generous `totalsize` fields.
pub const FDT_MAX_SIZE: usize = 2 * 1024 * 1024;
pub const FDT_MAGIC: u32 = 0xD00D_FEED;

/// Number of [`crate::device::Device`] slots in the early bump pool used
/// before the permanent, PMM-backed registry is built.
pub const DEVICE_EARLY_POOL_CAPACITY: usize = 64;
/// Resources per device in the early pool.
pub const DEVICE_EARLY_MAX_RESOURCES: usize = 8;

/// Default region reserved for the memory-map registry before PMM/slab
/// are available (§4.2).
pub const MEMMAP_STATIC_POOL_CAPACITY: usize = 32;

/// Virtual offset of the direct map window (§4.6 `create_dmap`). Zero in
/// this tree: physical addresses are real host addresses during the
/// self-hosted test builds, so the direct map is the identity function.
/// A bare-metal boot path would set this to the arch's kernel VA hole base.
pub const DMAP_BASE: u64 = 0;

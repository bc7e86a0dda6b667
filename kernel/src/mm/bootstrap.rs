//! Bootstrap bump allocator (C4).
//!
//! A monotonic bump pointer over a single physical window, used exactly
//! once — to carve out the PMM bitmap(s) — then abandoned. No free.

use spin::Mutex;

use crate::error::{KernelError, KernelResult};

struct Bump {
    cursor: u64,
    end: u64,
}

static BUMP: Mutex<Option<Bump>> = Mutex::new(None);

/// Arm the bump allocator over `[start, end)`. Called once by PMM init.
pub fn init(start: u64, end: u64) {
    *BUMP.lock() = Some(Bump { cursor: start, end });
}

fn align_up(addr: u64, align: u64) -> u64 {
    (addr + align - 1) & !(align - 1)
}

/// Allocate `size` bytes aligned to `align` (power of two). Never crosses
/// the end of the bootstrap window.
pub fn alloc(size: u64, align: u64) -> KernelResult<u64> {
    let mut guard = BUMP.lock();
    let bump = guard.as_mut().ok_or(KernelError::NotInitialized {
        subsystem: "bootstrap allocator",
    })?;
    let aligned = align_up(bump.cursor, align);
    let next = aligned
        .checked_add(size)
        .ok_or(KernelError::OutOfMemory {
            requested: size as usize,
            available: 0,
        })?;
    if next > bump.end {
        return Err(KernelError::OutOfMemory {
            requested: size as usize,
            available: (bump.end - bump.cursor) as usize,
        });
    }
    bump.cursor = next;
    Ok(aligned)
}

pub fn remaining() -> u64 {
    BUMP.lock().as_ref().map(|b| b.end - b.cursor).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_respects_alignment_and_end() {
        let _guard = super::super::TEST_LOCK.lock();
        init(0x1000, 0x2000);
        let a = alloc(8, 64).unwrap();
        assert_eq!(a % 64, 0);
        let b = alloc(0x2000, 16);
        assert!(b.is_err());
    }
}

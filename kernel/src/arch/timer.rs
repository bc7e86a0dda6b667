//! Architecture-independent timer interface

/// Get current timer tick count
pub fn get_ticks() -> u64 {
    #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
    {
        crate::arch::riscv::timer::get_ticks()
    }

    #[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
    {
        0
    }
}

/// Ticks per millisecond for the architecture's free-running counter.
/// ARM generic timer and the RISC-V `mtime`/`time` CSR both run at a
/// board-fixed frequency; 1 MHz is what QEMU's virt machine reports for
/// both, so ticks and microseconds coincide.
const TICKS_PER_MS: u64 = 1_000;

/// Current time since boot in milliseconds, derived from [`get_ticks`].
pub fn get_timestamp_ms() -> u64 {
    get_ticks() / TICKS_PER_MS
}

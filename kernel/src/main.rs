#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]

// This binary only has a real target on bare metal (aarch64/riscv64 with
// no OS underneath). On a hosted target (e.g. running `cargo check` on a
// workstation) it reduces to an empty `main` so the workspace still
// type-checks; the bare-metal code below is unreachable there.
#[cfg(not(target_os = "none"))]
fn main() {}

#[cfg(target_os = "none")]
extern crate alloc;

#[cfg(target_os = "none")]
use core::panic::PanicInfo;

#[cfg(target_os = "none")]
#[macro_use]
mod print;

#[cfg(target_os = "none")]
mod arch;
#[cfg(target_os = "none")]
mod config;
#[cfg(target_os = "none")]
mod device;
#[cfg(target_os = "none")]
mod error;
#[cfg(target_os = "none")]
mod irq;
#[cfg(target_os = "none")]
mod log_service;
#[cfg(target_os = "none")]
mod mm;
#[cfg(target_os = "none")]
mod serial;
#[cfg(target_os = "none")]
mod simple_alloc_unsafe;
#[cfg(target_os = "none")]
mod sync;

#[cfg(target_os = "none")]
use log_service::{klog, LogLevel};
#[cfg(target_os = "none")]
use simple_alloc_unsafe::{LockedUnsafeBumpAllocator, UnsafeBumpAllocator};

#[cfg(target_os = "none")]
#[global_allocator]
static ALLOCATOR: UnsafeBumpAllocator = UnsafeBumpAllocator::new();
#[cfg(target_os = "none")]
static LOCKED_ALLOCATOR: LockedUnsafeBumpAllocator = LockedUnsafeBumpAllocator::empty();

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    klog(LogLevel::Error, "panic", "kernel panic");
    let _ = info;
    arch::halt();
}

#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    let _ = layout;
    arch::halt();
}

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
const DRAM_BASE: u64 = 0x4000_0000;
#[cfg(all(target_os = "none", target_arch = "riscv64"))]
const DRAM_BASE: u64 = 0x8000_0000;

#[cfg(target_os = "none")]
const DRAM_SIZE: u64 = 128 * 1024 * 1024;
#[cfg(target_os = "none")]
const BOOTSTRAP_WINDOW: u64 = 2 * 1024 * 1024;
#[cfg(target_os = "none")]
const KERNEL_IMAGE_BUDGET: u64 = 16 * 1024 * 1024;

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
fn arch_mmu_ops() -> &'static dyn mm::ArchMmuOps {
    arch::aarch64::mmu::init_mair();
    &arch::aarch64::mmu::AARCH64_MMU
}

#[cfg(all(target_os = "none", target_arch = "riscv64"))]
fn arch_mmu_ops() -> &'static dyn mm::ArchMmuOps {
    &arch::riscv64::mmu::SV39_MMU
}

#[cfg(target_os = "none")]
#[allow(dead_code)]
fn get_allocator() -> &'static LockedUnsafeBumpAllocator {
    &LOCKED_ALLOCATOR
}

/// Kernel C entry point. `boot.S`/`boot.rs` clear BSS, set up an initial
/// stack, then jump here with MMU off and identity mapping assumed by the
/// bootstrap allocator. Called once, never returns.
#[cfg(target_os = "none")]
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    log_service::log_init();
    klog(LogLevel::Info, "boot", "kernel starting");

    arch::init();

    // Fallback RAM description used until the FDT-reported memory map
    // feeds real banks through this same path.
    let banks = [mm::RamBank {
        base: DRAM_BASE,
        size: DRAM_SIZE,
    }];
    let bootstrap_start = DRAM_BASE;
    let bootstrap_end = DRAM_BASE + BOOTSTRAP_WINDOW;
    let kernel_start = bootstrap_end;
    let kernel_end = kernel_start + KERNEL_IMAGE_BUDGET;

    if mm::init(
        bootstrap_start,
        bootstrap_end,
        kernel_start,
        kernel_end,
        &banks,
        arch_mmu_ops(),
    )
    .is_err()
    {
        klog(LogLevel::Error, "boot", "memory init failed");
        arch::halt();
    }

    klog(LogLevel::Info, "boot", "kernel ready");

    loop {
        arch::idle();
    }
}

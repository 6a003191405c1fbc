//! Memory core of a small multi-hart RISC-V kernel
//!
//! - [`mm::FrameAllocator`] hands out zeroed 4 KiB frames from a kernel and a
//!   user region.
//! - [`mm::PageTable`] builds, walks and tears down SV39 page tables made of
//!   kernel-region frames.
//! - [`mm::KernelSpace`] identity-maps the kernel and activates it per hart.
//!
//! On `riscv64` bare metal, `boot` wires these into the running kernel.

#![cfg_attr(not(test), no_std)]

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
#[macro_use]
mod console;

#[cfg(feature = "board_qemu")]
#[path = "boards/qemu.rs"]
mod board;

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub mod boot;
pub mod config;
pub mod logging;
pub mod mm;
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod sbi;
pub mod sync;

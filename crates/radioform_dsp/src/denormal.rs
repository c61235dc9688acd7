//! Hardware denormal suppression.
//!
//! Denormal (subnormal) floats can slow arithmetic by 10-100x on common
//! CPUs, and IIR feedback paths decay straight into them. Flush-to-zero /
//! denormals-are-zero mode makes the hardware round them to zero instead.
//!
//! The mode is per-thread. [`DspEngine::new`](crate::DspEngine::new) enables
//! it on the constructing thread; the audio thread should call
//! [`enable_denormal_suppression`] once at its own initialisation too.

/// Enable FTZ/DAZ on the calling thread. No-op on architectures without a
/// denormal control bit.
pub fn enable_denormal_suppression() {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::{_mm_getcsr, _mm_setcsr};
        // MXCSR: FTZ is bit 15, DAZ is bit 6.
        _mm_setcsr(_mm_getcsr() | 0x8040);
    }

    #[cfg(target_arch = "aarch64")]
    unsafe {
        // FPCR: FZ is bit 24.
        let mut fpcr: u64;
        core::arch::asm!("mrs {}, fpcr", out(reg) fpcr);
        fpcr |= 1 << 24;
        core::arch::asm!("msr fpcr, {}", in(reg) fpcr);
    }
}

/// Restore default IEEE-754 subnormal handling on the calling thread.
pub fn disable_denormal_suppression() {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use core::arch::x86_64::{_mm_getcsr, _mm_setcsr};
        _mm_setcsr(_mm_getcsr() & !0x8040);
    }

    #[cfg(target_arch = "aarch64")]
    unsafe {
        let mut fpcr: u64;
        core::arch::asm!("mrs {}, fpcr", out(reg) fpcr);
        fpcr &= !(1 << 24);
        core::arch::asm!("msr fpcr, {}", in(reg) fpcr);
    }
}

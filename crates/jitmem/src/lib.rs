//! Executable memory for generated routines.
mod region;

#[cfg(target_family = "windows")]
use windows::Win32::System::{
    Diagnostics::Debug::FlushInstructionCache, Threading::GetCurrentProcess,
};

#[cfg(target_os = "macos")]
unsafe extern "C" {
    unsafe fn sys_icache_invalidate(start: *mut std::ffi::c_void, len: usize);
}

use crate::region::Region;

#[rustfmt::skip]
pub use crate::region::Protection;

/// An exclusively owned block of executable code.
///
/// The backing pages are writable only while `new` copies the code in; they
/// are sealed read-execute before `new` returns and stay that way until the
/// buffer is dropped, which unmaps them.
pub struct CodeBuffer {
    region: Region,
    len: usize,
}

impl CodeBuffer {
    /// Maps a fresh region, fills it with `code` and seals it.
    pub fn new(code: &[u8]) -> Self {
        assert!(!code.is_empty());

        let region = Region::new(code.len());
        region.protect(Protection::ReadWrite);

        // SAFETY: the region is at least `code.len()` bytes long and writable,
        // and the two allocations cannot overlap
        unsafe { std::ptr::copy_nonoverlapping(code.as_ptr(), region.as_ptr(), code.len()) };

        region.protect(Protection::ReadExec);

        #[cfg(target_family = "windows")]
        unsafe {
            let process = GetCurrentProcess();
            FlushInstructionCache(process, Some(region.as_ptr().cast()), code.len()).unwrap();
        }

        #[cfg(target_os = "macos")]
        unsafe {
            sys_icache_invalidate(region.as_ptr().cast(), code.len());
        }

        Self {
            region,
            len: code.len(),
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.region.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

// SAFETY: the contents are immutable once sealed
unsafe impl Send for CodeBuffer {}
unsafe impl Sync for CodeBuffer {}

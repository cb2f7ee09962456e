#[cfg(target_family = "unix")]
use rustix::mm::{self as mman, MapFlags, ProtFlags};
#[cfg(target_family = "windows")]
use windows::Win32::System::Memory;

// TODO: don't assume 4 KiB pages
const PAGE_SIZE: usize = 4 * bytesize::KIB as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    ReadExec,
    ReadWrite,
}

/// A memory mapped region, unmapped on drop.
pub struct Region {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: changing the protection can be done from any thread
unsafe impl Send for Region {}

impl Region {
    /// Maps a new inaccessible region of at least `len` bytes.
    pub fn new(len: usize) -> Self {
        let len = len.next_multiple_of(PAGE_SIZE);

        // SAFETY: the pointer is null, so the kernel picks the placement
        #[cfg(target_family = "unix")]
        let region = unsafe {
            mman::mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::empty(),
                MapFlags::PRIVATE,
            )
        }
        .unwrap();

        #[cfg(target_family = "windows")]
        let region = unsafe {
            Memory::VirtualAlloc(
                None,
                len,
                Memory::MEM_RESERVE | Memory::MEM_COMMIT,
                Memory::PAGE_NOACCESS,
            )
        };

        Self {
            ptr: region.cast(),
            len,
        }
    }

    /// Changes the protection of this region to `protection`.
    pub fn protect(&self, protection: Protection) {
        #[cfg(target_family = "unix")]
        {
            use rustix::mm::MprotectFlags;

            let flags = match protection {
                Protection::ReadExec => MprotectFlags::READ | MprotectFlags::EXEC,
                Protection::ReadWrite => MprotectFlags::READ | MprotectFlags::WRITE,
            };

            // SAFETY: this region has been previously mapped by `new`, which makes it safe
            // to call `mprotect` on
            unsafe { mman::mprotect(self.ptr.cast(), self.len, flags).unwrap() }
        }

        #[cfg(target_family = "windows")]
        {
            let mut prev = Memory::PAGE_PROTECTION_FLAGS(0);
            let flags = match protection {
                Protection::ReadExec => Memory::PAGE_EXECUTE_READ,
                Protection::ReadWrite => Memory::PAGE_READWRITE,
            };

            unsafe {
                Memory::VirtualProtect(self.ptr.cast(), self.len, flags, &raw mut prev).unwrap()
            }
        }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: the region was mapped by `new` with this exact length
        #[cfg(target_family = "unix")]
        unsafe {
            mman::munmap(self.ptr.cast(), self.len).unwrap()
        }

        #[cfg(target_family = "windows")]
        unsafe {
            Memory::VirtualFree(self.ptr.cast(), 0, Memory::MEM_RELEASE).unwrap()
        }
    }
}

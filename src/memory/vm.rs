//! Virtual memory primitives: reserve, commit, decommit, protect, release.
//!
//! Every call operates on whole pages. Addresses passed to the `unsafe`
//! functions must come from [`reserve`] and stay inside the reserved range.

use std::io;
use std::ptr::NonNull;
use std::sync::OnceLock;

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Access rights for committed pages. The empty set means no access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protection: u32 {
        const READ = 0b01;
        const WRITE = 0b10;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// Errors reported by the platform memory layer.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("Failed to reserve {size} bytes of address space: {source}")]
    Reserve { size: usize, source: io::Error },

    #[error("Failed to commit {size} bytes at {addr:#x}: {source}")]
    Commit { addr: usize, size: usize, source: io::Error },

    #[error("Failed to decommit {size} bytes at {addr:#x}: {source}")]
    Decommit { addr: usize, size: usize, source: io::Error },

    #[error("Failed to protect {size} bytes at {addr:#x}: {source}")]
    Protect { addr: usize, size: usize, source: io::Error },

    #[error("Failed to release {size} bytes at {addr:#x}: {source}")]
    Release { addr: usize, size: usize, source: io::Error },

    #[error("Region exhausted: requested {requested} bytes, capacity {capacity} bytes")]
    CapacityExceeded { requested: usize, capacity: usize },
}

/// System page size, queried once.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(sys::page_size)
}

/// Round `size` up to a whole number of pages.
pub fn round_up_to_page(size: usize) -> usize {
    size.next_multiple_of(page_size())
}

/// Returns true if `addr` lies on a page boundary.
pub fn is_page_aligned(addr: usize) -> bool {
    addr % page_size() == 0
}

/// Reserve `size` bytes (rounded up to pages) of inaccessible address space.
pub fn reserve(size: usize) -> Result<NonNull<u8>, VmError> {
    let size = round_up_to_page(size.max(1));
    sys::reserve(size).map_err(|source| VmError::Reserve { size, source })
}

/// Make `[ptr, ptr + size)` accessible with `prot`.
///
/// # Safety
/// The range must lie inside a region obtained from [`reserve`].
pub unsafe fn commit(ptr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError> {
    debug_assert!(is_page_aligned(ptr.as_ptr() as usize));
    let size = round_up_to_page(size);
    sys::commit(ptr, size, prot).map_err(|source| VmError::Commit {
        addr: ptr.as_ptr() as usize,
        size,
        source,
    })
}

/// Return the physical pages behind `[ptr, ptr + size)` to the system.
/// The range reads back as zeroes after the next [`commit`].
///
/// # Safety
/// The range must lie inside a region obtained from [`reserve`] and must not
/// be referenced afterwards until recommitted.
pub unsafe fn decommit(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
    debug_assert!(is_page_aligned(ptr.as_ptr() as usize));
    let size = round_up_to_page(size);
    sys::decommit(ptr, size).map_err(|source| VmError::Decommit {
        addr: ptr.as_ptr() as usize,
        size,
        source,
    })
}

/// Change the access rights of committed pages.
///
/// # Safety
/// The range must be committed. Revoking write access while a `&mut`
/// borrow of the range is live is undefined behavior.
pub unsafe fn protect(ptr: NonNull<u8>, size: usize, prot: Protection) -> Result<(), VmError> {
    debug_assert!(is_page_aligned(ptr.as_ptr() as usize));
    let size = round_up_to_page(size);
    sys::protect(ptr, size, prot).map_err(|source| VmError::Protect {
        addr: ptr.as_ptr() as usize,
        size,
        source,
    })
}

/// Give a whole reservation back to the system.
///
/// # Safety
/// `ptr`/`size` must describe exactly one region returned by [`reserve`];
/// nothing may reference it afterwards.
pub unsafe fn release(ptr: NonNull<u8>, size: usize) -> Result<(), VmError> {
    let size = round_up_to_page(size.max(1));
    sys::release(ptr, size).map_err(|source| VmError::Release {
        addr: ptr.as_ptr() as usize,
        size,
        source,
    })
}

#[cfg(unix)]
mod sys {
    use super::Protection;
    use std::io;
    use std::ptr::{self, NonNull};

    pub fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size <= 0 {
            4096
        } else {
            size as usize
        }
    }

    fn native(prot: Protection) -> libc::c_int {
        let mut flags = libc::PROT_NONE;
        if prot.contains(Protection::READ) {
            flags |= libc::PROT_READ;
        }
        if prot.contains(Protection::WRITE) {
            flags |= libc::PROT_WRITE;
        }
        flags
    }

    fn map_none(addr: *mut libc::c_void, size: usize, fixed: bool) -> io::Result<NonNull<u8>> {
        let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
        if fixed {
            flags |= libc::MAP_FIXED;
        }
        // SAFETY: anonymous mapping; with MAP_FIXED the caller guarantees the
        // range belongs to one of our reservations.
        let p = unsafe { libc::mmap(addr, size, libc::PROT_NONE, flags, -1, 0) };
        if p == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(p.cast()).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
    }

    pub fn reserve(size: usize) -> io::Result<NonNull<u8>> {
        map_none(ptr::null_mut(), size, false)
    }

    pub unsafe fn commit(p: NonNull<u8>, size: usize, prot: Protection) -> io::Result<()> {
        protect(p, size, prot)
    }

    pub unsafe fn decommit(p: NonNull<u8>, size: usize) -> io::Result<()> {
        // Remapping drops the old pages; the fresh mapping is zero-filled.
        map_none(p.as_ptr().cast(), size, true).map(|_| ())
    }

    pub unsafe fn protect(p: NonNull<u8>, size: usize, prot: Protection) -> io::Result<()> {
        if libc::mprotect(p.as_ptr().cast(), size, native(prot)) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub unsafe fn release(p: NonNull<u8>, size: usize) -> io::Result<()> {
        if libc::munmap(p.as_ptr().cast(), size) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(windows)]
mod sys {
    use super::Protection;
    use std::io;
    use std::ptr::{self, NonNull};

    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE,
        MEM_RESERVE, PAGE_NOACCESS, PAGE_PROTECTION_FLAGS, PAGE_READONLY, PAGE_READWRITE,
    };
    use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

    pub fn page_size() -> usize {
        // SAFETY: GetSystemInfo fills the provided struct.
        let info = unsafe {
            let mut info: SYSTEM_INFO = std::mem::zeroed();
            GetSystemInfo(&mut info);
            info
        };
        info.dwPageSize as usize
    }

    fn native(prot: Protection) -> PAGE_PROTECTION_FLAGS {
        if prot.contains(Protection::WRITE) {
            PAGE_READWRITE
        } else if prot.contains(Protection::READ) {
            PAGE_READONLY
        } else {
            PAGE_NOACCESS
        }
    }

    pub fn reserve(size: usize) -> io::Result<NonNull<u8>> {
        // SAFETY: reserving fresh address space has no preconditions.
        let p = unsafe { VirtualAlloc(ptr::null(), size, MEM_RESERVE, PAGE_NOACCESS) };
        NonNull::new(p.cast()).ok_or_else(io::Error::last_os_error)
    }

    pub unsafe fn commit(p: NonNull<u8>, size: usize, prot: Protection) -> io::Result<()> {
        let r = VirtualAlloc(p.as_ptr().cast(), size, MEM_COMMIT, native(prot));
        if r.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub unsafe fn decommit(p: NonNull<u8>, size: usize) -> io::Result<()> {
        if VirtualFree(p.as_ptr().cast(), size, MEM_DECOMMIT) == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub unsafe fn protect(p: NonNull<u8>, size: usize, prot: Protection) -> io::Result<()> {
        let mut old: PAGE_PROTECTION_FLAGS = 0;
        if VirtualProtect(p.as_ptr().cast(), size, native(prot), &mut old) == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub unsafe fn release(p: NonNull<u8>, _size: usize) -> io::Result<()> {
        if VirtualFree(p.as_ptr().cast(), 0, MEM_RELEASE) == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

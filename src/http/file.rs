//! Static file resolution.
//!
//! A request target is appended to the document root as-is. There is no URL
//! decoding, no query-string stripping, and no protection against `..`
//! segments; targets are expected to come from trusted clients.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use crate::http::response::Outcome;

/// A read-only, private memory mapping of a whole file.
///
/// The mapping is released when the value is dropped. Empty files are
/// represented without a mapping.
pub struct FileMapping {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is read-only and owned exclusively by this value.
unsafe impl Send for FileMapping {}
unsafe impl Sync for FileMapping {}

impl FileMapping {
    /// Maps the first `len` bytes of `file`.
    pub fn map(file: &File, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned a null address"))?;
        Ok(Self { ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes until munmap in Drop.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for FileMapping {
    fn drop(&mut self) {
        if self.len > 0 {
            unsafe {
                libc::munmap(self.ptr.as_ptr().cast(), self.len);
            }
        }
    }
}

impl fmt::Debug for FileMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileMapping").field("len", &self.len).finish()
    }
}

/// Joins a target onto the document root by plain concatenation.
pub fn real_path(doc_root: &Path, target: &str) -> PathBuf {
    let mut path = doc_root.as_os_str().to_os_string();
    path.push(target);
    PathBuf::from(path)
}

/// Classifies the file behind `target` and maps it if it can be served.
///
/// The world-read bit is checked before the directory check, so a directory
/// without it yields [`Outcome::Forbidden`] rather than
/// [`Outcome::BadRequest`].
pub fn resolve(doc_root: &Path, target: &str) -> Outcome {
    let path = real_path(doc_root, target);

    let meta = match fs::metadata(&path) {
        Ok(meta) => meta,
        Err(_) => return Outcome::NoResource,
    };

    if meta.permissions().mode() & (libc::S_IROTH as u32) == 0 {
        return Outcome::Forbidden;
    }
    if meta.is_dir() {
        return Outcome::BadRequest;
    }

    let mapped = File::open(&path).and_then(|file| {
        let len = usize::try_from(meta.len()).map_err(io::Error::other)?;
        FileMapping::map(&file, len)
    });

    match mapped {
        Ok(mapping) => Outcome::FileReady(mapping),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to map file");
            Outcome::InternalError
        }
    }
}

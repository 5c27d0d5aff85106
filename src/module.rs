//! Process module introspection and section-scoped scanning
//!
//! Thin collaborator over the scan engine: it resolves a loaded image and the
//! byte range of a named section, then hands the range to the core entry
//! points. The engine itself never parses executable file formats.

use std::{
    fmt, iter, mem,
    os::windows::prelude::OsStrExt,
    path::{Path, PathBuf},
    string::FromUtf16Error,
};

use pelite::{pe::Pe, pe64::PeView};
use tracing::debug;
use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{FreeLibrary, HMODULE},
        System::{
            LibraryLoader::{GetModuleFileNameW, GetModuleHandleW, LoadLibraryW},
            ProcessStatus::{GetModuleInformation, MODULEINFO},
            Threading::GetCurrentProcess,
        },
    },
};

use crate::scan::{self, ScanAlign, ScanHints, ScanResult, Signature};

/// Module resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// module path has no filename component
    #[error("filename does not exist")]
    BadPath,
    /// filename is not valid utf8
    #[error("failed to convert to utf8")]
    OsStrConversion,
    #[error(transparent)]
    Utf16Conversion(#[from] FromUtf16Error),
    #[error(transparent)]
    Windows(#[from] windows::core::Error),
}

fn to_wide(path: &Path) -> Vec<u16> {
    path.as_os_str()
        .encode_wide()
        .chain(iter::once(0))
        .collect()
}

/// A handle based type which keeps the library loaded, which ensures the
/// base address is always correct as long as the handle exists
#[derive(Debug)]
struct ModuleHandle {
    path: Vec<u16>,
    base: usize,
}

impl ModuleHandle {
    fn new(path: &Path) -> Result<Self, ModuleError> {
        let path = to_wide(path);

        // increase library refcount
        let module = unsafe { LoadLibraryW(PCWSTR(path.as_ptr()))? };

        let slf = Self {
            path,
            base: module.0 as usize,
        };

        Ok(slf)
    }
}

impl Clone for ModuleHandle {
    fn clone(&self) -> Self {
        // increase refcount
        unsafe { LoadLibraryW(PCWSTR(self.path.as_ptr())).expect("load library failed") };

        Self {
            path: self.path.clone(),
            base: self.base,
        }
    }
}

impl Drop for ModuleHandle {
    fn drop(&mut self) {
        _ = unsafe { FreeLibrary(HMODULE(self.base as _)) };
    }
}

/// Represents a loaded module. The dll refcount is increased by 1 for this,
/// so it will not be unloaded while a [`Module`] is alive
#[derive(Clone)]
pub struct Module {
    handle: ModuleHandle,

    pub base: usize,
    pub end: usize,
    pub size: u32,
    pub path: PathBuf,
    pub name: String,
}

unsafe impl Send for Module {}
unsafe impl Sync for Module {}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("base", &self.base)
            .field("end", &self.end)
            .field("size", &self.size)
            .field("path", &self.path)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Module {{ base: {:#x?}, end: {:#x?}, size: {}, path: {}, name: {} }}",
            self.base,
            self.end,
            self.size,
            self.path.display(),
            self.name
        )
    }
}

impl TryFrom<HMODULE> for Module {
    type Error = ModuleError;

    fn try_from(module: HMODULE) -> Result<Self, Self::Error> {
        let mut module_info = MODULEINFO::default();

        unsafe {
            GetModuleInformation(
                GetCurrentProcess(),
                module,
                &mut module_info,
                mem::size_of::<MODULEINFO>() as u32,
            )?;
        }

        let mut buffer = vec![0; 1024];
        let n = unsafe { GetModuleFileNameW(module, &mut buffer) };

        let path: PathBuf = String::from_utf16(&buffer[..n as usize])?.into();
        let name = path
            .file_name()
            .ok_or(ModuleError::BadPath)?
            .to_str()
            .ok_or(ModuleError::OsStrConversion)?
            .to_owned();

        let handle = ModuleHandle::new(&path)?;

        let module = Module {
            handle,
            base: module_info.lpBaseOfDll as usize,
            end: module_info.lpBaseOfDll as usize + module_info.SizeOfImage as usize,
            size: module_info.SizeOfImage,
            path,
            name,
        };

        Ok(module)
    }
}

impl Module {
    /// The module backing the current process executable
    pub fn process() -> Result<Self, ModuleError> {
        let module = unsafe { GetModuleHandleW(PCWSTR::null())? };
        module.try_into()
    }

    /// Load (or re-resolve) a module by path or dll name
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let path = to_wide(path.as_ref());

        let module = unsafe { LoadLibraryW(PCWSTR(path.as_ptr()))? };

        module.try_into()
    }

    /// Byte range of a named section of this module, e.g. `.text`
    ///
    /// Returns `None` when no section carries the name.
    pub fn section_range(&self, section: &str) -> Option<(*const u8, usize)> {
        // SAFETY: base points at a loaded image which the handle refcount
        // keeps mapped for the lifetime of this Module
        let view = unsafe { PeView::module(self.base as *const u8) };

        let header = view
            .section_headers()
            .iter()
            .find(|h| h.name().map(|n| n == section).unwrap_or(false))?;

        let begin = (self.base + header.VirtualAddress as usize) as *const u8;
        let size = header.VirtualSize as usize;

        Some((begin, size))
    }
}

/// Signature scan over one section of a loaded module
///
/// A module scan that is not scoped to a section is wasteful and prone to
/// spurious matches in unrelated data, so only the section-scoped form
/// exists. A missing section behaves as an empty range: no match.
pub fn find_in_section(
    module: &Module,
    section: &str,
    signature: &Signature,
    alignment: ScanAlign,
    hints: ScanHints,
) -> ScanResult {
    let Some((begin, size)) = module.section_range(section) else {
        debug!(module = %module.name, section, "section not found");
        return scan::find_first(&[], signature, alignment, hints);
    };

    debug!(module = %module.name, section, size, "scanning section");

    // SAFETY: the section range lies inside the mapped image, which the
    // module's handle keeps alive for the duration of the call
    unsafe {
        scan::find_first_raw(
            begin,
            begin.wrapping_add(size),
            signature,
            alignment,
            hints,
        )
    }
}

//! Interned path tokens with identity equality.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

/// Opaque token for an interned path. Two keys are equal iff they came
/// from the same interner entry; path contents are never compared.
#[derive(Clone)]
pub struct PathKey(Arc<Path>);

impl PathKey {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<u8>() as usize
    }
}

impl PartialEq for PathKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for PathKey {}

impl Hash for PathKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathKey").field(&&*self.0).finish()
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Table of interned paths. Entries live as long as the interner.
#[derive(Debug, Default)]
pub struct PathInterner {
    table: Mutex<HashSet<Arc<Path>>>,
}

impl PathInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide interner; keys from it are unique for the process.
    pub fn global() -> &'static PathInterner {
        static GLOBAL: OnceLock<PathInterner> = OnceLock::new();
        GLOBAL.get_or_init(PathInterner::new)
    }

    /// Token for `path`. The bytes of the path are kept as they are, except
    /// that on Windows `\` separators are normalized to `/`.
    pub fn intern(&self, path: impl AsRef<Path>) -> PathKey {
        let normalized = normalize(path.as_ref());
        let mut table = self.table.lock();
        if let Some(existing) = table.get(&*normalized) {
            return PathKey(Arc::clone(existing));
        }
        let entry: Arc<Path> = Arc::from(&*normalized);
        table.insert(Arc::clone(&entry));
        PathKey(entry)
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(windows)]
fn normalize(path: &Path) -> Cow<'_, Path> {
    use std::ffi::OsString;
    use std::os::windows::ffi::{OsStrExt, OsStringExt};
    use std::path::PathBuf;

    const BACKSLASH: u16 = b'\\' as u16;
    if !path.as_os_str().encode_wide().any(|c| c == BACKSLASH) {
        return Cow::Borrowed(path);
    }
    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .map(|c| if c == BACKSLASH { u16::from(b'/') } else { c })
        .collect();
    Cow::Owned(PathBuf::from(OsString::from_wide(&wide)))
}

#[cfg(not(windows))]
fn normalize(path: &Path) -> Cow<'_, Path> {
    Cow::Borrowed(path)
}

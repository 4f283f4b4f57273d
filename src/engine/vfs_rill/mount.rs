use crate::LogicalPath;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

// A resolved byte source for one logical path
#[derive(Debug, Clone)]
pub enum VirtualFile
{
    InMemory(Arc<[u8]>),
    Backed(PathBuf), // resolvable to a real file stream
}

// Resolution must be a pure function: no side effects, no ordering requirements,
// and safe for concurrent calls from many worker threads.
pub trait FileResolver: Send + Sync
{
    fn resolve(&self, path: &LogicalPath) -> Option<VirtualFile>;
}

enum MountBackend
{
    Dir(PathBuf),
    Memory(HashMap<LogicalPath, Arc<[u8]>>),
}

struct Mount
{
    prefix: LogicalPath,
    backend: MountBackend,
}
impl Mount
{
    fn resolve(&self, path: &LogicalPath) -> Option<VirtualFile>
    {
        let rest = path.strip_prefix(&self.prefix)?;
        match &self.backend
        {
            MountBackend::Memory(files) =>
            {
                files.get(&rest).map(|bytes| VirtualFile::InMemory(bytes.clone()))
            },
            MountBackend::Dir(root) =>
            {
                // normalization already resolved '..', but an empty remainder would name the root itself
                if rest.is_empty() { return None; }

                let mut real = root.clone();
                for segment in rest.segments()
                {
                    real.push(segment);
                }
                match real.is_file()
                {
                    true => Some(VirtualFile::Backed(real)),
                    false => None, // fall through to older mounts
                }
            },
        }
    }
}

// An ordered mount table; the most recently added mount shadows older ones
#[derive(Default)]
pub struct Vfs
{
    mounts: RwLock<Vec<Mount>>,
}
impl Vfs
{
    #[must_use]
    pub fn new() -> Self { Self::default() }

    // Mount a real directory under a logical prefix
    pub fn mount_dir(&self, prefix: impl Into<LogicalPath>, dir: impl Into<PathBuf>)
    {
        let prefix = prefix.into();
        let dir = dir.into();
        log::debug!("Mounting directory {dir:?} at {prefix:?}");
        self.mounts.write().push(Mount { prefix, backend: MountBackend::Dir(dir) });
    }

    // Mount a set of in-memory files under a logical prefix
    pub fn mount_memory(&self, prefix: impl Into<LogicalPath>, files: impl IntoIterator<Item = (LogicalPath, Arc<[u8]>)>)
    {
        let prefix = prefix.into();
        log::debug!("Mounting in-memory files at {prefix:?}");
        self.mounts.write().push(Mount
        {
            prefix,
            backend: MountBackend::Memory(files.into_iter().collect()),
        });
    }

    #[must_use]
    pub fn mount_count(&self) -> usize
    {
        self.mounts.read().len()
    }
}
impl FileResolver for Vfs
{
    fn resolve(&self, path: &LogicalPath) -> Option<VirtualFile>
    {
        let mounts = self.mounts.read();
        mounts.iter().rev().find_map(|m| m.resolve(path))
    }
}

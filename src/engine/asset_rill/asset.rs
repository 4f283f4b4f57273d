use crate::AspectTypeId;
use std::fmt::{Debug, Formatter};
use vfs_rill::LogicalPath;

// One typed, lazily-populated facet of an Asset's data
pub trait AspectPayload: Sync + Send + 'static
{
    fn aspect_type() -> AspectTypeId;
}

// Identity object for one logical resource path.
// Created exactly once per distinct path by the registry; never mutated after creation
// except through its aspects.
pub struct Asset
{
    path: LogicalPath,
}
impl Asset
{
    pub(crate) fn new(path: LogicalPath) -> Self
    {
        Self { path }
    }

    #[inline] #[must_use]
    pub fn path(&self) -> &LogicalPath
    {
        &self.path
    }
}
impl Debug for Asset
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        Debug::fmt(&self.path, f)
    }
}

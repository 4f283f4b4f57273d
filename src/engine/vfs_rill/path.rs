use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use unicase::UniCase;

// A normalized, slash-separated logical resource identifier.
// Comparison and hashing are case-insensitive; the original casing is preserved for display.
// Stores a plain String internally rather than passing UniCase around publicly
#[derive(Clone)]
pub struct LogicalPath(String);
impl LogicalPath
{
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self
    {
        Self(normalize(raw.as_ref()))
    }

    #[inline] #[must_use]
    pub fn as_str(&self) -> &str
    {
        &self.0
    }

    #[inline] #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.0.is_empty()
    }

    // Does this path start with the (normalized) prefix, on a segment boundary?
    // Compares whole segments: case folding can change a segment's byte length, and
    // slicing at a byte offset could split a multibyte char. Must agree with Eq.
    #[must_use]
    pub fn starts_with(&self, prefix: &LogicalPath) -> bool
    {
        let mut segments = self.segments();
        prefix.segments().all(|p|
        {
            segments.next().is_some_and(|s| UniCase::new(s) == UniCase::new(p))
        })
    }

    // The remainder after a mount prefix, as a new path; None if the prefix doesn't match
    #[must_use]
    pub fn strip_prefix(&self, prefix: &LogicalPath) -> Option<LogicalPath>
    {
        if !self.starts_with(prefix) { return None; }
        let skip = prefix.segments().count();
        let rest: Vec<&str> = self.segments().skip(skip).collect();
        Some(LogicalPath(rest.join("/")))
    }

    #[must_use]
    pub fn segments(&self) -> impl Iterator<Item = &str>
    {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

// collapse separators, drop '.', resolve '..' against prior segments (clamped at the root)
fn normalize(raw: &str) -> String
{
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split(['/', '\\'])
    {
        match segment
        {
            "" | "." => {},
            ".." => { segments.pop(); },
            s => segments.push(s),
        }
    }
    segments.join("/")
}

impl PartialEq for LogicalPath
{
    fn eq(&self, other: &Self) -> bool
    {
        UniCase::new(self.0.as_str()) == UniCase::new(other.0.as_str())
    }
}
impl Eq for LogicalPath { }
impl Hash for LogicalPath
{
    fn hash<H: Hasher>(&self, state: &mut H)
    {
        UniCase::new(self.0.as_str()).hash(state)
    }
}
impl Display for LogicalPath
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}
impl Debug for LogicalPath
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        f.write_fmt(format_args!("vfs:{}", self.0))
    }
}
impl From<&str> for LogicalPath
{
    fn from(raw: &str) -> Self { Self::new(raw) }
}
impl From<String> for LogicalPath
{
    fn from(raw: String) -> Self { Self::new(raw) }
}

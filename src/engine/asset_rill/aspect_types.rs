// All the supported aspect kinds.
// Tags are assigned once here and used as the registry's secondary map key; they stay
// stable across dynamically loaded modules, unlike std::any::TypeId.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum AspectTypeId
{
    Invalid = 0,

    #[cfg(test)]
    Test1 = 1,
    #[cfg(test)]
    Test2 = 2,

    Bytes = 3, // non-descript, untyped data

    Text = 4,
    StructuredValue = 5,

    // decoded by external collaborators
    Image = 6,
    Texture = 7,
    BitmapFont = 8,
    Shader = 9,
}

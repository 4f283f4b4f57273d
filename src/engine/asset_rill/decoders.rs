use super::*;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use vfs_rill::LogicalPath;

// Resolved bytes handed to a decode plugin. Read-only; the decoder's output is the
// only thing that leaves the worker thread.
pub struct DecodeInput<'i>
{
    pub path: &'i LogicalPath,
    pub bytes: &'i [u8],
}

// Diagnostic sink for non-fatal decode complaints; drained to the log by the worker
pub struct DecodeDiag
{
    path: LogicalPath,
    warnings: Vec<String>,
}
impl DecodeDiag
{
    pub(crate) fn new(path: LogicalPath) -> Self
    {
        Self { path, warnings: Vec::new() }
    }

    pub fn warn(&mut self, message: impl Into<String>)
    {
        self.warnings.push(message.into());
    }

    pub(crate) fn flush(self)
    {
        for warning in self.warnings
        {
            log::warn!("While decoding {:?}: {warning}", self.path);
        }
    }
}

// A pluggable unit of decode work: bytes in, payload or error out.
// Runs on a worker thread; must only touch its inputs and job-local memory.
pub trait AspectDecoder<P: AspectPayload>: Sync + Send + 'static
{
    fn decode(&self, input: DecodeInput, diag: &mut DecodeDiag) -> Result<P, Box<dyn Error>>;
}

pub(crate) struct RegisteredAspect
{
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub decoder: Box<dyn Any + Send + Sync>, // holds an Arc<dyn AspectDecoder<P>>
}

// One registration per aspect kind, done once at startup
#[derive(Default)]
pub struct AspectDecoders
{
    pub(crate) registered: HashMap<AspectTypeId, RegisteredAspect>,
}
impl AspectDecoders
{
    #[must_use]
    pub fn add<P: AspectPayload, D: AspectDecoder<P>>(mut self, decoder: D) -> Self
    {
        let tag = P::aspect_type();
        let decoder: Arc<dyn AspectDecoder<P>> = Arc::new(decoder);
        let prior = self.registered.insert(tag, RegisteredAspect
        {
            type_id: TypeId::of::<P>(),
            type_name: short_type_name::<P>(),
            decoder: Box::new(decoder),
        });
        if prior.is_some()
        {
            log::warn!("Replaced the registered decoder for {tag:?}");
        }
        self
    }
}

fn short_type_name<T>() -> &'static str
{
    let name = std::any::type_name::<T>();
    match name.rfind(':')
    {
        None => name,
        Some(i) => &name[(i + 1)..],
    }
}

// --- built-in plugins ---
// Image/Texture/Shader/BitmapFont decoding lives with the collaborators that own
// those formats; only format-agnostic plugins ship here.

#[derive(Debug)]
pub struct RawBytes(pub Arc<[u8]>);
impl AspectPayload for RawBytes
{
    fn aspect_type() -> AspectTypeId { AspectTypeId::Bytes }
}

pub struct RawBytesDecoder;
impl AspectDecoder<RawBytes> for RawBytesDecoder
{
    fn decode(&self, input: DecodeInput, _diag: &mut DecodeDiag) -> Result<RawBytes, Box<dyn Error>>
    {
        Ok(RawBytes(Arc::from(input.bytes)))
    }
}

#[derive(Debug)]
pub struct PlainText(pub String);
impl AspectPayload for PlainText
{
    fn aspect_type() -> AspectTypeId { AspectTypeId::Text }
}

pub struct TextDecoder;
impl AspectDecoder<PlainText> for TextDecoder
{
    fn decode(&self, input: DecodeInput, diag: &mut DecodeDiag) -> Result<PlainText, Box<dyn Error>>
    {
        const BOM: &[u8] = b"\xef\xbb\xbf";
        let bytes = match input.bytes.strip_prefix(BOM)
        {
            Some(rest) =>
            {
                diag.warn("leading UTF-8 BOM stripped");
                rest
            },
            None => input.bytes,
        };
        Ok(PlainText(std::str::from_utf8(bytes)?.to_string()))
    }
}

#[derive(Debug)]
pub struct StructuredValue(pub toml::Value);
impl AspectPayload for StructuredValue
{
    fn aspect_type() -> AspectTypeId { AspectTypeId::StructuredValue }
}

pub struct TomlValueDecoder;
impl AspectDecoder<StructuredValue> for TomlValueDecoder
{
    fn decode(&self, input: DecodeInput, _diag: &mut DecodeDiag) -> Result<StructuredValue, Box<dyn Error>>
    {
        let text = std::str::from_utf8(input.bytes)?;
        Ok(StructuredValue(toml::from_str::<toml::Value>(text)?))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn input<'i>(path: &'i LogicalPath, bytes: &'i [u8]) -> DecodeInput<'i>
    {
        DecodeInput { path, bytes }
    }

    #[test]
    fn text_strips_bom_with_warning()
    {
        let path = LogicalPath::new("notes/readme.txt");
        let mut diag = DecodeDiag::new(path.clone());
        let text = TextDecoder.decode(input(&path, b"\xef\xbb\xbfhi"), &mut diag).unwrap();
        assert_eq!(text.0, "hi");
        assert_eq!(diag.warnings.len(), 1);
    }

    #[test]
    fn text_rejects_invalid_utf8()
    {
        let path = LogicalPath::new("notes/bad.txt");
        let mut diag = DecodeDiag::new(path.clone());
        assert!(TextDecoder.decode(input(&path, &[0xff, 0xfe]), &mut diag).is_err());
    }

    #[test]
    fn structured_value_round()
    {
        let path = LogicalPath::new("config/game.toml");
        let mut diag = DecodeDiag::new(path.clone());
        let value = TomlValueDecoder.decode(input(&path, b"speed = 3"), &mut diag).unwrap();
        assert_eq!(value.0.get("speed").and_then(|v| v.as_integer()), Some(3));

        assert!(TomlValueDecoder.decode(input(&path, b"= broken"), &mut diag).is_err());
    }
}

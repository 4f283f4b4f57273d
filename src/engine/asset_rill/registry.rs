use super::*;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;
use vfs_rill::LogicalPath;

struct AspectEntry
{
    type_id: TypeId, // fail-fast discriminator check only; the map key is the AspectTypeId tag
    aspect: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct RegistryTables
{
    assets: HashMap<LogicalPath, Arc<Asset>>,
    aspects: HashMap<(LogicalPath, AspectTypeId), AspectEntry>,
}

// The single source of truth for "does this resource/aspect already exist".
// Any thread may create assets and aspects (the table mutex serializes them), but only
// the owning thread - the one that constructed the registry - may commit payloads or
// tear the tables down.
pub struct AssetRegistry
{
    owner: ThreadId,
    tables: Mutex<RegistryTables>,
    decoders: HashMap<AspectTypeId, RegisteredAspect>, // immutable after construction
}
impl AssetRegistry
{
    #[must_use]
    pub fn new(decoders: AspectDecoders) -> Self
    {
        Self
        {
            owner: std::thread::current().id(),
            tables: Mutex::new(RegistryTables::default()),
            decoders: decoders.registered,
        }
    }

    #[inline] #[must_use]
    pub fn is_owning_thread(&self) -> bool
    {
        std::thread::current().id() == self.owner
    }

    pub(crate) fn assert_owning_thread(&self, what: &str)
    {
        assert!(self.is_owning_thread(),
            "{what} called off the registry's owning thread ({:?})", self.owner);
    }

    // Idempotent: the same normalized path always yields the identical Asset
    #[must_use]
    pub fn get_or_create_asset(&self, path: impl Into<LogicalPath>) -> Arc<Asset>
    {
        let path = path.into();
        let mut tables = self.tables.lock();
        tables.assets
            .entry(path.clone())
            .or_insert_with(|| Arc::new(Asset::new(path)))
            .clone()
    }

    #[must_use]
    pub fn find_asset(&self, path: &LogicalPath) -> Option<Arc<Asset>>
    {
        self.tables.lock().assets.get(path).cloned()
    }

    // Idempotent per (type, asset): concurrent callers all observe the same aspect,
    // registered (in Invalid state) before this returns
    #[must_use]
    pub fn get_or_create_aspect<P: AspectPayload>(&self, asset: &Arc<Asset>) -> Arc<Aspect<P>>
    {
        self.get_or_create_aspect_entry(asset).1
    }

    #[must_use]
    pub(crate) fn get_or_create_aspect_entry<P: AspectPayload>(&self, asset: &Arc<Asset>) -> (bool /* pre-existing */, Arc<Aspect<P>>)
    {
        let tag = P::aspect_type();
        if let Some(registered) = self.decoders.get(&tag)
        {
            assert_eq!(registered.type_id, TypeId::of::<P>(),
                "Aspect type {tag:?} is registered as {} but was requested through a different payload type",
                registered.type_name);
        }

        let mut tables = self.tables.lock();
        let mut pre_existing = true;
        let entry = tables.aspects
            .entry((asset.path().clone(), tag))
            .or_insert_with(||
            {
                pre_existing = false;
                AspectEntry
                {
                    type_id: TypeId::of::<P>(),
                    aspect: Arc::new(Aspect::<P>::new(asset)),
                }
            });

        // two registrations of the same tag with different payload types is a
        // type-identity bug in the caller, not a recoverable condition
        assert_eq!(entry.type_id, TypeId::of::<P>(),
            "Aspect type {tag:?} of {asset:?} was first requested through an incompatible payload type");

        let aspect = entry.aspect.clone().downcast::<Aspect<P>>()
            .unwrap_or_else(|_| panic!("Aspect entry for {asset:?} does not match its recorded discriminator"));
        (pre_existing, aspect)
    }

    #[must_use]
    pub fn find_aspect<P: AspectPayload>(&self, path: &LogicalPath) -> Option<Arc<Aspect<P>>>
    {
        let tables = self.tables.lock();
        let entry = tables.aspects.get(&(path.clone(), P::aspect_type()))?;
        assert_eq!(entry.type_id, TypeId::of::<P>(),
            "Aspect type {:?} of {path:?} was registered through an incompatible payload type",
            P::aspect_type());
        Some(entry.aspect.clone().downcast::<Aspect<P>>()
            .unwrap_or_else(|_| panic!("Aspect entry for {path:?} does not match its recorded discriminator")))
    }

    pub(crate) fn decoder_for<P: AspectPayload>(&self) -> Option<Arc<dyn AspectDecoder<P>>>
    {
        self.decoders.get(&P::aspect_type())
            .and_then(|registered| registered.decoder.downcast_ref::<Arc<dyn AspectDecoder<P>>>())
            .cloned()
    }

    // Clears every aspect and asset. Only valid when no load job is in flight against
    // them; quiescing the scheduler first is the caller's responsibility.
    pub fn release_all(&self)
    {
        self.assert_owning_thread("release_all");
        let mut tables = self.tables.lock();
        log::debug!("Releasing {} assets / {} aspects",
            tables.assets.len(), tables.aspects.len());
        tables.aspects.clear();
        tables.assets.clear();
    }

    #[must_use]
    pub fn asset_count(&self) -> usize
    {
        self.tables.lock().assets.len()
    }

    #[must_use]
    pub fn aspect_count(&self) -> usize
    {
        self.tables.lock().aspects.len()
    }
}

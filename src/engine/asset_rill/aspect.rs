use super::*;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use vfs_rill::LogicalPath;

// Observable state of one aspect. Readers only ever see a fully-formed payload;
// a LoadJob's half-decoded data lives in the job until commit.
pub enum AspectState<P: AspectPayload>
{
    Invalid,
    Loading,
    Valid(Arc<P>),
    Failed(LoadError),
}
impl<P: AspectPayload> AspectState<P>
{
    #[inline] #[must_use]
    pub fn is_valid(&self) -> bool { matches!(self, Self::Valid(_)) }
}
impl<P: AspectPayload> Clone for AspectState<P>
{
    fn clone(&self) -> Self
    {
        match self
        {
            Self::Invalid => Self::Invalid,
            Self::Loading => Self::Loading,
            Self::Valid(p) => Self::Valid(p.clone()),
            Self::Failed(e) => Self::Failed(e.clone()),
        }
    }
}
impl<P: AspectPayload> Debug for AspectState<P>
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        match self
        {
            Self::Invalid => f.write_str("Invalid"),
            Self::Loading => f.write_str("Loading"),
            Self::Valid(_) => f.write_str("Valid"),
            Self::Failed(e) => f.write_fmt(format_args!("Failed({e:?})")),
        }
    }
}

// One typed facet of an asset's data. At most one aspect of a given type exists per
// asset (enforced by the registry). The payload is immutable once Valid; an explicit
// reload swaps in a whole new payload, it never mutates the old one in place.
pub struct Aspect<P: AspectPayload>
{
    owner: Weak<Asset>, // diagnostics only, never traversed for ownership
    state: ArcSwap<AspectState<P>>,
    active_job: Mutex<Option<Arc<dyn UntypedLoadJob>>>,
    reloading: AtomicBool,
    warned_not_ready: AtomicBool,
}
impl<P: AspectPayload> Aspect<P>
{
    pub(crate) fn new(owner: &Arc<Asset>) -> Self
    {
        Self
        {
            owner: Arc::downgrade(owner),
            state: ArcSwap::from_pointee(AspectState::Invalid),
            active_job: Mutex::new(None),
            reloading: AtomicBool::new(false),
            warned_not_ready: AtomicBool::new(false),
        }
    }

    // A snapshot of the current state; cheap (one Arc clone at most)
    #[must_use]
    pub fn state(&self) -> AspectState<P>
    {
        AspectState::clone(&self.state.load())
    }

    // The decoded payload, if this aspect is Valid.
    // Reading before the aspect is ready is a caller error; it logs once per aspect
    // rather than crashing, to tolerate "not ready yet" polling.
    #[must_use]
    pub fn payload(&self) -> Option<Arc<P>>
    {
        match &**self.state.load()
        {
            AspectState::Valid(p) => Some(p.clone()),
            state =>
            {
                if !self.warned_not_ready.swap(true, Ordering::Relaxed)
                {
                    log::warn!("Read {:?} aspect of {:?} while {state:?}",
                        P::aspect_type(), self.owner_path());
                }
                None
            },
        }
    }

    #[inline] #[must_use]
    pub fn is_valid(&self) -> bool { matches!(&**self.state.load(), AspectState::Valid(_)) }
    #[inline] #[must_use]
    pub fn is_loading(&self) -> bool
    {
        matches!(&**self.state.load(), AspectState::Loading)
            || self.reloading.load(Ordering::Acquire)
    }
    #[must_use]
    pub fn error(&self) -> Option<LoadError>
    {
        match &**self.state.load()
        {
            AspectState::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    // The owning asset's path, if the registry still holds it
    #[must_use]
    pub fn owner_path(&self) -> Option<LogicalPath>
    {
        self.owner.upgrade().map(|a| a.path().clone())
    }

    // Always called with the active_job lock held by the requester, so two concurrent
    // requests for the same aspect cannot both transition it.
    pub(crate) fn begin_loading(&self, reload: bool)
    {
        match &**self.state.load()
        {
            AspectState::Invalid => self.state.store(Arc::new(AspectState::Loading)),
            AspectState::Failed(_) if reload => self.state.store(Arc::new(AspectState::Loading)),
            // readers keep the old payload until the reload commits
            AspectState::Valid(_) if reload => { self.reloading.store(true, Ordering::Release); },
            state => panic!("Illegal load transition for {:?} aspect of {:?}: {state:?}",
                P::aspect_type(), self.owner_path()),
        }
    }

    // Owning thread only (callers enforce); moves the job's result into this aspect
    pub(crate) fn commit(&self, outcome: Result<Arc<P>, LoadError>)
    {
        let was_reloading = self.reloading.swap(false, Ordering::AcqRel);
        match (&**self.state.load(), outcome)
        {
            (AspectState::Loading, Ok(payload)) =>
                self.state.store(Arc::new(AspectState::Valid(payload))),
            (AspectState::Loading, Err(err)) =>
                self.state.store(Arc::new(AspectState::Failed(err))),
            (AspectState::Valid(_), Ok(payload)) if was_reloading =>
                self.state.store(Arc::new(AspectState::Valid(payload))),
            (AspectState::Valid(_), Err(err)) if was_reloading =>
            {
                // a bad reload never replaces a good payload
                log::warn!("Reload of {:?} aspect of {:?} failed, keeping previous payload: {err}",
                    P::aspect_type(), self.owner_path());
            },
            (state, _) => panic!("Commit to {:?} aspect of {:?} in state {state:?}",
                P::aspect_type(), self.owner_path()),
        }
    }

    // Enqueue-failure path (no worker ever ran): decoder missing, scheduler shut down
    pub(crate) fn mark_failed(&self, error: LoadError)
    {
        match &**self.state.load()
        {
            AspectState::Invalid | AspectState::Loading =>
                self.state.store(Arc::new(AspectState::Failed(error))),
            state => panic!("Marking {:?} aspect of {:?} failed in state {state:?}",
                P::aspect_type(), self.owner_path()),
        }
    }

    // Rolls back a Valid->reload transition whose job was never enqueued
    pub(crate) fn abort_reload(&self)
    {
        self.reloading.store(false, Ordering::Release);
    }

    #[must_use]
    pub(crate) fn active_job(&self) -> Option<Arc<dyn UntypedLoadJob>>
    {
        self.active_job.lock().clone()
    }

    pub(crate) fn clear_active_job(&self)
    {
        *self.active_job.lock() = None;
    }

    pub(crate) fn try_lock_for_enqueue(&self) -> Option<parking_lot::MutexGuard<'_, Option<Arc<dyn UntypedLoadJob>>>>
    {
        let guard = self.active_job.lock();
        match guard.is_some()
        {
            true => None, // a job is already in flight
            false => Some(guard),
        }
    }
}

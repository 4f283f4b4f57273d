use super::*;
use std::sync::Arc;
use vfs_rill::{FileResolver, LogicalPath};

pub struct AssetsConfig
{
    pub worker_count: usize,
}
impl Default for AssetsConfig
{
    fn default() -> Self
    {
        Self { worker_count: 1 }
    }
}
impl AssetsConfig
{
    #[cfg(test)]
    pub fn test(worker_count: usize) -> Self
    {
        Self { worker_count }
    }
}

// Consumer-facing face of the loading core. Explicitly constructed (no global
// singletons); its owning thread is the thread that calls new(), and that thread is
// the only one allowed to pump commits, do blocking loads or release the registry.
pub struct Assets
{
    registry: Arc<AssetRegistry>,
    scheduler: JobScheduler,
    resolver: Arc<dyn FileResolver>,
}
impl Assets
{
    #[must_use]
    pub fn new(decoders: AspectDecoders, resolver: Arc<dyn FileResolver>, config: AssetsConfig) -> Self
    {
        let scheduler = JobScheduler::new();
        scheduler.set_worker_count(config.worker_count);
        Self
        {
            registry: Arc::new(AssetRegistry::new(decoders)),
            scheduler,
            resolver,
        }
    }

    #[inline] #[must_use]
    pub fn registry(&self) -> &AssetRegistry
    {
        &self.registry
    }

    // Never blocks. Returns the aspect immediately; if it has never been requested
    // this enqueues exactly one load job for it, even under a concurrent double
    // request. Valid and Failed aspects come back as-is with no new I/O.
    #[must_use]
    pub fn request_aspect<P: AspectPayload>(&self, path: impl Into<LogicalPath>) -> Arc<Aspect<P>>
    {
        let asset = self.registry.get_or_create_asset(path);
        let aspect = self.registry.get_or_create_aspect::<P>(&asset);
        self.enqueue_for(&aspect, asset.path(), false);
        aspect
    }

    // Explicit hot-reload: re-enqueues the aspect's load. Readers keep the previous
    // Valid payload until the new commit lands. Returns false if there is nothing to
    // reload or a load is already in flight.
    pub fn request_reload<P: AspectPayload>(&self, path: impl Into<LogicalPath>) -> bool
    {
        let path = path.into();
        let Some(aspect) = self.registry.find_aspect::<P>(&path) else { return false; };
        self.enqueue_for(&aspect, &path, true)
    }

    fn enqueue_for<P: AspectPayload>(&self, aspect: &Arc<Aspect<P>>, path: &LogicalPath, reload: bool) -> bool
    {
        // the job slot lock serializes competing requesters; the first one in
        // creates the job, everyone else sees it and backs off
        let Some(mut job_slot) = aspect.try_lock_for_enqueue() else { return false; };

        match aspect.state()
        {
            AspectState::Invalid => {},
            AspectState::Valid(_) | AspectState::Failed(_) if reload => {},
            _ => return false, // loading, or settled and not reloading
        }

        let Some(decoder) = self.registry.decoder_for::<P>() else
        {
            if !reload
            {
                log::warn!("No decoder registered for {:?} aspect of {path:?}", P::aspect_type());
                aspect.mark_failed(LoadError::DecoderNotRegistered);
            }
            return false;
        };

        aspect.begin_loading(reload);
        let job: Arc<dyn UntypedLoadJob> = Arc::new(LoadJob::new(
            aspect.clone(),
            path.clone(),
            self.resolver.clone(),
            decoder));
        *job_slot = Some(job.clone());
        drop(job_slot); // enqueue happens outside the job slot lock

        if !self.scheduler.enqueue(job)
        {
            aspect.clear_active_job();
            match aspect.state()
            {
                // Invalid->Loading or Failed->Loading never started, surface the refusal
                AspectState::Loading => aspect.mark_failed(LoadError::Shutdown),
                // a Valid aspect keeps its payload, only the pending swap is dropped
                _ => aspect.abort_reload(),
            }
            log::warn!("Load of {path:?} refused, loading core is shut down");
            return false;
        }
        true
    }

    // Owning-thread startup loads: enqueue if needed, wait for the decode, commit,
    // return the payload. Stalls the frame by design; requires at least one worker.
    pub fn blocking_load<P: AspectPayload>(&self, path: impl Into<LogicalPath>) -> Result<Arc<P>, LoadError>
    {
        self.registry.assert_owning_thread("blocking_load");

        let aspect = self.request_aspect::<P>(path);
        match aspect.state()
        {
            AspectState::Valid(payload) => return Ok(payload),
            AspectState::Failed(err) => return Err(err),
            _ => {},
        }

        if let Some(job) = aspect.active_job()
        {
            job.wait();
        }

        // the terminal signal fires just before the job lands on the commit channel,
        // so a single pump can come up empty; pump until the aspect settles
        loop
        {
            self.pump_commits();
            match aspect.state()
            {
                AspectState::Valid(payload) => return Ok(payload),
                AspectState::Failed(err) => return Err(err),
                // the job is terminal and still registered, its commit is in flight
                _ if aspect.active_job().is_some() => std::thread::yield_now(),
                // nothing to wait on and no commit coming: workers lost
                _ => return Err(LoadError::Shutdown),
            }
        }
    }

    // Owning thread, once per frame/tick: apply every finished job to its aspect.
    // This is the single writer for aspect payloads.
    pub fn pump_commits(&self) -> usize
    {
        self.registry.assert_owning_thread("pump_commits");
        self.scheduler.drain_commits()
    }

    #[inline] #[must_use]
    pub fn n_to_load(&self) -> usize
    {
        self.scheduler.n_to_load()
    }

    // Cumulative count of committed jobs (success or failure)
    #[inline] #[must_use]
    pub fn total_loaded(&self) -> usize
    {
        self.scheduler.total_committed()
    }

    pub fn set_worker_count(&self, count: usize)
    {
        self.scheduler.set_worker_count(count);
    }

    #[inline] #[must_use]
    pub fn worker_count(&self) -> usize
    {
        self.scheduler.worker_count()
    }

    // Prevent any new load from being enqueued and retire the pool.
    // Queued jobs still run; their commits are applied on drop.
    pub fn shutdown(&self)
    {
        self.scheduler.shutdown();
    }

    // Clears every asset and aspect. Callers must quiesce loads first (n_to_load()
    // of zero); this is not internally synchronized against the scheduler.
    pub fn release_all(&self)
    {
        self.registry.release_all();
    }
}
impl Drop for Assets
{
    fn drop(&mut self)
    {
        self.shutdown();

        match self.registry.is_owning_thread()
        {
            true => { self.scheduler.drain_commits(); },
            false => log::warn!("Assets dropped off its owning thread, finished jobs discarded"),
        }

        let leaked = self.scheduler.n_to_load();
        if leaked != 0
        {
            log::error!("! Leak detected: {leaked} load job(s) never committed");
        }
    }
}

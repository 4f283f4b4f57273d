use super::*;
use parking_lot::{Condvar, Mutex};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use vfs_rill::{FileResolver, LogicalPath, VirtualFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError
{
    Shutdown, // the loading core has been shut down and no new asset can be loaded
    DecoderNotRegistered,
    Resolve, // the logical path has no backing file or bytes
    Fetch, // the backing file could not be read
    Decode(Arc<str>), // bytes present but malformed; carries the decoder's diagnostic
}
impl Display for LoadError
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { Debug::fmt(self, f) }
}
impl Error for LoadError { }

// Pending on construction (brief, pre-enqueue), Loading once a worker picks the job up.
// Terminal states are final; a job is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase
{
    Pending,
    Loading,
    LoadedOk,
    LoadedFailed,
}
impl JobPhase
{
    #[inline] #[must_use]
    pub fn is_terminal(self) -> bool
    {
        matches!(self, Self::LoadedOk | Self::LoadedFailed)
    }
}

// Type-erased face of a LoadJob, for the queue and the commit list
pub trait UntypedLoadJob: Send + Sync
{
    // Worker-thread entry: resolve + decode into job-local storage, then mark terminal.
    // Must not touch the registry or any aspect payload.
    fn run(&self);
    // Owning-thread entry: move the decoded result into the target aspect
    fn commit(&self);

    fn phase(&self) -> JobPhase;
    // Block until this job reaches a terminal state
    fn wait(&self);

    fn path(&self) -> &LogicalPath;
}

// One pending or in-flight unit of work that will populate exactly one aspect.
// Exclusively owns its decoded result until commit hands it to the aspect.
pub struct LoadJob<P: AspectPayload>
{
    aspect: Arc<Aspect<P>>,
    path: LogicalPath,
    resolver: Arc<dyn FileResolver>,
    decoder: Arc<dyn AspectDecoder<P>>,

    result: Mutex<Option<Result<P, LoadError>>>, // job-local until commit
    phase: Mutex<JobPhase>,
    terminal: Condvar, // signaled exactly once, after the terminal phase is set, before commit
}
impl<P: AspectPayload> LoadJob<P>
{
    pub(crate) fn new(
        aspect: Arc<Aspect<P>>,
        path: LogicalPath,
        resolver: Arc<dyn FileResolver>,
        decoder: Arc<dyn AspectDecoder<P>>) -> Self
    {
        Self
        {
            aspect,
            path,
            resolver,
            decoder,
            result: Mutex::new(None),
            phase: Mutex::new(JobPhase::Pending),
            terminal: Condvar::new(),
        }
    }

    #[inline] #[must_use]
    pub fn is_loaded(&self) -> bool
    {
        self.phase().is_terminal()
    }

    #[inline] #[must_use]
    pub fn is_successful(&self) -> bool
    {
        *self.phase.lock() == JobPhase::LoadedOk
    }

    fn load_sync_impl(&self) -> Result<P, LoadError>
    {
        let file = self.resolver.resolve(&self.path).ok_or(LoadError::Resolve)?;
        let bytes: Arc<[u8]> = match file
        {
            VirtualFile::InMemory(bytes) => bytes,
            VirtualFile::Backed(real_path) =>
            {
                std::fs::read(&real_path).map_err(|err|
                {
                    log::warn!("Failed to read {real_path:?} backing {:?}: {err}", self.path);
                    LoadError::Fetch
                })?.into()
            },
        };

        let mut diag = DecodeDiag::new(self.path.clone());
        let decoded = self.decoder.decode(DecodeInput { path: &self.path, bytes: &bytes }, &mut diag);
        diag.flush();

        decoded.map_err(|err|
        {
            log::error!("Failed to decode {:?} as {:?}: {err}", self.path, P::aspect_type());
            LoadError::Decode(err.to_string().into())
        })
    }
}
impl<P: AspectPayload> UntypedLoadJob for LoadJob<P>
{
    fn run(&self)
    {
        {
            let mut phase = self.phase.lock();
            assert_eq!(*phase, JobPhase::Pending, "Load job for {:?} ran twice", self.path);
            *phase = JobPhase::Loading;
        }

        // a panicking decoder must not take the worker down with it
        let outcome = catch_unwind(AssertUnwindSafe(|| self.load_sync_impl()))
            .unwrap_or_else(|_|
            {
                log::error!("Decoder for {:?} panicked", self.path);
                Err(LoadError::Decode("decoder panicked".into()))
            });

        let ok = outcome.is_ok();
        *self.result.lock() = Some(outcome);

        {
            let mut phase = self.phase.lock();
            *phase = if ok { JobPhase::LoadedOk } else { JobPhase::LoadedFailed };
        }
        self.terminal.notify_all();
    }

    fn commit(&self)
    {
        assert!(self.phase().is_terminal(),
            "Commit of {:?} before the job reached a terminal state", self.path);

        let result = self.result.lock().take()
            .unwrap_or_else(|| panic!("Commit of {:?} ran twice", self.path));

        match result
        {
            Ok(payload) => self.aspect.commit(Ok(Arc::new(payload))),
            Err(err) => self.aspect.commit(Err(err)),
        }

        // the job carries no further ownership of the decoded data
        self.aspect.clear_active_job();
    }

    fn phase(&self) -> JobPhase
    {
        *self.phase.lock()
    }

    fn wait(&self)
    {
        let mut phase = self.phase.lock();
        while !phase.is_terminal()
        {
            self.terminal.wait(&mut phase);
        }
    }

    fn path(&self) -> &LogicalPath
    {
        &self.path
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestPayload(u32);
    impl AspectPayload for TestPayload
    {
        fn aspect_type() -> AspectTypeId { AspectTypeId::Test1 }
    }

    struct FixedResolver(Option<VirtualFile>);
    impl FileResolver for FixedResolver
    {
        fn resolve(&self, _path: &LogicalPath) -> Option<VirtualFile> { self.0.clone() }
    }

    struct CountingDecoder(AtomicUsize);
    impl AspectDecoder<TestPayload> for CountingDecoder
    {
        fn decode(&self, input: DecodeInput, _diag: &mut DecodeDiag) -> Result<TestPayload, Box<dyn std::error::Error>>
        {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(TestPayload(input.bytes.len() as u32))
        }
    }

    fn make_job(file: Option<VirtualFile>) -> (Arc<Aspect<TestPayload>>, LoadJob<TestPayload>)
    {
        let asset = Arc::new(Asset::new(LogicalPath::new("test/payload")));
        let aspect = Arc::new(Aspect::<TestPayload>::new(&asset));
        aspect.begin_loading(false);
        let job = LoadJob::new(
            aspect.clone(),
            LogicalPath::new("test/payload"),
            Arc::new(FixedResolver(file)),
            Arc::new(CountingDecoder(AtomicUsize::new(0))));
        (aspect, job)
    }

    #[test]
    fn phases_move_forward_only()
    {
        let bytes: Arc<[u8]> = Arc::from(&b"12345"[..]);
        let (aspect, job) = make_job(Some(VirtualFile::InMemory(bytes)));

        assert_eq!(job.phase(), JobPhase::Pending);
        assert!(!job.is_loaded());

        job.run();
        assert_eq!(job.phase(), JobPhase::LoadedOk);
        assert!(job.is_loaded());
        assert!(job.is_successful());
        job.wait(); // already terminal, must not block

        // the payload is not visible until commit
        assert!(!aspect.is_valid());
        job.commit();
        assert_eq!(aspect.payload().unwrap().0, 5);
    }

    #[test]
    #[should_panic]
    fn reruns_are_fatal()
    {
        let (_aspect, job) = make_job(None);
        job.run();
        job.run();
    }

    #[test]
    fn resolution_failure_is_job_local()
    {
        let (aspect, job) = make_job(None);
        job.run();
        assert!(job.is_loaded());
        assert!(!job.is_successful());

        job.commit();
        assert_eq!(aspect.error(), Some(LoadError::Resolve));
        assert!(aspect.payload().is_none());
    }

    #[test]
    fn wait_blocks_until_terminal()
    {
        let bytes: Arc<[u8]> = Arc::from(&b"x"[..]);
        let (_aspect, job) = make_job(Some(VirtualFile::InMemory(bytes)));
        let job = Arc::new(job);

        let waiter = std::thread::spawn(
        {
            let job = job.clone();
            move ||
            {
                job.wait();
                assert!(job.is_loaded());
            }
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        job.run();
        waiter.join().unwrap();
    }
}

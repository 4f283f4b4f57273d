use super::*;
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{Builder, JoinHandle};

// Hard cap on the worker pool; set_worker_count clamps to this
pub const MAX_LOAD_WORKERS: usize = 8;

enum QueueEntry
{
    Job(Arc<dyn UntypedLoadJob>),
    Stop, // one per worker being retired; unblocks and exits cleanly
}

struct QueueState
{
    entries: VecDeque<QueueEntry>,
    closed: bool, // set under the same lock as the final sentinels
}

// Strict FIFO: jobs are dequeued in enqueue order, no priority or path-based
// reordering. Deterministic load ordering is relied upon by tests.
struct JobQueue
{
    state: Mutex<QueueState>,
    available: Condvar,
}
impl JobQueue
{
    fn new() -> Self
    {
        Self
        {
            state: Mutex::new(QueueState { entries: VecDeque::new(), closed: false }),
            available: Condvar::new(),
        }
    }

    // Refused once the queue is closed, so no job can land behind the final sentinels
    #[must_use]
    fn push(&self, entry: QueueEntry) -> bool
    {
        let mut state = self.state.lock();
        if state.closed
        {
            return false;
        }
        state.entries.push_back(entry);
        drop(state);
        self.available.notify_one();
        true
    }

    // Front of the queue: a retiring worker must see its sentinel before the backlog
    fn push_priority(&self, entry: QueueEntry)
    {
        self.state.lock().entries.push_front(entry);
        self.available.notify_one();
    }

    // Close to new jobs and queue one sentinel per live worker, in one critical section
    fn close_and_stop(&self, workers: usize)
    {
        let mut state = self.state.lock();
        state.closed = true;
        for _ in 0..workers
        {
            state.entries.push_back(QueueEntry::Stop);
        }
        drop(state);
        self.available.notify_all();
    }

    fn pop_blocking(&self) -> QueueEntry
    {
        let mut state = self.state.lock();
        loop
        {
            match state.entries.pop_front()
            {
                Some(entry) => return entry,
                None => { self.available.wait(&mut state); },
            }
        }
    }

    fn len(&self) -> usize
    {
        self.state.lock().entries.len()
    }
}

struct WorkerState
{
    handles: Vec<JoinHandle<()>>, // every spawned worker; retired ones join instantly
    target: usize,
}

// Bounded worker-thread pool pulling load jobs off the FIFO queue. Workers only run
// the jobs' decode step; terminal jobs land on the commit channel for the owning
// thread to drain once per tick.
pub struct JobScheduler
{
    queue: Arc<JobQueue>,
    workers: Mutex<WorkerState>,
    live_workers: Arc<AtomicUsize>,
    next_worker_id: AtomicUsize,

    commit_send: Sender<Arc<dyn UntypedLoadJob>>,
    commit_recv: Receiver<Arc<dyn UntypedLoadJob>>,

    pending: AtomicUsize, // enqueued but not yet committed
    total_committed: AtomicUsize,
    is_shutdown: AtomicBool,
}
impl JobScheduler
{
    #[must_use]
    pub(crate) fn new() -> Self
    {
        let (commit_send, commit_recv) = unbounded();
        Self
        {
            queue: Arc::new(JobQueue::new()),
            workers: Mutex::new(WorkerState { handles: Vec::new(), target: 0 }),
            live_workers: Arc::new(AtomicUsize::new(0)),
            next_worker_id: AtomicUsize::new(0),
            commit_send,
            commit_recv,
            pending: AtomicUsize::new(0),
            total_committed: AtomicUsize::new(0),
            is_shutdown: AtomicBool::new(false),
        }
    }

    fn worker_fn(
        queue: Arc<JobQueue>,
        commit_send: Sender<Arc<dyn UntypedLoadJob>>,
        live_workers: Arc<AtomicUsize>) -> impl FnOnce()
    {
        move ||
        {
            log::debug!("Starting load worker thread");
            'worker: loop
            {
                match queue.pop_blocking()
                {
                    QueueEntry::Stop =>
                    {
                        log::debug!("Stopping load worker thread");
                        break 'worker;
                    },
                    QueueEntry::Job(job) =>
                    {
                        job.run();
                        // terminal state and its condvar signal happen inside run(),
                        // so wait()ers are released even if the commit side is gone
                        if commit_send.send(job).is_err()
                        {
                            log::error!("Commit channel closed, finished job discarded");
                        }
                    },
                }
            }
            live_workers.fetch_sub(1, Ordering::AcqRel);
        }
    }

    // Appends to the FIFO queue and signals one waiting worker.
    // Returns false once the scheduler has been shut down; the shutdown check happens
    // under the queue lock so an accepted job always sits ahead of the final sentinels.
    #[must_use]
    pub(crate) fn enqueue(&self, job: Arc<dyn UntypedLoadJob>) -> bool
    {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.queue.push(QueueEntry::Job(job))
        {
            return true;
        }
        self.pending.fetch_sub(1, Ordering::AcqRel);
        false
    }

    // Grows by spawning named threads; shrinks cooperatively (a retiring worker
    // finishes only its current job, pops its front-of-queue sentinel and exits).
    // Zero workers with jobs pending is not an error; the queue simply accumulates.
    pub fn set_worker_count(&self, count: usize)
    {
        let count = count.min(MAX_LOAD_WORKERS);

        let mut workers = self.workers.lock();
        if self.is_shutdown.load(Ordering::Acquire)
        {
            return;
        }
        workers.handles.retain(|h| !h.is_finished()); // reap previously retired workers

        let prior = workers.target;
        workers.target = count;
        for _ in prior..count
        {
            let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
            self.live_workers.fetch_add(1, Ordering::AcqRel);
            let thread = Builder::new()
                .name(format!("load worker {id}"))
                .spawn(Self::worker_fn(
                    self.queue.clone(),
                    self.commit_send.clone(),
                    self.live_workers.clone()))
                .expect("Failed to spawn load worker thread");
            workers.handles.push(thread);
        }
        let retiring = prior.saturating_sub(count);
        drop(workers); // queue pushes happen outside the pool lock

        // ahead of the backlog: a retiring worker must not keep serving pending jobs
        for _ in 0..retiring
        {
            self.queue.push_priority(QueueEntry::Stop);
        }
    }

    #[must_use]
    pub fn worker_count(&self) -> usize
    {
        self.workers.lock().target
    }

    // Owning thread, once per tick: apply every finished job to its aspect
    pub(crate) fn drain_commits(&self) -> usize
    {
        let mut committed = 0;
        while let Ok(job) = self.commit_recv.try_recv()
        {
            job.commit();
            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.total_committed.fetch_add(1, Ordering::AcqRel);
            committed += 1;
        }
        committed
    }

    // Jobs enqueued but not yet committed
    #[must_use]
    pub fn n_to_load(&self) -> usize
    {
        self.pending.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn total_committed(&self) -> usize
    {
        self.total_committed.load(Ordering::Acquire)
    }

    #[must_use]
    pub(crate) fn queued_len(&self) -> usize
    {
        self.queue.len()
    }

    // Close the queue, sentinel every worker and join them. Jobs accepted before the
    // close still run (the sentinels sit behind them in FIFO order); anything after
    // is refused.
    pub fn shutdown(&self)
    {
        if self.is_shutdown.swap(true, Ordering::AcqRel)
        {
            return;
        }

        let (retiring, handles) =
        {
            let mut workers = self.workers.lock();
            let retiring = workers.target;
            workers.target = 0;
            (retiring, std::mem::take(&mut workers.handles))
        };

        self.queue.close_and_stop(retiring);
        for handle in handles
        {
            if handle.join().is_err()
            {
                log::error!("Load worker thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn queue_push_pop()
    {
        let queue = JobQueue::new();
        assert!(queue.push(QueueEntry::Stop));
        assert!(queue.push(QueueEntry::Stop));
        assert_eq!(queue.len(), 2);
        assert!(matches!(queue.pop_blocking(), QueueEntry::Stop));
        assert!(matches!(queue.pop_blocking(), QueueEntry::Stop));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn closed_queue_refuses_entries()
    {
        let queue = JobQueue::new();
        assert!(queue.push(QueueEntry::Stop));
        queue.close_and_stop(1);
        assert!(!queue.push(QueueEntry::Stop));
        assert_eq!(queue.len(), 2); // the pre-close entry plus one sentinel
    }

    #[test]
    fn retired_worker_handles_are_reaped()
    {
        let scheduler = JobScheduler::new();
        for _ in 0..4
        {
            scheduler.set_worker_count(2);
            scheduler.set_worker_count(0);
        }
        // wait for every retired worker to fully exit
        while scheduler.workers.lock().handles.iter().any(|h| !h.is_finished())
        {
            std::thread::yield_now();
        }

        scheduler.set_worker_count(1);
        assert_eq!(scheduler.workers.lock().handles.len(), 1);
        scheduler.shutdown();
    }

    #[test]
    fn pool_grows_and_shuts_down()
    {
        let scheduler = JobScheduler::new();
        assert_eq!(scheduler.worker_count(), 0);

        scheduler.set_worker_count(2);
        assert_eq!(scheduler.worker_count(), 2);

        scheduler.set_worker_count(100); // clamped
        assert_eq!(scheduler.worker_count(), MAX_LOAD_WORKERS);

        scheduler.set_worker_count(1);
        assert_eq!(scheduler.worker_count(), 1);

        scheduler.shutdown();
        assert_eq!(scheduler.worker_count(), 0);

        // idempotent
        scheduler.shutdown();
    }
}

//! The bounded work-queue engine behind every I/O provider.
//!
//! A [`WorkQueue`] schedules "load tile X" jobs against one provider's
//! [`TileLoader`], bounding outstanding work and never loading the same tile
//! twice concurrently. Jobs live in a pending table keyed by the packed tile
//! key; a fixed pool of worker tasks claims the *most recently submitted*
//! job that is not already being worked on, which under a scrolling map
//! approximates "serve what is on screen right now".
//!
//! Capacity is enforced at submit time: inserting beyond the limit evicts
//! the oldest entry that is not being worked on and fails its callback. This
//! keeps memory bounded and stops the queue outgrowing worker throughput, at
//! the price that very old requests can starve under sustained overload.
//! That is an accepted trade-off, not something this engine counteracts.

mod loader;

pub use loader::{CantContinue, LoadResult, LoadedTile, TileLoader};

use anyhow::{Result, ensure};
use parking_lot::Mutex;
use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};
use tilepipe_core::TileCoord;
use tokio::sync::Notify;

/// The final word on one submitted job.
#[derive(Debug)]
pub enum JobOutcome {
	/// The loader produced bytes, fresh or expired.
	Loaded(LoadedTile),
	/// The loader had nothing, the attempt failed, or the job was evicted.
	Failed,
}

/// Receives a job's outcome exactly once.
pub type JobSink = Box<dyn FnOnce(JobOutcome) + Send + 'static>;

struct Job {
	coord: TileCoord,
	stamp: u64,
	sink: JobSink,
}

#[derive(Default)]
struct QueueState {
	pending: HashMap<u64, Job>,
	working: HashSet<u64>,
	last_stamp: u64,
	detached: bool,
}

struct QueueInner {
	loader: Arc<dyn TileLoader>,
	capacity: usize,
	state: Mutex<QueueState>,
	wakeup: Notify,
}

/// A bounded producer/consumer engine running one provider's loader on a
/// fixed pool of worker tasks.
///
/// Must be constructed inside a tokio runtime. Dropping the handle detaches
/// the engine and lets the workers exit.
pub struct WorkQueue {
	inner: Arc<QueueInner>,
}

impl WorkQueue {
	/// Create an engine with `workers` worker tasks and a pending table
	/// bounded to `capacity` entries.
	///
	/// A worker pool larger than the queue is pointless, so the pool is
	/// clamped to the capacity.
	pub fn new(loader: Arc<dyn TileLoader>, workers: usize, capacity: usize) -> WorkQueue {
		let capacity = capacity.max(1);
		if workers > capacity {
			log::warn!("pending queue is smaller than the worker pool, reducing workers to {capacity}");
		}
		let workers = workers.clamp(1, capacity);

		let inner = Arc::new(QueueInner {
			loader,
			capacity,
			state: Mutex::new(QueueState::default()),
			wakeup: Notify::new(),
		});

		for _ in 0..workers {
			tokio::spawn(worker_loop(Arc::clone(&inner)));
		}

		WorkQueue { inner }
	}

	/// The loader this engine runs.
	#[must_use]
	pub fn loader(&self) -> &Arc<dyn TileLoader> {
		&self.inner.loader
	}

	/// Enqueue a job. Never blocks; returns immediately.
	///
	/// If the coordinate is already queued, its recency is bumped and the
	/// stored sink is replaced by `sink`; the engine holds at most one job
	/// per tile. If the table is full, the oldest entry not being worked on
	/// is evicted and fails; if every entry is being worked on, the incoming
	/// submission itself fails.
	///
	/// # Errors
	/// Returns an error if the engine has been detached, a caller contract
	/// violation, reported synchronously.
	pub fn submit(&self, coord: &TileCoord, sink: JobSink) -> Result<()> {
		let key = coord.as_key();
		let mut failed_sink = None;

		{
			let mut state = self.inner.state.lock();
			ensure!(!state.detached, "cannot submit to a detached work queue");

			state.last_stamp += 1;
			let stamp = state.last_stamp;

			if let Some(job) = state.pending.get_mut(&key) {
				log::trace!("'{}': {coord:?} already queued, bumping", self.inner.loader.name());
				job.stamp = stamp;
				job.sink = sink;
			} else {
				let mut incoming = Some(sink);
				if state.pending.len() >= self.inner.capacity {
					let QueueState { pending, working, .. } = &mut *state;
					let oldest = pending
						.iter()
						.filter(|(k, _)| !working.contains(*k))
						.min_by_key(|(_, job)| job.stamp)
						.map(|(k, _)| *k);
					if let Some(oldest) = oldest {
						log::debug!("'{}': queue full, evicting oldest entry", self.inner.loader.name());
						failed_sink = pending.remove(&oldest).map(|job| job.sink);
					} else {
						// every queued tile is being worked on right now
						failed_sink = incoming.take();
					}
				}
				if let Some(sink) = incoming {
					state.pending.insert(key, Job { coord: *coord, stamp, sink });
				}
			}
		}

		if let Some(sink) = failed_sink {
			sink(JobOutcome::Failed);
		}
		self.inner.wakeup.notify_one();
		Ok(())
	}

	/// Number of queued jobs, including those currently being worked on.
	#[must_use]
	pub fn pending_count(&self) -> usize {
		self.inner.state.lock().pending.len()
	}

	/// Whether [`detach`](Self::detach) has been called.
	#[must_use]
	pub fn is_detached(&self) -> bool {
		self.inner.state.lock().detached
	}

	/// Shut the engine down: drop all queued jobs *without* notifying their
	/// sinks, refuse further submissions, and let the worker pool exit.
	/// Jobs already being worked on finish, and their results are discarded.
	pub fn detach(&self) {
		let dropped = {
			let mut state = self.inner.state.lock();
			if state.detached {
				return;
			}
			state.detached = true;
			state.working.clear();
			state.pending.drain().count()
		};
		log::debug!("'{}' detached, {dropped} queued jobs dropped", self.inner.loader.name());
		self.inner.wakeup.notify_waiters();
	}
}

impl Drop for WorkQueue {
	fn drop(&mut self) {
		self.detach();
	}
}

impl std::fmt::Debug for WorkQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("WorkQueue")
			.field("loader", &self.inner.loader.name())
			.field("capacity", &self.inner.capacity)
			.field("pending", &state.pending.len())
			.field("working", &state.working.len())
			.finish()
	}
}

async fn worker_loop(inner: Arc<QueueInner>) {
	loop {
		// register interest before looking for work, so a submit that lands
		// in between is not missed
		let notified = inner.wakeup.notified();
		if inner.state.lock().detached {
			return;
		}
		match claim_next(&inner) {
			Some((key, coord)) => run_job(&inner, key, &coord).await,
			None => notified.await,
		}
	}
}

/// Claim the most recently submitted job that nobody is working on yet.
fn claim_next(inner: &QueueInner) -> Option<(u64, TileCoord)> {
	let mut state = inner.state.lock();
	if state.detached {
		return None;
	}
	let QueueState { pending, working, .. } = &mut *state;
	let claimed = pending
		.iter()
		.filter(|(key, _)| !working.contains(*key))
		.max_by_key(|(_, job)| job.stamp)
		.map(|(key, job)| (*key, job.coord))?;
	working.insert(claimed.0);
	Some(claimed)
}

async fn run_job(inner: &Arc<QueueInner>, key: u64, coord: &TileCoord) {
	log::trace!("'{}' loading {coord:?}", inner.loader.name());
	match inner.loader.load_tile(coord).await {
		Ok(Some(tile)) => complete(inner, key, JobOutcome::Loaded(tile)),
		Ok(None) => complete(inner, key, JobOutcome::Failed),
		Err(CantContinue(e)) => {
			log::warn!("'{}' cannot continue: {e:#}", inner.loader.name());
			abandon_all(inner);
		}
	}
}

/// Remove the job from both tables and deliver the outcome exactly once.
fn complete(inner: &QueueInner, key: u64, outcome: JobOutcome) {
	let job = {
		let mut state = inner.state.lock();
		state.working.remove(&key);
		state.pending.remove(&key)
	};
	// absent job: it was drained by detach or a cannot-continue sweep
	if let Some(job) = job {
		(job.sink)(outcome);
	}
}

/// Fail every queued job at once. The backing resource is assumed down for
/// all of them, so retrying one by one would only serialize the failures.
fn abandon_all(inner: &QueueInner) {
	let jobs: Vec<Job> = {
		let mut state = inner.state.lock();
		state.working.clear();
		state.pending.drain().map(|(_, job)| job).collect()
	};
	log::debug!("'{}': failing {} queued jobs", inner.loader.name(), jobs.len());
	for job in jobs {
		(job.sink)(JobOutcome::Failed);
	}
}

//! One-shot latches flushing deferred registrations.
//!
//! A [`Milestone`] collects actions until it is reached. Reaching it runs the
//! pending actions in registration order, including actions registered while
//! the queue drains; actions registered afterwards run immediately. Reaching a milestone twice does nothing the second time.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

type Action = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct State {
	reached: bool,
	draining: bool,
	pending: VecDeque<Action>,
}

/// A one-shot latch.
///
/// # Examples
///
/// ```
/// use trellis_core::Milestone;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let milestone = Milestone::new("config_ready");
/// let count = Arc::new(AtomicUsize::new(0));
///
/// let c = count.clone();
/// milestone.register(move || { c.fetch_add(1, Ordering::SeqCst); });
/// assert_eq!(count.load(Ordering::SeqCst), 0);
///
/// milestone.reach();
/// milestone.reach();
/// assert_eq!(count.load(Ordering::SeqCst), 1);
/// ```
pub struct Milestone {
	name: &'static str,
	state: Mutex<State>,
}

impl Milestone {
	pub fn new(name: &'static str) -> Self {
		Self {
			name,
			state: Mutex::new(State::default()),
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn is_reached(&self) -> bool {
		self.state.lock().reached
	}

	/// Registers an action, running it right away when already reached.
	pub fn register(&self, action: impl FnOnce() + Send + 'static) {
		{
			let mut state = self.state.lock();
			if !state.reached {
				state.pending.push_back(Box::new(action));
				return;
			}
		}
		tracing::trace!(milestone = self.name, "milestone already reached, running action");
		action();
	}

	/// Drains pending actions in FIFO order, then marks the milestone as
	/// reached.
	///
	/// Actions run without the internal lock held, so they may register
	/// further actions on this same milestone. Those join the back of the
	/// queue.
	pub fn reach(&self) {
		{
			let mut state = self.state.lock();
			if state.reached || state.draining {
				return;
			}
			state.draining = true;
			tracing::debug!(milestone = self.name, actions = state.pending.len(), "milestone reached");
		}
		loop {
			let action = {
				let mut state = self.state.lock();
				match state.pending.pop_front() {
					Some(action) => action,
					None => {
						state.draining = false;
						state.reached = true;
						return;
					}
				}
			};
			action();
		}
	}

	/// Returns the milestone to its initial state, dropping pending actions.
	pub fn reset(&self) {
		let mut state = self.state.lock();
		state.reached = false;
		state.draining = false;
		state.pending.clear();
	}
}

impl std::fmt::Debug for Milestone {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("Milestone")
			.field("name", &self.name)
			.field("reached", &state.reached)
			.field("pending", &state.pending.len())
			.finish()
	}
}

/// The four configuration milestones of an application.
#[derive(Debug, Clone)]
pub struct Milestones {
	pub config_ready: Arc<Milestone>,
	pub renderers_ready: Arc<Milestone>,
	pub environment_loaded: Arc<Milestone>,
	pub app_ready: Arc<Milestone>,
}

impl Milestones {
	pub fn new() -> Self {
		Self {
			config_ready: Arc::new(Milestone::new("config_ready")),
			renderers_ready: Arc::new(Milestone::new("renderers_ready")),
			environment_loaded: Arc::new(Milestone::new("environment_loaded")),
			app_ready: Arc::new(Milestone::new("app_ready")),
		}
	}

	/// All milestones in the order they are reached.
	pub fn all(&self) -> [&Arc<Milestone>; 4] {
		[
			&self.config_ready,
			&self.renderers_ready,
			&self.environment_loaded,
			&self.app_ready,
		]
	}

	pub fn reset_all(&self) {
		for milestone in self.all() {
			milestone.reset();
		}
	}
}

impl Default for Milestones {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Box<dyn FnOnce() + Send>) {
		let log = Arc::new(Mutex::new(Vec::new()));
		let handle = log.clone();
		let make = move |n: u32| {
			let log = handle.clone();
			Box::new(move || log.lock().push(n)) as Box<dyn FnOnce() + Send>
		};
		(log, make)
	}

	#[rstest]
	fn test_pending_actions_run_in_fifo_order() {
		let milestone = Milestone::new("test");
		let (log, make) = recorder();
		milestone.register(make(1));
		milestone.register(make(2));
		milestone.register(make(3));
		assert!(log.lock().is_empty());

		milestone.reach();
		assert_eq!(*log.lock(), vec![1, 2, 3]);
	}

	#[rstest]
	fn test_reaching_twice_runs_actions_once() {
		let milestone = Milestone::new("test");
		let (log, make) = recorder();
		milestone.register(make(1));
		milestone.reach();
		milestone.reach();
		assert_eq!(*log.lock(), vec![1]);
		assert!(milestone.is_reached());
	}

	#[rstest]
	fn test_post_latch_registration_runs_immediately_once() {
		let milestone = Milestone::new("test");
		let (log, make) = recorder();
		milestone.reach();
		milestone.register(make(7));
		assert_eq!(*log.lock(), vec![7]);
		milestone.reach();
		assert_eq!(*log.lock(), vec![7]);
	}

	#[rstest]
	fn test_action_may_register_on_same_milestone() {
		let milestone = Arc::new(Milestone::new("test"));
		let (log, make) = recorder();
		let inner = make(2);
		let m = milestone.clone();
		milestone.register(move || m.register(inner));
		milestone.register(make(1));

		milestone.reach();
		assert_eq!(*log.lock(), vec![1, 2]);
		assert!(milestone.is_reached());
	}

	#[rstest]
	fn test_registration_while_draining_keeps_fifo_order() {
		let milestone = Arc::new(Milestone::new("test"));
		let (log, make) = recorder();
		let late = make(4);
		let m = milestone.clone();
		milestone.register(make(1));
		milestone.register(move || {
			assert!(!m.is_reached());
			m.register(late);
		});
		milestone.register(make(2));
		milestone.register(make(3));

		milestone.reach();
		assert_eq!(*log.lock(), vec![1, 2, 3, 4]);

		milestone.register(make(5));
		assert_eq!(*log.lock(), vec![1, 2, 3, 4, 5]);
	}

	#[rstest]
	fn test_reset_all() {
		let milestones = Milestones::new();
		for milestone in milestones.all() {
			milestone.reach();
		}
		milestones.reset_all();
		assert!(milestones.all().iter().all(|m| !m.is_reached()));
	}
}

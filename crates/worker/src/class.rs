/// Execution classes used to label spawned work in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Short-lived tasks that wait on a signal and forward it (cancellation watchers).
	Watcher,
	/// Work standing in for a boundary operation (simulated launches, terminations).
	Boundary,
	/// Anything else that may be delayed without affecting delivery.
	Background,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Watcher => "watcher",
			Self::Boundary => "boundary",
			Self::Background => "background",
		}
	}
}

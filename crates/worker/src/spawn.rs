use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

use crate::TaskClass;

/// Returns the ambient runtime handle, or a lazily built fallback runtime when
/// the caller is not inside one (boundary callbacks from foreign threads).
pub(crate) fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static FALLBACK_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = FALLBACK_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(1)
			.thread_name("handoff-worker-fallback")
			.build()
			.expect("failed to build handoff-worker fallback tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns an async task labelled with `class`.
#[allow(clippy::disallowed_methods)]
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	runtime_handle().spawn(fut)
}

/// Returns true when called from inside a tokio runtime.
pub fn in_runtime() -> bool {
	tokio::runtime::Handle::try_current().is_ok()
}

//! Microtask / job queue (C10): a FIFO queue of promise-reaction jobs and
//! `queueMicrotask` callbacks, drained by `run_jobs`. Grounded on
//! `boa_engine`'s own `job::SimpleJobQueue` (see `boa_engine::job::JobQueue`)
//! and on `jjs-core/jjs-context.c`'s manual drain loop, which this mirrors:
//! the host decides when to drain, the engine never auto-drains after a
//! top-level call.

use boa_engine::job::{JobQueue, NativeJob};
use boa_engine::object::FunctionObjectBuilder;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsValue, NativeFunction};
use std::cell::RefCell;
use std::collections::VecDeque;

/// Single-threaded FIFO job queue: `run_jobs` drains until empty, including
/// jobs enqueued by jobs already running in the same call (spec §4.11).
#[derive(Debug, Default)]
pub struct FifoJobQueue {
    jobs: RefCell<VecDeque<NativeJob>>,
}

impl FifoJobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any job is currently queued.
    #[must_use]
    pub fn has_pending_jobs(&self) -> bool {
        !self.jobs.borrow().is_empty()
    }
}

impl JobQueue for FifoJobQueue {
    fn enqueue_promise_job(&self, job: NativeJob, _context: &mut Context) {
        self.jobs.borrow_mut().push_back(job);
    }

    fn run_jobs(&self, context: &mut Context) {
        while let Some(job) = self.jobs.borrow_mut().pop_front() {
            if let Err(err) = job.call(context) {
                log::warn!("unhandled promise rejection in job queue: {err}");
            }
        }
    }
}

/// Installs a `queueMicrotask(callback)` global. `callback` is invoked with
/// no arguments and `undefined` `this`; a non-callable argument rejects
/// synchronously with a `TypeError` (spec §4.11).
///
/// # Errors
/// Propagates any failure from registering the global function.
pub fn install_queue_microtask(context: &mut Context) -> JsResult<()> {
    let function = FunctionObjectBuilder::new(
        context.realm(),
        NativeFunction::from_fn_ptr(|_this, args, context| {
            let callback = args
                .first()
                .and_then(JsValue::as_object)
                .filter(|o| o.is_callable())
                .cloned();
            let Some(callback) = callback else {
                return Err(JsNativeError::typ()
                    .with_message("queueMicrotask callback must be a function")
                    .into());
            };
            context
                .job_queue()
                .enqueue_promise_job(
                    NativeJob::new(move |ctx| callback.call(&JsValue::undefined(), &[], ctx)),
                    context,
                );
            Ok(JsValue::undefined())
        }),
    )
    .name(js_string!("queueMicrotask"))
    .length(1)
    .build();

    context.register_global_property(js_string!("queueMicrotask"), function, Attribute::all())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn fifo_queue_runs_jobs_in_enqueue_order() {
        let mut context = Context::default();
        let queue = FifoJobQueue::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let order = Rc::clone(&order);
            queue.enqueue_promise_job(
                NativeJob::new(move |_ctx| {
                    order.borrow_mut().push(i);
                    Ok(JsValue::undefined())
                }),
                &mut context,
            );
        }

        assert!(queue.has_pending_jobs());
        queue.run_jobs(&mut context);
        assert!(!queue.has_pending_jobs());
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }
}

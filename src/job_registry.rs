use crate::BackgroundJob;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

type RunTaskFn<Context> =
    dyn Fn(Context, Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// Lookup table from job type name to the function that deserializes the
/// payload and runs the matching [`BackgroundJob`].
///
/// Dispatch is a pure lookup. Adding a platform means one more
/// [`register`](Self::register) call at startup; the worker stays untouched.
pub(crate) struct JobRegistry<Context> {
    entries: HashMap<String, Arc<RunTaskFn<Context>>>,
}

impl<Context> Default for JobRegistry<Context> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<Context> Clone for JobRegistry<Context> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<Context: Clone + Send + 'static> JobRegistry<Context> {
    pub(crate) fn register<J: BackgroundJob<Context = Context>>(&mut self) {
        self.entries
            .insert(J::JOB_NAME.to_owned(), Arc::new(run_job::<J>));
    }

    pub(crate) fn get(&self, job_type: &str) -> Option<&Arc<RunTaskFn<Context>>> {
        self.entries.get(job_type)
    }

    pub(crate) fn job_types(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

fn run_job<J: BackgroundJob>(ctx: J::Context, payload: Value) -> BoxFuture<'static, anyhow::Result<()>> {
    async move {
        let job: J = serde_json::from_value(payload)?;
        job.run(ctx).await
    }
    .boxed()
}

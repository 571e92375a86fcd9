use sentry_core::TransactionContext;
use sentry_core::protocol::SpanStatus;
use std::any::Any;
use std::future::Future;

/// Turn the opaque payload of a caught panic into something loggable.
pub(crate) fn try_to_extract_panic_info(info: &(dyn Any + Send + 'static)) -> anyhow::Error {
    if let Some(message) = info.downcast_ref::<&'static str>() {
        anyhow::anyhow!("job panicked: {message}")
    } else if let Some(message) = info.downcast_ref::<String>() {
        anyhow::anyhow!("job panicked: {message}")
    } else {
        anyhow::anyhow!("job panicked")
    }
}

/// Wrap a job run in a sentry transaction so failures show up in error
/// reporting with the job type as the transaction name. A no-op when no
/// sentry client is initialized by the embedding application.
pub(crate) async fn with_sentry_transaction<F, Fut, R, E>(
    transaction_name: &str,
    callback: F,
) -> Result<R, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let tx_ctx = TransactionContext::new(transaction_name, "queue.process");
    let transaction = sentry_core::start_transaction(tx_ctx);

    let result = callback().await;

    transaction.set_status(match &result {
        Ok(_) => SpanStatus::Ok,
        Err(_) => SpanStatus::UnknownError,
    });
    transaction.finish();

    result
}

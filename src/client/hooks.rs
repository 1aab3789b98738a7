/// Shutdown hooks into the producer pipeline (record batching, partition
/// sinks), out of scope for this core beyond the ordering §4.7 requires.
pub trait ProducerHooks: Send + Sync {
    /// Wake every buffered sink so it observes cancellation instead of
    /// blocking in backoff; called before the metadata loop is joined.
    fn wake_sinks(&self) {}

    /// Fail every buffered record on every partition with `broker_dead`;
    /// called last, once the metadata loop has confirmed shutdown.
    fn fail_all_records(&self) {}
}

/// Shutdown hooks into the consumer pipeline (partition sources, group
/// rebalance loop), out of scope for this core beyond the ordering §4.7
/// requires.
pub trait ConsumerHooks: Send + Sync {
    /// Marks the consumer dead and assigns it an empty partition set,
    /// idempotently draining any source consumers. Returns `true` the
    /// first time it's called, `false` on subsequent calls.
    fn mark_dead_and_drain(&self) -> bool {
        true
    }

    /// Wake every parked partition source so it observes cancellation.
    fn wake_sources(&self) {}
}

/// The hooks a `Client` was built without: every call is a no-op, so a
/// `Client` constructed with no producer/consumer attached still shuts
/// down cleanly.
pub struct NoopHooks;

impl ProducerHooks for NoopHooks {}
impl ConsumerHooks for NoopHooks {}

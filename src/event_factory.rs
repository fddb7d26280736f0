//! Event factories for slot pre-allocation
//!
//! The ring buffer invokes a factory once per slot at construction, so every
//! slot exists before the first claim and nothing allocates during the
//! steady-state publish/consume cycle.

/// Factory for the initial contents of each slot
///
/// Called exactly `buffer_size` times while the ring buffer is being built.
/// Implementations should return an event in its neutral state; producers
/// overwrite slot contents in place after claiming a sequence.
pub trait EventFactory<E>: Send + Sync {
    /// Create one event instance.
    fn new_instance(&self) -> E;
}

/// Factory for event types that implement `Default`
pub struct DefaultEventFactory<E: Default> {
    _phantom: std::marker::PhantomData<E>,
}

impl<E: Default> DefaultEventFactory<E> {
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E: Default> Default for DefaultEventFactory<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Default + Send + Sync> EventFactory<E> for DefaultEventFactory<E> {
    fn new_instance(&self) -> E {
        E::default()
    }
}

/// Factory backed by a closure, for events without a useful `Default`
pub struct ClosureEventFactory<E, F>
where
    F: Fn() -> E + Send + Sync,
{
    factory_fn: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> ClosureEventFactory<E, F>
where
    F: Fn() -> E + Send + Sync,
{
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventFactory<E> for ClosureEventFactory<E, F>
where
    E: Send + Sync,
    F: Fn() -> E + Send + Sync,
{
    fn new_instance(&self) -> E {
        (self.factory_fn)()
    }
}

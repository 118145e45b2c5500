use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::{
    device::{Device, LibraryHandle, QueueId},
    error::Result,
    stream::Stream,
};

/// A library handle bound to one stream for its whole life. The borrow keeps
/// the stream alive at least as long as the context.
pub struct LibraryContext<'s, D: Device, H: LibraryHandle<D>> {
    handle: Option<H>,
    stream: &'s Stream<D>,
    _device: PhantomData<D>,
}

pub type BlasContext<'s, D> = LibraryContext<'s, D, <D as Device>::Blas>;
pub type SolverContext<'s, D> = LibraryContext<'s, D, <D as Device>::Solver>;

impl<'s, D: Device, H: LibraryHandle<D>> LibraryContext<'s, D, H> {
    /// Create the handle, binding it to `stream` unless that is the default queue.
    pub fn new(stream: &'s Stream<D>) -> Result<Self> {
        let mut handle = H::create(stream.device())?;
        if let Some(queue) = stream.queue() {
            if let Err(e) = handle.set_stream(queue) {
                if let Err(destroy) = handle.destroy() {
                    warn!(library = %H::LIBRARY, "failed to destroy handle: {destroy}");
                }
                return Err(e);
            }
        }
        debug!(library = %H::LIBRARY, stream = %stream.id(), "context created");
        Ok(Self {
            handle: Some(handle),
            stream,
            _device: PhantomData,
        })
    }

    pub fn handle(&self) -> &H {
        // Only `close` and `drop` take the handle, both consume the context
        self.handle
            .as_ref()
            .unwrap_or_else(|| unreachable!("context used after close"))
    }

    pub fn stream(&self) -> &'s Stream<D> {
        self.stream
    }

    /// The queue the library reports it issues work to.
    pub fn bound_stream(&self) -> Result<QueueId> {
        self.handle().stream_id()
    }

    /// Destroy the handle, reporting failure.
    pub fn close(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.destroy(),
            None => Ok(()),
        }
    }
}

impl<D: Device, H: LibraryHandle<D>> Drop for LibraryContext<'_, D, H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.destroy() {
                warn!(library = %H::LIBRARY, "failed to destroy handle: {e}");
            }
        }
    }
}

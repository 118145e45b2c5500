use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    device::{Device, QueueId},
    error::Result,
};

/// An ordered work queue on a device, either the implicit default queue or one
/// this stream created and owns.
pub struct Stream<D: Device> {
    device: Arc<D>,
    queue: Option<D::Queue>,
}

impl<D: Device> Stream<D> {
    pub fn new(device: &Arc<D>, use_default: bool) -> Result<Self> {
        let queue = if use_default {
            None
        } else {
            Some(device.create_queue()?)
        };
        let stream = Self {
            device: device.clone(),
            queue,
        };
        debug!(id = %stream.id(), device = %device.name(), "stream created");
        Ok(stream)
    }

    pub fn is_default(&self) -> bool {
        self.queue.is_none()
    }

    pub fn id(&self) -> QueueId {
        self.device.queue_id(self.queue.as_ref())
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Native queue, `None` for the default queue.
    pub fn queue(&self) -> Option<&D::Queue> {
        self.queue.as_ref()
    }

    /// Block until everything enqueued so far has completed.
    pub fn synchronize(&self) -> Result<()> {
        self.device.synchronize(self.queue.as_ref())
    }

    /// Destroy an owned queue, reporting failure.
    pub fn destroy(mut self) -> Result<()> {
        match self.queue.take() {
            Some(queue) => {
                debug!(id = %self.device.queue_id(Some(&queue)), "stream destroyed");
                self.device.destroy_queue(queue)
            }
            None => Ok(()),
        }
    }
}

impl<D: Device> Drop for Stream<D> {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            let id = self.device.queue_id(Some(&queue));
            if let Err(e) = self.device.destroy_queue(queue) {
                warn!(%id, "failed to destroy stream: {e}");
            } else {
                debug!(%id, "stream destroyed");
            }
        }
    }
}

impl<D: Device> std::fmt::Debug for Stream<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").field("id", &self.id()).finish()
    }
}

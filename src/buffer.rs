use std::{fmt::Debug, mem::size_of, sync::Arc};

use tracing::trace;

use crate::{
    device::{Device, DeviceMemory},
    error::{Error, Region, Result},
    scalar::Element,
    stream::Stream,
};

/// A host region and a device region of the same capacity.
///
/// Both are zeroed at construction and released together. Element accessors
/// live on the views built over a buffer, copies between the regions live here.
pub struct Buffer<T: Element, D: Device> {
    device: Arc<D>,
    host: Vec<T>,
    dev: D::Memory,
}

impl<T: Element, D: Device> Buffer<T, D> {
    pub fn new(device: &Arc<D>, len: usize) -> Result<Self> {
        let bytes = len.checked_mul(size_of::<T>()).ok_or(Error::Allocation {
            region: Region::Host,
            bytes: usize::MAX,
            reason: format!("{len} elements overflow the address space"),
        })?;
        let mut host = Vec::new();
        host.try_reserve_exact(len).map_err(|e| Error::Allocation {
            region: Region::Host,
            bytes,
            reason: e.to_string(),
        })?;
        host.resize(len, T::zeroed());
        let dev = device.alloc_zeroed(bytes)?;
        trace!(len, bytes, "buffer allocated");
        Ok(Self {
            device: device.clone(),
            host,
            dev,
        })
    }

    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.host.len() * size_of::<T>()
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn host(&self) -> &[T] {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut [T] {
        &mut self.host
    }

    /// Device region, as handed to library routines.
    pub fn dev(&self) -> &D::Memory {
        &self.dev
    }

    pub fn dev_mut(&mut self) -> &mut D::Memory {
        &mut self.dev
    }

    pub fn copy_host_to_device(&mut self) -> Result<()> {
        self.device
            .copy_htod(bytemuck::cast_slice(&self.host), &mut self.dev)
    }

    pub fn copy_device_to_host(&mut self) -> Result<()> {
        self.device
            .copy_dtoh(&self.dev, bytemuck::cast_slice_mut(&mut self.host))
    }

    /// Enqueue the full host to device copy. Only complete once `stream` is synchronized.
    pub fn copy_host_to_device_async(&mut self, stream: &Stream<D>) -> Result<()> {
        self.device.copy_htod_async(
            bytemuck::cast_slice(&self.host),
            &mut self.dev,
            stream.queue(),
        )
    }

    /// Enqueue the full device to host copy. Only complete once `stream` is synchronized.
    pub fn copy_device_to_host_async(&mut self, stream: &Stream<D>) -> Result<()> {
        self.device.copy_dtoh_async(
            &self.dev,
            bytemuck::cast_slice_mut(&mut self.host),
            stream.queue(),
        )
    }

    /// Synchronous snapshot of the device region, leaving the host copy untouched.
    pub fn read_device(&self) -> Result<Vec<T>> {
        let mut out = vec![T::zeroed(); self.host.len()];
        self.device
            .copy_dtoh(&self.dev, bytemuck::cast_slice_mut(&mut out))?;
        Ok(out)
    }

    /// Release both regions, reporting a device side failure.
    pub fn release(self) -> Result<()> {
        trace!(len = self.host.len(), "buffer released");
        self.dev.release()
    }
}

impl<T: Element, D: Device> Debug for Buffer<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("device", &self.device.name())
            .field("len", &self.host.len())
            .field("bytes", &self.byte_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::{FaultPoint, SimDevice};

    #[test]
    fn test_zeroed_on_both_sides() {
        let dev = SimDevice::new();
        let buf = Buffer::<f64, _>::new(&dev, 12).unwrap();
        assert_eq!(buf.len(), 12);
        assert_eq!(buf.byte_len(), 96);
        assert!(buf.host().iter().all(|v| *v == 0.0));
        assert_eq!(buf.read_device().unwrap(), vec![0.0; 12]);
    }

    #[test]
    fn test_read_device_keeps_host() {
        let dev = SimDevice::new();
        let mut buf = Buffer::<i32, _>::new(&dev, 3).unwrap();
        buf.host_mut().copy_from_slice(&[1, 2, 3]);
        buf.copy_host_to_device().unwrap();
        buf.host_mut().copy_from_slice(&[7, 8, 9]);
        assert_eq!(buf.read_device().unwrap(), vec![1, 2, 3]);
        assert_eq!(buf.host(), &[7, 8, 9]);
        buf.copy_device_to_host().unwrap();
        assert_eq!(buf.host(), &[1, 2, 3]);
    }

    #[test]
    fn test_failed_device_alloc_leaks_nothing() {
        let dev = SimDevice::new();
        dev.fail_next(FaultPoint::Alloc);
        let err = Buffer::<f32, _>::new(&dev, 64).unwrap_err();
        assert!(matches!(
            err,
            Error::Allocation {
                region: Region::Device,
                ..
            }
        ));
        assert_eq!(dev.stats().live_allocations, 0);
    }

    #[test]
    fn test_release_frees_device_region() {
        let dev = SimDevice::new();
        let a = Buffer::<f32, _>::new(&dev, 16).unwrap();
        let b = Buffer::<f32, _>::new(&dev, 16).unwrap();
        assert_eq!(dev.stats().live_bytes, 128);
        a.release().unwrap();
        assert_eq!(dev.stats().live_bytes, 64);
        drop(b);
        assert_eq!(dev.stats().live_allocations, 0);
    }

    #[test]
    fn test_host_overflow_is_allocation_error() {
        let dev = SimDevice::new();
        let err = Buffer::<f64, _>::new(&dev, usize::MAX / 2).unwrap_err();
        assert!(matches!(
            err,
            Error::Allocation {
                region: Region::Host,
                ..
            }
        ));
    }
}

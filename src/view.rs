//! Shaped views over a [`Buffer`]. Element accessors only touch the host copy.

use std::{
    fmt::{self, Write},
    ops::{Deref, DerefMut},
    sync::Arc,
};

use itertools::Itertools;

use crate::{
    buffer::Buffer,
    device::Device,
    error::{Error, Region, Result},
    scalar::Element,
};

fn element_count(a: usize, b: usize) -> Result<usize> {
    a.checked_mul(b).ok_or_else(|| Error::Allocation {
        region: Region::Host,
        bytes: usize::MAX,
        reason: format!("{a}x{b} elements overflow the address space"),
    })
}

/// `n` elements, `stride` apart. The buffer holds `n * stride` elements.
#[derive(Debug)]
pub struct Vector<T: Element, D: Device> {
    buf: Buffer<T, D>,
    n: usize,
    stride: usize,
}

impl<T: Element, D: Device> Vector<T, D> {
    /// Panics if `stride` is zero.
    pub fn new(device: &Arc<D>, n: usize, stride: usize) -> Result<Self> {
        assert!(stride >= 1, "vector stride must be at least 1");
        Ok(Self {
            buf: Buffer::new(device, element_count(n, stride)?)?,
            n,
            stride,
        })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// The BLAS increment
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn el(&self, i: usize) -> T {
        self.buf.host()[self.stride * i]
    }

    pub fn el_mut(&mut self, i: usize) -> &mut T {
        let stride = self.stride;
        &mut self.buf.host_mut()[stride * i]
    }

    /// Logical elements, skipping the stride gaps.
    pub fn values(&self) -> impl Iterator<Item = T> + '_ {
        self.buf.host().iter().step_by(self.stride).take(self.n).copied()
    }
}

impl<T: Element, D: Device> Deref for Vector<T, D> {
    type Target = Buffer<T, D>;
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl<T: Element, D: Device> DerefMut for Vector<T, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

/// Column-major `rows × cols`, element `(r, c)` at `c * rows + r`.
#[derive(Debug)]
pub struct Matrix<T: Element, D: Device> {
    buf: Buffer<T, D>,
    rows: usize,
    cols: usize,
}

impl<T: Element, D: Device> Matrix<T, D> {
    pub fn new(device: &Arc<D>, rows: usize, cols: usize) -> Result<Self> {
        Ok(Self {
            buf: Buffer::new(device, element_count(rows, cols)?)?,
            rows,
            cols,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn leading_dim(&self) -> usize {
        self.rows
    }

    pub fn el(&self, r: usize, c: usize) -> T {
        self.buf.host()[c * self.rows + r]
    }

    pub fn el_mut(&mut self, r: usize, c: usize) -> &mut T {
        let rows = self.rows;
        &mut self.buf.host_mut()[c * rows + r]
    }

    /// Shape and contents of the device region, read back without touching
    /// the host copy.
    pub fn describe(&self) -> Result<String> {
        let vals = self.buf.read_device()?;
        let mut out = String::new();
        // Writing to a String can't fail
        let _ = write!(
            out,
            "dims: {}x{}, nItems: {}, size: {}, vals: {}",
            self.rows,
            self.cols,
            self.buf.len(),
            self.buf.byte_len(),
            vals.iter().map(|v| format!("{v:?}")).join(" ")
        );
        Ok(out)
    }
}

impl<T: Element, D: Device> Deref for Matrix<T, D> {
    type Target = Buffer<T, D>;
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl<T: Element, D: Device> DerefMut for Matrix<T, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

/// A vector of length one.
#[derive(Debug)]
pub struct Scalar<T: Element, D: Device>(Vector<T, D>);

impl<T: Element, D: Device> Scalar<T, D> {
    pub fn new(device: &Arc<D>) -> Result<Self> {
        Vector::new(device, 1, 1).map(Scalar)
    }

    pub fn get(&self) -> T {
        self.0.el(0)
    }

    pub fn set(&mut self, v: T) {
        *self.0.el_mut(0) = v;
    }

    pub fn el_mut(&mut self) -> &mut T {
        self.0.el_mut(0)
    }
}

impl<T: Element, D: Device> Deref for Scalar<T, D> {
    type Target = Buffer<T, D>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Element, D: Device> DerefMut for Scalar<T, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: Element, D: Device> fmt::Display for Vector<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.values().map(|v| format!("{v:?}")).join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::SimDevice;

    #[test]
    fn test_vector_stride_layout() {
        let dev = SimDevice::new();
        let mut v = Vector::<f32, _>::new(&dev, 3, 4).unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(v.host().len(), 12);
        for i in 0..3 {
            *v.el_mut(i) = i as f32 + 1.0;
        }
        assert_eq!(v.host()[0], 1.0);
        assert_eq!(v.host()[4], 2.0);
        assert_eq!(v.host()[8], 3.0);
        assert_eq!(v.values().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
        assert_eq!(v.to_string(), "[1.0, 2.0, 3.0]");
    }

    #[test]
    fn test_matrix_column_major() {
        let dev = SimDevice::new();
        let mut m = Matrix::<f64, _>::new(&dev, 2, 3).unwrap();
        *m.el_mut(1, 2) = 5.0;
        *m.el_mut(0, 1) = 3.0;
        assert_eq!(m.host()[2 * 2 + 1], 5.0);
        assert_eq!(m.host()[2], 3.0);
        assert_eq!(m.el(1, 2), 5.0);
        assert_eq!(m.leading_dim(), 2);
    }

    #[test]
    fn test_describe_reads_device() {
        let dev = SimDevice::new();
        let mut m = Matrix::<f32, _>::new(&dev, 1, 2).unwrap();
        *m.el_mut(0, 1) = 4.0;
        assert_eq!(
            m.describe().unwrap(),
            "dims: 1x2, nItems: 2, size: 8, vals: 0.0 0.0"
        );
        m.copy_host_to_device().unwrap();
        assert_eq!(
            m.describe().unwrap(),
            "dims: 1x2, nItems: 2, size: 8, vals: 0.0 4.0"
        );
    }

    #[test]
    fn test_oversized_views_are_allocation_errors() {
        let dev = SimDevice::new();
        for err in [
            Vector::<f32, _>::new(&dev, usize::MAX / 2, 4).map(|_| ()).unwrap_err(),
            Matrix::<f64, _>::new(&dev, usize::MAX / 2, 3).map(|_| ()).unwrap_err(),
        ] {
            assert!(matches!(
                err,
                Error::Allocation {
                    region: Region::Host,
                    ..
                }
            ));
        }
        assert_eq!(dev.stats().live_allocations, 0);
    }

    #[test]
    #[should_panic(expected = "stride must be at least 1")]
    fn test_zero_stride_rejected() {
        let dev = SimDevice::new();
        let _ = Vector::<f32, _>::new(&dev, 4, 0);
    }

    #[test]
    fn test_scalar() {
        let dev = SimDevice::new();
        let mut s = Scalar::<i32, _>::new(&dev).unwrap();
        s.set(3);
        *s.el_mut() += 1;
        assert_eq!(s.get(), 4);
        assert_eq!(s.len(), 1);
    }
}

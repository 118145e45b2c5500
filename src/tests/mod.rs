mod level2;
mod lifecycle;
mod linear_solve;
mod suite;

use std::{fmt::Debug, sync::Arc};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::prelude::*;

/// Ensure two arrays are nearly equal, relative to the expected values
pub fn assert_close<T: BlasFloat>(a_vec: &[T], b_vec: &[T], tolerance: f64) {
    assert_eq!(a_vec.len(), b_vec.len(), "Number of elements doesn't match");
    for (i, (a, b)) in a_vec.iter().zip(b_vec.iter()).enumerate() {
        let rerr = relative_error(*a, *b);
        if rerr.is_nan() || rerr > tolerance {
            panic!("{b} is not close to {a} at {i}, rerr: {rerr}");
        }
    }
}

/// Ensure two arrays are exactly equal
pub fn assert_exact<T: PartialEq + Debug>(a_vec: &[T], b_vec: &[T]) {
    assert_eq!(a_vec.len(), b_vec.len(), "Number of elements doesn't match");
    for (a, b) in a_vec.iter().zip(b_vec.iter()) {
        if a != b {
            panic!("{a:?} is not equal to {b:?}");
        }
    }
}

pub fn random_vec<T: BlasFloat>(n: usize, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| T::cast_from(rng.gen_range(-0.5..0.5)))
        .collect()
}

/// A fresh simulated device with one stream on it.
pub fn sim_stream(use_default: bool) -> (Arc<SimDevice>, Stream<SimDevice>) {
    crate::logging::init_for_tests();
    let dev = SimDevice::new();
    let stream = Stream::new(&dev, use_default).unwrap();
    (dev, stream)
}

/// Nothing the harness allocated is still alive on `dev`.
pub fn assert_released(dev: &SimDevice) {
    let stats = dev.stats();
    assert_eq!(stats.live_allocations, 0, "leaked allocations: {stats:?}");
    assert_eq!(stats.live_bytes, 0, "leaked bytes: {stats:?}");
    assert_eq!(stats.live_handles, 0, "leaked handles: {stats:?}");
    assert_eq!(stats.live_queues, 0, "leaked queues: {stats:?}");
}

/// Stamp a test body out once per precision, on both the default and a
/// custom stream.
#[macro_export]
macro_rules! precision_tests {
    ($name:ident, |$t:ident, $use_default:ident| $body:block) => {
        paste::paste! {
            #[test]
            fn [<$name _f32_default_stream>]() {
                type $t = f32;
                let $use_default = true;
                $body
            }
            #[test]
            fn [<$name _f32_custom_stream>]() {
                type $t = f32;
                let $use_default = false;
                $body
            }
            #[test]
            fn [<$name _f64_default_stream>]() {
                type $t = f64;
                let $use_default = true;
                $body
            }
            #[test]
            fn [<$name _f64_custom_stream>]() {
                type $t = f64;
                let $use_default = false;
                $body
            }
        }
    };
}

#[macro_export]
macro_rules! test_imports {
    () => {
        #[allow(unused_imports)]
        use $crate::{
            precision_tests,
            prelude::*,
            tests::{assert_close, assert_exact, assert_released, random_vec, sim_stream},
        };
        #[allow(unused_imports)]
        use proptest::prelude::*;
    };
}

crate::test_imports!();

#[test]
fn test_buffer_round_trip() {
    let dev = SimDevice::new();
    let mut buf = Buffer::<f32, SimDevice>::new(&dev, 10).unwrap();
    assert_exact(buf.host(), &[0.0; 10]);
    assert_exact(&buf.read_device().unwrap(), &[0.0; 10]);

    let data = random_vec::<f32>(10, 1);
    buf.host_mut().copy_from_slice(&data);
    buf.copy_host_to_device().unwrap();
    buf.host_mut().fill(0.0);
    buf.copy_device_to_host().unwrap();
    assert_exact(buf.host(), &data);

    buf.release().unwrap();
    assert_released(&dev);
}

#[test]
fn test_read_device_leaves_host_alone() {
    let dev = SimDevice::new();
    let mut mat = Matrix::<f64, SimDevice>::new(&dev, 2, 2).unwrap();
    *mat.el_mut(1, 0) = 5.0;
    mat.copy_host_to_device().unwrap();
    *mat.el_mut(1, 0) = 7.0;
    assert_exact(&mat.read_device().unwrap(), &[0.0, 5.0, 0.0, 0.0]);
    assert_eq!(mat.el(1, 0), 7.0);
    assert_eq!(
        mat.describe().unwrap(),
        "dims: 2x2, nItems: 4, size: 32, vals: 0.0 5.0 0.0 0.0"
    );
}

#[test]
fn test_async_copies_are_queued() {
    let (dev, stream) = sim_stream(false);
    let mut buf = Buffer::<f64, SimDevice>::new(&dev, 8).unwrap();
    buf.copy_host_to_device_async(&stream).unwrap();
    buf.copy_device_to_host_async(&stream).unwrap();
    assert_eq!(dev.pending(stream.id()), 2);
    stream.synchronize().unwrap();
    assert_eq!(dev.pending(stream.id()), 0);
    assert_eq!(dev.submitted(stream.id()), 2);
}

#[test]
fn test_device_out_of_memory() {
    let dev = SimDevice::with_memory_limit(1024);
    let _held = Buffer::<f64, SimDevice>::new(&dev, 100).unwrap();
    let err = Buffer::<f64, SimDevice>::new(&dev, 100).unwrap_err();
    assert!(matches!(
        err,
        Error::Allocation {
            region: Region::Device,
            bytes: 800,
            ..
        }
    ));
    assert_eq!(err.code(), None);
    assert_eq!(dev.stats().live_allocations, 1);
}

#[test]
fn test_host_size_overflow() {
    let dev = SimDevice::new();
    let err = Buffer::<f64, SimDevice>::new(&dev, usize::MAX / 2).unwrap_err();
    assert!(matches!(
        err,
        Error::Allocation {
            region: Region::Host,
            ..
        }
    ));
    assert_released(&dev);
}

#[test]
fn test_stream_lifecycle() {
    let dev = SimDevice::new();
    let default = Stream::new(&dev, true).unwrap();
    assert!(default.is_default());
    assert_eq!(default.id(), QueueId::DEFAULT);
    assert_eq!(dev.stats().live_queues, 0);

    let custom = Stream::new(&dev, false).unwrap();
    assert!(!custom.is_default());
    assert_eq!(dev.stats().live_queues, 1);
    custom.destroy().unwrap();
    default.destroy().unwrap();
    assert_released(&dev);
}

#[test]
fn test_stream_failures() {
    let dev = SimDevice::new();
    dev.fail_next(FaultPoint::CreateQueue);
    let err = Stream::new(&dev, false).unwrap_err();
    assert_eq!(err.category(), "stream");

    let stream = Stream::new(&dev, false).unwrap();
    dev.fail_next(FaultPoint::Synchronize);
    let err = stream.synchronize().unwrap_err();
    assert!(matches!(err, Error::Synchronization { .. }));
    assert!(!err.is_library_status());

    dev.fail_next(FaultPoint::DestroyQueue);
    assert!(stream.destroy().is_err());
    // The queue is gone even though the runtime complained
    assert_released(&dev);
}

/// Every fault point a tester can hit, with the error category it surfaces as.
const TESTER_FAULTS: [(FaultPoint, &str); 5] = [
    (FaultPoint::Alloc, "allocation"),
    (FaultPoint::CopyToDevice, "transfer"),
    (FaultPoint::CopyToHost, "transfer"),
    (FaultPoint::Synchronize, "synchronization"),
    (FaultPoint::Kernel, "kernel invocation"),
];

#[test]
fn test_faults_release_everything() {
    for (point, category) in TESTER_FAULTS {
        let dev = SimDevice::new();
        {
            let stream = Stream::new(&dev, false).unwrap();
            let params = GemmParams {
                transa: Transpose::NoTrans,
                transb: Transpose::Trans,
                m: 6,
                n: 5,
                k: 4,
                alpha: 1.0,
                beta: 0.5,
            };
            dev.fail_next(point);
            let result = GemmTester::<f32, SimDevice>::new(&stream, &params)
                .and_then(|tester| run(tester, 1e-4));
            let err = result.unwrap_err();
            assert_eq!(err.category(), category, "{point:?}: {err}");
        }
        assert_released(&dev);
    }
}

#[test]
fn test_fault_becomes_error_outcome() {
    let (dev, stream) = sim_stream(true);
    dev.fail_next(FaultPoint::Kernel);
    let params = [AxpyParams {
        n: 4,
        incx: 1,
        incy: 1,
        alpha: 2.0,
    }; 2];
    let section = run_cases("saxpy".to_string(), &stream, &params, 1e-4, |p| {
        AxpyTester::<f32, SimDevice>::new(&stream, p)
    });
    // The section moves on after the failed instance
    assert!(matches!(section.instances[0].outcome, Outcome::Error(_)));
    assert!(matches!(section.instances[1].outcome, Outcome::Passed(_)));
    let summary = section.summary();
    assert_eq!((summary.passed, summary.errors), (1, 1));
    assert!(!section.passed());
}

#[test]
fn test_phases_run_in_order() {
    let (dev, stream) = sim_stream(false);
    let params = CopyParams {
        n: 16,
        incx: 1,
        incy: 1,
        factor: 0.5,
    };
    let tester = CopyTester::<f64, SimDevice>::new(&stream, &params).unwrap();
    let launches = dev.stats().kernel_launches;
    let initialized = Lifecycle::new(tester).init().unwrap();
    assert_eq!(dev.stats().kernel_launches, launches);
    let executed = initialized.execute().unwrap();
    assert_eq!(dev.stats().kernel_launches, launches + 1);
    assert!(executed.check(0.0).passed());
}

/// Runs `tester` phase by phase and asserts the stream has drained after
/// each one.
fn assert_phases_synchronize<K: KernelTester>(dev: &SimDevice, stream: &Stream<SimDevice>, tester: K) {
    let name = tester.name();
    let submitted = dev.submitted(stream.id());
    let initialized = Lifecycle::new(tester).init().unwrap();
    let after_init = dev.submitted(stream.id());
    assert!(after_init > submitted, "{name}: init enqueued nothing");
    assert_eq!(dev.pending(stream.id()), 0, "{name}: init left work queued");
    let _executed = initialized.execute().unwrap();
    assert!(dev.submitted(stream.id()) > after_init, "{name}: nothing launched");
    assert_eq!(dev.pending(stream.id()), 0, "{name}: do_operation left work queued");
}

precision_tests!(test_every_tester_synchronizes, |T, use_default| {
    let (dev, stream) = sim_stream(use_default);
    let (n, incx, incy) = (24, 4, 7);
    assert_phases_synchronize(
        &dev,
        &stream,
        AxpyTester::<T, SimDevice>::new(&stream, &AxpyParams { n, incx, incy, alpha: 0.5 }).unwrap(),
    );
    assert_phases_synchronize(
        &dev,
        &stream,
        DotTester::<T, SimDevice>::new(&stream, &DotParams { n, incx, incy }).unwrap(),
    );
    assert_phases_synchronize(
        &dev,
        &stream,
        CopyTester::<T, SimDevice>::new(&stream, &CopyParams { n, incx, incy, factor: 1.25 }).unwrap(),
    );
    for which in [Extremum::Max, Extremum::Min] {
        let params = ExtremumParams { n, incx, seed: 5 };
        assert_phases_synchronize(
            &dev,
            &stream,
            ExtremumTester::<T, SimDevice>::new(&stream, which, &params).unwrap(),
        );
    }
    let gemv = GemvParams {
        trans: Transpose::Trans,
        m: 12,
        n: 9,
        incx,
        incy,
        alpha: 1.0,
        beta: 0.5,
    };
    assert_phases_synchronize(&dev, &stream, GemvTester::<T, SimDevice>::new(&stream, &gemv).unwrap());
    let gemm = GemmParams {
        transa: Transpose::Trans,
        transb: Transpose::NoTrans,
        m: 7,
        n: 6,
        k: 5,
        alpha: 1.0,
        beta: 0.5,
    };
    assert_phases_synchronize(&dev, &stream, GemmTester::<T, SimDevice>::new(&stream, &gemm).unwrap());
    let gesv = GesvParams {
        n: 10,
        nrhs: 3,
        seed: 8,
    };
    assert_phases_synchronize(&dev, &stream, GesvTester::<T, SimDevice>::new(&stream, &gesv).unwrap());
});

crate::test_imports!();

use strum::IntoEnumIterator;

use crate::device::sim::blas_status;

fn gemv_params(trans: Transpose, m: usize, n: usize, incx: usize, incy: usize) -> GemvParams {
    GemvParams {
        trans,
        m,
        n,
        incx,
        incy,
        alpha: 0.5,
        beta: 1.5,
    }
}

precision_tests!(test_gemv_grid, |T, use_default| {
    let (dev, stream) = sim_stream(use_default);
    for (incx, incy, trans) in itertools::iproduct!(INCX_SET, INCY_SET, Transpose::iter()) {
        let params = gemv_params(trans, 73, 51, incx, incy);
        let report = run(GemvTester::<T, SimDevice>::new(&stream, &params).unwrap(), 1e-4).unwrap();
        assert!(report.passed(), "{params}: {report}");
        // Transposing swaps which dimension y runs over
        let len_y = if trans.is_trans() { 51 } else { 73 };
        assert_eq!(report.checked, len_y);
    }
    if !use_default {
        assert!(dev.submitted(stream.id()) > 0);
        assert_eq!(dev.pending(stream.id()), 0);
    }
});

#[test]
fn test_gemv_beta_zero_ignores_y() {
    let (_dev, stream) = sim_stream(true);
    let params = GemvParams {
        beta: 0.0,
        ..gemv_params(Transpose::NoTrans, 10, 4, 1, 1)
    };
    let tester = GemvTester::<f64, SimDevice>::new(&stream, &params).unwrap();
    let report = run(tester, 1e-12).unwrap();
    assert!(report.passed(), "{report}");
}

#[test]
fn test_gemv_rejects_bad_leading_dimension() {
    let (dev, stream) = sim_stream(false);
    let ctx = BlasContext::<SimDevice>::new(&stream).unwrap();
    let a = Matrix::<f32, SimDevice>::new(&dev, 4, 4).unwrap();
    let x = Vector::<f32, SimDevice>::new(&dev, 4, 1).unwrap();
    let mut y = Vector::<f32, SimDevice>::new(&dev, 4, 1).unwrap();
    let err = ctx
        .handle()
        .gemv(
            Transpose::NoTrans,
            4,
            4,
            &1.0f32,
            a.dev(),
            2,
            x.dev(),
            1,
            &0.0f32,
            y.dev_mut(),
            1,
        )
        .unwrap_err();
    assert!(matches!(err, Error::KernelInvocation { ref routine, .. } if routine == "sgemv"));
    assert_eq!(err.code(), Some(blas_status::INVALID_VALUE));
}

#[test]
fn test_gemv_mismatch_detected() {
    let (_dev, stream) = sim_stream(false);
    let params = gemv_params(Transpose::Trans, 10, 4, 1, 7);
    let mut tester = GemvTester::<f64, SimDevice>::new(&stream, &params).unwrap();
    tester.init().unwrap();
    tester.do_operation().unwrap();
    assert!(tester.check(1e-4).passed());
    *tester.y_mut().el_mut(2) += 1.0;
    let report = tester.check(1e-4);
    assert!(!report.passed());
    assert_eq!(report.mismatch_count(), 1);
}

#[test]
fn test_gemv_empty_rows() {
    // lda stays at 1 when A has no rows
    let (_dev, stream) = sim_stream(false);
    for trans in Transpose::iter() {
        let params = GemvParams {
            beta: 1.0,
            ..gemv_params(trans, 0, 5, 1, 1)
        };
        let report = run(GemvTester::<f32, SimDevice>::new(&stream, &params).unwrap(), 1e-4).unwrap();
        assert!(report.passed(), "{params}: {report}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_gemv_double(
        m in 1usize..120,
        n in 1usize..120,
        incx in prop::sample::select(INCX_SET.to_vec()),
        incy in prop::sample::select(INCY_SET.to_vec()),
        trans in any::<bool>(),
        alpha in -1.0f64..1.0,
        beta in -2.5f64..2.5,
    ) {
        let (_dev, stream) = sim_stream(false);
        let params = GemvParams { trans: trans.into(), m, n, incx, incy, alpha, beta };
        let report = run(GemvTester::<f64, SimDevice>::new(&stream, &params).unwrap(), 1e-4).unwrap();
        prop_assert!(report.passed(), "{}: {}", params, report);
    }

    // Same-sign coefficients keep the single precision result away from
    // cancellation
    #[test]
    fn prop_gemv_single(
        m in 1usize..120,
        n in 1usize..120,
        trans in any::<bool>(),
        alpha in 0.1f64..1.0,
        beta in 0.1f64..2.5,
    ) {
        let (_dev, stream) = sim_stream(true);
        let params = GemvParams { trans: trans.into(), m, n, incx: 4, incy: 7, alpha, beta };
        let report = run(GemvTester::<f32, SimDevice>::new(&stream, &params).unwrap(), 1e-4).unwrap();
        prop_assert!(report.passed(), "{}: {}", params, report);
    }
}

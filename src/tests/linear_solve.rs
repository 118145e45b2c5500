crate::test_imports!();

fn small(n: usize, nrhs: usize) -> GesvParams {
    GesvParams { n, nrhs, seed: 0 }
}

precision_tests!(test_gesv_known_system, |T, use_default| {
    let (dev, stream) = sim_stream(use_default);
    let mut tester = GesvTester::<T, SimDevice>::new(&stream, &small(2, 1)).unwrap();
    // [[4, 1], [2, 3]] x = [1, 2]
    let a: Vec<T> = [4.0, 2.0, 1.0, 3.0].map(T::cast_from).to_vec();
    let b: Vec<T> = [1.0, 2.0].map(T::cast_from).to_vec();
    tester.set_operands(&a, &b);
    let executed = Lifecycle::new(tester).init().unwrap().execute().unwrap();
    assert_eq!(executed.tester().info(), 0);
    assert_close(
        executed.tester().solution().host(),
        &[T::cast_from(0.1), T::cast_from(0.6)],
        1e-5,
    );
    let report = executed.check(1e-4);
    assert!(report.passed(), "{report}");
    assert!(report.residual_norm.unwrap() < 1e-5);
    drop(stream);
    assert_released(&dev);
});

#[test]
fn test_gesv_pivots() {
    let (_dev, stream) = sim_stream(false);
    let mut tester = GesvTester::<f64, SimDevice>::new(&stream, &small(2, 1)).unwrap();
    tester.set_operands(&[0.0, 1.0, 2.0, 1.0], &[2.0, 3.0]);
    let executed = Lifecycle::new(tester).init().unwrap().execute().unwrap();
    assert_exact(executed.tester().pivots().host(), &[2, 2]);
    assert_exact(executed.tester().solution().host(), &[2.0, 1.0]);
    assert_eq!(executed.tester().iterations(), 0);
    assert!(executed.check(1e-12).passed());
}

#[test]
fn test_gesv_wrong_solution_detected() {
    let (_dev, stream) = sim_stream(true);
    let mut tester = GesvTester::<f64, SimDevice>::new(&stream, &small(2, 1)).unwrap();
    // diag(2, 4) x = [2, 8], so each row only sees its own unknown
    tester.set_operands(&[2.0, 0.0, 0.0, 4.0], &[2.0, 8.0]);
    tester.init().unwrap();
    tester.do_operation().unwrap();
    assert_exact(tester.solution().host(), &[1.0, 2.0]);
    assert!(tester.check(1e-12).passed());
    *tester.solution_mut().el_mut(1, 0) = 2.5;
    let report = tester.check(1e-4);
    assert!(!report.passed());
    assert_eq!(report.mismatch_count(), 1);
    assert_eq!(report.residual_norm, Some(2.0));
}

#[test]
fn test_singular_system_is_skipped() {
    let (_dev, stream) = sim_stream(true);
    let mut tester = GesvTester::<f64, SimDevice>::new(&stream, &small(2, 2)).unwrap();
    tester.set_operands(&[1.0, 2.0, 2.0, 4.0], &[1.0, 1.0, 2.0, 2.0]);
    let executed = Lifecycle::new(tester).init().unwrap().execute().unwrap();
    assert_eq!(executed.tester().info(), 2);
    let report = executed.check(1e-4);
    assert!(report.is_skipped());
    assert!(!report.passed());
    let outcome = Outcome::from_result(Ok(report));
    assert!(matches!(outcome, Outcome::Skipped(_)));
    assert!(!outcome.is_failure());
}

#[test]
fn test_multiple_right_hand_sides() {
    let (_dev, stream) = sim_stream(false);
    let params = GesvParams {
        n: 40,
        nrhs: 12,
        seed: 11,
    };
    let report = run(GesvTester::<f64, SimDevice>::new(&stream, &params).unwrap(), 1e-4).unwrap();
    assert!(report.passed(), "{report}");
    assert_eq!(report.checked, 40 * 12);
}

#[test]
fn test_largest_system() {
    let (_dev, stream) = sim_stream(false);
    let params = GesvParams {
        n: 150,
        nrhs: 20,
        seed: 2024,
    };
    let report = run(GesvTester::<f64, SimDevice>::new(&stream, &params).unwrap(), 1e-4).unwrap();
    assert!(report.passed(), "{report}");
    assert_eq!(report.checked, 150 * 20);
}

#[test]
fn test_solver_failure_releases_everything() {
    let (dev, stream) = sim_stream(false);
    dev.fail_next(FaultPoint::Kernel);
    let err = run(
        GesvTester::<f32, SimDevice>::new(&stream, &small(8, 3)).unwrap(),
        1e-4,
    )
    .unwrap_err();
    assert!(matches!(err, Error::KernelInvocation { ref routine, .. } if routine == "sgesv"));
    drop(stream);
    assert_released(&dev);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_gesv_residual(n in 50usize..=150, nrhs in 2usize..=20, seed in any::<u64>()) {
        let (_dev, stream) = sim_stream(seed % 2 == 0);
        let params = GesvParams { n, nrhs, seed };
        let report = run(GesvTester::<f64, SimDevice>::new(&stream, &params).unwrap(), 1e-4).unwrap();
        // A random dense matrix is singular with probability zero
        prop_assert!(report.passed(), "{}: {}", params, report);
    }
}

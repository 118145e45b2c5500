crate::test_imports!();

use rand::{rngs::StdRng, SeedableRng};
use strum::IntoEnumIterator;

fn quick_config() -> HarnessConfig {
    HarnessConfig {
        seed: Some(7),
        min_size: 10,
        max_size: 30,
        min_nrhs: 2,
        max_nrhs: 5,
        ..Default::default()
    }
}

#[test]
fn test_case_grids() {
    let cfg = HarnessConfig {
        samples: 3,
        ..quick_config()
    };
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(axpy_cases(&cfg, &mut rng).len(), 3 * 4);
    assert_eq!(dot_cases(&cfg, &mut rng).len(), 3 * 4);
    assert_eq!(copy_cases(&cfg, &mut rng).len(), 3 * 4);
    assert_eq!(extremum_cases(&cfg, &mut rng).len(), 3 * 2);
    assert_eq!(gemv_cases(&cfg, &mut rng).len(), 3 * 8);

    let gemm = gemm_cases(&cfg, &mut rng);
    assert_eq!(gemm.len(), 3 * 4);
    for p in &gemm {
        assert!((10..=30).contains(&p.m) && (10..=30).contains(&p.k));
        assert!((-1.0..=1.0).contains(&p.alpha) && (-2.5..=2.5).contains(&p.beta));
    }
    assert_eq!(
        gemm.iter()
            .take(4)
            .map(|p| (p.transa, p.transb))
            .collect::<Vec<_>>(),
        itertools::iproduct!(Transpose::iter(), Transpose::iter()).collect::<Vec<_>>()
    );

    let gesv = gesv_cases(&cfg, &mut rng);
    assert_eq!(gesv.len(), 3 * 2);
    for pair in gesv.chunks(2) {
        assert_eq!(pair[0].nrhs, 1);
        assert!((2..=5).contains(&pair[1].nrhs));
        assert_eq!(pair[0].n, pair[1].n);
    }
}

#[test]
fn test_cases_are_reproducible() {
    let cfg = quick_config();
    let draw = || gemv_cases(&cfg, &mut StdRng::seed_from_u64(99));
    assert_eq!(draw(), draw());
}

#[test]
fn test_full_suite() {
    crate::logging::init_for_tests();
    let dev = SimDevice::new();
    let report = run_suite(&dev, &quick_config());
    assert_eq!(report.seed, 7);
    assert_eq!(report.device, "sim");
    assert_eq!(report.sections.len(), 2 * 8 * 2);
    for section in &report.sections {
        assert_eq!(section.summary().errors, 0, "{}", section.name);
        // Single precision results can legitimately cancel past the
        // tolerance for unlucky draws, double precision can't
        if section.name.starts_with('d') || section.name.starts_with("id") {
            assert!(section.passed(), "{} on {} stream", section.name, section.stream_label());
        }
    }
    let summary = report.summary();
    assert_eq!(summary.errors, 0);
    assert!(summary.total() > 0);
    assert_released(&dev);
}

#[test]
fn test_stream_modes() {
    for (mode, sections) in [
        (StreamMode::Default, 2),
        (StreamMode::Custom, 2),
        (StreamMode::Both, 4),
    ] {
        let dev = SimDevice::new();
        let cfg = HarnessConfig {
            streams: mode,
            kernels: vec![KernelKind::Dot],
            ..quick_config()
        };
        let report = run_suite(&dev, &cfg);
        assert_eq!(report.sections.len(), sections);
        assert!(report.passed(), "{mode}");
        let defaults = report.sections.iter().filter(|s| s.default_stream).count();
        match mode {
            StreamMode::Default => assert_eq!(defaults, 2),
            StreamMode::Custom => assert_eq!(defaults, 0),
            StreamMode::Both => assert_eq!(defaults, 2),
        }
    }
}

#[test]
fn test_suite_from_toml() {
    let cfg = HarnessConfig::from_toml(
        r#"
        seed = 3
        min_size = 8
        max_size = 16
        streams = "custom"
        kernels = ["gesv"]
        precisions = ["double"]
        "#,
    )
    .unwrap();
    let dev = SimDevice::new();
    let report = run_suite(&dev, &cfg);
    assert_eq!(report.sections.len(), 1);
    let section = &report.sections[0];
    assert_eq!(section.name, "dgesv");
    assert_eq!(section.stream_label(), "custom");
    assert!(section.passed());
    for inst in &section.instances {
        let residual = inst.outcome.report().and_then(|r| r.residual_norm);
        assert!(residual.is_some(), "{}", inst.params);
    }
}

#[test]
fn test_queue_failure_is_a_section_error() {
    let dev = SimDevice::new();
    dev.fail_next(FaultPoint::CreateQueue);
    let cfg = HarnessConfig {
        streams: StreamMode::Custom,
        kernels: vec![KernelKind::Axpy],
        precisions: vec![Precision::Double],
        ..quick_config()
    };
    let report = run_suite(&dev, &cfg);
    assert_eq!(report.sections.len(), 1);
    let summary = report.summary();
    assert_eq!(summary.errors, 1);
    assert!(!report.passed());
}

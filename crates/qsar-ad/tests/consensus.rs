use ndarray::{Array1, ArrayView1};
use qsar_ad::consensus::{combine_and, combine_with_structural, compare_methods, MethodVerdict};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_verdict(rng: &mut StdRng, n: usize) -> Array1<bool> {
    Array1::from_shape_fn(n, |_| rng.gen_bool(0.7))
}

// ----------------------------------------------------------------------------
// AND combination
// ----------------------------------------------------------------------------

#[test]
fn and_with_all_true_is_identity() {
    let mut rng = StdRng::seed_from_u64(21);
    let v = random_verdict(&mut rng, 50);
    let ones = Array1::from_elem(50, true);
    assert_eq!(combine_and(&[v.view(), ones.view()]).unwrap(), v);
    assert_eq!(combine_and(&[v.view()]).unwrap(), v);
}

#[test]
fn and_is_idempotent_and_order_free() {
    let mut rng = StdRng::seed_from_u64(22);
    let a = random_verdict(&mut rng, 50);
    let b = random_verdict(&mut rng, 50);
    assert_eq!(combine_and(&[a.view(), a.view()]).unwrap(), a);
    assert_eq!(
        combine_and(&[a.view(), b.view()]).unwrap(),
        combine_and(&[b.view(), a.view()]).unwrap()
    );
}

#[test]
fn consensus_with_structural_control() {
    let mut rng = StdRng::seed_from_u64(23);
    let methods: Vec<MethodVerdict> = ["Leverage", "SimilarityDistance"]
        .iter()
        .map(|name| MethodVerdict::new(*name, random_verdict(&mut rng, 30)))
        .collect();
    let rtc = random_verdict(&mut rng, 30);
    let combined = combine_with_structural(&methods, rtc.view()).unwrap();

    assert_eq!(combined.len(), 4);
    assert_eq!(combined[0].name, "Leverage+RTC");
    assert_eq!(combined[2].verdict, rtc);

    let views: Vec<ArrayView1<bool>> = methods
        .iter()
        .map(|m| m.verdict.view())
        .chain(std::iter::once(rtc.view()))
        .collect();
    assert_eq!(combined[3].name, "Consensus+RTC");
    assert_eq!(combined[3].verdict, combine_and(&views).unwrap());
    // the consensus is never wider than any single combined method
    for m in &combined[..2] {
        assert!(combined[3]
            .verdict
            .iter()
            .zip(m.verdict.iter())
            .all(|(&c, &v)| !c || v));
    }
}

// ----------------------------------------------------------------------------
// Method comparison
// ----------------------------------------------------------------------------

#[test]
fn comparison_ranks_the_method_that_isolates_the_outlier() {
    let n = 20;
    let y_true = Array1::from_shape_fn(n, |i| i as f64);
    let mut y_pred = &y_true + 0.1;
    y_pred[7] += 25.0;

    let mut flagged = Array1::from_elem(n, true);
    flagged[7] = false;
    let score = Array1::from_shape_fn(n, |i| if i == 7 { 1.0 } else { 0.1 });
    let methods = vec![
        MethodVerdict::new("good", flagged).with_score(score),
        MethodVerdict::new("everything", Array1::from_elem(n, true)),
    ];

    let reports = compare_methods(y_true.view(), y_pred.view(), &methods).unwrap();
    let (good, all) = (&reports[0], &reports[1]);

    assert_eq!(good.name, "good");
    assert!((good.coverage - 0.95).abs() < 1e-12);
    assert!((good.balanced_accuracy - 1.0).abs() < 1e-12);
    assert!((good.auc - 1.0).abs() < 1e-12);
    assert!((good.rmse_in_ad - 0.1).abs() < 1e-9);
    assert!(good.delta_rmse_in > 0.0);
    assert_eq!((good.tp, good.fp, good.tn, good.fn_), (19, 0, 1, 0));
    assert!((good.iap - 1.0).abs() < 1e-12);

    assert_eq!(all.coverage, 1.0);
    assert!((all.balanced_accuracy - 0.5).abs() < 1e-12);
    assert!((all.auc - 0.5).abs() < 1e-12);
    assert_eq!(all.rmse_out_ad, 0.0);
    assert!((all.delta_rmse_in).abs() < 1e-12);
}

#[test]
fn comparison_rejects_misaligned_verdicts() {
    let y = Array1::from_elem(5, 1.0);
    let methods = vec![MethodVerdict::new("short", Array1::from_elem(4, true))];
    assert!(compare_methods(y.view(), y.view(), &methods).is_err());
}

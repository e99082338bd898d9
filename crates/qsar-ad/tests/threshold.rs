use ndarray::{array, Array1};
use qsar_ad::config::AdScore;
use qsar_ad::threshold::{optimize_threshold, Comparison};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_oof(seed: u64, n: usize) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let y_true = Array1::from_shape_fn(n, |_| rng.gen_range(-2.0..2.0));
    let noise = Array1::from_shape_fn(n, |_| rng.gen_range(-0.5..0.5));
    let score = Array1::from_shape_fn(n, |_| rng.gen_range(0.0..1.0));
    // error grows with the score
    let y_pred = &y_true + &(&noise * &score.mapv(|s| 1.0 + 5.0 * s));
    (y_true, y_pred, score)
}

#[test]
fn search_is_deterministic() {
    let (y_true, y_pred, score) = random_oof(7, 200);
    for metric in [AdScore::BalancedAccuracy, AdScore::RmseDifference] {
        let a = optimize_threshold(
            y_true.view(),
            y_pred.view(),
            score.view(),
            Comparison::LessEqual,
            metric,
        )
        .unwrap();
        let b = optimize_threshold(
            y_true.view(),
            y_pred.view(),
            score.view(),
            Comparison::LessEqual,
            metric,
        )
        .unwrap();
        assert_eq!(a, b);
        assert!(score.iter().any(|&s| s == a.threshold) || a.threshold == 0.0);
    }
}

#[test]
fn selected_threshold_is_never_beaten_by_another_candidate() {
    let (y_true, y_pred, score) = random_oof(11, 120);
    let best = optimize_threshold(
        y_true.view(),
        y_pred.view(),
        score.view(),
        Comparison::LessEqual,
        AdScore::RmseDifference,
    )
    .unwrap();
    for &z in score.iter() {
        let ad = Comparison::LessEqual.apply(score.view(), z);
        let value = AdScore::RmseDifference
            .evaluate(y_true.view(), y_pred.view(), ad.view())
            .unwrap();
        assert!(value <= best.score + 1e-12);
    }
}

#[test]
fn negative_metrics_keep_the_zero_baseline() {
    // the lowest scores carry the largest errors, so every cutoff makes
    // RMSE inside worse than outside
    let y_true = array![0.0, 0.0, 0.0, 0.0];
    let y_pred = array![5.0, 4.0, 0.1, 0.1];
    let score = array![0.1, 0.2, 0.8, 0.9];
    let found = optimize_threshold(
        y_true.view(),
        y_pred.view(),
        score.view(),
        Comparison::LessEqual,
        AdScore::RmseDifference,
    )
    .unwrap();
    assert_eq!(found.threshold, 0.0);
    assert_eq!(found.score, 0.0);
    assert_eq!(found.n_candidates, 4);
}

#[test]
fn greater_equal_comparison_flips_the_verdict() {
    let score = array![0.1, 0.5, 0.9];
    assert_eq!(
        Comparison::GreaterEqual.apply(score.view(), 0.5).to_vec(),
        vec![false, true, true]
    );
    assert_eq!(
        Comparison::LessEqual.apply(score.view(), 0.5).to_vec(),
        vec![true, true, false]
    );
}

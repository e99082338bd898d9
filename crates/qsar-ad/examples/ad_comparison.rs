use std::path::Path;

use anyhow::Result;
use maud::html;
use ndarray::{Array1, ArrayView1};
use rand::{rngs::StdRng, Rng, SeedableRng};

use qsar_ad::config::{AdScore, CrossValidation, ForestParams, RegressorConfig, ThresholdPolicy};
use qsar_ad::consensus::{combine_with_structural, compare_methods, MethodVerdict};
use qsar_ad::domain::{
    EnsembleVarianceParams, Environment, LeverageParams, ReactionTypeControl, SimilarityParams,
};
use qsar_ad::io::descriptors::read_descriptor_csv;
use qsar_ad::models::forest::RandomForestRegressor;
use qsar_ad::models::regressor_trait::Regressor;
use qsar_ad::preprocessing::StandardScaler;
use qsar_ad::report::plots::{plot_coverage_curve, plot_score_distribution};
use qsar_ad::report::report::{comparison_section, Report, ReportSection};
use qsar_ad::stats::reliable_mask;
use qsar_ad::{AdConfig, AdMethod, DomainEstimator};

fn target(row: ArrayView1<f64>) -> f64 {
    (3.0 * row[0]).sin() + row[1] * row[1] - 0.5 * row[2]
}

/// Write a synthetic descriptor table: 200 training rows spanning [0, 1)
/// in every descriptor, then 80 test rows from the same range and 20
/// shifted rows.
fn write_synthetic_table(path: &Path) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["y", "d0", "d1", "d2", "d3"])?;
    for i in 0..300 {
        let range = if i < 280 { 0.0..1.0 } else { 1.0..2.0 };
        let row = Array1::from_shape_fn(4, |_| rng.gen_range(range.clone()));
        let mut record = vec![target(row.view()).to_string()];
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let table = std::env::temp_dir().join("qsar_ad_synthetic.csv");
    write_synthetic_table(&table)?;
    let data = read_descriptor_csv(&table, "y")?;
    data.log_summary();

    let train = data.select(&(0..200).collect::<Vec<_>>());
    let test = data.select(&(200..300).collect::<Vec<_>>());

    // AD methods compare distances across descriptors, so put them on one scale
    let (scaler, x_train) = StandardScaler::fit_transform(train.x.view())?;
    let x_test = scaler.transform(test.x.view())?;
    let (y_train, y_test) = (train.y, test.y);

    // four reaction types in training; the shifted block is a new one
    let sig_train: Vec<String> = (0..200).map(|i| format!("type{}", i % 4)).collect();
    let sig_test: Vec<String> = (0..100)
        .map(|i| if i < 80 { format!("type{}", i % 4) } else { "type9".to_string() })
        .collect();

    println!("Train X shape: {:?}", x_train.shape());
    println!("Test X shape: {:?}", x_test.shape());

    let forest = ForestParams {
        n_estimators: 50,
        seed: 7,
        ..Default::default()
    };
    let mut model = RandomForestRegressor::new(forest)?;
    model.fit(x_train.view(), y_train.view())?;
    let y_pred = model.predict(x_test.view())?;

    let cv = CrossValidation::new(5, 42);
    let configs = vec![
        AdConfig::BoundingBox,
        AdConfig::Leverage(LeverageParams::default()),
        AdConfig::SimilarityDistance(SimilarityParams {
            threshold: ThresholdPolicy::CrossValidated,
            regressor: Some(RegressorConfig::RandomForest(forest)),
            cv,
            ..Default::default()
        }),
        AdConfig::EnsembleVariance(EnsembleVarianceParams {
            forest,
            score: AdScore::RmseDifference,
            cv,
            ..Default::default()
        }),
    ];

    let mut verdicts = Vec::new();
    let mut report = Report::new(
        "Applicability domain comparison",
        env!("CARGO_PKG_VERSION"),
        None,
        "Synthetic descriptors with an extrapolated test block",
    );
    let reliable = reliable_mask(y_test.view(), y_pred.view());

    for config in &configs {
        let mut method = AdMethod::from_config(config)?;
        method.fit(x_train.view(), Some(y_train.view()))?;
        let verdict = method.predict(x_test.view())?;
        let mut entry = MethodVerdict::new(method.name(), verdict);

        if let Some(score) = method.predict_proba(x_test.view())? {
            let mut section = ReportSection::new(method.name());
            section.add_content(html! {
                p { "Threshold: " (format!("{:.4}", method.threshold().unwrap_or(f64::NAN))) }
            });
            section.add_plot(plot_score_distribution(
                score.view(),
                &reliable,
                &format!("{} score distribution", method.name()),
            )?);
            section.add_plot(plot_coverage_curve(
                score.view(),
                method.threshold(),
                &format!("{} coverage", method.name()),
            )?);
            report.add_section(section);
            entry = entry.with_score(score);
        }
        verdicts.push(entry);
    }

    let mut rtc = ReactionTypeControl::new(Environment::Depth(1));
    rtc.fit(&sig_train)?;
    let structural = rtc.predict(&sig_test)?;
    let mut all = verdicts.clone();
    all.extend(combine_with_structural(&verdicts, structural.view())?);

    let reports = compare_methods(y_test.view(), y_pred.view(), &all)?;
    for r in &reports {
        println!(
            "{:<28} coverage={:.2} rmse_in={:.3} rmse_out={:.3} ba={:.3} auc={:.3}",
            r.name, r.coverage, r.rmse_in_ad, r.rmse_out_ad, r.balanced_accuracy, r.auc
        );
    }
    report.add_section(comparison_section("Method comparison", &reports));

    let path = std::env::temp_dir().join("qsar_ad_comparison.html");
    report.save_to_file(&path)?;
    println!("Report written to {}", path.display());

    Ok(())
}

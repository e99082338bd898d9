use itertools_num::linspace;
use ndarray::ArrayView1;
use plotly::common::{DashType, Line, Mode};
use plotly::layout::{Axis, Layout};
use plotly::{Histogram, Plot, Scatter};

use crate::config::AdScore;
use crate::error::{check_len, AdError, Result};
use crate::threshold::{unique_sorted, Comparison};

/// Number of points on the coverage curve.
const COVERAGE_POINTS: usize = 200;

fn threshold_marker(threshold: f64, y_max: f64) -> Box<Scatter<f64, f64>> {
    Scatter::new(vec![threshold, threshold], vec![0.0, y_max])
        .mode(Mode::Lines)
        .name("Selected threshold")
        .line(Line::new().color("red").dash(DashType::Dash))
}

/// Histogram of the outlyingness score for reliable and unreliable
/// predictions.
pub fn plot_score_distribution(
    score: ArrayView1<f64>,
    reliable: &[bool],
    title: &str,
) -> Result<Plot> {
    check_len("plot_score_distribution: labels", score.len(), reliable.len())?;

    let mut scores_reliable = Vec::new();
    let mut scores_unreliable = Vec::new();
    for (&s, &r) in score.iter().zip(reliable.iter()) {
        if r {
            scores_reliable.push(s);
        } else {
            scores_unreliable.push(s);
        }
    }

    let layout = Layout::new()
        .title(title)
        .x_axis(Axis::new().title("Outlyingness score"))
        .y_axis(Axis::new().title("Count"));

    let mut plot = Plot::new();
    plot.add_trace(Histogram::new(scores_reliable).name("Reliable"));
    plot.add_trace(Histogram::new(scores_unreliable).name("Unreliable"));
    plot.set_layout(layout);
    Ok(plot)
}

/// AD metric at every candidate threshold (the unique score values), with
/// the selected threshold marked when given.
pub fn plot_threshold_sweep(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
    score: ArrayView1<f64>,
    metric: AdScore,
    selected: Option<f64>,
    title: &str,
) -> Result<Plot> {
    check_len("plot_threshold_sweep: y_pred", y_true.len(), y_pred.len())?;
    check_len("plot_threshold_sweep: score", y_true.len(), score.len())?;

    let candidates = unique_sorted(score)?;
    let values = candidates
        .iter()
        .map(|&z| {
            let ad = Comparison::LessEqual.apply(score, z);
            metric.evaluate(y_true, y_pred, ad.view())
        })
        .collect::<Result<Vec<f64>>>()?;
    let y_max = values.iter().copied().fold(0.0, f64::max);

    let mut plot = Plot::new();
    plot.add_trace(
        Scatter::new(candidates, values)
            .mode(Mode::LinesMarkers)
            .name(metric.as_str()),
    );
    if let Some(t) = selected {
        plot.add_trace(threshold_marker(t, y_max));
    }
    plot.set_layout(
        Layout::new()
            .title(title)
            .x_axis(Axis::new().title("Threshold"))
            .y_axis(Axis::new().title(metric.as_str())),
    );
    Ok(plot)
}

/// Fraction of samples in domain as the threshold moves over the score
/// range.
pub fn plot_coverage_curve(score: ArrayView1<f64>, selected: Option<f64>, title: &str) -> Result<Plot> {
    let candidates = unique_sorted(score)?;
    let (Some(&lo), Some(&hi)) = (candidates.first(), candidates.last()) else {
        return Err(AdError::InvalidInput("coverage curve of an empty score".to_string()));
    };

    let n = score.len() as f64;
    let thresholds: Vec<f64> = linspace(lo, hi, COVERAGE_POINTS).collect();
    let coverage: Vec<f64> = thresholds
        .iter()
        .map(|&t| score.iter().filter(|&&s| s <= t).count() as f64 / n)
        .collect();

    let mut plot = Plot::new();
    plot.add_trace(Scatter::new(thresholds, coverage).mode(Mode::Lines).name("Coverage"));
    if let Some(t) = selected {
        plot.add_trace(threshold_marker(t, 1.0));
    }
    plot.set_layout(
        Layout::new()
            .title(title)
            .x_axis(Axis::new().title("Threshold"))
            .y_axis(Axis::new().title("Fraction in domain")),
    );
    Ok(plot)
}

//! Self-contained HTML report: a header, titled sections of free-form
//! markup and plotly figures, and an AD method comparison table.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use maud::{html, Markup, PreEscaped, DOCTYPE};
use plotly::Plot;

use crate::consensus::MethodReport;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";

const STYLE: &str = "body{font-family:sans-serif;margin:2em auto;max-width:1100px;color:#222}\
table{border-collapse:collapse;font-size:0.85em}\
th,td{border:1px solid #ccc;padding:4px 8px;text-align:right}\
th:first-child,td:first-child{text-align:left}\
header img{height:48px;vertical-align:middle;margin-right:1em}";

enum Block {
    Content(Markup),
    Plot(Plot),
}

pub struct ReportSection {
    title: String,
    blocks: Vec<Block>,
}

impl ReportSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            blocks: Vec::new(),
        }
    }

    pub fn add_content(&mut self, content: Markup) {
        self.blocks.push(Block::Content(content));
    }

    pub fn add_plot(&mut self, plot: Plot) {
        self.blocks.push(Block::Plot(plot));
    }

    fn render(&self, section_idx: usize) -> Markup {
        html! {
            section {
                h2 { (self.title) }
                @for (i, block) in self.blocks.iter().enumerate() {
                    @match block {
                        Block::Content(markup) => {
                            div.content { (markup) }
                        }
                        Block::Plot(plot) => {
                            div.plot {
                                (PreEscaped(plot.to_inline_html(Some(format!("plot-{}-{}", section_idx, i).as_str()))))
                            }
                        }
                    }
                }
            }
        }
    }
}

pub struct Report {
    title: String,
    version: String,
    logo: Option<String>,
    subtitle: String,
    sections: Vec<ReportSection>,
}

impl Report {
    pub fn new(title: &str, version: &str, logo: Option<&str>, subtitle: &str) -> Self {
        Self {
            title: title.to_string(),
            version: version.to_string(),
            logo: logo.map(str::to_string),
            subtitle: subtitle.to_string(),
            sections: Vec::new(),
        }
    }

    pub fn add_section(&mut self, section: ReportSection) {
        self.sections.push(section);
    }

    pub fn render(&self) -> String {
        let generated = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let page = html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    title { (self.title) }
                    script src=(PLOTLY_CDN) {}
                    style { (PreEscaped(STYLE)) }
                }
                body {
                    header {
                        @if let Some(logo) = &self.logo {
                            img src=(logo) alt="logo";
                        }
                        h1 { (self.title) }
                        p { (self.subtitle) }
                        p.meta { "Version " (self.version) " | generated " (generated) }
                    }
                    @for (i, section) in self.sections.iter().enumerate() {
                        (section.render(i))
                    }
                }
            }
        };
        page.into_string()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(&path, self.render())
            .with_context(|| format!("Failed to write report: {}", path.as_ref().display()))?;
        log::info!("Report written to {}", path.as_ref().display());
        Ok(())
    }
}

fn fmt3(v: f64) -> String {
    format!("{:.3}", v)
}

/// Section with one row per AD method of a `compare_methods` result.
pub fn comparison_section(title: &str, reports: &[MethodReport]) -> ReportSection {
    let mut section = ReportSection::new(title);
    section.add_content(html! {
        table {
            thead {
                tr {
                    th { "Method" } th { "Coverage" }
                    th { "R² (all)" } th { "R² in" } th { "R² out" }
                    th { "RMSE (all)" } th { "RMSE in" } th { "RMSE out" }
                    th { "TP" } th { "FP" } th { "TN" } th { "FN" }
                    th { "Sens." } th { "Spec." } th { "PPV" } th { "NPV" }
                    th { "F1" } th { "BA" } th { "IAP" } th { "AUC" }
                }
            }
            tbody {
                @for r in reports {
                    tr {
                        td { (r.name) } td { (fmt3(r.coverage)) }
                        td { (fmt3(r.r2_no_ad)) } td { (fmt3(r.r2_in_ad)) } td { (fmt3(r.r2_out_ad)) }
                        td { (fmt3(r.rmse_no_ad)) } td { (fmt3(r.rmse_in_ad)) } td { (fmt3(r.rmse_out_ad)) }
                        td { (r.tp) } td { (r.fp) } td { (r.tn) } td { (r.fn_) }
                        td { (fmt3(r.sensitivity)) } td { (fmt3(r.specificity)) }
                        td { (fmt3(r.ppv)) } td { (fmt3(r.npv)) }
                        td { (fmt3(r.f1)) } td { (fmt3(r.balanced_accuracy)) }
                        td { (fmt3(r.iap)) } td { (fmt3(r.auc)) }
                    }
                }
            }
        }
    });
    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{compare_methods, MethodVerdict};
    use ndarray::array;

    #[test]
    fn report_contains_sections_and_table_rows() {
        let y_true = array![1.0, 2.0, 3.0, 4.0];
        let y_pred = array![1.1, 2.1, 2.9, 6.0];
        let methods = [MethodVerdict::new("Box", array![true, true, true, false])];
        let reports = compare_methods(y_true.view(), y_pred.view(), &methods).unwrap();

        let mut report = Report::new("AD report", "0.1.0", None, "Applicability domain");
        let mut intro = ReportSection::new("Introduction");
        intro.add_content(html! { p { "hello" } });
        report.add_section(intro);
        report.add_section(comparison_section("Comparison", &reports));

        let page = report.render();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<h2>Comparison</h2>"));
        assert!(page.contains("<td>Box</td>"));
    }
}

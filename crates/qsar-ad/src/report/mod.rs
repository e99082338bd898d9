//! Reporting and plotting helpers.
//!
//! Plots are small helpers converting AD scores and verdicts into
//! `plotly::Plot`; `report` assembles them into a static HTML page.
pub mod plots;
pub mod report;

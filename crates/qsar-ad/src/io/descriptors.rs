//! Delimited descriptor-table reader.
//!
//! One row per sample: an optional identifier column, an optional
//! reaction-signature column, the target column and numeric descriptor
//! columns.
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use csv::StringRecord;
use ndarray::{Array1, Array2};

use crate::data_handling::DescriptorSet;

/// Configuration for reading descriptor tables.
#[derive(Debug, Clone)]
pub struct DescriptorReaderConfig {
    pub delimiter: u8,
    /// Column holding the property values.
    pub target_column: String,
    /// Column with sample identifiers; rows are numbered when absent.
    pub id_column: Option<String>,
    /// Column with precomputed reaction signatures.
    pub signature_column: Option<String>,
    /// Descriptor columns to load, in order. When `None`, every column that
    /// is not the target, id or signature column is a descriptor.
    pub feature_columns: Option<Vec<String>>,
    /// Columns skipped when auto-selecting descriptors.
    pub ignore_columns: Vec<String>,
}

impl Default for DescriptorReaderConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            target_column: "y".to_string(),
            id_column: None,
            signature_column: None,
            feature_columns: None,
            ignore_columns: vec!["SMILES".to_string(), "Name".to_string()],
        }
    }
}

/// Read a comma-separated descriptor table with `target_column` as `y`.
pub fn read_descriptor_csv<P: AsRef<Path>>(path: P, target_column: &str) -> Result<DescriptorSet> {
    let config = DescriptorReaderConfig {
        target_column: target_column.to_string(),
        ..Default::default()
    };
    read_descriptors_with_config(path, &config)
}

/// Read a descriptor table using a custom configuration.
pub fn read_descriptors_with_config<P: AsRef<Path>>(
    path: P,
    config: &DescriptorReaderConfig,
) -> Result<DescriptorSet> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(true)
        .from_path(&path)
        .with_context(|| format!("Failed to open descriptor file: {}", path.as_ref().display()))?;

    let headers = reader
        .headers()
        .context("Failed to read descriptor header row")?
        .clone();

    let target_idx = find_column(&headers, &config.target_column)
        .ok_or_else(|| anyhow!("Missing target column '{}'", config.target_column))?;
    let id_idx = optional_column(&headers, config.id_column.as_deref())?;
    let signature_idx = optional_column(&headers, config.signature_column.as_deref())?;

    let feature_indices =
        resolve_feature_indices(&headers, config, target_idx, id_idx, signature_idx)?;
    if feature_indices.is_empty() {
        return Err(anyhow!("No descriptor columns detected in header"));
    }

    let mut features = Vec::new();
    let mut targets = Vec::new();
    let mut sample_ids = Vec::new();
    let mut signatures = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let target = parse_cell(&record, &headers, target_idx, row_idx)?;
        targets.push(target);

        sample_ids.push(match id_idx {
            Some(idx) => record.get(idx).unwrap_or_default().trim().to_string(),
            None => row_idx.to_string(),
        });
        if let Some(idx) = signature_idx {
            signatures.push(record.get(idx).unwrap_or_default().trim().to_string());
        }

        for &idx in &feature_indices {
            features.push(parse_cell(&record, &headers, idx, row_idx)?);
        }
    }

    let n_samples = targets.len();
    let x = Array2::from_shape_vec((n_samples, feature_indices.len()), features)
        .context("Failed to build descriptor matrix")?;
    let feature_names = feature_indices
        .iter()
        .map(|&idx| headers.get(idx).unwrap_or("").to_string())
        .collect();

    let set = DescriptorSet::new(x, Array1::from_vec(targets), feature_names, sample_ids)?;
    let set = if signature_idx.is_some() {
        set.with_signatures(signatures)?
    } else {
        set
    };
    log::debug!(
        "Read {} samples x {} descriptors from {}",
        set.n_samples(),
        set.n_features(),
        path.as_ref().display()
    );
    Ok(set)
}

fn parse_cell(record: &StringRecord, headers: &StringRecord, idx: usize, row_idx: usize) -> Result<f64> {
    let value = record
        .get(idx)
        .ok_or_else(|| anyhow!("Missing value for '{}' at row {}", headers.get(idx).unwrap_or(""), row_idx + 1))?;
    value.trim().parse::<f64>().with_context(|| {
        format!(
            "Invalid number '{}' in column '{}' at row {}",
            value,
            headers.get(idx).unwrap_or(""),
            row_idx + 1
        )
    })
}

fn find_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
}

fn optional_column(headers: &StringRecord, name: Option<&str>) -> Result<Option<usize>> {
    match name {
        Some(name) => find_column(headers, name)
            .map(Some)
            .ok_or_else(|| anyhow!("Missing column '{}'", name)),
        None => Ok(None),
    }
}

fn resolve_feature_indices(
    headers: &StringRecord,
    config: &DescriptorReaderConfig,
    target_idx: usize,
    id_idx: Option<usize>,
    signature_idx: Option<usize>,
) -> Result<Vec<usize>> {
    if let Some(names) = &config.feature_columns {
        return names
            .iter()
            .map(|name| {
                find_column(headers, name)
                    .ok_or_else(|| anyhow!("Missing descriptor column '{}'", name))
            })
            .collect();
    }

    Ok((0..headers.len())
        .filter(|&idx| idx != target_idx && Some(idx) != id_idx && Some(idx) != signature_idx)
        .filter(|&idx| {
            let name = headers.get(idx).unwrap_or("");
            !config
                .ignore_columns
                .iter()
                .any(|ignored| ignored.eq_ignore_ascii_case(name.trim()))
        })
        .collect())
}

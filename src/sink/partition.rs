//! Hive-style partitioning.
//!
//! Splits a batch into one slice per distinct combination of partition
//! column values. Each slice carries its directory (`year=2018/month=11`)
//! and the remaining data columns.

use deltalake::arrow::array::{Array, RecordBatch, UInt32Array};
use deltalake::arrow::compute::take_record_batch;
use deltalake::arrow::error::ArrowError;
use deltalake::arrow::row::{RowConverter, SortField};
use deltalake::arrow::util::display::array_value_to_string;
use std::collections::HashMap;
use std::fmt::Write;

/// Directory name used for null (or empty) partition values.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Rows of a batch sharing one set of partition values.
#[derive(Debug, Clone)]
pub struct PartitionSlice {
    /// Relative directory, empty for unpartitioned tables.
    pub dir: String,
    /// The rows, without the partition columns.
    pub batch: RecordBatch,
}

fn needs_escape(c: char) -> bool {
    matches!(
        c,
        '\u{00}'..='\u{1F}'
            | '"'
            | '#'
            | '%'
            | '\''
            | '*'
            | '/'
            | ':'
            | '='
            | '?'
            | '\\'
            | '\u{7F}'
            | '{'
            | '['
            | ']'
            | '^'
    )
}

/// Escape a partition value the way Hive does: `%XX` for path-unsafe ASCII.
pub fn escape_partition_value(value: &str) -> String {
    if value.is_empty() {
        return DEFAULT_PARTITION.to_string();
    }
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escape(c) {
            // needs_escape only matches ASCII
            let _ = write!(escaped, "%{:02X}", c as u32);
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn render(array: &dyn Array, row: usize) -> Result<String, ArrowError> {
    if array.is_null(row) {
        return Ok(DEFAULT_PARTITION.to_string());
    }
    array_value_to_string(array, row).map(|value| escape_partition_value(&value))
}

/// Split `batch` by the values of `partition_by`, in column order.
///
/// Slices are sorted by directory. With no partition columns the whole
/// batch comes back as a single slice.
pub fn split_partitions(
    batch: &RecordBatch,
    partition_by: &[&str],
) -> Result<Vec<PartitionSlice>, ArrowError> {
    if partition_by.is_empty() {
        return Ok(vec![PartitionSlice {
            dir: String::new(),
            batch: batch.clone(),
        }]);
    }

    let schema = batch.schema();
    let mut key_columns = Vec::with_capacity(partition_by.len());
    for name in partition_by {
        key_columns.push(batch.column(schema.index_of(name)?).clone());
    }
    let data_indices: Vec<usize> = (0..schema.fields().len())
        .filter(|&i| !partition_by.contains(&schema.field(i).name().as_str()))
        .collect();
    let data = batch.project(&data_indices)?;

    let converter = RowConverter::new(
        key_columns
            .iter()
            .map(|c| SortField::new(c.data_type().clone()))
            .collect(),
    )?;
    let rows = converter.convert_columns(&key_columns)?;

    let mut groups: Vec<(usize, Vec<u32>)> = Vec::new();
    let mut lookup = HashMap::new();
    for row in 0..batch.num_rows() {
        let group = *lookup.entry(rows.row(row)).or_insert_with(|| {
            groups.push((row, Vec::new()));
            groups.len() - 1
        });
        groups[group].1.push(row as u32);
    }

    let mut slices = Vec::with_capacity(groups.len());
    for (first_row, indices) in groups {
        let mut dir = String::new();
        for (name, column) in partition_by.iter().zip(&key_columns) {
            if !dir.is_empty() {
                dir.push('/');
            }
            let _ = write!(dir, "{}={}", name, render(column.as_ref(), first_row)?);
        }
        let batch = take_record_batch(&data, &UInt32Array::from(indices))?;
        slices.push(PartitionSlice { dir, batch });
    }
    slices.sort_by(|a, b| a.dir.cmp(&b.dir));
    Ok(slices)
}

//! Timestamp decomposition and the `time` dimension.
//!
//! Calendar fields are computed in UTC from `floor(ts / 1000)`. `week` is the
//! ISO-8601 week number and `weekday` counts from Sunday = 1 to
//! Saturday = 7.

use chrono::{DateTime, Datelike, Timelike};
use deltalake::arrow::array::{Array, ArrayRef, Int32Array, Int64Array, RecordBatch};
use deltalake::arrow::compute::{filter_record_batch, is_not_null};
use deltalake::arrow::datatypes::Schema;
use snafu::prelude::*;
use std::sync::Arc;

use crate::error::{ComputeSnafu, TransformError};
use crate::schema::{log, table, time, time_fields};

use super::{distinct_table, int64_column, project};

/// Partition columns of the `time` table when partitioning is enabled.
pub const TIME_PARTITION: &[&str] = &["year", "month"];

/// Calendar breakdown of one event timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    pub start_time: i64,
    pub hour: i32,
    pub day: i32,
    pub week: i32,
    pub month: i32,
    pub year: i32,
    pub weekday: i32,
}

impl Calendar {
    /// Break down an epoch-millisecond timestamp.
    ///
    /// Returns `None` when the instant is outside chrono's range.
    pub fn from_millis(ts: i64) -> Option<Self> {
        let start_time = ts.div_euclid(1000);
        let at = DateTime::from_timestamp(start_time, 0)?;
        Some(Self {
            start_time,
            hour: at.hour() as i32,
            day: at.day() as i32,
            week: at.iso_week().week() as i32,
            month: at.month() as i32,
            year: at.year(),
            weekday: at.weekday().number_from_sunday() as i32,
        })
    }
}

/// Append `start_time` and the calendar columns to the play events.
///
/// Rows with a null `ts` get null in every appended column.
pub fn decompose_timestamps(plays: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let ts = int64_column(plays, log::TS)?;
    let calendars: Vec<Option<Calendar>> = ts
        .iter()
        .map(|value| value.and_then(Calendar::from_millis))
        .collect();

    let int32 = |f: fn(&Calendar) -> i32| -> ArrayRef {
        Arc::new(
            calendars
                .iter()
                .map(|c| c.as_ref().map(f))
                .collect::<Int32Array>(),
        )
    };
    let appended: Vec<ArrayRef> = vec![
        Arc::new(
            calendars
                .iter()
                .map(|c| c.map(|c| c.start_time))
                .collect::<Int64Array>(),
        ),
        int32(|c| c.hour),
        int32(|c| c.day),
        int32(|c| c.week),
        int32(|c| c.month),
        int32(|c| c.year),
        int32(|c| c.weekday),
    ];

    let schema = plays.schema();
    let fields = schema
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .chain(time_fields().iter().cloned());
    let columns = plays.columns().iter().cloned().chain(appended).collect();

    RecordBatch::try_new(Arc::new(Schema::new(fields.collect::<Vec<_>>())), columns)
        .context(ComputeSnafu {
            operation: "timestamp decomposition",
        })
}

/// Distinct calendar rows of the decomposed plays, excluding null timestamps.
pub fn build_time_table(augmented: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let columns: Vec<(&str, &str)> = time_fields()
        .iter()
        .map(|f| (f.name().as_str(), f.name().as_str()))
        .collect();
    let projected = project(augmented, &columns)?;

    let start_time = projected.column(0);
    let present = if start_time.null_count() > 0 {
        let mask = is_not_null(start_time.as_ref()).context(ComputeSnafu {
            operation: "null timestamp filter",
        })?;
        filter_record_batch(&projected, &mask).context(ComputeSnafu {
            operation: "null timestamp filter",
        })?
    } else {
        projected
    };

    debug_assert_eq!(present.schema().field(0).name(), time::START_TIME);
    distinct_table(table::TIME, &present)
}

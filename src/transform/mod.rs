//! Table derivations.
//!
//! Everything here is a pure function over Arrow RecordBatches: projection
//! with renames, full-row deduplication, the play filter, timestamp
//! decomposition and the catalog join. I/O lives in `source` and `sink`.

pub mod logs;
pub mod songplays;
pub mod songs;
pub mod time;

use deltalake::arrow::array::{Array, ArrayRef, Int64Array, RecordBatch, StringArray, UInt32Array};
use deltalake::arrow::compute::take_record_batch;
use deltalake::arrow::datatypes::{Field, Schema};
use deltalake::arrow::row::{RowConverter, Rows, SortField};
use snafu::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::KeyConflictPolicy;
use crate::emit;
use crate::error::{
    ComputeSnafu, KeyConflictSnafu, MissingColumnSnafu, TransformError, UnexpectedTypeSnafu,
};
use crate::metrics::events::DuplicateRowsDropped;

pub use logs::{build_users_table, filter_song_plays};
pub use songplays::{JoinOutput, build_songplays_table};
pub use songs::{build_artists_table, build_songs_table};
pub use time::{build_time_table, decompose_timestamps};

/// Look up a column by name.
pub(crate) fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, TransformError> {
    batch.column_by_name(name).context(MissingColumnSnafu { column: name })
}

/// Look up a Utf8 column by name.
pub(crate) fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a StringArray, TransformError> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<StringArray>()
        .context(UnexpectedTypeSnafu {
            column: name,
            expected: "Utf8",
        })
}

/// Look up an Int64 column by name.
pub(crate) fn int64_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a Int64Array, TransformError> {
    column(batch, name)?
        .as_any()
        .downcast_ref::<Int64Array>()
        .context(UnexpectedTypeSnafu {
            column: name,
            expected: "Int64",
        })
}

/// Select `(source, target)` columns in order, renaming as listed.
pub fn project(batch: &RecordBatch, columns: &[(&str, &str)]) -> Result<RecordBatch, TransformError> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());

    for (source, target) in columns {
        let array = column(batch, source)?;
        fields.push(Field::new(*target, array.data_type().clone(), true));
        arrays.push(Arc::clone(array));
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .context(ComputeSnafu { operation: "project" })
}

fn row_format(batch: &RecordBatch) -> Result<Rows, TransformError> {
    let fields = batch
        .schema()
        .fields()
        .iter()
        .map(|f| SortField::new(f.data_type().clone()))
        .collect();
    let converter = RowConverter::new(fields).context(ComputeSnafu {
        operation: "row conversion",
    })?;
    converter
        .convert_columns(batch.columns())
        .context(ComputeSnafu {
            operation: "row conversion",
        })
}

fn take_rows(batch: &RecordBatch, keep: Vec<u32>) -> Result<RecordBatch, TransformError> {
    if keep.len() == batch.num_rows() && keep.iter().enumerate().all(|(i, &k)| i as u32 == k) {
        return Ok(batch.clone());
    }
    take_record_batch(batch, &UInt32Array::from(keep)).context(ComputeSnafu { operation: "take" })
}

/// Drop rows that equal an earlier row in every column.
///
/// Nulls compare equal to nulls. The first occurrence is kept and input
/// order is preserved.
pub fn distinct(batch: &RecordBatch) -> Result<RecordBatch, TransformError> {
    if batch.num_rows() < 2 {
        return Ok(batch.clone());
    }

    let rows = row_format(batch)?;
    let mut seen = HashSet::with_capacity(rows.num_rows());
    let keep: Vec<u32> = (0..rows.num_rows())
        .filter(|&i| seen.insert(rows.row(i)))
        .map(|i| i as u32)
        .collect();

    take_rows(batch, keep)
}

/// [`distinct`] plus a duplicate count metric for `table`.
pub(crate) fn distinct_table(
    table: &'static str,
    batch: &RecordBatch,
) -> Result<RecordBatch, TransformError> {
    let unique = distinct(batch)?;
    let dropped = batch.num_rows() - unique.num_rows();
    if dropped > 0 {
        emit!(DuplicateRowsDropped {
            table,
            count: dropped as u64,
        });
    }
    Ok(unique)
}

/// Apply a [`KeyConflictPolicy`] to a deduplicated dimension.
///
/// `First` keeps, per key, the row that sorts lowest across all columns,
/// so the survivor does not depend on input order.
pub fn resolve_key_conflicts(
    table: &'static str,
    batch: &RecordBatch,
    key: &str,
    policy: KeyConflictPolicy,
) -> Result<RecordBatch, TransformError> {
    if policy == KeyConflictPolicy::KeepAll || batch.num_rows() < 2 {
        return Ok(batch.clone());
    }

    let keys = string_column(batch, key)?;
    let rows = row_format(batch)?;
    let mut chosen: HashMap<Option<&str>, usize> = HashMap::new();

    for i in 0..batch.num_rows() {
        let value = keys.is_valid(i).then(|| keys.value(i));
        match chosen.entry(value) {
            Entry::Vacant(slot) => {
                slot.insert(i);
            }
            Entry::Occupied(mut slot) => {
                if policy == KeyConflictPolicy::Fail {
                    return KeyConflictSnafu {
                        table,
                        key: value.unwrap_or("null").to_string(),
                    }
                    .fail();
                }
                if rows.row(i) < rows.row(*slot.get()) {
                    slot.insert(i);
                }
            }
        }
    }

    let mut keep: Vec<u32> = chosen.into_values().map(|i| i as u32).collect();
    keep.sort_unstable();
    take_rows(batch, keep)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::schema::{log, raw_log_schema, raw_song_schema, song};
    use deltalake::arrow::array::Float64Array;

    /// One raw song row: (song_id, title, artist_id, artist_name, year, duration).
    pub type SongRow<'a> = (&'a str, &'a str, &'a str, &'a str, i64, f64);

    pub fn song_catalog(rows: &[SongRow<'_>]) -> RecordBatch {
        let n = rows.len();
        let strings = |f: for<'r> fn(&'r SongRow<'r>) -> &'r str| -> ArrayRef {
            Arc::new(StringArray::from(rows.iter().map(|r| f(r)).collect::<Vec<_>>()))
        };
        let columns: Vec<ArrayRef> = vec![
            strings(|r| r.0),
            strings(|r| r.1),
            strings(|r| r.2),
            strings(|r| r.3),
            Arc::new(StringArray::from(vec![Some("Berlin"); n])),
            Arc::new(Float64Array::from(vec![None::<f64>; n])),
            Arc::new(Float64Array::from(vec![None::<f64>; n])),
            Arc::new(Int64Array::from(rows.iter().map(|r| r.4).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.5).collect::<Vec<_>>())),
        ];
        let batch = RecordBatch::try_new(raw_song_schema(), columns).unwrap();
        assert_eq!(batch.schema().field(0).name(), song::SONG_ID);
        batch
    }

    /// One raw log row.
    #[derive(Clone)]
    pub struct LogRow<'a> {
        pub page: &'a str,
        pub ts: i64,
        pub user_id: &'a str,
        pub first_name: &'a str,
        pub level: &'a str,
        pub song: Option<&'a str>,
        pub artist: Option<&'a str>,
        pub session_id: i64,
    }

    impl<'a> LogRow<'a> {
        pub fn play(user_id: &'a str, ts: i64, artist: &'a str, song: &'a str) -> Self {
            Self {
                page: log::NEXT_SONG,
                ts,
                user_id,
                first_name: "Lily",
                level: "free",
                song: Some(song),
                artist: Some(artist),
                session_id: 7,
            }
        }

        pub fn page(page: &'a str, user_id: &'a str, ts: i64) -> Self {
            Self {
                page,
                ts,
                user_id,
                first_name: "Lily",
                level: "free",
                song: None,
                artist: None,
                session_id: 7,
            }
        }

        pub fn with_level(mut self, level: &'a str) -> Self {
            self.level = level;
            self
        }
    }

    pub fn log_batch(rows: &[LogRow<'_>]) -> RecordBatch {
        let n = rows.len();
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(rows.iter().map(|r| r.page).collect::<Vec<_>>())),
            Arc::new(Int64Array::from(rows.iter().map(|r| r.ts).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.user_id).collect::<Vec<_>>())),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.first_name).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(vec!["Koch"; n])),
            Arc::new(StringArray::from(vec!["F"; n])),
            Arc::new(StringArray::from(rows.iter().map(|r| r.level).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.song).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.artist).collect::<Vec<_>>())),
            Arc::new(Int64Array::from(
                rows.iter().map(|r| r.session_id).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(vec!["Chicago-Naperville-Elgin, IL-IN-WI"; n])),
            Arc::new(StringArray::from(vec!["Mozilla/5.0"; n])),
        ];
        RecordBatch::try_new(raw_log_schema(), columns).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltalake::arrow::array::Int32Array;

    fn batch(ids: Vec<Option<&str>>, values: Vec<Option<i32>>) -> RecordBatch {
        RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("id", deltalake::arrow::datatypes::DataType::Utf8, true),
                Field::new("value", deltalake::arrow::datatypes::DataType::Int32, true),
            ])),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(Int32Array::from(values)),
            ],
        )
        .unwrap()
    }

    fn ids(batch: &RecordBatch) -> Vec<Option<String>> {
        let ids = string_column(batch, "id").unwrap();
        ids.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn test_project_renames_and_orders() {
        let input = batch(vec![Some("a")], vec![Some(1)]);
        let out = project(&input, &[("value", "v"), ("id", "key")]).unwrap();

        assert_eq!(out.schema().field(0).name(), "v");
        assert_eq!(out.schema().field(1).name(), "key");
    }

    #[test]
    fn test_project_missing_column() {
        let input = batch(vec![Some("a")], vec![Some(1)]);
        let err = project(&input, &[("nope", "x")]).unwrap_err();
        assert!(matches!(err, TransformError::MissingColumn { .. }));
    }

    #[test]
    fn test_distinct_keeps_first_and_order() {
        let input = batch(
            vec![Some("b"), Some("a"), Some("b"), None, None, Some("a")],
            vec![Some(1), Some(2), Some(1), None, None, Some(3)],
        );
        let out = distinct(&input).unwrap();

        assert_eq!(
            ids(&out),
            vec![
                Some("b".to_string()),
                Some("a".to_string()),
                None,
                Some("a".to_string())
            ]
        );
    }

    #[test]
    fn test_distinct_is_idempotent() {
        let input = batch(
            vec![Some("x"), Some("x"), Some("y")],
            vec![Some(1), Some(1), Some(2)],
        );
        let once = distinct(&input).unwrap();
        let twice = distinct(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_key_conflict_keep_all() {
        let input = batch(vec![Some("a"), Some("a")], vec![Some(2), Some(1)]);
        let out = resolve_key_conflicts("t", &input, "id", KeyConflictPolicy::KeepAll).unwrap();
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn test_key_conflict_first_is_order_independent() {
        let forward = batch(
            vec![Some("a"), Some("b"), Some("a")],
            vec![Some(2), Some(5), Some(1)],
        );
        let backward = batch(
            vec![Some("a"), Some("b"), Some("a")],
            vec![Some(1), Some(5), Some(2)],
        );

        for input in [forward, backward] {
            let out = resolve_key_conflicts("t", &input, "id", KeyConflictPolicy::First).unwrap();
            assert_eq!(out.num_rows(), 2);
            let values = out
                .column(1)
                .as_any()
                .downcast_ref::<Int32Array>()
                .unwrap();
            let a_row = ids(&out)
                .iter()
                .position(|id| id.as_deref() == Some("a"))
                .unwrap();
            assert_eq!(values.value(a_row), 1);
        }
    }

    #[test]
    fn test_key_conflict_fail() {
        let input = batch(vec![Some("a"), Some("a")], vec![Some(2), Some(1)]);
        let err = resolve_key_conflicts("songs", &input, "id", KeyConflictPolicy::Fail).unwrap_err();
        match err {
            TransformError::KeyConflict { table, key } => {
                assert_eq!(table, "songs");
                assert_eq!(key, "a");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

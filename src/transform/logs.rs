//! Play filter and the `users` dimension.

use deltalake::arrow::array::{RecordBatch, Scalar, StringArray};
use deltalake::arrow::compute::filter_record_batch;
use deltalake::arrow::compute::kernels::cmp::eq;
use snafu::prelude::*;
use tracing::debug;

use crate::config::KeyConflictPolicy;
use crate::emit;
use crate::error::{ComputeSnafu, TransformError};
use crate::metrics::events::EventsFiltered;
use crate::schema::{log, table};

use super::{column, distinct_table, project, resolve_key_conflicts};

const USER_COLUMNS: &[(&str, &str)] = &[
    (log::USER_ID, "user_id"),
    (log::FIRST_NAME, "first_name"),
    (log::LAST_NAME, "last_name"),
    (log::GENDER, "gender"),
    (log::LEVEL, "level"),
];

/// Keep only `NextSong` events. Rows with a null `page` are dropped.
pub fn filter_song_plays(logs: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let page = column(logs, log::PAGE)?;
    let next_song = Scalar::new(StringArray::from(vec![log::NEXT_SONG]));

    // eq yields null for null pages and filter treats null as false
    let mask = eq(page, &next_song).context(ComputeSnafu {
        operation: "page filter",
    })?;
    let plays = filter_record_batch(logs, &mask).context(ComputeSnafu {
        operation: "page filter",
    })?;

    let dropped = logs.num_rows() - plays.num_rows();
    debug!("Kept {} play events, dropped {}", plays.num_rows(), dropped);
    emit!(EventsFiltered {
        count: dropped as u64,
    });
    Ok(plays)
}

/// Project user attributes and drop exact duplicate rows.
///
/// Keyed on `user_id` but one user may appear once per subscription level.
pub fn build_users_table(
    plays: &RecordBatch,
    policy: KeyConflictPolicy,
) -> Result<RecordBatch, TransformError> {
    let projected = project(plays, USER_COLUMNS)?;
    let unique = distinct_table(table::USERS, &projected)?;
    resolve_key_conflicts(table::USERS, &unique, "user_id", policy)
}

//! The `songplays` fact table.
//!
//! Play events carry no song id, so facts are reconstructed by matching the
//! event's free-text `(artist, song)` against the catalog's
//! `(artist_name, title)`. Every catalog row that matches yields one fact
//! row. Plays that match nothing are returned as [`RejectedPlay`]s instead
//! of being dropped.

use deltalake::arrow::array::{Array, ArrayRef, Int64Array, RecordBatch, UInt32Array};
use deltalake::arrow::compute::take;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::MatchMode;
use crate::emit;
use crate::error::{ComputeSnafu, TransformError};
use crate::keys::SurrogateKeys;
use crate::metrics::events::PlaysUnmatched;
use crate::rejects::{RejectReason, RejectedPlay};
use crate::schema::{log, song, time};

use super::{column, int64_column, string_column};

/// Partition columns of the `songplays` table.
pub const SONGPLAYS_PARTITION: &[&str] = &["year", "month"];

/// Result of the catalog join.
#[derive(Debug)]
pub struct JoinOutput {
    /// Matched plays in fact table layout.
    pub songplays: RecordBatch,
    /// Plays that produced no fact row.
    pub rejected: Vec<RejectedPlay>,
}

fn join_key(mode: MatchMode, value: &str) -> Cow<'_, str> {
    match mode {
        MatchMode::Exact => Cow::Borrowed(value),
        MatchMode::Normalized => Cow::Owned(value.trim().to_lowercase()),
    }
}

type CatalogIndex<'a> = HashMap<(Cow<'a, str>, Cow<'a, str>), Vec<u32>>;

/// Index catalog rows by `(artist_name, title)`. Rows with a null in
/// either field are left out and can never match.
fn index_catalog(catalog: &RecordBatch, mode: MatchMode) -> Result<CatalogIndex<'_>, TransformError> {
    let names = string_column(catalog, song::ARTIST_NAME)?;
    let titles = string_column(catalog, song::TITLE)?;

    let mut index = CatalogIndex::with_capacity(catalog.num_rows());
    for row in 0..catalog.num_rows() {
        if names.is_null(row) || titles.is_null(row) {
            continue;
        }
        index
            .entry((join_key(mode, names.value(row)), join_key(mode, titles.value(row))))
            .or_default()
            .push(row as u32);
    }
    Ok(index)
}

/// Join timestamp-augmented plays with the raw song catalog.
///
/// `plays` must already carry the calendar columns from
/// [`super::decompose_timestamps`]. Ids are drawn from `keys` in output
/// row order.
pub fn build_songplays_table(
    plays: &RecordBatch,
    catalog: &RecordBatch,
    mode: MatchMode,
    keys: &SurrogateKeys,
) -> Result<JoinOutput, TransformError> {
    let index = index_catalog(catalog, mode)?;

    let artists = string_column(plays, log::ARTIST)?;
    let songs = string_column(plays, log::SONG)?;
    let user_ids = string_column(plays, log::USER_ID)?;
    let sessions = int64_column(plays, log::SESSION_ID)?;
    let start_times = int64_column(plays, time::START_TIME)?;

    let mut play_rows = Vec::new();
    let mut song_rows = Vec::new();
    let mut rejected = Vec::new();

    for row in 0..plays.num_rows() {
        let reason = if artists.is_null(row) || songs.is_null(row) {
            Some(RejectReason::MissingJoinKey)
        } else {
            let key = (
                join_key(mode, artists.value(row)),
                join_key(mode, songs.value(row)),
            );
            match index.get(&key) {
                Some(matches) => {
                    for &song_row in matches {
                        play_rows.push(row as u32);
                        song_rows.push(song_row);
                    }
                    None
                }
                None => Some(RejectReason::NoCatalogMatch),
            }
        };

        if let Some(reason) = reason {
            rejected.push(RejectedPlay {
                user_id: user_ids.is_valid(row).then(|| user_ids.value(row).to_string()),
                session_id: sessions.is_valid(row).then(|| sessions.value(row)),
                start_time: start_times.is_valid(row).then(|| start_times.value(row)),
                artist: artists.is_valid(row).then(|| artists.value(row).to_string()),
                song: songs.is_valid(row).then(|| songs.value(row).to_string()),
                reason,
            });
        }
    }

    let play_rows = UInt32Array::from(play_rows);
    let song_rows = UInt32Array::from(song_rows);
    let gather = |batch: &RecordBatch, name: &str, rows: &UInt32Array| -> Result<ArrayRef, TransformError> {
        take(column(batch, name)?.as_ref(), rows, None).context(ComputeSnafu {
            operation: "songplays join",
        })
    };

    let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(keys.allocate(play_rows.len())));
    let songplays = RecordBatch::try_from_iter_with_nullable([
        ("songplay_id", ids, true),
        ("start_time", gather(plays, time::START_TIME, &play_rows)?, true),
        ("user_id", gather(plays, log::USER_ID, &play_rows)?, true),
        ("level", gather(plays, log::LEVEL, &play_rows)?, true),
        ("song_id", gather(catalog, song::SONG_ID, &song_rows)?, true),
        ("session_id", gather(plays, log::SESSION_ID, &play_rows)?, true),
        ("location", gather(plays, log::LOCATION, &play_rows)?, true),
        ("user_agent", gather(plays, log::USER_AGENT, &play_rows)?, true),
        ("year", gather(plays, time::YEAR, &play_rows)?, true),
        ("month", gather(plays, time::MONTH, &play_rows)?, true),
    ])
    .context(ComputeSnafu {
        operation: "songplays join",
    })?;

    info!(
        "Joined {} plays against {} catalog rows: {} fact rows, {} unmatched",
        plays.num_rows(),
        catalog.num_rows(),
        songplays.num_rows(),
        rejected.len()
    );
    emit!(PlaysUnmatched {
        count: rejected.len() as u64,
    });

    Ok(JoinOutput {
        songplays,
        rejected,
    })
}

//! `songs` and `artists` dimensions from the raw song catalog.

use deltalake::arrow::array::RecordBatch;

use crate::config::KeyConflictPolicy;
use crate::error::TransformError;
use crate::schema::{song, table};

use super::{distinct_table, project, resolve_key_conflicts};

/// Partition columns of the `songs` table, outermost first.
pub const SONGS_PARTITION: &[&str] = &["year", "artist_id"];

const SONG_COLUMNS: &[(&str, &str)] = &[
    (song::SONG_ID, "song_id"),
    (song::TITLE, "title"),
    (song::ARTIST_ID, "artist_id"),
    (song::YEAR, "year"),
    (song::DURATION, "duration"),
];

const ARTIST_COLUMNS: &[(&str, &str)] = &[
    (song::ARTIST_ID, "artist_id"),
    (song::ARTIST_NAME, "name"),
    (song::ARTIST_LOCATION, "location"),
    (song::ARTIST_LATITUDE, "latitude"),
    (song::ARTIST_LONGITUDE, "longitude"),
];

/// Project song attributes and drop exact duplicate rows.
pub fn build_songs_table(
    catalog: &RecordBatch,
    policy: KeyConflictPolicy,
) -> Result<RecordBatch, TransformError> {
    let projected = project(catalog, SONG_COLUMNS)?;
    let unique = distinct_table(table::SONGS, &projected)?;
    resolve_key_conflicts(table::SONGS, &unique, "song_id", policy)
}

/// Project artist attributes and drop exact duplicate rows.
pub fn build_artists_table(
    catalog: &RecordBatch,
    policy: KeyConflictPolicy,
) -> Result<RecordBatch, TransformError> {
    let projected = project(catalog, ARTIST_COLUMNS)?;
    let unique = distinct_table(table::ARTISTS, &projected)?;
    resolve_key_conflicts(table::ARTISTS, &unique, "artist_id", policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::string_column;
    use crate::transform::test_support::song_catalog;

    const SETANTA: (&str, &str, &str, &str, i64, f64) = (
        "SOZCTXZ12AB0182364",
        "Setanta matins",
        "AR5KOSW1187FB35FF4",
        "Elena",
        0,
        269.58322,
    );

    #[test]
    fn test_songs_columns_and_dedup() {
        let catalog = song_catalog(&[
            SETANTA,
            SETANTA,
            ("SOUPIRU12A6D4FA1E1", "Der Kleine Dompfaff", "ARJIE2Y1187B994AB7", "Line Renaud", 0, 152.92036),
        ]);

        let songs = build_songs_table(&catalog, KeyConflictPolicy::KeepAll).unwrap();

        let names: Vec<String> = songs
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, ["song_id", "title", "artist_id", "year", "duration"]);
        assert_eq!(songs.num_rows(), 2);
    }

    #[test]
    fn test_songs_dedup_is_idempotent() {
        let catalog = song_catalog(&[SETANTA, SETANTA]);
        let once = build_songs_table(&catalog, KeyConflictPolicy::KeepAll).unwrap();
        let twice = super::super::distinct(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_artists_renamed_and_soft_duplicates_kept() {
        // same artist id, different spelling of the name
        let catalog = song_catalog(&[
            SETANTA,
            ("SOXXXXX12AB0180000", "Other", "AR5KOSW1187FB35FF4", "Elena ", 2001, 100.0),
        ]);

        let artists = build_artists_table(&catalog, KeyConflictPolicy::KeepAll).unwrap();
        assert_eq!(artists.schema().field(1).name(), "name");
        assert_eq!(artists.num_rows(), 2);

        let first = build_artists_table(&catalog, KeyConflictPolicy::First).unwrap();
        assert_eq!(first.num_rows(), 1);
        assert_eq!(string_column(&first, "name").unwrap().value(0), "Elena");

        let err = build_artists_table(&catalog, KeyConflictPolicy::Fail).unwrap_err();
        assert!(matches!(err, TransformError::KeyConflict { table: "artists", .. }));
    }
}

//! Arrow schemas for the raw datasets and the star schema tables.
//!
//! Raw schemas only list the fields the job selects; everything else in the
//! source JSON is skipped by the decoder. Every column is nullable because a
//! missing JSON field decodes as null.

use deltalake::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::sync::{Arc, LazyLock};

/// Raw song record columns.
pub mod song {
    pub const SONG_ID: &str = "song_id";
    pub const TITLE: &str = "title";
    pub const ARTIST_ID: &str = "artist_id";
    pub const ARTIST_NAME: &str = "artist_name";
    pub const ARTIST_LOCATION: &str = "artist_location";
    pub const ARTIST_LATITUDE: &str = "artist_latitude";
    pub const ARTIST_LONGITUDE: &str = "artist_longitude";
    pub const YEAR: &str = "year";
    pub const DURATION: &str = "duration";
}

/// Raw log record columns.
pub mod log {
    pub const PAGE: &str = "page";
    pub const TS: &str = "ts";
    pub const USER_ID: &str = "userId";
    pub const FIRST_NAME: &str = "firstName";
    pub const LAST_NAME: &str = "lastName";
    pub const GENDER: &str = "gender";
    pub const LEVEL: &str = "level";
    pub const SONG: &str = "song";
    pub const ARTIST: &str = "artist";
    pub const SESSION_ID: &str = "sessionId";
    pub const LOCATION: &str = "location";
    pub const USER_AGENT: &str = "userAgent";

    /// The page value that marks a play event.
    pub const NEXT_SONG: &str = "NextSong";
}

/// Calendar columns appended to play events by timestamp decomposition.
pub mod time {
    pub const START_TIME: &str = "start_time";
    pub const HOUR: &str = "hour";
    pub const DAY: &str = "day";
    pub const WEEK: &str = "week";
    pub const MONTH: &str = "month";
    pub const YEAR: &str = "year";
    pub const WEEKDAY: &str = "weekday";
}

/// Output table names.
pub mod table {
    pub const SONGS: &str = "songs";
    pub const ARTISTS: &str = "artists";
    pub const USERS: &str = "users";
    pub const TIME: &str = "time";
    pub const SONGPLAYS: &str = "songplays";
}

fn nullable(name: &str, data_type: DataType) -> Field {
    Field::new(name, data_type, true)
}

static RAW_SONG: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        nullable(song::SONG_ID, DataType::Utf8),
        nullable(song::TITLE, DataType::Utf8),
        nullable(song::ARTIST_ID, DataType::Utf8),
        nullable(song::ARTIST_NAME, DataType::Utf8),
        nullable(song::ARTIST_LOCATION, DataType::Utf8),
        nullable(song::ARTIST_LATITUDE, DataType::Float64),
        nullable(song::ARTIST_LONGITUDE, DataType::Float64),
        nullable(song::YEAR, DataType::Int64),
        nullable(song::DURATION, DataType::Float64),
    ]))
});

static RAW_LOG: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        nullable(log::PAGE, DataType::Utf8),
        nullable(log::TS, DataType::Int64),
        nullable(log::USER_ID, DataType::Utf8),
        nullable(log::FIRST_NAME, DataType::Utf8),
        nullable(log::LAST_NAME, DataType::Utf8),
        nullable(log::GENDER, DataType::Utf8),
        nullable(log::LEVEL, DataType::Utf8),
        nullable(log::SONG, DataType::Utf8),
        nullable(log::ARTIST, DataType::Utf8),
        nullable(log::SESSION_ID, DataType::Int64),
        nullable(log::LOCATION, DataType::Utf8),
        nullable(log::USER_AGENT, DataType::Utf8),
    ]))
});

static TIME_FIELDS: LazyLock<Vec<Field>> = LazyLock::new(|| {
    vec![
        nullable(time::START_TIME, DataType::Int64),
        nullable(time::HOUR, DataType::Int32),
        nullable(time::DAY, DataType::Int32),
        nullable(time::WEEK, DataType::Int32),
        nullable(time::MONTH, DataType::Int32),
        nullable(time::YEAR, DataType::Int32),
        nullable(time::WEEKDAY, DataType::Int32),
    ]
});

/// Schema the song catalog is decoded into.
pub fn raw_song_schema() -> SchemaRef {
    RAW_SONG.clone()
}

/// Schema the play logs are decoded into.
pub fn raw_log_schema() -> SchemaRef {
    RAW_LOG.clone()
}

/// The seven calendar fields, in `time` table order.
pub fn time_fields() -> &'static [Field] {
    &TIME_FIELDS
}

//! The ETL run.
//!
//! Two flows share one [`ExecutionContext`]:
//! - **Song data**: catalog → `songs`, `artists`
//! - **Log data**: events → `users`, `time`, `songplays` (joined with the
//!   catalog read by the song flow)
//!
//! Both inputs are read concurrently. The song flow writes its tables as
//! soon as the catalog is in memory, so a missing log directory does not
//! prevent `songs` and `artists` from being produced.

use deltalake::arrow::array::RecordBatch;
use snafu::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::context::ExecutionContext;
use crate::emit;
use crate::error::{EtlError, RejectSnafu, SinkSnafu, SourceSnafu, TransformSnafu};
use crate::metrics::events::TableCompleted;
use crate::rejects::RejectStats;
use crate::schema::{raw_log_schema, raw_song_schema, table};
use crate::sink::{SaveMode, WriteSummary};
use crate::transform::songplays::SONGPLAYS_PARTITION;
use crate::transform::songs::SONGS_PARTITION;
use crate::transform::time::TIME_PARTITION;
use crate::transform::{
    build_artists_table, build_songplays_table, build_songs_table, build_time_table,
    build_users_table, decompose_timestamps, filter_song_plays,
};

const SONG_DATASET: &str = "song_data";
const LOG_DATASET: &str = "log_data";

/// Tables written by the song flow.
#[derive(Debug, Clone)]
pub struct SongTables {
    pub songs: WriteSummary,
    pub artists: WriteSummary,
}

/// Tables written by the log flow.
#[derive(Debug, Clone)]
pub struct LogTables {
    /// `NextSong` events after filtering.
    pub plays: usize,
    pub users: WriteSummary,
    pub time: WriteSummary,
    pub songplays: WriteSummary,
}

/// Statistics about a completed run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub song_records: usize,
    pub log_records: usize,
    pub songs: SongTables,
    pub logs: LogTables,
    pub rejected: RejectStats,
}

impl RunStats {
    /// Every table summary in write order.
    pub fn tables(&self) -> [&WriteSummary; 5] {
        [
            &self.songs.songs,
            &self.songs.artists,
            &self.logs.users,
            &self.logs.time,
            &self.logs.songplays,
        ]
    }
}

async fn write(
    ctx: &ExecutionContext,
    name: &'static str,
    batch: &RecordBatch,
    partition_by: &[&str],
    started: Instant,
) -> Result<WriteSummary, EtlError> {
    let summary = ctx
        .sink()
        .write_table(name, batch, partition_by, SaveMode::Overwrite)
        .await
        .context(SinkSnafu)?;
    emit!(TableCompleted {
        table: name,
        duration: started.elapsed(),
    });
    Ok(summary)
}

/// Read the raw song catalog.
pub async fn read_song_data(ctx: &ExecutionContext) -> Result<RecordBatch, EtlError> {
    ctx.source()
        .read_json(SONG_DATASET, &ctx.settings().song_pattern, raw_song_schema())
        .await
        .context(SourceSnafu {
            dataset: SONG_DATASET,
        })
}

/// Read the raw event logs.
pub async fn read_log_data(ctx: &ExecutionContext) -> Result<RecordBatch, EtlError> {
    ctx.source()
        .read_json(LOG_DATASET, &ctx.settings().log_pattern, raw_log_schema())
        .await
        .context(SourceSnafu {
            dataset: LOG_DATASET,
        })
}

/// Build and write `songs` and `artists` from the catalog.
pub async fn process_song_data(
    ctx: &ExecutionContext,
    catalog: &RecordBatch,
) -> Result<SongTables, EtlError> {
    let policy = ctx.settings().on_key_conflict;

    let started = Instant::now();
    let songs = build_songs_table(catalog, policy).context(TransformSnafu { table: table::SONGS })?;
    let songs = write(ctx, table::SONGS, &songs, SONGS_PARTITION, started).await?;

    let started = Instant::now();
    let artists =
        build_artists_table(catalog, policy).context(TransformSnafu { table: table::ARTISTS })?;
    let artists = write(ctx, table::ARTISTS, &artists, &[], started).await?;

    Ok(SongTables { songs, artists })
}

/// Build and write `users`, `time` and `songplays` from the event logs.
///
/// Unmatched plays go to the context's reject sink.
pub async fn process_log_data(
    ctx: &ExecutionContext,
    logs: &RecordBatch,
    catalog: &RecordBatch,
) -> Result<LogTables, EtlError> {
    let settings = ctx.settings();

    let plays = filter_song_plays(logs).context(TransformSnafu { table: table::USERS })?;
    info!(
        "{} of {} log records are play events",
        plays.num_rows(),
        logs.num_rows()
    );

    let started = Instant::now();
    let users = build_users_table(&plays, settings.on_key_conflict)
        .context(TransformSnafu { table: table::USERS })?;
    let users = write(ctx, table::USERS, &users, &[], started).await?;

    let started = Instant::now();
    let augmented = decompose_timestamps(&plays).context(TransformSnafu { table: table::TIME })?;
    let time = build_time_table(&augmented).context(TransformSnafu { table: table::TIME })?;
    let time_partition: &[&str] = if settings.partition_time {
        TIME_PARTITION
    } else {
        &[]
    };
    let time = write(ctx, table::TIME, &time, time_partition, started).await?;

    let started = Instant::now();
    let joined = build_songplays_table(&augmented, catalog, settings.match_mode, ctx.keys())
        .context(TransformSnafu {
            table: table::SONGPLAYS,
        })?;
    debug!("Forwarding {} rejected plays", joined.rejected.len());
    ctx.rejects()
        .reject(joined.rejected)
        .await
        .context(RejectSnafu)?;
    let songplays = write(
        ctx,
        table::SONGPLAYS,
        &joined.songplays,
        SONGPLAYS_PARTITION,
        started,
    )
    .await?;

    Ok(LogTables {
        plays: plays.num_rows(),
        users,
        time,
        songplays,
    })
}

/// Run both flows against `ctx`.
pub async fn run(ctx: &ExecutionContext) -> Result<RunStats, EtlError> {
    let song_flow = async {
        let catalog = read_song_data(ctx).await?;
        let tables = process_song_data(ctx, &catalog).await?;
        Ok::<_, EtlError>((catalog, tables))
    };
    let (song_result, log_result) = tokio::join!(song_flow, read_log_data(ctx));
    let (catalog, songs) = song_result?;
    let logs = log_result?;

    let log_tables = process_log_data(ctx, &logs, &catalog).await?;
    let rejected = ctx.rejects().finish().await.context(RejectSnafu)?;

    Ok(RunStats {
        song_records: catalog.num_rows(),
        log_records: logs.num_rows(),
        songs,
        logs: log_tables,
        rejected,
    })
}

/// Build the context from `config` and run the job.
pub async fn run_pipeline(config: Config) -> Result<RunStats, EtlError> {
    let ctx = ExecutionContext::from_config(&config).await?;
    run(&ctx).await
}

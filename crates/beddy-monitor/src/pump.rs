//! Feeds newline-delimited event JSON into the service and reports changes

use std::io::Write;

use beddy_core::{Cursor, Event};
use beddy_sessions::{Session, SessionListChanged};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::error::MonitorError;
use crate::service::EventService;

/// One line of monitor output
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report<'a> {
    /// The session list changed
    Changed(&'a SessionListChanged),
    /// Session list once the input is exhausted
    Final {
        logical_clock: Cursor,
        sessions: &'a [Session],
    },
}

/// Counters for one pump run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub events_put: u64,
    pub lines_skipped: u64,
    pub changes_reported: u64,
    pub changes_lagged: u64,
    /// Highest clock put during the run
    pub last_clock: Cursor,
}

/// Put every event read from `input`, writing a report line per change
///
/// Blank lines are skipped silently and malformed lines with a warning.
/// A failed `put` aborts the run. Once input ends, waits for the projection
/// to catch up and writes the final session list.
pub async fn pump<R, W>(
    service: &EventService,
    input: R,
    output: &mut W,
) -> Result<PumpStats, MonitorError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut changes = service.subscribe();
    let mut lines = input.lines();
    let mut stats = PumpStats::default();

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => report_change(&change, output, &mut stats)?,
                Err(RecvError::Lagged(missed)) => lagged(missed, &mut stats),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) => ingest(service, &line, &mut stats).await?,
                None => break,
            },
        }
    }

    info!(
        events_put = stats.events_put,
        lines_skipped = stats.lines_skipped,
        "Input exhausted, waiting for projection"
    );
    service.sessions().wait_for_cursor(stats.last_clock).await?;
    drain(&mut changes, output, &mut stats)?;

    let sessions = service.get_session_list();
    write_report(
        output,
        &Report::Final {
            logical_clock: service.sessions().cursor(),
            sessions: &sessions,
        },
    )?;
    output.flush()?;
    Ok(stats)
}

async fn ingest(
    service: &EventService,
    line: &str,
    stats: &mut PumpStats,
) -> Result<(), MonitorError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    let event = match Event::from_json(line) {
        Ok(event) => event,
        Err(e) => {
            stats.lines_skipped += 1;
            warn!(error = %e, "Skipping malformed event line");
            return Ok(());
        }
    };

    let clock = event.logical_clock;
    service.put(event).await?;
    stats.events_put += 1;
    stats.last_clock = stats.last_clock.max(clock);
    debug!(logical_clock = clock, "Event stored");
    Ok(())
}

/// Report notifications already queued; everything up to the cursor is queued
fn drain<W: Write>(
    changes: &mut broadcast::Receiver<SessionListChanged>,
    output: &mut W,
    stats: &mut PumpStats,
) -> Result<(), MonitorError> {
    loop {
        match changes.try_recv() {
            Ok(change) => report_change(&change, output, stats)?,
            Err(TryRecvError::Lagged(missed)) => lagged(missed, stats),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
        }
    }
}

fn report_change<W: Write>(
    change: &SessionListChanged,
    output: &mut W,
    stats: &mut PumpStats,
) -> Result<(), MonitorError> {
    write_report(output, &Report::Changed(change))?;
    stats.changes_reported += 1;
    Ok(())
}

fn lagged(missed: u64, stats: &mut PumpStats) {
    stats.changes_lagged += missed;
    warn!(missed, "Change notifications dropped, output fell behind");
}

fn write_report<W: Write>(output: &mut W, report: &Report<'_>) -> Result<(), MonitorError> {
    serde_json::to_writer(&mut *output, report)?;
    output.write_all(b"\n")?;
    Ok(())
}

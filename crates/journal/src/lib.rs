//! Flagfall Match Journal
//!
//! Every event the orchestrator emits for a match is appended to that
//! match's journal. At settlement the journal is sealed into a
//! [`MatchRecord`] carrying a SHA-256 digest of the event stream, which
//! [`verify_record`] can later check for tampering and internal consistency.
//!
//! # Architecture
//!
//! - `MatchJournal`: collects `MatchEventProto`s while a match runs
//! - `verify_record`: digest and stream-consistency checks
//! - `write_record` / `read_record`: protobuf file persistence

#![deny(unsafe_code)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flagfall_sim::{Team, TeamMap, Tick};
use flagfall_wire::match_event_proto::Event;
use flagfall_wire::{MatchEventProto, MatchRecord, RECORD_FORMAT_VERSION, team_code, team_from_code};
use prost::Message;
use sha2::{Digest, Sha256};
use tracing::debug;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("failed to decode match record: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("match record already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("unsupported record format version {0}")]
    UnsupportedVersion(u32),

    #[error("event digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("inconsistent event stream: {reason}")]
    InvalidStream { reason: String },
}

impl JournalError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Decode(_) => "decode",
            Self::AlreadyExists(_) => "already_exists",
            Self::UnsupportedVersion(_) => "unsupported_version",
            Self::DigestMismatch { .. } => "digest_mismatch",
            Self::InvalidStream { .. } => "invalid_stream",
        }
    }

    fn stream(reason: impl Into<String>) -> Self {
        Self::InvalidStream {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Event log of a single match.
#[derive(Debug, Clone)]
pub struct MatchJournal {
    arena: String,
    seed: u64,
    tick_rate_hz: u32,
    start_tick: Option<Tick>,
    events: Vec<MatchEventProto>,
}

impl MatchJournal {
    pub fn new(arena: impl Into<String>, seed: u64, tick_rate_hz: u32) -> Self {
        Self {
            arena: arena.into(),
            seed,
            tick_rate_hz,
            start_tick: None,
            events: Vec::new(),
        }
    }

    pub fn arena(&self) -> &str {
        &self.arena
    }

    /// Tick of the recorded `MatchStarted`, if any.
    pub fn start_tick(&self) -> Option<Tick> {
        self.start_tick
    }

    pub fn events(&self) -> &[MatchEventProto] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn record(&mut self, event: MatchEventProto) {
        if self.start_tick.is_none() && matches!(event.event, Some(Event::MatchStarted(_))) {
            self.start_tick = Some(event.tick);
        }
        self.events.push(event);
    }

    /// Seal the journal into a record.
    pub fn finalize(self, end_tick: Tick, end_reason: &str, winner: Option<Team>) -> MatchRecord {
        let events_sha256 = events_digest(&self.events);
        MatchRecord {
            format_version: RECORD_FORMAT_VERSION,
            arena: self.arena,
            seed: self.seed,
            tick_rate_hz: self.tick_rate_hz,
            start_tick: self.start_tick.unwrap_or(end_tick),
            end_tick,
            end_reason: end_reason.to_string(),
            winner: team_code(winner),
            events: self.events,
            events_sha256,
        }
    }
}

/// Lowercase hex SHA-256 over the length-delimited encoding of `events`.
pub fn events_digest(events: &[MatchEventProto]) -> String {
    let mut hasher = Sha256::new();
    for event in events {
        hasher.update(event.encode_length_delimited_to_vec());
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Verification
// ============================================================================

/// Check a record's digest and the internal consistency of its events.
///
/// # Verification Steps
/// 1. Format version is supported
/// 2. Event digest matches
/// 3. Ticks are non-decreasing and within `[start_tick, end_tick]`
/// 4. Exactly one `MatchEnded`, and no gameplay event follows it
/// 5. `MatchEnded` agrees with the record's winner and reason
/// 6. Per-team `FlagCaptured` counts match the final capture score, and each
///    capture reports the next score for its team
pub fn verify_record(record: &MatchRecord) -> Result<(), JournalError> {
    // Step 1
    if record.format_version != RECORD_FORMAT_VERSION {
        return Err(JournalError::UnsupportedVersion(record.format_version));
    }

    // Step 2
    let actual = events_digest(&record.events);
    if actual != record.events_sha256 {
        return Err(JournalError::DigestMismatch {
            expected: record.events_sha256.clone(),
            actual,
        });
    }

    // Step 3
    if record.start_tick > record.end_tick {
        return Err(JournalError::stream(format!(
            "start tick {} after end tick {}",
            record.start_tick, record.end_tick
        )));
    }
    let mut last_tick = 0;
    for event in &record.events {
        if event.tick < last_tick {
            return Err(JournalError::stream(format!(
                "tick {} follows tick {last_tick}",
                event.tick
            )));
        }
        if event.tick > record.end_tick {
            return Err(JournalError::stream(format!(
                "event at tick {} after end tick {}",
                event.tick, record.end_tick
            )));
        }
        last_tick = event.tick;
    }

    // Step 4
    let ended: Vec<usize> = record
        .events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e.event, Some(Event::MatchEnded(_))))
        .map(|(i, _)| i)
        .collect();
    let [end_index] = ended[..] else {
        return Err(JournalError::stream(format!(
            "expected exactly one match end, found {}",
            ended.len()
        )));
    };
    if let Some(late) = record.events[end_index + 1..]
        .iter()
        .find(|e| e.is_gameplay())
    {
        return Err(JournalError::stream(format!(
            "gameplay event after match end at tick {}",
            late.tick
        )));
    }

    // Step 5
    let Some(Event::MatchEnded(end)) = &record.events[end_index].event else {
        return Err(JournalError::stream("match end vanished"));
    };
    if end.winner != record.winner || end.reason != record.end_reason {
        return Err(JournalError::stream(
            "match end disagrees with record winner or reason",
        ));
    }

    // Step 6
    let mut captures: TeamMap<u32> = TeamMap::default();
    for event in &record.events[..end_index] {
        if let Some(Event::FlagCaptured(capture)) = &event.event {
            let team = team_from_code(capture.team)
                .ok_or_else(|| JournalError::stream("capture without a team"))?;
            captures[team] += 1;
            if capture.score != captures[team] {
                return Err(JournalError::stream(format!(
                    "{team} capture reports score {} but is capture {}",
                    capture.score, captures[team]
                )));
            }
        }
    }
    let reported = TeamMap::new(end.red_captures, end.blue_captures);
    if captures != reported {
        return Err(JournalError::stream(format!(
            "final score {}-{} but {}-{} captures recorded",
            reported.red, reported.blue, captures.red, captures.blue
        )));
    }

    Ok(())
}

// ============================================================================
// Record I/O
// ============================================================================

/// Write a record to `path`. Never overwrites an existing file.
pub fn write_record(record: &MatchRecord, path: &Path) -> Result<(), JournalError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    if path.exists() {
        return Err(JournalError::AlreadyExists(path.to_path_buf()));
    }

    let encoded = record.encode_to_vec();
    let mut file = fs::File::create(path)?;
    file.write_all(&encoded)?;

    debug!(
        arena = %record.arena,
        events = record.events.len(),
        bytes = encoded.len(),
        path = %path.display(),
        "match record written"
    );
    Ok(())
}

pub fn read_record(path: &Path) -> Result<MatchRecord, JournalError> {
    let data = fs::read(path)?;
    Ok(MatchRecord::decode(data.as_slice())?)
}

// ============================================================================
// Tests
// ============================================================================

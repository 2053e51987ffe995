//! Trigger list loading.
//!
//! The renderer that produced the test video also writes one CSV row per frame
//! in which a tyre sits in the trigger zone:
//!
//! ```text
//! frame_index,target_time_sec,entity_id,label,expected_verdict
//! 42,1.400,0,circle,ACCEPT
//! ```
//!
//! A tyre lingers in the zone for several frames, so only the first row per
//! entity is kept.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Expected inspection outcome for a tyre.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Accept,
    Reject,
}

impl FromStr for Verdict {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACCEPT" => Ok(Verdict::Accept),
            "REJECT" => Ok(Verdict::Reject),
            other => Err(anyhow!(
                "unknown verdict '{}'; expected ACCEPT or REJECT",
                other
            )),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Accept => write!(f, "ACCEPT"),
            Verdict::Reject => write!(f, "REJECT"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TriggerRecord {
    /// Video frame the row was generated from.
    pub sequence_index: u64,
    /// Offset from session start at which to capture.
    pub target_time_sec: f64,
    pub entity_id: u64,
    /// Dot style drawn on the tyre (circle, pacman, donut, ...).
    pub label: String,
    pub expected: Verdict,
}

impl TriggerRecord {
    /// Target as a duration. Negative or NaN times clamp to zero, huge ones to `Duration::MAX`.
    pub fn target_offset(&self) -> Duration {
        if self.target_time_sec.is_nan() || self.target_time_sec <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.target_time_sec).unwrap_or(Duration::MAX)
    }
}

/// Offset for a target time, if it is a representable non-negative duration.
fn offset_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Deduplicated trigger list, in load order. Read-only once built.
#[derive(Clone, Debug, Default)]
pub struct TriggerSchedule {
    records: Vec<TriggerRecord>,
    duplicates_dropped: usize,
}

impl TriggerSchedule {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open trigger list {}", path.display()))?;
        Self::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("load trigger list {}", path.display()))
    }

    /// Parse CSV text. The first line is a header and is skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut rows = Vec::new();
        for (idx, line) in reader.lines().enumerate().skip(1) {
            let line_no = idx + 1;
            let line = line.with_context(|| format!("read line {}", line_no))?;
            if line.trim().is_empty() {
                continue;
            }
            rows.push(parse_row(&line).with_context(|| format!("line {}", line_no))?);
        }
        Ok(Self::from_records(rows))
    }

    /// Keep the first record seen for each entity id, preserving order.
    /// Records whose target time is not a valid offset are dropped.
    pub fn from_records(records: impl IntoIterator<Item = TriggerRecord>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        let mut duplicates_dropped = 0;
        for record in records {
            if offset_from_secs(record.target_time_sec).is_none() {
                log::warn!(
                    "dropping trigger for entity {}: invalid target time {}",
                    record.entity_id,
                    record.target_time_sec
                );
                continue;
            }
            if seen.insert(record.entity_id) {
                kept.push(record);
            } else {
                duplicates_dropped += 1;
            }
        }
        if kept
            .windows(2)
            .any(|pair| pair[1].target_time_sec < pair[0].target_time_sec)
        {
            log::warn!("trigger times are not ascending; late triggers will fire immediately");
        }
        Self {
            records: kept,
            duplicates_dropped,
        }
    }

    pub fn records(&self) -> &[TriggerRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TriggerRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }
}

fn parse_row(line: &str) -> Result<TriggerRecord> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 5 {
        return Err(anyhow!("expected 5 fields, found {}", fields.len()));
    }
    let sequence_index = fields[0]
        .parse()
        .map_err(|_| anyhow!("invalid frame index '{}'", fields[0]))?;
    let target_time_sec: f64 = fields[1]
        .parse()
        .map_err(|_| anyhow!("invalid target time '{}'", fields[1]))?;
    if offset_from_secs(target_time_sec).is_none() {
        return Err(anyhow!(
            "target time must be a non-negative offset in range, got {}",
            fields[1]
        ));
    }
    let entity_id = fields[2]
        .parse()
        .map_err(|_| anyhow!("invalid entity id '{}'", fields[2]))?;
    if fields[3].is_empty() {
        return Err(anyhow!("empty label"));
    }
    Ok(TriggerRecord {
        sequence_index,
        target_time_sec,
        entity_id,
        label: fields[3].to_string(),
        expected: fields[4].parse()?,
    })
}

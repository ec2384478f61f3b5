//! Duplicate id selection and the id/count artifact format.
//!
//! The artifact is one `hex_id,count` line per entry with no header and no
//! quoting. Ids are H3 tokens and never contain the delimiter; writing one
//! that does is an error rather than a silently unreadable file.

use crate::aggregate::IdCounts;
use hexdedup_core::{DedupError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// An id seen more than once, with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateEntry {
    pub hex_id: String,
    pub count: u64,
}

impl DuplicateEntry {
    pub fn new(hex_id: impl Into<String>, count: u64) -> Self {
        Self {
            hex_id: hex_id.into(),
            count,
        }
    }
}

/// Selects duplicate ids from a count map.
pub struct DuplicateSetBuilder {
    report_interval: usize,
}

impl DuplicateSetBuilder {
    #[must_use]
    pub fn new(report_interval: usize) -> Self {
        Self {
            report_interval: report_interval.max(1),
        }
    }

    /// Entries with `count > 1`, in map order.
    #[must_use]
    pub fn build(&self, counts: &IdCounts) -> Vec<DuplicateEntry> {
        let mut found = Vec::new();
        for (hex_id, count) in counts.iter() {
            if count > 1 {
                found.push(DuplicateEntry::new(hex_id, count));
                if found.len() % self.report_interval == 0 {
                    tracing::info!(duplicates = found.len(), "collecting duplicate ids");
                }
            }
        }
        tracing::debug!(
            duplicates = found.len(),
            distinct = counts.len(),
            "duplicate set built"
        );
        found
    }
}

/// Entries with `count > 1`, in map order.
#[must_use]
pub fn find_duplicates(counts: &IdCounts) -> Vec<DuplicateEntry> {
    DuplicateSetBuilder::new(usize::MAX).build(counts)
}

fn check_token(hex_id: &str) -> Result<()> {
    if hex_id.contains(',') {
        return Err(DedupError::InvalidToken {
            token: hex_id.to_string(),
            reason: "contains the ',' delimiter",
        });
    }
    if hex_id.contains(['\n', '\r']) {
        return Err(DedupError::InvalidToken {
            token: hex_id.to_string(),
            reason: "contains a line break",
        });
    }
    Ok(())
}

/// Write `(hex_id, count)` pairs, one per line.
pub fn write_pairs<'a, W, I>(writer: &mut W, pairs: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = (&'a str, u64)>,
{
    for (hex_id, count) in pairs {
        check_token(hex_id)?;
        writeln!(writer, "{hex_id},{count}")?;
    }
    Ok(())
}

/// Write `(hex_id, count)` pairs to a file, replacing it.
pub fn write_pairs_file<'a, P, I>(path: P, pairs: I) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_pairs(&mut writer, pairs)?;
    writer.flush()?;
    Ok(())
}

/// Write duplicate entries to a file, replacing it.
pub fn write_entries_file<P: AsRef<Path>>(path: P, entries: &[DuplicateEntry]) -> Result<()> {
    write_pairs_file(path, entries.iter().map(|e| (e.hex_id.as_str(), e.count)))
}

/// Read `(hex_id, count)` pairs written by [`write_pairs`].
pub fn read_pairs<R: BufRead>(reader: R) -> Result<Vec<DuplicateEntry>> {
    parse_pairs(reader, 0)
}

/// Read a duplicate id artifact. Every count must be at least 2.
pub fn read_duplicates<R: BufRead>(reader: R) -> Result<Vec<DuplicateEntry>> {
    parse_pairs(reader, 2)
}

fn parse_pairs<R: BufRead>(mut reader: R, min_count: u64) -> Result<Vec<DuplicateEntry>> {
    let mut entries = Vec::new();
    let mut line = String::new();
    let mut line_num = 0;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_num += 1;

        let text = line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(line.as_str());
        if text.is_empty() {
            continue;
        }

        let (hex_id, count) = text.split_once(',').ok_or_else(|| DedupError::Parse {
            line: line_num,
            message: "expected `hex_id,count`".to_string(),
        })?;
        if hex_id.is_empty() {
            return Err(DedupError::Parse {
                line: line_num,
                message: "empty hex_id".to_string(),
            });
        }
        let count: u64 = count.parse().map_err(|e| DedupError::Parse {
            line: line_num,
            message: format!("invalid count {count:?}: {e}"),
        })?;
        if count < min_count {
            return Err(DedupError::Parse {
                line: line_num,
                message: format!("count {count} for {hex_id:?} is not a duplicate"),
            });
        }

        entries.push(DuplicateEntry::new(hex_id, count));
    }

    Ok(entries)
}

/// Read `(hex_id, count)` pairs from a file.
pub fn read_pairs_file<P: AsRef<Path>>(path: P) -> Result<Vec<DuplicateEntry>> {
    let file = File::open(path)?;
    read_pairs(BufReader::new(file))
}

/// Read a duplicate id artifact from a file.
pub fn read_duplicates_file<P: AsRef<Path>>(path: P) -> Result<Vec<DuplicateEntry>> {
    let file = File::open(path)?;
    read_duplicates(BufReader::new(file))
}

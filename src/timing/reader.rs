use std::fs;
use std::path::{Path, PathBuf};

use super::schema::kind_for_header;
use crate::core::StreamKind;
use crate::error::{Result, SyncError};

/// Columns shared by every stream kind
#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub trial_number: u32,
    pub stream_id: String,
    pub wall_time: f64,
    /// Seconds
    pub monotonic_time: f64,
    pub sequence: u64,
}

#[derive(Debug, Clone)]
pub struct TimingLogContents {
    pub path: PathBuf,
    pub kind: StreamKind,
    pub rows: Vec<TimingRecord>,
}

impl TimingLogContents {
    pub fn first(&self) -> Option<&TimingRecord> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&TimingRecord> {
        self.rows.last()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Wall-clock span between the first and last row
    pub fn duration_seconds(&self) -> f64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last.wall_time - first.wall_time,
            _ => 0.0,
        }
    }
}

/// Parse a timing log written by [`super::TimingLog`].
///
/// An unterminated final line (the tail of an interrupted write) is ignored;
/// every complete row must parse.
pub fn read_timing_log(path: impl AsRef<Path>) -> Result<TimingLogContents> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;

    let malformed = |detail: String| SyncError::MalformedLog {
        path: path.to_path_buf(),
        detail,
    };

    let mut lines = content.split_inclusive('\n');
    let header = lines
        .next()
        .ok_or_else(|| malformed("missing header".to_string()))?;
    let kind = kind_for_header(header)
        .ok_or_else(|| malformed(format!("unknown header {:?}", header.trim_end())))?;

    let mut rows = Vec::new();
    for (idx, line) in lines.enumerate() {
        if !line.ends_with('\n') {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        let record = parse_row(line).map_err(|detail| malformed(format!("row {}: {}", idx + 1, detail)))?;
        rows.push(record);
    }

    Ok(TimingLogContents {
        path: path.to_path_buf(),
        kind,
        rows,
    })
}

fn parse_row(line: &str) -> std::result::Result<TimingRecord, String> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 5 {
        return Err(format!("expected at least 5 columns, found {}", fields.len()));
    }

    Ok(TimingRecord {
        trial_number: fields[0]
            .parse()
            .map_err(|e| format!("trial {:?}: {}", fields[0], e))?,
        stream_id: fields[1].to_string(),
        wall_time: fields[2]
            .parse()
            .map_err(|e| format!("wall_time {:?}: {}", fields[2], e))?,
        monotonic_time: fields[3]
            .parse()
            .map_err(|e| format!("monotonic_time {:?}: {}", fields[3], e))?,
        sequence: fields[4]
            .parse()
            .map_err(|e| format!("sequence {:?}: {}", fields[4], e))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_truncated_tail_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cam.csv");
        fs::write(
            &path,
            "trial,stream,wall_time,monotonic_time,sequence,frame_index,sensor_time_ns\n\
             1,cam,1000.000000,0.000000000,0,0,\n\
             1,cam,1000.0333",
        )
        .unwrap();

        let contents = read_timing_log(&path).unwrap();
        assert_eq!(contents.kind, StreamKind::Video);
        assert_eq!(contents.len(), 1);
    }

    #[test]
    fn test_unknown_header_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.csv");
        fs::write(&path, "a,b,c\n1,2,3\n").unwrap();

        let err = read_timing_log(&path).unwrap_err();
        assert!(matches!(err, SyncError::MalformedLog { .. }));
    }

    #[test]
    fn test_bad_number_reports_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mic.csv");
        fs::write(
            &path,
            "trial,stream,wall_time,monotonic_time,sequence,chunk_index,sample_count,sensor_time_ns\n\
             1,mic,abc,0.0,0,0,960,\n",
        )
        .unwrap();

        let err = read_timing_log(&path).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }
}

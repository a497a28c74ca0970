//! CSV schemas for traces, filtered output and forecasts

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{PoseError, Result, TraceFailure};
use crate::types::{Pose, POSE_DIM};

pub const FILTERED_SUFFIX: &str = "_filtered";
pub const FORECAST_SUFFIX: &str = "_future_predictions";

const TRACE_COLUMNS: [&str; POSE_DIM] = [
    "PosX", "PosY", "PosZ", "QuatW", "QuatX", "QuatY", "QuatZ",
];
const FORECAST_COLUMNS: [&str; POSE_DIM] = [
    "Future_PosX",
    "Future_PosY",
    "Future_PosZ",
    "Future_QuatW",
    "Future_QuatX",
    "Future_QuatY",
    "Future_QuatZ",
];

/// Column layout of a pose CSV
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CsvSchema {
    /// Ground truth, measurements and filtered output
    Trace,
    /// Forecast output
    Forecast,
}

impl CsvSchema {
    pub fn columns(self) -> [&'static str; POSE_DIM] {
        match self {
            CsvSchema::Trace => TRACE_COLUMNS,
            CsvSchema::Forecast => FORECAST_COLUMNS,
        }
    }
}

/// Parse a number that may be wrapped in array brackets, e.g. `[1.23]`.
///
/// Brackets must be balanced; empty, non-numeric and non-finite values are
/// rejected.
pub fn parse_bracketed(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    let opening = trimmed.chars().take_while(|c| *c == '[').count();
    let closing = trimmed.chars().rev().take_while(|c| *c == ']').count();
    if opening != closing {
        return Err(PoseError::Parse(format!("unbalanced brackets in {text:?}")));
    }
    let inner = trimmed[opening..trimmed.len() - closing].trim();
    let value: f64 = inner
        .parse()
        .map_err(|e| PoseError::Parse(format!("{text:?} is not a number: {e}")))?;
    if !value.is_finite() {
        return Err(PoseError::Parse(format!("{text:?} is not finite")));
    }
    Ok(value)
}

/// Read poses from any reader. `source` only labels errors.
///
/// Columns are looked up by name; extra columns are ignored.
pub fn parse_poses<R: Read>(
    reader: R,
    schema: CsvSchema,
    source: &Path,
) -> std::result::Result<Vec<Pose>, TraceFailure> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| from_csv(source, e).in_trace(source, None))?
        .clone();

    let mut indices = [0usize; POSE_DIM];
    let mut missing = Vec::new();
    for (slot, name) in indices.iter_mut().zip(schema.columns()) {
        match headers.iter().position(|h| h == name) {
            Some(idx) => *slot = idx,
            None => missing.push(name),
        }
    }
    if !missing.is_empty() {
        return Err(PoseError::Schema(format!(
            "missing column(s) {}",
            missing.join(", ")
        ))
        .in_trace(source, None));
    }

    let mut poses = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record
            .map_err(|e| from_csv(source, e).in_trace(source, Some(row)))?;
        let mut values = [0.0; POSE_DIM];
        for (value, (&idx, name)) in values
            .iter_mut()
            .zip(indices.iter().zip(schema.columns()))
        {
            let field = record.get(idx).ok_or_else(|| {
                PoseError::Schema(format!("column {name} missing from record"))
                    .in_trace(source, Some(row))
            })?;
            *value = parse_bracketed(field).map_err(|e| match e {
                PoseError::Parse(msg) => {
                    PoseError::Parse(format!("{name}: {msg}")).in_trace(source, Some(row))
                }
                other => other.in_trace(source, Some(row)),
            })?;
        }
        poses.push(Pose::from_array(values));
    }
    Ok(poses)
}

/// Write poses with the schema's header to any writer.
pub fn write_poses<W: Write>(writer: W, schema: CsvSchema, poses: &[Pose]) -> csv::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(schema.columns())?;
    for pose in poses {
        csv_writer.write_record(pose.to_array().iter().map(|v| v.to_string()))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Load a whole trace file.
pub fn read_trace(path: &Path, schema: CsvSchema) -> std::result::Result<Vec<Pose>, TraceFailure> {
    let file = File::open(path).map_err(|e| PoseError::io(path, e).in_trace(path, None))?;
    parse_poses(BufReader::new(file), schema, path)
}

/// Write a trace file atomically: a `.tmp` sibling is written, then renamed.
/// The temporary file is removed on failure.
pub fn write_trace(path: &Path, schema: CsvSchema, poses: &[Pose]) -> Result<()> {
    let tmp = tmp_path(path);
    let result = (|| {
        let file = File::create(&tmp).map_err(|e| PoseError::io(&tmp, e))?;
        write_poses(BufWriter::new(file), schema, poses).map_err(|e| from_csv(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| PoseError::io(path, e))
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    } else {
        info!("Saved {} rows to {}", poses.len(), path.display());
    }
    result
}

/// `<output_dir>/<stem>_filtered.csv`
pub fn filtered_path(output_dir: &Path, input: &Path) -> PathBuf {
    derived_path(output_dir, input, FILTERED_SUFFIX)
}

/// `<output_dir>/<stem>_future_predictions.csv`
pub fn forecast_path(output_dir: &Path, input: &Path) -> PathBuf {
    derived_path(output_dir, input, FORECAST_SUFFIX)
}

fn derived_path(output_dir: &Path, input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(format!("{stem}{suffix}.csv"))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn from_csv(path: &Path, err: csv::Error) -> PoseError {
    if err.is_io_error() {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => PoseError::io(path, io),
            other => PoseError::Schema(format!("{other:?}")),
        }
    } else {
        match err.kind() {
            csv::ErrorKind::UnequalLengths { .. } => {
                PoseError::Schema(format!("wrong field count: {err}"))
            }
            csv::ErrorKind::Utf8 { .. } => PoseError::Parse(err.to_string()),
            _ => PoseError::Schema(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Quaternion;

    fn label() -> &'static Path {
        Path::new("memory.csv")
    }

    #[test]
    fn test_parse_bracketed() {
        assert_eq!(parse_bracketed("1.23").unwrap(), 1.23);
        assert_eq!(parse_bracketed("[1.23]").unwrap(), 1.23);
        assert_eq!(parse_bracketed(" [ -4e-3 ] ").unwrap(), -4e-3);
        assert_eq!(parse_bracketed("[[7]]").unwrap(), 7.0);
    }

    #[test]
    fn test_parse_bracketed_rejects_malformed() {
        for bad in ["", "[]", "[1.2", "1.2]", "[abc]", "[1.2.3]", "nan", "[inf]"] {
            assert!(
                matches!(parse_bracketed(bad), Err(PoseError::Parse(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_parse_trace_with_extra_column() {
        let data = "Timestamp,PosX,PosY,PosZ,QuatW,QuatX,QuatY,QuatZ\n\
                    0.0,1,2,3,1,0,0,0\n\
                    0.1,1.5,2.5,3.5,0.9,0.1,0.2,0.3\n";
        let poses = parse_poses(data.as_bytes(), CsvSchema::Trace, label()).unwrap();
        assert_eq!(poses.len(), 2);
        assert_eq!(poses[1].x, 1.5);
        assert_eq!(poses[1].quaternion, Quaternion::new(0.9, 0.1, 0.2, 0.3));
    }

    #[test]
    fn test_column_order_follows_header() {
        let data = "QuatZ,QuatY,QuatX,QuatW,PosZ,PosY,PosX\n7,6,5,4,3,2,1\n";
        let poses = parse_poses(data.as_bytes(), CsvSchema::Trace, label()).unwrap();
        assert_eq!(poses[0].to_array(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let data = "PosX,PosY,PosZ,QuatW,QuatX,QuatY\n1,2,3,1,0,0\n";
        let err = parse_poses(data.as_bytes(), CsvSchema::Trace, label()).unwrap_err();
        assert_eq!(err.error.kind(), "schema");
        assert!(err.error.to_string().contains("QuatZ"));
        assert_eq!(err.row, None);
    }

    #[test]
    fn test_wrong_field_count_is_schema_error() {
        let data = "PosX,PosY,PosZ,QuatW,QuatX,QuatY,QuatZ\n1,2,3,1,0,0,0\n1,2,3\n";
        let err = parse_poses(data.as_bytes(), CsvSchema::Trace, label()).unwrap_err();
        assert_eq!(err.error.kind(), "schema");
        assert_eq!(err.row, Some(1));
    }

    #[test]
    fn test_malformed_value_reports_row_and_column() {
        let data = "Future_PosX,Future_PosY,Future_PosZ,Future_QuatW,Future_QuatX,Future_QuatY,Future_QuatZ\n\
                    [1],[2],[3],[1],[0],[0],[0]\n\
                    [1],[x],[3],[1],[0],[0],[0]\n";
        let err = parse_poses(data.as_bytes(), CsvSchema::Forecast, label())
            .unwrap_err();
        assert_eq!(err.error.kind(), "parse");
        assert_eq!(err.row, Some(1));
        assert!(err.error.to_string().contains("Future_PosY"));
    }

    #[test]
    fn test_write_header() {
        let mut buf = Vec::new();
        write_poses(&mut buf, CsvSchema::Forecast, &[]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text.trim_end(),
            "Future_PosX,Future_PosY,Future_PosZ,Future_QuatW,Future_QuatX,Future_QuatY,Future_QuatZ"
        );
    }

    #[test]
    fn test_derived_paths() {
        let out = Path::new("/out");
        let input = Path::new("/data/run_07.csv");
        assert_eq!(filtered_path(out, input), Path::new("/out/run_07_filtered.csv"));
        assert_eq!(
            forecast_path(out, input),
            Path::new("/out/run_07_future_predictions.csv")
        );
        assert_eq!(tmp_path(Path::new("/out/a.csv")), Path::new("/out/a.csv.tmp"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_trace(Path::new("/definitely/not/here.csv"), CsvSchema::Trace)
            .unwrap_err();
        assert_eq!(err.error.kind(), "io");
    }
}

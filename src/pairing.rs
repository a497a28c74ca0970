//! Identifier-keyed join of ground-truth and forecast trace files

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::csv_io::{FILTERED_SUFFIX, FORECAST_SUFFIX};
use crate::error::{PoseError, Result};

/// One ground-truth file and the output derived from it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracePair {
    pub trace_id: String,
    pub truth: PathBuf,
    pub predicted: PathBuf,
}

/// File stem with a known output suffix removed:
/// `run_07_future_predictions.csv` and `run_07.csv` both map to `run_07`.
pub fn trace_id(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let id = [FORECAST_SUFFIX, FILTERED_SUFFIX]
        .iter()
        .find_map(|suffix| stem.strip_suffix(suffix))
        .unwrap_or(stem);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn index_by_id<'a>(
    side: &str,
    files: &'a [PathBuf],
    problems: &mut Vec<String>,
) -> BTreeMap<String, &'a PathBuf> {
    let mut by_id: BTreeMap<String, &PathBuf> = BTreeMap::new();
    for path in files {
        let Some(id) = trace_id(path) else {
            problems.push(format!("{side}: no trace id in {}", path.display()));
            continue;
        };
        if let Some(previous) = by_id.insert(id.clone(), path) {
            problems.push(format!(
                "{side}: duplicate id {id} ({} and {})",
                previous.display(),
                path.display()
            ));
        }
    }
    by_id
}

/// Join by trace id. Fails with `PairingMismatch` listing every id that is
/// unmatched, duplicated or unparsable; nothing is silently dropped.
pub fn pair_traces(
    truth_files: &[PathBuf],
    predicted_files: &[PathBuf],
) -> Result<Vec<TracePair>> {
    let mut problems = Vec::new();
    let truth = index_by_id("ground truth", truth_files, &mut problems);
    let predicted = index_by_id("predicted", predicted_files, &mut problems);

    for id in truth.keys().filter(|id| !predicted.contains_key(*id)) {
        problems.push(format!("{id} has no predicted trace"));
    }
    for id in predicted.keys().filter(|id| !truth.contains_key(*id)) {
        problems.push(format!("{id} has no ground-truth trace"));
    }
    if !problems.is_empty() {
        return Err(PoseError::PairingMismatch(problems.join("; ")));
    }

    Ok(truth
        .into_iter()
        .map(|(trace_id, truth_path)| {
            let predicted_path = predicted[&trace_id].clone();
            TracePair {
                trace_id,
                truth: truth_path.clone(),
                predicted: predicted_path,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_trace_id() {
        assert_eq!(trace_id(Path::new("/a/run_1.csv")).as_deref(), Some("run_1"));
        assert_eq!(
            trace_id(Path::new("/b/run_1_future_predictions.csv")).as_deref(),
            Some("run_1")
        );
        assert_eq!(trace_id(Path::new("run_1_filtered.csv")).as_deref(), Some("run_1"));
        assert_eq!(trace_id(Path::new("_filtered.csv")), None);
    }

    #[test]
    fn test_pairs_by_id_not_by_order() {
        let truth = paths(&["gt/b.csv", "gt/a.csv", "gt/c.csv"]);
        let predicted = paths(&[
            "out/c_future_predictions.csv",
            "out/a_future_predictions.csv",
            "out/b_future_predictions.csv",
        ]);
        let pairs = pair_traces(&truth, &predicted).unwrap();
        assert_eq!(pairs.len(), 3);
        for pair in &pairs {
            assert_eq!(trace_id(&pair.truth), Some(pair.trace_id.clone()));
            assert_eq!(trace_id(&pair.predicted), Some(pair.trace_id.clone()));
        }
        assert_eq!(pairs[0].trace_id, "a");
    }

    #[test]
    fn test_missing_prediction_fails() {
        let truth = paths(&["gt/A.csv", "gt/B.csv"]);
        let predicted = paths(&["out/B_future_predictions.csv"]);
        let err = pair_traces(&truth, &predicted).unwrap_err();
        assert!(matches!(
            err,
            PoseError::PairingMismatch(ref msg) if msg.contains("A has no predicted trace")
        ));
    }

    #[test]
    fn test_extra_prediction_fails() {
        let truth = paths(&["gt/A.csv"]);
        let predicted = paths(&[
            "out/A_future_predictions.csv",
            "out/Z_future_predictions.csv",
        ]);
        let err = pair_traces(&truth, &predicted).unwrap_err();
        assert!(err.to_string().contains("Z has no ground-truth trace"));
    }

    #[test]
    fn test_duplicate_id_fails() {
        let truth = paths(&["gt/A.csv"]);
        let predicted = paths(&["out/A_future_predictions.csv", "out/A_filtered.csv"]);
        let err = pair_traces(&truth, &predicted).unwrap_err();
        assert!(err.to_string().contains("duplicate id A"));
    }
}

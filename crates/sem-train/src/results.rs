//! Append-only result tables and per-run artefacts.
//!
//! Everything lands under one output directory:
//!
//! | file                              | content                                 |
//! |-----------------------------------|-----------------------------------------|
//! | `results_purity_coverage.csv`     | one [`ResultRow`] per run and grain     |
//! | `coverage.csv`, `purity.csv`      | per-interval clustering rows            |
//! | `sem_complete.txt`                | ids of finished runs                    |
//! | `sem_error.txt`                   | ids of failed runs with the error chain |
//! | `{title}_diagnostic_{epoch}.json` | the raw [`SegmentationResult`]          |
//! | `{title}_gtfreqs_{grain}.json`    | the human frequency curve               |
//!
//! CSV headers are written only when a file is created.
//!
//! [`SegmentationResult`]: crate::model::SegmentationResult

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TrainError, TrainResult};
use crate::metrics::{CoverageRow, PurityRow};

/// Per-run results table.
pub const RESULTS_FILE: &str = "results_purity_coverage.csv";
/// Per-annotated-interval coverage table.
pub const COVERAGE_FILE: &str = "coverage.csv";
/// Per-inferred-interval purity table.
pub const PURITY_FILE: &str = "purity.csv";
/// Finished run ids.
pub const COMPLETE_LOG: &str = "sem_complete.txt";
/// Failed run ids.
pub const ERROR_LOG: &str = "sem_error.txt";

/// One row of [`RESULTS_FILE`]. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Run name.
    pub run: String,
    /// `coarse` or `fine`.
    pub grain: String,
    /// Scaled point-biserial correlation.
    pub bicorr: f64,
    /// Percentile of `bicorr` among the annotators.
    pub percentile: f64,
    /// Event models instantiated so far.
    pub n_event_models: usize,
    /// Event models used for more than the activity threshold.
    pub active_event_models: usize,
    /// 1-based epoch.
    pub epoch: usize,
    /// Rows with a boundary.
    pub number_boundaries: usize,
    /// Model hyper-parameters.
    pub sem_params: String,
    /// Experiment tag.
    pub tag: String,
    /// Mean prediction error.
    pub mean_pe: f64,
    /// Standard deviation of the prediction error.
    pub std_pe: f64,
    /// Pearson r of the smoothed prediction.
    pub pearson_r: f64,
    /// Training or evaluation pass.
    pub is_train: bool,
    /// Switches to an existing event.
    pub switch_old: usize,
    /// Switches to a new event.
    pub switch_new: usize,
    /// Restarts of the current event.
    pub switch_current: usize,
    /// Normalised entropy of event usage.
    pub entropy: f64,
    /// Length-weighted purity.
    pub purity: f64,
    /// Length-weighted coverage.
    pub coverage: f64,
}

/// Identifies which run and pass a clustering row belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct RowContext {
    /// 1-based epoch.
    pub epoch: usize,
    /// Run name.
    pub run: String,
    /// Experiment tag.
    pub tag: String,
    /// Training or evaluation pass.
    pub is_train: bool,
}

#[derive(Serialize)]
struct PurityRecord<'a> {
    sem_event: &'a str,
    sem_length: f64,
    annotated_max_overlap: f64,
    max_purity: f64,
    epoch: usize,
    run: &'a str,
    tag: &'a str,
    is_train: bool,
}

#[derive(Serialize)]
struct CoverageRecord<'a> {
    annotated_event: &'a str,
    annotated_length: f64,
    sem_max_overlap: f64,
    max_coverage: f64,
    epoch: usize,
    run: &'a str,
    tag: &'a str,
    is_train: bool,
}

/// Writes every table and artefact under one directory.
#[derive(Debug, Clone)]
pub struct ResultsWriter {
    dir: PathBuf,
}

impl ResultsWriter {
    /// Create the output directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> TrainResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| TrainError::io(&dir, e))?;
        Ok(Self { dir })
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append_records<T: Serialize>(&self, name: &str, records: impl IntoIterator<Item = T>) -> TrainResult<()> {
        let path = self.dir.join(name);
        let fresh = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TrainError::io(&path, e))?;
        let mut wtr = csv::WriterBuilder::new().has_headers(fresh).from_writer(file);
        for r in records {
            wtr.serialize(r).map_err(|e| TrainError::csv(&path, e))?;
        }
        wtr.flush().map_err(|e| TrainError::io(&path, e))?;
        Ok(())
    }

    /// Append one results row.
    pub fn append_result(&self, row: &ResultRow) -> TrainResult<()> {
        self.append_records(RESULTS_FILE, std::iter::once(row))
    }

    /// Append per-interval coverage rows.
    pub fn append_coverage(&self, rows: &[CoverageRow], ctx: &RowContext) -> TrainResult<()> {
        self.append_records(
            COVERAGE_FILE,
            rows.iter().map(|r| CoverageRecord {
                annotated_event: &r.annotated_event,
                annotated_length: r.annotated_length,
                sem_max_overlap: r.sem_max_overlap,
                max_coverage: r.max_coverage,
                epoch: ctx.epoch,
                run: &ctx.run,
                tag: &ctx.tag,
                is_train: ctx.is_train,
            }),
        )
    }

    /// Append per-interval purity rows.
    pub fn append_purity(&self, rows: &[PurityRow], ctx: &RowContext) -> TrainResult<()> {
        self.append_records(
            PURITY_FILE,
            rows.iter().map(|r| PurityRecord {
                sem_event: &r.sem_event,
                sem_length: r.sem_length,
                annotated_max_overlap: r.annotated_max_overlap,
                max_purity: r.max_purity,
                epoch: ctx.epoch,
                run: &ctx.run,
                tag: &ctx.tag,
                is_train: ctx.is_train,
            }),
        )
    }

    fn append_line(&self, name: &str, line: &str) -> TrainResult<()> {
        let path = self.dir.join(name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TrainError::io(&path, e))?;
        writeln!(file, "{line}").map_err(|e| TrainError::io(&path, e))
    }

    /// Record a finished run.
    pub fn mark_complete(&self, run_id: &str) -> TrainResult<()> {
        self.append_line(COMPLETE_LOG, run_id)
    }

    /// Record a failed run and its error chain.
    pub fn mark_error(&self, run_id: &str, chain: &str) -> TrainResult<()> {
        self.append_line(ERROR_LOG, &format!("{run_id}\n{chain}"))
    }

    /// Serialize `value` as JSON to `{dir}/{relative}`, creating parents.
    pub fn write_json<T: Serialize + ?Sized>(&self, relative: &str, value: &T) -> TrainResult<PathBuf> {
        let path = self.dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TrainError::io(parent, e))?;
        }
        let json = serde_json::to_string(value)?;
        fs::write(&path, json).map_err(|e| TrainError::io(&path, e))?;
        debug!(path = %path.display(), "wrote artefact");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(run: &str) -> ResultRow {
        ResultRow {
            run: run.into(),
            grain: "coarse".into(),
            bicorr: 0.5,
            percentile: 60.0,
            n_event_models: 3,
            active_event_models: 1,
            epoch: 1,
            number_boundaries: 4,
            sem_params: "{}".into(),
            tag: "t".into(),
            mean_pe: 0.1,
            std_pe: 0.01,
            pearson_r: 0.3,
            is_train: true,
            switch_old: 1,
            switch_new: 2,
            switch_current: 1,
            entropy: 0.9,
            purity: 0.7,
            coverage: 0.8,
        }
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let w = ResultsWriter::new(dir.path()).unwrap();
        w.append_result(&row("a")).unwrap();
        w.append_result(&row("b")).unwrap();
        let text = fs::read_to_string(dir.path().join(RESULTS_FILE)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("run,grain,bicorr,percentile,n_event_models"));
        assert!(lines[0].ends_with("entropy,purity,coverage"));
    }

    #[test]
    fn purity_rows_carry_context() {
        let dir = tempfile::tempdir().unwrap();
        let w = ResultsWriter::new(dir.path()).unwrap();
        let ctx = RowContext { epoch: 2, run: "r".into(), tag: "t".into(), is_train: false };
        let rows = vec![PurityRow {
            sem_event: "0".into(),
            sem_length: 2.0,
            annotated_max_overlap: 1.0,
            max_purity: 0.5,
        }];
        w.append_purity(&rows, &ctx).unwrap();
        let text = fs::read_to_string(dir.path().join(PURITY_FILE)).unwrap();
        assert_eq!(
            text,
            "sem_event,sem_length,annotated_max_overlap,max_purity,epoch,run,tag,is_train\n0,2.0,1.0,0.5,2,r,t,false\n"
        );
    }
}

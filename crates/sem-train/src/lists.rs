//! Run lists.
//!
//! A list token is either a run name (`4.4.4_kinect`) or a path to a `.txt`
//! file of tokens, one per line, which is read recursively.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{TrainError, TrainResult};

/// Nesting limit for `.txt` lists that include other lists.
const MAX_DEPTH: usize = 16;

/// Per-modality completion lists intersected by [`merge_run_lists`].
pub const COMPLETION_LISTS: &[&str] =
    &["appear_complete.txt", "vid_complete.txt", "skel_complete.txt", "objhand_complete.txt"];

/// A parsed run list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunList {
    /// Plain list of runs.
    Flat(Vec<String>),
    /// One list of runs per bucket.
    Stratified(Vec<Vec<String>>),
}

impl RunList {
    /// All runs, bucket order preserved.
    pub fn flatten(&self) -> Vec<String> {
        match self {
            RunList::Flat(runs) => runs.clone(),
            RunList::Stratified(buckets) => buckets.iter().flatten().cloned().collect(),
        }
    }

    /// Number of runs across all buckets.
    pub fn len(&self) -> usize {
        match self {
            RunList::Flat(runs) => runs.len(),
            RunList::Stratified(buckets) => buckets.iter().map(Vec::len).sum(),
        }
    }

    /// `true` when no run is listed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_list_file(token: &str) -> bool {
    token.contains(".txt")
}

/// Read the non-empty, trimmed lines of a list file.
pub fn read_lines(path: &Path) -> TrainResult<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|e| TrainError::io(path, e))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Resolve a nested list token: as given, else relative to the parent list.
fn resolve(token: &str, parent: Option<&Path>) -> PathBuf {
    let p = PathBuf::from(token);
    if p.is_relative() && !p.exists() {
        if let Some(dir) = parent.and_then(Path::parent) {
            let candidate = dir.join(&p);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    p
}

fn parse_flat(token: &str, parent: Option<&Path>, depth: usize) -> TrainResult<Vec<String>> {
    if !is_list_file(token) {
        return Ok(vec![token.to_owned()]);
    }
    if depth > MAX_DEPTH {
        return Err(TrainError::invalid_input(format!("list `{token}` nests too deeply")));
    }
    let path = resolve(token, parent);
    let mut runs = Vec::new();
    for line in read_lines(&path)? {
        runs.extend(parse_flat(&line, Some(&path), depth + 1)?);
    }
    Ok(runs)
}

/// Parse a list token.
///
/// With `stratified`, a `.txt` token must list further `.txt` files, each of
/// which becomes one bucket; a bare run name becomes a single bucket.
pub fn parse_input(token: &str, stratified: bool) -> TrainResult<RunList> {
    if !stratified {
        return Ok(RunList::Flat(parse_flat(token, None, 0)?));
    }
    if !is_list_file(token) {
        return Ok(RunList::Stratified(vec![vec![token.to_owned()]]));
    }
    let path = resolve(token, None);
    let entries = read_lines(&path)?;
    match entries.first() {
        Some(first) if is_list_file(first) => {}
        _ => {
            return Err(TrainError::invalid_input(format!(
                "stratified list `{token}` must contain .txt entries, found {entries:?}"
            )))
        }
    }
    let buckets = entries
        .iter()
        .map(|e| parse_flat(e, Some(&path), 1))
        .collect::<TrainResult<Vec<_>>>()?;
    Ok(RunList::Stratified(buckets))
}

/// Intersect several run lists and write the sorted result to `out`.
pub fn merge_run_lists(inputs: &[PathBuf], out: &Path) -> TrainResult<Vec<String>> {
    let mut iter = inputs.iter();
    let Some(first) = iter.next() else {
        return Err(TrainError::invalid_input("no lists to merge"));
    };
    let mut common: BTreeSet<String> = read_lines(first)?.into_iter().collect();
    for path in iter {
        let other: BTreeSet<String> = read_lines(path)?.into_iter().collect();
        common = common.intersection(&other).cloned().collect();
    }
    let merged: Vec<String> = common.into_iter().collect();
    let mut body = merged.join("\n");
    body.push('\n');
    fs::write(out, body).map_err(|e| TrainError::io(out, e))?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_token_is_a_single_run() {
        assert_eq!(parse_input("4.4.4_kinect", false).unwrap(), RunList::Flat(vec!["4.4.4_kinect".into()]));
        assert_eq!(
            parse_input("4.4.4_kinect", true).unwrap(),
            RunList::Stratified(vec![vec!["4.4.4_kinect".into()]])
        );
    }

    #[test]
    fn nested_lists_are_flattened() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "1.1.1_kinect\n2.2.2_C1\n").unwrap();
        let top = dir.path().join("top.txt");
        fs::write(&top, "a.txt\n3.3.3_kinect\n\n").unwrap();
        let list = parse_input(top.to_str().unwrap(), false).unwrap();
        assert_eq!(list.flatten(), vec!["1.1.1_kinect", "2.2.2_C1", "3.3.3_kinect"]);
    }

    #[test]
    fn stratified_needs_list_entries() {
        let dir = tempfile::tempdir().unwrap();
        let top = dir.path().join("strat.txt");
        fs::write(&top, "1.1.1_kinect\n").unwrap();
        assert!(parse_input(top.to_str().unwrap(), true).is_err());

        fs::write(dir.path().join("b0.txt"), "r1\nr2\n").unwrap();
        fs::write(dir.path().join("b1.txt"), "r3\n").unwrap();
        fs::write(&top, "b0.txt\nb1.txt\n").unwrap();
        let list = parse_input(top.to_str().unwrap(), true).unwrap();
        assert_eq!(list, RunList::Stratified(vec![vec!["r1".into(), "r2".into()], vec!["r3".into()]]));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn merge_keeps_common_runs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "r2\nr1\nr3\n").unwrap();
        fs::write(&b, "r3\nr1\n").unwrap();
        let out = dir.path().join("merged.txt");
        let merged = merge_run_lists(&[a, b], &out).unwrap();
        assert_eq!(merged, vec!["r1", "r3"]);
        assert_eq!(fs::read_to_string(out).unwrap(), "r1\nr3\n");
    }
}

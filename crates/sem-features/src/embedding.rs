//! Word embeddings and the object-hand / scene embedding preprocessor.
//!
//! Object distances are turned into a single semantic vector per frame: the
//! K nearest object categories are embedded with a word-vector table and
//! averaged with inverse-distance weights.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{EmbeddingError, FeatureError};
use crate::normalize::zscore_columns;
use crate::table::FeatureTable;

// ---------------------------------------------------------------------------
// WordEmbeddings
// ---------------------------------------------------------------------------

/// A read-only word-vector table.
#[derive(Debug, Clone)]
pub struct WordEmbeddings {
    dim: usize,
    vectors: HashMap<String, Array1<f64>>,
}

impl WordEmbeddings {
    /// Load a GloVe-style text file: one `word v1 … vD` entry per line.
    ///
    /// A word2vec `count dim` header line is skipped. Entries whose key has
    /// embedded spaces are accepted as long as the trailing `D` tokens parse.
    pub fn from_glove_text(path: &Path) -> Result<Self, EmbeddingError> {
        let text = fs::read_to_string(path)
            .map_err(|source| EmbeddingError::FileRead { path: path.to_path_buf(), source })?;
        let parse_err = |line: usize, message: String| EmbeddingError::Parse {
            path: path.to_path_buf(),
            line,
            message,
        };

        let mut dim: Option<usize> = None;
        let mut vectors = HashMap::new();
        for (i, line) in text.lines().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            if i == 0 && tokens.len() == 2 && tokens.iter().all(|t| t.parse::<usize>().is_ok()) {
                continue;
            }
            let d = *dim.get_or_insert(tokens.len() - 1);
            if d == 0 || tokens.len() < d + 1 {
                return Err(parse_err(i + 1, format!("expected a word and {d} values")));
            }
            let split = tokens.len() - d;
            let word = tokens[..split].join(" ");
            let values = tokens[split..]
                .iter()
                .map(|t| t.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| parse_err(i + 1, e.to_string()))?;
            vectors.insert(word, Array1::from(values));
        }

        let dim = dim.ok_or(EmbeddingError::Empty)?;
        debug!(words = vectors.len(), dim, "loaded word embeddings");
        Ok(Self { dim, vectors })
    }

    /// Build from in-memory pairs. All vectors must share one dimension.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, EmbeddingError>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let mut dim = None;
        let mut vectors = HashMap::new();
        for (word, values) in pairs {
            let word = word.into();
            let d = *dim.get_or_insert(values.len());
            if values.len() != d {
                return Err(EmbeddingError::DimensionMismatch { word, expected: d, actual: values.len() });
            }
            vectors.insert(word, Array1::from(values));
        }
        let dim = dim.ok_or(EmbeddingError::Empty)?;
        Ok(Self { dim, vectors })
    }

    /// Vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Vocabulary size.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// `true` when the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Exact lookup.
    pub fn get(&self, word: &str) -> Option<&Array1<f64>> {
        self.vectors.get(word)
    }

    /// Embed a category name.
    ///
    /// The whole phrase is tried first. Otherwise the phrase is split on
    /// spaces, parentheses are stripped from each word and the word vectors
    /// are averaged.
    pub fn phrase_vector(&self, phrase: &str) -> Result<Array1<f64>, EmbeddingError> {
        if let Some(v) = self.vectors.get(phrase) {
            return Ok(v.clone());
        }
        let words: Vec<&str> = phrase.split(' ').collect();
        let mut sum = Array1::<f64>::zeros(self.dim);
        for w in &words {
            let w = w.replace(['(', ')'], "");
            let v = self.vectors.get(&w).ok_or_else(|| EmbeddingError::UnknownWord {
                word: w.clone(),
                category: phrase.to_owned(),
            })?;
            sum += v;
        }
        Ok(sum / words.len() as f64)
    }
}

// ---------------------------------------------------------------------------
// Object embeddings
// ---------------------------------------------------------------------------

/// Which distance columns feed the embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMode {
    /// Columns ending in `_dist_z`.
    #[default]
    Depth,
    /// Columns ending in `_dist`.
    Planar,
}

impl DistanceMode {
    /// Column suffix selected by this mode.
    pub fn suffix(self) -> &'static str {
        match self {
            DistanceMode::Depth => "_dist_z",
            DistanceMode::Planar => "_dist",
        }
    }
}

/// Knobs for [`preprocess_objhand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEmbeddingOptions {
    /// Column prefix of the output, `objhand` or `scene`.
    pub feature: String,
    /// Number of nearest categories averaged per frame.
    pub num_objects: usize,
    /// Distance column family.
    pub mode: DistanceMode,
    /// Z-score the output columns.
    pub standardize: bool,
}

impl ObjectEmbeddingOptions {
    /// Object-hand defaults: 3 nearest, depth distances, no scaling.
    pub fn objhand() -> Self {
        Self { feature: "objhand".into(), num_objects: 3, mode: DistanceMode::Depth, standardize: false }
    }

    /// Scene defaults: 30 nearest, depth distances, no scaling.
    pub fn scene() -> Self {
        Self { feature: "scene".into(), num_objects: 30, mode: DistanceMode::Depth, standardize: false }
    }
}

/// Nearest category names per frame, nearest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTable {
    /// Frames with at least one category.
    pub frames: Vec<i64>,
    /// Category names per frame.
    pub names: Vec<Vec<String>>,
}

impl CategoryTable {
    /// Categories at each requested frame, carrying the last known entry
    /// forward. Frames before the first entry get an empty list.
    pub fn at_frames(&self, frames: &[i64]) -> Vec<Vec<String>> {
        frames
            .iter()
            .map(|&f| {
                let idx = self.frames.partition_point(|&x| x <= f);
                if idx == 0 {
                    Vec::new()
                } else {
                    self.names[idx - 1].clone()
                }
            })
            .collect()
    }

    /// Number of frames with categories.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// `true` when no frame has a category.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Inverse-distance weights.
///
/// With `d' = d + 1`, `w = 1 - d' / (Σd' + 1)`. The shift keeps weights
/// positive when all distances are zero or a single object is present.
pub fn inverse_distance_weights(distances: &[f64]) -> Vec<f64> {
    let shifted: Vec<f64> = distances.iter().map(|d| d + 1.0).collect();
    let total: f64 = shifted.iter().sum::<f64>() + 1.0;
    shifted.iter().map(|d| 1.0 - d / total).collect()
}

/// Category name of a distance column: suffix and instance number removed.
pub fn category_of(column: &str, mode: DistanceMode) -> Option<String> {
    let stem = column.strip_suffix(mode.suffix())?;
    let name = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    if name.is_empty() {
        None
    } else {
        Some(name.to_owned())
    }
}

/// Build the object embedding table of one run.
///
/// Instance columns are collapsed to categories by minimum distance. For
/// every frame the `num_objects` nearest categories are embedded and mixed
/// with [`inverse_distance_weights`]. Frames with no category, or with a
/// zero weight sum, are all-missing.
pub fn preprocess_objhand(
    path: &Path,
    fps: f64,
    embeddings: &WordEmbeddings,
    options: &ObjectEmbeddingOptions,
) -> Result<(FeatureTable, CategoryTable), FeatureError> {
    let raw = FeatureTable::from_csv(path, &options.feature, fps, &[])?;

    // category -> instance column indices, in sorted category order
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, c) in raw.columns().iter().enumerate() {
        if let Some(cat) = category_of(c, options.mode) {
            groups.entry(cat).or_default().push(i);
        }
    }
    let categories: Vec<(&String, &Vec<usize>)> = groups.iter().collect();

    let dim = embeddings.dim();
    let mut values = Array2::<f64>::from_elem((raw.n_rows(), dim), f64::NAN);
    let mut cat_table = CategoryTable::default();
    let mut cache: HashMap<&str, Array1<f64>> = HashMap::new();

    for (r, row) in raw.values().outer_iter().enumerate() {
        let mut nearest: Vec<(f64, &str)> = categories
            .iter()
            .filter_map(|(name, cols)| {
                let d = cols
                    .iter()
                    .map(|&c| row[c])
                    .filter(|v| !v.is_nan())
                    .fold(f64::NAN, f64::min);
                (!d.is_nan()).then_some((d, name.as_str()))
            })
            .collect();
        if nearest.is_empty() {
            continue;
        }
        nearest.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        nearest.truncate(options.num_objects.max(1));

        cat_table.frames.push(raw.frames()[r]);
        cat_table.names.push(nearest.iter().map(|(_, n)| (*n).to_owned()).collect());

        let distances: Vec<f64> = nearest.iter().map(|(d, _)| *d).collect();
        let weights = inverse_distance_weights(&distances);
        let weight_sum: f64 = weights.iter().sum();
        if weight_sum == 0.0 {
            error!(frame = raw.frames()[r], "sum of category weights is zero");
            continue;
        }

        let mut acc = Array1::<f64>::zeros(dim);
        for ((_, name), w) in nearest.iter().zip(&weights) {
            let v = match cache.entry(*name) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(embeddings.phrase_vector(name)?),
            };
            acc.scaled_add(*w, &*v);
        }
        values.row_mut(r).assign(&(acc / weight_sum));
    }

    if options.standardize {
        zscore_columns(&mut values);
    }

    let columns = (0..dim).map(|i| format!("{}_{i}", options.feature)).collect();
    let table = FeatureTable::new(options.feature.clone(), fps, raw.frames().to_vec(), columns, values)?;
    debug!(
        feature = %options.feature,
        rows = table.n_rows(),
        categories = categories.len(),
        "built object embeddings"
    );
    Ok((table, cat_table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn toy() -> WordEmbeddings {
        WordEmbeddings::from_pairs([
            ("towel", vec![1.0, 0.0]),
            ("cup", vec![0.0, 1.0]),
            ("hand", vec![2.0, 2.0]),
        ])
        .unwrap()
    }

    #[test]
    fn phrase_falls_back_to_word_average() {
        let e = toy();
        let v = e.phrase_vector("hand (towel)").unwrap();
        assert_relative_eq!(v[0], 1.5);
        assert_relative_eq!(v[1], 1.0);
        assert!(e.phrase_vector("spoon").is_err());
    }

    #[test]
    fn weights_favor_near_objects() {
        let w = inverse_distance_weights(&[0.0, 1.0]);
        // d' = [1, 2], total = 4
        assert_relative_eq!(w[0], 0.75);
        assert_relative_eq!(w[1], 0.5);
        let single = inverse_distance_weights(&[3.0]);
        assert_relative_eq!(single[0], 0.2);
    }

    #[test]
    fn category_strips_suffix_and_instance() {
        assert_eq!(category_of("towel12_dist_z", DistanceMode::Depth).as_deref(), Some("towel"));
        assert_eq!(category_of("towel1_dist", DistanceMode::Depth), None);
        assert_eq!(category_of("towel1_dist", DistanceMode::Planar).as_deref(), Some("towel"));
        assert_eq!(category_of("hand towel (small)0_dist", DistanceMode::Planar).as_deref(), Some("hand towel (small)"));
    }

    #[test]
    fn categories_carry_forward() {
        let t = CategoryTable { frames: vec![2, 5], names: vec![vec!["a".into()], vec!["b".into()]] };
        let got = t.at_frames(&[0, 2, 4, 9]);
        assert!(got[0].is_empty());
        assert_eq!(got[1], vec!["a".to_string()]);
        assert_eq!(got[2], vec!["a".to_string()]);
        assert_eq!(got[3], vec!["b".to_string()]);
    }
}

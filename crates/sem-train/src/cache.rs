//! Per-run readout bundles.
//!
//! A [`ReadoutBundle`] keeps the intermediate tables of one run: the
//! post-alignment modality tables, the pre-alignment object embedding, the
//! nearest categories, and the model input and prediction in feature, PCA and
//! inverted space. Bundles are JSON files named
//! `{output_dir}/{title}_inputdf_{epoch}.json`; a later process with
//! `use_cache` reloads the `_post` tables of epoch 1 instead of preprocessing
//! the raw CSVs again.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use sem_features::embedding::CategoryTable;
use sem_features::table::FeatureTable;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Intermediate tables of one run. Absent tables are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadoutBundle {
    /// Aligned appearance table.
    pub appear_post: Option<FeatureTable>,
    /// Aligned optical-flow table.
    pub optical_post: Option<FeatureTable>,
    /// Aligned skeleton table.
    pub skel_post: Option<FeatureTable>,
    /// Aligned object-hand embedding.
    pub objhand_post: Option<FeatureTable>,
    /// Aligned scene embedding.
    pub scene_post: Option<FeatureTable>,
    /// Object-hand embedding before alignment, complete rows only.
    pub objhand_pre: Option<FeatureTable>,
    /// Nearest categories per frame.
    pub categories: Option<CategoryTable>,
    /// Aligned feature matrix.
    pub x_train: Option<Array2<f64>>,
    /// Model input in PCA space.
    pub x_train_pca: Option<Array2<f64>>,
    /// Model input mapped back to feature space.
    pub x_train_inverted: Option<Array2<f64>>,
    /// Model prediction in feature space.
    pub x_inferred: Option<Array2<f64>>,
    /// Model prediction in PCA space.
    pub x_inferred_pca: Option<Array2<f64>>,
    /// Model prediction mapped back to feature space.
    pub x_inferred_inverted: Option<Array2<f64>>,
}

/// Bundle file of `title` at `epoch`.
pub fn bundle_path(output_dir: &Path, title: &str, epoch: usize) -> PathBuf {
    output_dir.join(format!("{title}_inputdf_{epoch}.json"))
}

impl ReadoutBundle {
    /// Read a bundle.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let text = fs::read_to_string(path).map_err(|source| CacheError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text).map_err(|source| CacheError::Decode { path: path.to_path_buf(), source })
    }

    /// Write a bundle, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CacheError::Io { path: parent.to_path_buf(), source })?;
        }
        let json = serde_json::to_string(self).map_err(|source| CacheError::Decode { path: path.to_path_buf(), source })?;
        fs::write(path, json).map_err(|source| CacheError::Io { path: path.to_path_buf(), source })
    }

    /// The post-alignment tables in block order
    /// (`appear`, `optical`, `skel`, `objhand`, `scene`).
    pub fn post_tables(&self, path: &Path) -> Result<Vec<FeatureTable>, CacheError> {
        let slots: [(&'static str, &Option<FeatureTable>); 5] = [
            ("appear_post", &self.appear_post),
            ("optical_post", &self.optical_post),
            ("skel_post", &self.skel_post),
            ("objhand_post", &self.objhand_post),
            ("scene_post", &self.scene_post),
        ];
        slots
            .into_iter()
            .map(|(table, slot)| {
                slot.clone().ok_or_else(|| CacheError::MissingTable { path: path.to_path_buf(), table })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn table(name: &str) -> FeatureTable {
        FeatureTable::new(name, 30.0, vec![0, 1], vec![format!("{name}_0")], array![[1.0], [2.0]]).unwrap()
    }

    #[test]
    fn save_then_reload_post_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = bundle_path(dir.path(), "tag/run_trimtag", 1);
        assert!(path.ends_with("tag/run_trimtag_inputdf_1.json"));

        let bundle = ReadoutBundle {
            appear_post: Some(table("appear")),
            optical_post: Some(table("optical")),
            skel_post: Some(table("skel")),
            objhand_post: Some(table("objhand")),
            scene_post: Some(table("scene")),
            x_train: Some(array![[0.5, 0.5]]),
            ..Default::default()
        };
        bundle.save(&path).unwrap();
        let back = ReadoutBundle::load(&path).unwrap();
        let names: Vec<String> = back.post_tables(&path).unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["appear", "optical", "skel", "objhand", "scene"]);
        assert_eq!(back.x_train, bundle.x_train);
    }

    #[test]
    fn missing_table_is_named() {
        let err = ReadoutBundle::default().post_tables(Path::new("b.json")).unwrap_err();
        assert!(matches!(err, CacheError::MissingTable { table: "appear_post", .. }));
    }
}

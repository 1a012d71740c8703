use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::config::CategoryConfig;
use crate::errors::{GrabError, GrabResult};
use crate::perception::types::{Category, DismissVariant};

pub const DEFAULT_CLASSES: [&str; 7] = [
    "red_packet",
    "open_button",
    "amount_text",
    "close_button",
    "back_button",
    "opened_red_packet",
    "play_button",
];

pub fn default_class_names() -> Vec<String> {
    DEFAULT_CLASSES.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassNames {
    List(Vec<String>),
    Indexed(BTreeMap<usize, String>),
}

#[derive(Debug, Deserialize)]
struct DatasetFile {
    names: Option<ClassNames>,
}

fn parse_class_names(content: &str) -> GrabResult<Option<Vec<String>>> {
    let dataset: DatasetFile = serde_yaml::from_str(content)?;
    Ok(dataset.names.map(|names| match names {
        ClassNames::List(list) => list,
        // BTreeMap iterates in index order.
        ClassNames::Indexed(map) => map.into_values().collect(),
    }))
}

/// Class names from a YOLO dataset file, or the default list when the file
/// is missing, unreadable or has no `names` field.
pub fn load_class_names(path: &Path) -> Vec<String> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "dataset config not found, using default classes");
        return default_class_names();
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(GrabError::from)
        .and_then(|content| parse_class_names(&content));
    match parsed {
        Ok(Some(names)) => {
            tracing::info!(path = %path.display(), count = names.len(), "class names loaded");
            names
        }
        Ok(None) => {
            tracing::warn!(path = %path.display(), "no names field in dataset config, using default classes");
            default_class_names()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read dataset config, using default classes");
            default_class_names()
        }
    }
}

/// Maps detector class names onto arbiter categories.
#[derive(Debug, Clone, Default)]
pub struct CategoryMap {
    by_name: HashMap<String, Category>,
}

impl CategoryMap {
    pub fn from_config(cfg: &CategoryConfig) -> Self {
        let mut by_name = HashMap::new();
        let groups = [
            (&cfg.primary, Category::PrimaryAction),
            (&cfg.secondary, Category::SecondaryTarget),
            (&cfg.dismiss_back, Category::Dismiss(DismissVariant::Back)),
            (&cfg.dismiss_close, Category::Dismiss(DismissVariant::Close)),
        ];
        for (names, category) in groups {
            for name in names {
                by_name.insert(name.clone(), category);
            }
        }
        Self { by_name }
    }

    pub fn category_of(&self, class_name: &str) -> Category {
        self.by_name.get(class_name).copied().unwrap_or(Category::Ignored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_as_list() {
        let names = parse_class_names("path: data\nnames:\n  - a\n  - b\n").unwrap();
        assert_eq!(names, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn names_as_index_map_keep_index_order() {
        let names = parse_class_names("names:\n  2: c\n  0: a\n  1: b\n").unwrap();
        assert_eq!(names, Some(vec!["a".into(), "b".into(), "c".into()]));
    }

    #[test]
    fn missing_or_empty_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_class_names(&dir.path().join("nope.yaml")), default_class_names());

        let path = dir.path().join("dataset.yaml");
        std::fs::write(&path, "train: images/train\n").unwrap();
        assert_eq!(load_class_names(&path), default_class_names());

        std::fs::write(&path, "names: [x, y]\n").unwrap();
        assert_eq!(load_class_names(&path), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn default_mapping_covers_all_categories() {
        let map = CategoryMap::from_config(&CategoryConfig::default());
        assert_eq!(map.category_of("open_button"), Category::PrimaryAction);
        assert_eq!(map.category_of("red_packet"), Category::SecondaryTarget);
        assert_eq!(map.category_of("back_button"), Category::Dismiss(DismissVariant::Back));
        assert_eq!(map.category_of("close_button"), Category::Dismiss(DismissVariant::Close));
        assert_eq!(map.category_of("amount_text"), Category::Ignored);
    }
}

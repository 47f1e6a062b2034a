//! In-process gradient-boosted tree evaluator.
//!
//! Reads the JSON model dump written by LightGBM's `dump_model()`:
//! `feature_names` plus `tree_info[].tree_structure`, where inner nodes
//! carry `split_feature`/`threshold`/`left_child`/`right_child` and leaves
//! carry `leaf_value`. Leaf values of all trees are summed and passed
//! through a sigmoid (binary objective).
//!
//! A sample at `value <= threshold` goes left.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use super::{Features, ScoringOracle};
use crate::types::FlipperError;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Node {
    Split {
        split_feature: usize,
        threshold: f64,
        left_child: Box<Node>,
        right_child: Box<Node>,
    },
    Leaf {
        leaf_value: f64,
    },
}

#[derive(Debug, Deserialize)]
struct TreeInfo {
    tree_structure: Node,
}

#[derive(Debug, Deserialize)]
struct ModelDump {
    feature_names: Vec<String>,
    tree_info: Vec<TreeInfo>,
}

#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    feature_names: Vec<String>,
    trees: Vec<Node>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn max_split_feature(node: &Node) -> Option<usize> {
    match node {
        Node::Leaf { .. } => None,
        Node::Split {
            split_feature,
            left_child,
            right_child,
            ..
        } => [Some(*split_feature), max_split_feature(left_child), max_split_feature(right_child)]
            .into_iter()
            .flatten()
            .max(),
    }
}

impl TreeEnsemble {
    pub fn from_json(json: &str) -> Result<Self, FlipperError> {
        let dump: ModelDump = serde_json::from_str(json)
            .map_err(|e| FlipperError::Config(format!("invalid model dump: {e}")))?;

        if let Some(unknown) = dump
            .feature_names
            .iter()
            .find(|n| super::FEATURE_NAMES.iter().all(|known| known != n))
        {
            return Err(FlipperError::Config(format!("model uses unknown feature '{unknown}'")));
        }

        let trees: Vec<Node> = dump.tree_info.into_iter().map(|t| t.tree_structure).collect();
        if let Some(idx) = trees.iter().filter_map(max_split_feature).max() {
            if idx >= dump.feature_names.len() {
                return Err(FlipperError::Config(format!(
                    "split on feature index {idx} but model names {} features",
                    dump.feature_names.len()
                )));
            }
        }

        Ok(Self {
            feature_names: dump.feature_names,
            trees,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file: {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Failed to load model: {}", path.display()))
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Sum of leaf values before the sigmoid.
    pub fn raw_score(&self, features: &Features) -> f64 {
        let row: Vec<f64> = self
            .feature_names
            .iter()
            .map(|n| features.value(n).unwrap_or(0.0))
            .collect();

        self.trees
            .iter()
            .map(|tree| {
                let mut node = tree;
                loop {
                    match node {
                        Node::Leaf { leaf_value } => break *leaf_value,
                        Node::Split {
                            split_feature,
                            threshold,
                            left_child,
                            right_child,
                        } => {
                            node = if row[*split_feature] <= *threshold {
                                left_child
                            } else {
                                right_child
                            };
                        }
                    }
                }
            })
            .sum()
    }
}

#[async_trait]
impl ScoringOracle for TreeEnsemble {
    async fn predict(&self, features: &Features) -> Result<f64, FlipperError> {
        features.validate()?;
        Ok(sigmoid(self.raw_score(features)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Random forest adapter over flattened decision trees.
//!
//! All trees share flat node arrays; `roots[i]` is the first node of tree `i`.
//! Internal nodes send `x[feature] <= threshold` left, leaves carry a class
//! distribution.

use std::sync::Arc;

use crate::features::FeatureTensor;
use crate::math::normalize_sum_inplace;
use crate::scorer::{ModelKind, ModelScorer, load_error, weight_error};
use crate::weights::WeightStore;
use crate::{LungError, Result};

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        row: usize,
    },
}

#[derive(Debug)]
pub struct RandomForestScorer {
    id: String,
    input_shape: Vec<usize>,
    class_names: Arc<[String]>,
    roots: Vec<usize>,
    nodes: Vec<Node>,
    /// Normalized leaf distributions, `[n_nodes, n_classes]`.
    values: Vec<f32>,
}

fn index(id: &str, name: &str, v: i64, bound: usize) -> Result<usize> {
    usize::try_from(v)
        .ok()
        .filter(|&i| i < bound)
        .ok_or_else(|| load_error(id, format!("{name} index {v} out of range 0..{bound}")))
}

impl RandomForestScorer {
    pub fn load(
        id: &str,
        store: &WeightStore,
        class_names: Arc<[String]>,
        input_shape: Vec<usize>,
    ) -> Result<Self> {
        let err = weight_error(id);
        let roots = store.tensor_i64("forest.roots").map_err(&err)?;
        let feature = store.tensor_i64("forest.feature").map_err(&err)?;
        let threshold = store.tensor_f32("forest.threshold").map_err(&err)?;
        let left = store.tensor_i64("forest.left").map_err(&err)?;
        let right = store.tensor_i64("forest.right").map_err(&err)?;
        let value = store.tensor_f32("forest.value").map_err(&err)?;

        let n_nodes = feature.data.len();
        let n_features: usize = input_shape.iter().product();
        let n_classes = class_names.len();

        if threshold.data.len() != n_nodes
            || left.data.len() != n_nodes
            || right.data.len() != n_nodes
        {
            return Err(load_error(id, "forest node arrays differ in length"));
        }
        if value.shape.len() != 2 || value.shape[0] != n_nodes {
            return Err(load_error(
                id,
                format!("forest.value shape {:?}, expected [{n_nodes}, classes]", value.shape),
            ));
        }
        if value.shape[1] != n_classes {
            return Err(load_error(
                id,
                LungError::LabelMismatch {
                    expected: n_classes,
                    got: value.shape[1],
                },
            ));
        }
        if roots.data.is_empty() {
            return Err(load_error(id, "forest has no trees"));
        }

        let mut nodes = Vec::with_capacity(n_nodes);
        for i in 0..n_nodes {
            let node = if feature.data[i] < 0 {
                Node::Leaf { row: i }
            } else {
                let l = index(id, "left child", left.data[i], n_nodes)?;
                let r = index(id, "right child", right.data[i], n_nodes)?;
                // Children after parents rules out cycles.
                if l <= i || r <= i {
                    return Err(load_error(id, format!("node {i} has a backward child link")));
                }
                Node::Split {
                    feature: index(id, "feature", feature.data[i], n_features)?,
                    threshold: threshold.data[i],
                    left: l,
                    right: r,
                }
            };
            nodes.push(node);
        }

        let roots = roots
            .data
            .iter()
            .map(|&r| index(id, "root", r, n_nodes))
            .collect::<Result<Vec<_>>>()?;

        let mut values = value.data;
        for (i, row) in values.chunks_exact_mut(n_classes.max(1)).enumerate() {
            if matches!(nodes[i], Node::Leaf { .. }) && !normalize_sum_inplace(row) {
                return Err(load_error(id, format!("leaf {i} has zero mass")));
            }
        }

        Ok(Self {
            id: id.to_string(),
            input_shape,
            class_names,
            roots,
            nodes,
            values,
        })
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.roots.len()
    }

    fn leaf(&self, root: usize, x: &[f32]) -> usize {
        let mut i = root;
        loop {
            match self.nodes[i] {
                Node::Leaf { row } => return row,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if x[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

impl ModelScorer for RandomForestScorer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ModelKind {
        ModelKind::RandomForest
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn probabilities(&self, features: &FeatureTensor) -> Result<Vec<f32>> {
        let n_classes = self.class_names.len();
        let mut sum = vec![0.0f64; n_classes];
        for &root in &self.roots {
            let row = self.leaf(root, &features.data);
            let dist = &self.values[row * n_classes..(row + 1) * n_classes];
            for (s, &p) in sum.iter_mut().zip(dist) {
                *s += f64::from(p);
            }
        }
        let n_trees = self.roots.len() as f64;
        Ok(sum.into_iter().map(|s| (s / n_trees) as f32).collect())
    }
}

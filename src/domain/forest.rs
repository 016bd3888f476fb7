//! Seeded regression trees and forests.
//!
//! Trees grow by weighted variance reduction. With unit weights a leaf holds
//! the mean target; with weights `w` it holds `Σ w·y / Σ w`, which is what the
//! effect stage of the estimator relies on.

use crate::domain::error::CausalError;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct TreeConfig {
    /// `None` grows until the leaf constraints stop it.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` tries all of them.
    pub max_features: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Running sums over a set of weighted samples.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    count: usize,
    w: f64,
    wy: f64,
    wyy: f64,
}

impl Moments {
    fn add(&mut self, y: f64, w: f64) {
        self.count += 1;
        self.w += w;
        self.wy += w * y;
        self.wyy += w * y * y;
    }

    fn minus(self, other: Moments) -> Moments {
        Moments {
            count: self.count - other.count,
            w: self.w - other.w,
            wy: self.wy - other.wy,
            wyy: self.wyy - other.wyy,
        }
    }

    /// Weighted sum of squared deviations from the weighted mean.
    fn sse(&self) -> f64 {
        if self.w <= 0.0 {
            return 0.0;
        }
        (self.wyy - self.wy * self.wy / self.w).max(0.0)
    }

    fn mean(&self) -> Option<f64> {
        (self.w > 0.0).then(|| self.wy / self.w)
    }
}

struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// CART regression tree over row-major features.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    root: Node,
}

/// Borrowed training data shared by every node of a tree.
struct Samples<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    w: &'a [f64],
}

impl RegressionTree {
    /// Grow a tree on the rows listed in `rows` (duplicates allowed).
    pub fn fit(
        config: &TreeConfig,
        x: &[Vec<f64>],
        y: &[f64],
        w: &[f64],
        rows: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let samples = Samples { x, y, w };
        let n_features = x.first().map_or(0, Vec::len);
        let root = grow(config, &samples, rows.to_vec(), 0, 0.0, n_features, rng);
        Self { root }
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        fn count(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => count(left) + count(right),
            }
        }
        count(&self.root)
    }
}

fn moments_of(samples: &Samples<'_>, rows: &[usize]) -> Moments {
    let mut m = Moments::default();
    for &r in rows {
        m.add(samples.y[r], samples.w[r]);
    }
    m
}

fn grow(
    config: &TreeConfig,
    samples: &Samples<'_>,
    rows: Vec<usize>,
    depth: usize,
    fallback: f64,
    n_features: usize,
    rng: &mut ChaCha8Rng,
) -> Node {
    let total = moments_of(samples, &rows);
    // A leaf with no weight inherits its parent's value.
    let value = total.mean().unwrap_or(fallback);

    let depth_reached = config.max_depth.is_some_and(|max| depth >= max);
    if depth_reached
        || rows.len() < config.min_samples_split.max(2)
        || rows.len() < 2 * config.min_samples_leaf.max(1)
        || total.sse() <= 1e-12
    {
        return Node::Leaf { value };
    }

    let Some(best) = best_split(config, samples, &rows, total, n_features, rng) else {
        return Node::Leaf { value };
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .into_iter()
        .partition(|&r| samples.x[r][best.feature] <= best.threshold);

    let left = grow(config, samples, left_rows, depth + 1, value, n_features, rng);
    let right = grow(config, samples, right_rows, depth + 1, value, n_features, rng);
    Node::Split {
        feature: best.feature,
        threshold: best.threshold,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn best_split(
    config: &TreeConfig,
    samples: &Samples<'_>,
    rows: &[usize],
    total: Moments,
    n_features: usize,
    rng: &mut ChaCha8Rng,
) -> Option<Candidate> {
    let mut features: Vec<usize> = (0..n_features).collect();
    features.shuffle(rng);
    features.truncate(config.max_features.unwrap_or(n_features).clamp(1, n_features.max(1)));

    let min_leaf = config.min_samples_leaf.max(1);
    let parent_sse = total.sse();
    let mut best: Option<Candidate> = None;

    for feature in features {
        let mut sorted = rows.to_vec();
        sorted.sort_by(|&a, &b| samples.x[a][feature].total_cmp(&samples.x[b][feature]));

        let mut left = Moments::default();
        for i in 0..sorted.len() - 1 {
            let r = sorted[i];
            left.add(samples.y[r], samples.w[r]);

            let here = samples.x[r][feature];
            let next = samples.x[sorted[i + 1]][feature];
            if here == next {
                continue;
            }
            let right = total.minus(left);
            if left.count < min_leaf || right.count < min_leaf {
                continue;
            }

            let gain = parent_sse - left.sse() - right.sse();
            if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                best = Some(Candidate {
                    feature,
                    threshold: (here + next) / 2.0,
                    gain,
                });
            }
        }
    }
    best
}

/// How each tree draws its training rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sampling {
    /// `n` rows with replacement.
    Bootstrap,
    /// The given fraction of rows without replacement.
    Subsample(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub tree: TreeConfig,
    pub sampling: Sampling,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            tree: TreeConfig::default(),
            sampling: Sampling::Bootstrap,
            seed: 42,
        }
    }
}

/// Bagged regression trees; tree `i` is seeded with `seed + i`.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(
        config: &ForestConfig,
        x: &[Vec<f64>],
        y: &[f64],
        weights: Option<&[f64]>,
    ) -> Result<Self, CausalError> {
        let n = y.len();
        if n == 0 {
            return Err(CausalError::Estimation {
                reason: "cannot fit a forest on zero rows".into(),
            });
        }
        if x.len() != n || weights.is_some_and(|w| w.len() != n) {
            return Err(CausalError::Estimation {
                reason: format!("forest inputs disagree on row count ({n} targets)"),
            });
        }
        if config.n_trees == 0 {
            return Err(CausalError::Estimation {
                reason: "forest needs at least one tree".into(),
            });
        }
        if let Sampling::Subsample(fraction) = config.sampling {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(CausalError::Estimation {
                    reason: format!("subsample fraction {fraction} outside (0, 1]"),
                });
            }
        }

        let unit;
        let w = match weights {
            Some(w) => w,
            None => {
                unit = vec![1.0; n];
                &unit
            }
        };

        let trees = (0..config.n_trees)
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(i as u64));
                let rows = draw_rows(config.sampling, n, &mut rng);
                RegressionTree::fit(&config.tree, x, y, w, &rows, &mut rng)
            })
            .collect();
        Ok(Self { trees })
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict_one(features)).sum();
        sum / self.trees.len() as f64
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn draw_rows(sampling: Sampling, n: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    match sampling {
        Sampling::Bootstrap => (0..n).map(|_| rng.gen_range(0..n)).collect(),
        Sampling::Subsample(fraction) => {
            let k = ((n as f64 * fraction).round() as usize).clamp(1, n);
            let mut rows = rand::seq::index::sample(rng, n, k).into_vec();
            rows.sort_unstable();
            rows
        }
    }
}

/*!
Fixture trees and brute force references for the tests. The brute force references enumerate every coalition of features, so they are only usable on trees with a handful of features.
*/

use crate::{ComparisonMode, Condition, Instance, Node, Tree, TreeArrays};
use ndarray::prelude::*;

/// Convert a row with `None` for missing values into the value and missing slices an `Instance` borrows.
pub fn instance(row: &[Option<f64>]) -> (Vec<f64>, Vec<bool>) {
	let values = row.iter().map(|value| value.unwrap_or(f64::NAN)).collect();
	let missing = row.iter().map(|value| value.is_none()).collect();
	(values, missing)
}

/// A single split on feature 0 at 0.5. Three training examples went left to a leaf with value 1 and one went right to a leaf with value 4.
pub fn stump_arrays() -> TreeArrays {
	TreeArrays {
		children_left: vec![1, -1, -1],
		children_right: vec![2, -1, -1],
		children_default: vec![1, -1, -1],
		features: vec![0, -2, -2],
		thresholds: vec![0.5, -2.0, -2.0],
		values: vec![vec![0.0], vec![1.0], vec![4.0]],
		node_sample_weight: vec![4.0, 3.0, 1.0],
	}
}

/**
A tree over three features with two outputs that splits on feature 0 three times along one path and on feature 1 twice, with defaults going both ways.

```text
                 0: f0 <= 0.5
          /                      \
   1: f1 <= 1.0               2: f0 <= 2.0
    /        \                 /          \
3: f2 <= 0   4              5: f1 <= -1    6
  /    \                     /       \
 7      8                   9     10: f0 <= 1.0
                                    /      \
                                  11        12
```
*/
pub fn repeated_feature_arrays() -> TreeArrays {
	TreeArrays {
		children_left: vec![1, 3, 5, 7, -1, 9, -1, -1, -1, -1, 11, -1, -1],
		children_right: vec![2, 4, 6, 8, -1, 10, -1, -1, -1, -1, 12, -1, -1],
		children_default: vec![2, 3, 5, 8, -1, 10, -1, -1, -1, -1, 11, -1, -1],
		features: vec![0, 1, 0, 2, -2, 1, -2, -2, -2, -2, 0, -2, -2],
		thresholds: vec![
			0.5, 1.0, 2.0, 0.0, -2.0, -1.0, -2.0, -2.0, -2.0, -2.0, 1.0, -2.0, -2.0,
		],
		values: vec![
			vec![0.0, 0.0],
			vec![0.0, 0.0],
			vec![0.0, 0.0],
			vec![0.0, 0.0],
			vec![2.0, 1.0],
			vec![0.0, 0.0],
			vec![-3.0, 0.5],
			vec![1.5, -2.0],
			vec![0.5, 3.0],
			vec![7.0, 0.0],
			vec![0.0, 0.0],
			vec![4.0, 1.0],
			vec![-1.0, 2.5],
		],
		node_sample_weight: vec![
			39.0, 20.0, 19.0, 10.0, 10.0, 14.0, 5.0, 4.0, 6.0, 2.0, 12.0, 3.0, 9.0,
		],
	}
}

/// Rows for the three features of `repeated_feature_arrays`, including values exactly on thresholds and missing values.
pub fn instance_rows() -> Vec<Vec<Option<f64>>> {
	vec![
		vec![Some(0.2), Some(1.5), Some(-1.0)],
		vec![Some(0.5), Some(1.0), Some(0.0)],
		vec![Some(3.0), Some(-2.0), Some(2.0)],
		vec![Some(1.0), None, Some(0.5)],
		vec![None, Some(-1.0), None],
		vec![Some(1.5), Some(0.0), Some(0.0)],
		vec![None, None, None],
	]
}

/// The exclusive or of two features, each split at 0.5, with one training example per leaf.
pub fn xor_arrays() -> TreeArrays {
	TreeArrays {
		children_left: vec![1, 3, 5, -1, -1, -1, -1],
		children_right: vec![2, 4, 6, -1, -1, -1, -1],
		children_default: vec![1, 3, 5, -1, -1, -1, -1],
		features: vec![0, 1, 1, -2, -2, -2, -2],
		thresholds: vec![0.5, 0.5, 0.5, -2.0, -2.0, -2.0, -2.0],
		values: vec![
			vec![0.0],
			vec![0.0],
			vec![0.0],
			vec![0.0],
			vec![1.0],
			vec![1.0],
			vec![0.0],
		],
		node_sample_weight: vec![4.0, 2.0, 2.0, 1.0, 1.0, 1.0, 1.0],
	}
}

/// The expected output of the tree when the features in `coalition` take the instance's values and the rest follow the training data.
pub fn conditional_expectation(
	tree: &Tree,
	x: Instance,
	comparison: ComparisonMode,
	coalition: &[bool],
) -> Array1<f64> {
	fn expectation(
		tree: &Tree,
		node_index: usize,
		x: Instance,
		comparison: ComparisonMode,
		coalition: &[bool],
	) -> Array1<f64> {
		let node = match &tree.nodes()[node_index] {
			Node::Leaf(_) => return tree.value(node_index).to_owned(),
			Node::Branch(n) => n,
		};
		if coalition[node.split.feature_index] {
			return expectation(tree, node.route(x, comparison), x, comparison, coalition);
		}
		if node.sample_weight == 0.0 {
			return Array1::zeros(tree.n_outputs());
		}
		let mut result = Array1::zeros(tree.n_outputs());
		for child_index in [node.left_child_index, node.right_child_index].iter() {
			let fraction = tree.nodes()[*child_index].sample_weight() / node.sample_weight;
			let value = expectation(tree, *child_index, x, comparison, coalition);
			result.scaled_add(fraction, &value);
		}
		result
	}
	expectation(tree, 0, x, comparison, coalition)
}

/// Compute the path dependent SHAP values of `row` by enumerating every coalition. A `Present` condition feature is always in the coalition and an `Absent` one never is. Neither is a player.
pub fn brute_force_path_dependent(
	tree: &Tree,
	row: &[Option<f64>],
	comparison: ComparisonMode,
	condition: Option<Condition>,
) -> Array2<f64> {
	let (values, missing) = instance(row);
	let x = Instance::new(&values, &missing).unwrap();
	let n_features = row.len();
	let players: Vec<usize> = (0..n_features)
		.filter(|feature_index| condition.map(|c| c.feature_index()) != Some(*feature_index))
		.collect();
	let coalition_values: Vec<Array1<f64>> = (0..1usize << players.len())
		.map(|mask| {
			let mut coalition = vec![false; n_features];
			for (player, feature_index) in players.iter().enumerate() {
				coalition[*feature_index] = mask & (1 << player) != 0;
			}
			if let Some(Condition::Present(feature_index)) = condition {
				coalition[feature_index] = true;
			}
			conditional_expectation(tree, x, comparison, &coalition)
		})
		.collect();
	let mut result = Array2::zeros((n_features + 1, tree.n_outputs()));
	for (feature_index, phi) in players.iter().zip(shapley_values(&coalition_values)) {
		result.row_mut(*feature_index).assign(&phi);
	}
	if condition.is_none() {
		result.row_mut(n_features).assign(&coalition_values[0]);
	}
	result
}

/// Compute the interventional SHAP values of `x` against the background `r` by enumerating every coalition. Features in the coalition take their values from `x` and the rest from `r`.
pub fn brute_force_independent(
	tree: &Tree,
	x: &[Option<f64>],
	r: &[Option<f64>],
	comparison: ComparisonMode,
) -> Array2<f64> {
	let n_features = x.len();
	let coalition_values: Vec<Array1<f64>> = (0..1usize << n_features)
		.map(|mask| {
			let row: Vec<Option<f64>> = (0..n_features)
				.map(|feature_index| {
					if mask & (1 << feature_index) != 0 {
						x[feature_index]
					} else {
						r[feature_index]
					}
				})
				.collect();
			let (values, missing) = instance(&row);
			let z = Instance::new(&values, &missing).unwrap();
			tree.predict(z, comparison).to_owned()
		})
		.collect();
	let mut result = Array2::zeros((n_features + 1, tree.n_outputs()));
	for (feature_index, phi) in shapley_values(&coalition_values).into_iter().enumerate() {
		result.row_mut(feature_index).assign(&phi);
	}
	result.row_mut(n_features).assign(&coalition_values[0]);
	result
}

/// `coalition_values[mask]` is the value of the coalition whose players are the set bits of `mask`.
fn shapley_values(coalition_values: &[Array1<f64>]) -> Vec<Array1<f64>> {
	let n_players = coalition_values.len().trailing_zeros() as usize;
	let factorial = |n: usize| (1..=n).map(|i| i as f64).product::<f64>();
	(0..n_players)
		.map(|player| {
			let mut phi = Array1::zeros(coalition_values[0].len());
			for mask in 0..coalition_values.len() {
				if mask & (1 << player) != 0 {
					continue;
				}
				let size = mask.count_ones() as usize;
				let weight = factorial(size) * factorial(n_players - size - 1) / factorial(n_players);
				let marginal = &coalition_values[mask | (1 << player)] - &coalition_values[mask];
				phi.scaled_add(weight, &marginal);
			}
			phi
		})
		.collect()
}

pub fn assert_close(actual: ArrayView2<f64>, expected: ArrayView2<f64>) {
	assert_eq!(actual.shape(), expected.shape());
	for (a, b) in actual.iter().zip(expected.iter()) {
		assert!(
			(a - b).abs() < 1e-9,
			"expected\n{:?}\nbut got\n{:?}",
			expected,
			actual
		);
	}
}

/*!
This module computes interventional SHAP values: the contribution of each feature to the difference between the prediction for a foreground instance and the prediction for a single background instance, assuming the features are independent.

The tree is walked once. At a branch where the foreground and background instances go the same way, nothing is learned about the split feature and the walk follows them. Where they diverge, the split feature is resolved and both children are visited, first the left and then the right. Along the way we track `n_resolved`, the number of distinct features resolved on the current path, and `n_foreground`, the number of them resolved to the foreground side. At a leaf, these give the share of the leaf's value owed to each resolved feature via the weight table. The shares are collected bottom up in a positive list (credit to features resolved to the foreground) and a negative list (debit to features resolved to the background), and a branch that resolved its feature credits it with the foreground side's positive list plus the background side's negative list.

A feature tested again below the branch that resolved it is not resolved a second time. The walk follows the side it was first resolved to, and a signed per-feature history counts how deep it is in such nested tests.
*/

use crate::{ComparisonMode, ContributionBuffer, Error, Instance, Node, Tree, WeightTable};
use ndarray::prelude::*;

/// Compute the interventional SHAP values of `foreground` against `background` for a single tree and add them to `contributions`. The prediction for `background` is added to the bias, so the contributions and the bias sum to the prediction for `foreground`, which is returned.
pub fn independent_contributions<'a>(
	tree: &'a Tree,
	foreground: Instance,
	background: Instance,
	comparison: ComparisonMode,
	contributions: &mut ContributionBuffer,
) -> Result<ArrayView1<'a, f64>, Error> {
	if foreground.n_features() != background.n_features() {
		return Err(Error::InstanceFeatureCountMismatch {
			expected: foreground.n_features(),
			actual: background.n_features(),
		});
	}
	contributions.check(tree, foreground)?;
	let prediction = tree.predict(foreground, comparison);
	let n_features = foreground.n_features();
	let mut phi = contributions.values_mut();
	if let Node::Leaf(_) = tree.nodes()[0] {
		phi.row_mut(n_features).scaled_add(1.0, &tree.value(0));
		return Ok(prediction);
	}
	let mut walk = Walk {
		tree,
		foreground,
		background,
		comparison,
		phi,
		scratch: Scratch::new(tree, n_features),
		n_resolved: 0,
		n_foreground: 0,
	};
	walk.run();
	Ok(prediction)
}

/// This records which instance is sent to a node by its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Origin {
	/// Both instances are sent to the node, or neither is.
	Neither,
	/// Only the foreground instance is sent to the node.
	Foreground,
	/// Only the background instance is sent to the node.
	Background,
}

/// The buffers used during a single walk. They are sized up front from the tree so the walk never allocates.
struct Scratch {
	/// Each row holds the credit collected below a node for features resolved to the foreground side.
	positive: Array2<f64>,
	/// Each row holds the debit collected below a node for features resolved to the background side.
	negative: Array2<f64>,
	/// For each feature, the number of branches on the current path below the one that resolved it, positive if it was resolved to the foreground side and negative if it was resolved to the background side.
	feature_history: Vec<i32>,
	origins: Vec<Origin>,
	/// The branches on the current path whose children are still being visited.
	node_stack: Vec<usize>,
	weights: WeightTable,
}

impl Scratch {
	fn new(tree: &Tree, n_features: usize) -> Self {
		Self {
			positive: Array2::zeros((tree.n_nodes(), tree.n_outputs())),
			negative: Array2::zeros((tree.n_nodes(), tree.n_outputs())),
			feature_history: vec![0; n_features],
			origins: vec![Origin::Neither; tree.n_nodes()],
			node_stack: Vec::with_capacity(tree.max_depth()),
			weights: WeightTable::new(tree.max_depth()),
		}
	}
}

struct Walk<'a, 'b> {
	tree: &'a Tree,
	foreground: Instance<'b>,
	background: Instance<'b>,
	comparison: ComparisonMode,
	phi: ArrayViewMut2<'b, f64>,
	scratch: Scratch,
	n_resolved: usize,
	n_foreground: usize,
}

impl<'a, 'b> Walk<'a, 'b> {
	fn run(&mut self) {
		let tree = self.tree;
		let bias_index = self.phi.nrows() - 1;
		let mut node_index = 0;
		// This is `None` when the walk arrives at `node_index` from its parent, and the child it came back from otherwise.
		let mut from_child_index: Option<usize> = None;
		loop {
			let node = match &tree.nodes()[node_index] {
				Node::Leaf(_) => {
					self.visit_leaf(node_index, bias_index);
					let parent_index = match self.scratch.node_stack.pop() {
						Some(parent_index) => parent_index,
						None => break,
					};
					self.leave(node_index);
					from_child_index = Some(node_index);
					node_index = parent_index;
					continue;
				}
				Node::Branch(n) => n,
			};
			let feature_index = node.split.feature_index;
			let foreground_child_index = node.route(self.foreground, self.comparison);
			let background_child_index = node.route(self.background, self.comparison);
			let diverges = foreground_child_index != background_child_index;
			if diverges {
				self.scratch.origins[foreground_child_index] = Origin::Foreground;
				self.scratch.origins[background_child_index] = Origin::Background;
			} else {
				self.scratch.origins[foreground_child_index] = Origin::Neither;
			}
			match from_child_index {
				// Arriving from the parent.
				None => {
					self.scratch.node_stack.push(node_index);
					let history = &mut self.scratch.feature_history[feature_index];
					let next_index = if *history > 0 {
						*history += 1;
						Some(foreground_child_index)
					} else if *history < 0 {
						*history -= 1;
						Some(background_child_index)
					} else if !diverges {
						Some(foreground_child_index)
					} else {
						None
					};
					node_index = match next_index {
						Some(next_index) => next_index,
						// The feature is resolved here. Visit both children, starting with the left.
						None => {
							self.resolve(feature_index, node.left_child_index, foreground_child_index);
							node.left_child_index
						}
					};
				}
				// Arriving from a child on a path that did not resolve this node's feature. Pass its lists up unchanged.
				Some(child_index) if !diverges || self.scratch.feature_history[feature_index] != 0 => {
					if node_index == 0 {
						break;
					}
					for output in 0..tree.n_outputs() {
						self.scratch.positive[[node_index, output]] =
							self.scratch.positive[[child_index, output]];
						self.scratch.negative[[node_index, output]] =
							self.scratch.negative[[child_index, output]];
					}
					let parent_index = match self.scratch.node_stack.pop() {
						Some(parent_index) => parent_index,
						None => break,
					};
					self.leave(node_index);
					from_child_index = Some(node_index);
					node_index = parent_index;
				}
				// Arriving from the left child of a resolving branch. Visit the right child.
				Some(child_index) if child_index == node.left_child_index => {
					self.scratch.node_stack.push(node_index);
					self.resolve(feature_index, node.right_child_index, foreground_child_index);
					from_child_index = None;
					node_index = node.right_child_index;
				}
				// Arriving from the right child of a resolving branch. Both sides are done, so credit the feature and merge the lists.
				Some(_) => {
					for output in 0..tree.n_outputs() {
						let foreground_positive =
							self.scratch.positive[[foreground_child_index, output]];
						let foreground_negative =
							self.scratch.negative[[foreground_child_index, output]];
						let background_positive =
							self.scratch.positive[[background_child_index, output]];
						let background_negative =
							self.scratch.negative[[background_child_index, output]];
						self.phi[[feature_index, output]] += foreground_positive + background_negative;
						self.scratch.positive[[node_index, output]] =
							foreground_positive + background_positive;
						self.scratch.negative[[node_index, output]] =
							foreground_negative + background_negative;
					}
					if node_index == 0 {
						break;
					}
					let parent_index = match self.scratch.node_stack.pop() {
						Some(parent_index) => parent_index,
						None => break,
					};
					self.leave(node_index);
					from_child_index = Some(node_index);
					node_index = parent_index;
				}
			}
		}
	}

	fn visit_leaf(&mut self, node_index: usize, bias_index: usize) {
		let tree = self.tree;
		let value = tree.value(node_index);
		// Only the leaf the background instance reaches has no feature resolved to the foreground side.
		if self.n_foreground == 0 {
			self.phi.row_mut(bias_index).scaled_add(1.0, &value);
		}
		let mut positive = self.scratch.positive.row_mut(node_index);
		let mut negative = self.scratch.negative.row_mut(node_index);
		positive.fill(0.0);
		negative.fill(0.0);
		if self.n_resolved == 0 {
			return;
		}
		if self.n_foreground != 0 {
			let weight = self
				.scratch
				.weights
				.get(self.n_resolved, self.n_foreground - 1);
			positive.scaled_add(weight, &value);
		}
		if self.n_foreground != self.n_resolved {
			let weight = self.scratch.weights.get(self.n_resolved, self.n_foreground);
			negative.scaled_add(-weight, &value);
		}
	}

	/// Record that the walk is entering `child_index` of a branch that resolves `feature_index`.
	fn resolve(&mut self, feature_index: usize, child_index: usize, foreground_child_index: usize) {
		self.n_resolved += 1;
		if child_index == foreground_child_index {
			self.n_foreground += 1;
			self.scratch.feature_history[feature_index] += 1;
		} else {
			self.scratch.feature_history[feature_index] -= 1;
		}
	}

	/// Undo the bookkeeping done when the walk entered `node_index` from its parent.
	fn leave(&mut self, node_index: usize) {
		let parent = match self.tree.nodes()[node_index].parent() {
			Some(parent) => parent,
			None => return,
		};
		let history = &mut self.scratch.feature_history[parent.split_feature_index];
		if *history > 0 {
			*history -= 1;
		} else if *history < 0 {
			*history += 1;
		}
		if *history == 0 {
			match self.scratch.origins[node_index] {
				Origin::Foreground => {
					self.n_resolved -= 1;
					self.n_foreground -= 1;
				}
				Origin::Background => {
					self.n_resolved -= 1;
				}
				Origin::Neither => {}
			}
		}
	}
}

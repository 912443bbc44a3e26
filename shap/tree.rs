use crate::{Error, Instance};
use ndarray::prelude::*;

/// Trees are stored as a `Vec` of `Node`s. Each branch in the tree has two indexes into the `Vec`, one for each of its children, and every node other than the root has a link back to its parent. The root is always the node at index 0.
#[derive(Clone, Debug)]
pub struct Tree {
	nodes: Vec<Node>,
	/// This has shape (n_nodes, n_outputs). The rows for leaves hold the leaf outputs. The rows for branches hold the expected output over the subtree, once `compute_expectations` has run.
	values: Array2<f64>,
	max_depth: usize,
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

/// A `BranchNode` is a branch in a tree.
#[derive(Clone, Debug)]
pub struct BranchNode {
	/// This is the index in the tree's node vector for this node's left child.
	pub left_child_index: usize,
	/// This is the index in the tree's node vector for this node's right child.
	pub right_child_index: usize,
	/// When explaining an example, it will be sent either to the right or left child. The `split` contains the information necessary to determine which way it will go.
	pub split: BranchSplit,
	/// This is the total weight of the training examples that passed through this node.
	pub sample_weight: f64,
	pub parent: Option<ParentLink>,
}

/// A branch split takes the value of a single feature and compares it with `split_value`. The comparison operator is chosen per call with a `ComparisonMode`.
#[derive(Clone, Debug)]
pub struct BranchSplit {
	/// This is the index of the feature to get the value for.
	pub feature_index: usize,
	/// This is the threshold value of the split.
	pub split_value: f64,
	/// This is the direction examples with a missing value for the feature are sent.
	pub missing_values_direction: SplitDirection,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SplitDirection {
	Left,
	Right,
}

/// The leaves in a tree hold the values to output for examples that get sent to them. The values themselves are stored in the tree's `values` array.
#[derive(Clone, Debug)]
pub struct LeafNode {
	/// This is the total weight of the training examples that were sent to this leaf.
	pub sample_weight: f64,
	pub parent: Option<ParentLink>,
}

/// A `ParentLink` points from a node back to the branch it hangs from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParentLink {
	pub node_index: usize,
	/// This is the feature the parent splits on.
	pub split_feature_index: usize,
}

/// This selects the comparison used by every branch. It must match the convention the tree was trained with.
#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize)]
pub enum ComparisonMode {
	/// Examples with `value <= split_value` go left.
	#[serde(rename = "less_than_or_equal")]
	LessThanOrEqual,
	/// Examples with `value < split_value` go left.
	#[serde(rename = "less_than")]
	LessThan,
}

impl Default for ComparisonMode {
	fn default() -> Self {
		ComparisonMode::LessThanOrEqual
	}
}

/// This is the flat array encoding of a tree, with one entry per node in each array. Negative child indexes mark leaves. The `features`, `thresholds`, and `children_default` entries of leaves are ignored.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TreeArrays {
	pub children_left: Vec<i64>,
	pub children_right: Vec<i64>,
	pub children_default: Vec<i64>,
	pub features: Vec<i64>,
	pub thresholds: Vec<f64>,
	/// One row of output values per node.
	pub values: Vec<Vec<f64>>,
	pub node_sample_weight: Vec<f64>,
}

impl Node {
	pub fn sample_weight(&self) -> f64 {
		match self {
			Node::Branch(n) => n.sample_weight,
			Node::Leaf(n) => n.sample_weight,
		}
	}

	pub fn parent(&self) -> Option<ParentLink> {
		match self {
			Node::Branch(n) => n.parent,
			Node::Leaf(n) => n.parent,
		}
	}

	pub fn as_branch(&self) -> Option<&BranchNode> {
		match self {
			Node::Branch(n) => Some(n),
			Node::Leaf(_) => None,
		}
	}
}

impl BranchNode {
	/// Return the index of the child the instance is sent to. Missing values always go to the default child, whatever their numeric value.
	pub fn route(&self, instance: Instance, comparison: ComparisonMode) -> usize {
		let feature_index = self.split.feature_index;
		let direction = if instance.is_missing(feature_index) {
			self.split.missing_values_direction
		} else {
			let value = instance.value(feature_index);
			let goes_left = match comparison {
				ComparisonMode::LessThanOrEqual => value <= self.split.split_value,
				ComparisonMode::LessThan => value < self.split.split_value,
			};
			if goes_left {
				SplitDirection::Left
			} else {
				SplitDirection::Right
			}
		};
		self.child_index(direction)
	}

	pub fn child_index(&self, direction: SplitDirection) -> usize {
		match direction {
			SplitDirection::Left => self.left_child_index,
			SplitDirection::Right => self.right_child_index,
		}
	}

	/// Return the child that is not `child_index`.
	pub fn sibling_index(&self, child_index: usize) -> usize {
		if child_index == self.left_child_index {
			self.right_child_index
		} else {
			self.left_child_index
		}
	}

	pub fn default_child_index(&self) -> usize {
		self.child_index(self.split.missing_values_direction)
	}
}

impl Tree {
	/// Build a tree from its flat array encoding, checking that the arrays describe a single tree rooted at node 0.
	pub fn from_arrays(arrays: &TreeArrays) -> Result<Tree, Error> {
		let n_nodes = arrays.children_left.len();
		if n_nodes == 0 {
			return Err(Error::EmptyTree);
		}
		let lengths = [
			("children_right", arrays.children_right.len()),
			("children_default", arrays.children_default.len()),
			("features", arrays.features.len()),
			("thresholds", arrays.thresholds.len()),
			("values", arrays.values.len()),
			("node_sample_weight", arrays.node_sample_weight.len()),
		];
		for (name, actual) in lengths.iter() {
			if *actual != n_nodes {
				return Err(Error::ArrayLengthMismatch {
					name: *name,
					expected: n_nodes,
					actual: *actual,
				});
			}
		}
		let n_outputs = arrays.values[0].len();
		if n_outputs == 0 {
			return Err(Error::NoOutputs);
		}
		let mut values = Array2::zeros((n_nodes, n_outputs));
		for (node_index, row) in arrays.values.iter().enumerate() {
			if row.len() != n_outputs {
				return Err(Error::OutputCountMismatch {
					node_index,
					expected: n_outputs,
					actual: row.len(),
				});
			}
			for (output, value) in values.row_mut(node_index).iter_mut().zip(row.iter()) {
				*output = *value;
			}
		}
		// Convert each entry, then link every child to its parent.
		let mut nodes = Vec::with_capacity(n_nodes);
		for node_index in 0..n_nodes {
			let sample_weight = arrays.node_sample_weight[node_index];
			if sample_weight.is_nan() || sample_weight < 0.0 {
				return Err(Error::InvalidSampleWeight {
					node_index,
					sample_weight,
				});
			}
			let left = arrays.children_left[node_index];
			let right = arrays.children_right[node_index];
			let node = match (left < 0, right < 0) {
				(true, true) => Node::Leaf(LeafNode {
					sample_weight,
					parent: None,
				}),
				(false, false) => {
					let left_child_index = child_index(node_index, left, n_nodes)?;
					let right_child_index = child_index(node_index, right, n_nodes)?;
					if left_child_index == right_child_index {
						return Err(Error::MultipleParents {
							node_index: left_child_index,
						});
					}
					let default = arrays.children_default[node_index];
					let missing_values_direction = if default == left {
						SplitDirection::Left
					} else if default == right {
						SplitDirection::Right
					} else {
						return Err(Error::InvalidDefaultChild {
							node_index,
							default_index: default,
						});
					};
					let feature = arrays.features[node_index];
					if feature < 0 {
						return Err(Error::InvalidSplitFeature {
							node_index,
							feature_index: feature,
						});
					}
					Node::Branch(BranchNode {
						left_child_index,
						right_child_index,
						split: BranchSplit {
							feature_index: feature as usize,
							split_value: arrays.thresholds[node_index],
							missing_values_direction,
						},
						sample_weight,
						parent: None,
					})
				}
				_ => return Err(Error::OneSidedBranch { node_index }),
			};
			nodes.push(node);
		}
		for node_index in 0..n_nodes {
			let (left_child_index, right_child_index, feature_index) = match &nodes[node_index] {
				Node::Branch(n) => (
					n.left_child_index,
					n.right_child_index,
					n.split.feature_index,
				),
				Node::Leaf(_) => continue,
			};
			for child_index in [left_child_index, right_child_index].iter() {
				let link = ParentLink {
					node_index,
					split_feature_index: feature_index,
				};
				let parent = match &mut nodes[*child_index] {
					Node::Branch(n) => &mut n.parent,
					Node::Leaf(n) => &mut n.parent,
				};
				if parent.is_some() {
					return Err(Error::MultipleParents {
						node_index: *child_index,
					});
				}
				*parent = Some(link);
			}
		}
		// The root cannot be anyone's child. With every other node having exactly one parent, a walk from the root reaches every node exactly once unless some nodes form a detached cycle.
		if nodes[0].parent().is_some() {
			return Err(Error::MultipleParents { node_index: 0 });
		}
		let mut visited = vec![false; n_nodes];
		let mut max_depth = 0;
		let mut stack = vec![(0, 0)];
		while let Some((node_index, depth)) = stack.pop() {
			visited[node_index] = true;
			match &nodes[node_index] {
				Node::Branch(n) => {
					stack.push((n.left_child_index, depth + 1));
					stack.push((n.right_child_index, depth + 1));
				}
				Node::Leaf(_) => max_depth = max_depth.max(depth),
			}
		}
		if let Some(node_index) = visited.iter().position(|visited| !visited) {
			return Err(Error::UnreachableNode { node_index });
		}
		log::debug!(
			"built a tree with {} nodes, {} outputs, and max depth {}",
			n_nodes,
			n_outputs,
			max_depth
		);
		Ok(Tree {
			nodes,
			values,
			max_depth,
		})
	}

	/// Convert the tree back to its flat array encoding. Leaves are written with `-1` children and feature `-2`, matching the usual convention.
	pub fn to_arrays(&self) -> TreeArrays {
		let n_nodes = self.nodes.len();
		let mut arrays = TreeArrays {
			children_left: Vec::with_capacity(n_nodes),
			children_right: Vec::with_capacity(n_nodes),
			children_default: Vec::with_capacity(n_nodes),
			features: Vec::with_capacity(n_nodes),
			thresholds: Vec::with_capacity(n_nodes),
			values: self.values.outer_iter().map(|row| row.to_vec()).collect(),
			node_sample_weight: Vec::with_capacity(n_nodes),
		};
		for node in self.nodes.iter() {
			match node {
				Node::Branch(n) => {
					arrays.children_left.push(n.left_child_index as i64);
					arrays.children_right.push(n.right_child_index as i64);
					arrays
						.children_default
						.push(n.default_child_index() as i64);
					arrays.features.push(n.split.feature_index as i64);
					arrays.thresholds.push(n.split.split_value);
				}
				Node::Leaf(_) => {
					arrays.children_left.push(-1);
					arrays.children_right.push(-1);
					arrays.children_default.push(-1);
					arrays.features.push(-2);
					arrays.thresholds.push(-2.0);
				}
			}
			arrays.node_sample_weight.push(node.sample_weight());
		}
		arrays
	}

	pub fn nodes(&self) -> &[Node] {
		&self.nodes
	}

	pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
		&mut self.nodes
	}

	pub fn values(&self) -> ArrayView2<f64> {
		self.values.view()
	}

	pub(crate) fn values_mut(&mut self) -> ArrayViewMut2<f64> {
		self.values.view_mut()
	}

	/// Return the output values of a node.
	pub fn value(&self, node_index: usize) -> ArrayView1<f64> {
		self.values.row(node_index)
	}

	/// Return the expected output of the tree, which is the value of the root once `compute_expectations` has run.
	pub fn expected_value(&self) -> ArrayView1<f64> {
		self.value(0)
	}

	pub fn n_nodes(&self) -> usize {
		self.nodes.len()
	}

	pub fn n_outputs(&self) -> usize {
		self.values.ncols()
	}

	/// The length of the longest path from the root to a leaf, counted in edges.
	pub fn max_depth(&self) -> usize {
		self.max_depth
	}

	pub(crate) fn set_max_depth(&mut self, max_depth: usize) {
		self.max_depth = max_depth;
	}

	/// The smallest number of features an instance needs to be explained by this tree.
	pub fn n_features_required(&self) -> usize {
		self.nodes
			.iter()
			.filter_map(|node| node.as_branch())
			.map(|node| node.split.feature_index + 1)
			.max()
			.unwrap_or(0)
	}

	/// The distinct features this tree splits on, in ascending order.
	pub fn split_features(&self) -> Vec<usize> {
		let mut features: Vec<usize> = self
			.nodes
			.iter()
			.filter_map(|node| node.as_branch())
			.map(|node| node.split.feature_index)
			.collect();
		features.sort_unstable();
		features.dedup();
		features
	}

	/// Return the index of the leaf the instance reaches.
	pub fn leaf_index(&self, instance: Instance, comparison: ComparisonMode) -> usize {
		let mut node_index = 0;
		while let Node::Branch(node) = &self.nodes[node_index] {
			node_index = node.route(instance, comparison);
		}
		node_index
	}

	/// Make a prediction for a given instance.
	pub fn predict(&self, instance: Instance, comparison: ComparisonMode) -> ArrayView1<f64> {
		self.value(self.leaf_index(instance, comparison))
	}
}

fn child_index(node_index: usize, child: i64, n_nodes: usize) -> Result<usize, Error> {
	if child as usize >= n_nodes || child as usize == node_index {
		return Err(Error::InvalidChild {
			node_index,
			child_index: child,
		});
	}
	Ok(child as usize)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::testing::{instance, stump_arrays};

	#[test]
	fn test_from_arrays_links_parents() {
		let tree = Tree::from_arrays(&stump_arrays()).unwrap();
		assert_eq!(tree.n_nodes(), 3);
		assert_eq!(tree.n_outputs(), 1);
		assert_eq!(tree.max_depth(), 1);
		assert_eq!(tree.n_features_required(), 1);
		assert_eq!(tree.nodes()[0].parent(), None);
		let link = Some(ParentLink {
			node_index: 0,
			split_feature_index: 0,
		});
		assert_eq!(tree.nodes()[1].parent(), link);
		assert_eq!(tree.nodes()[2].parent(), link);
	}

	#[test]
	fn test_to_arrays_round_trips() {
		let arrays = stump_arrays();
		let tree = Tree::from_arrays(&arrays).unwrap();
		assert_eq!(tree.to_arrays(), arrays);
	}

	#[test]
	fn test_comparison_modes() {
		let tree = Tree::from_arrays(&stump_arrays()).unwrap();
		let (values, missing) = instance(&[Some(0.5)]);
		let x = Instance::new(&values, &missing).unwrap();
		assert_eq!(tree.leaf_index(x, ComparisonMode::LessThanOrEqual), 1);
		assert_eq!(tree.leaf_index(x, ComparisonMode::LessThan), 2);
		assert_eq!(tree.predict(x, ComparisonMode::LessThan)[0], 4.0);
	}

	#[test]
	fn test_missing_values_take_the_default_child() {
		let mut arrays = stump_arrays();
		arrays.children_default[0] = 2;
		let tree = Tree::from_arrays(&arrays).unwrap();
		for value in [0.0, f64::NAN, -1e300, f64::INFINITY].iter() {
			let values = [*value];
			let x = Instance::new(&values, &[true]).unwrap();
			assert_eq!(tree.leaf_index(x, ComparisonMode::LessThanOrEqual), 2);
		}
	}

	#[test]
	fn test_invalid_trees() {
		let mut arrays = stump_arrays();
		arrays.children_right[0] = -1;
		assert_eq!(
			Tree::from_arrays(&arrays).unwrap_err(),
			Error::OneSidedBranch { node_index: 0 }
		);

		let mut arrays = stump_arrays();
		arrays.children_left[0] = 3;
		assert_eq!(
			Tree::from_arrays(&arrays).unwrap_err(),
			Error::InvalidChild {
				node_index: 0,
				child_index: 3
			}
		);

		let mut arrays = stump_arrays();
		arrays.children_default[0] = 0;
		assert_eq!(
			Tree::from_arrays(&arrays).unwrap_err(),
			Error::InvalidDefaultChild {
				node_index: 0,
				default_index: 0
			}
		);

		let mut arrays = stump_arrays();
		arrays.node_sample_weight[1] = -1.0;
		assert_eq!(
			Tree::from_arrays(&arrays).unwrap_err(),
			Error::InvalidSampleWeight {
				node_index: 1,
				sample_weight: -1.0
			}
		);

		let mut arrays = stump_arrays();
		arrays.features.pop();
		assert_eq!(
			Tree::from_arrays(&arrays).unwrap_err(),
			Error::ArrayLengthMismatch {
				name: "features",
				expected: 3,
				actual: 2
			}
		);
	}

	#[test]
	fn test_cycles_are_rejected() {
		// Node 1 points back at the root.
		let mut arrays = stump_arrays();
		arrays.children_left[1] = 0;
		arrays.children_right[1] = 2;
		arrays.children_default[1] = 0;
		arrays.features[1] = 0;
		assert!(matches!(
			Tree::from_arrays(&arrays).unwrap_err(),
			Error::MultipleParents { .. }
		));

		// Nodes 3 and 4 form a cycle that is detached from the root.
		let arrays = TreeArrays {
			children_left: vec![1, -1, -1, 4, 3, -1, -1],
			children_right: vec![2, -1, -1, 5, 6, -1, -1],
			children_default: vec![1, -1, -1, 4, 3, -1, -1],
			features: vec![0, -2, -2, 0, 0, -2, -2],
			thresholds: vec![0.0; 7],
			values: vec![vec![0.0]; 7],
			node_sample_weight: vec![1.0; 7],
		};
		assert_eq!(
			Tree::from_arrays(&arrays).unwrap_err(),
			Error::UnreachableNode { node_index: 3 }
		);

		let arrays = TreeArrays {
			children_left: vec![1, -1, -1, 4, 3],
			children_right: vec![2, -1, -1, -1, -1],
			children_default: vec![1, -1, -1, 4, 3],
			features: vec![0, -2, -2, 0, 0],
			thresholds: vec![0.0; 5],
			values: vec![vec![0.0]; 5],
			node_sample_weight: vec![1.0; 5],
		};
		assert_eq!(
			Tree::from_arrays(&arrays).unwrap_err(),
			Error::OneSidedBranch { node_index: 3 }
		);
	}

	#[test]
	fn test_unreachable_nodes_are_rejected() {
		let mut arrays = stump_arrays();
		arrays.children_left.push(-1);
		arrays.children_right.push(-1);
		arrays.children_default.push(-1);
		arrays.features.push(-2);
		arrays.thresholds.push(-2.0);
		arrays.values.push(vec![0.0]);
		arrays.node_sample_weight.push(1.0);
		let error = Tree::from_arrays(&arrays).unwrap_err();
		insta::assert_display_snapshot!(error, @"node 3 is not reachable from the root");
	}
}

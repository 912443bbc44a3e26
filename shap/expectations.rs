use crate::{Node, Tree};

/**
Compute the value and sample weight of every branch in the tree from the leaves below it. The value of a branch is the average of its children's values, weighted by their sample weights, so the value of the root is the expected output of the tree over the training data. Branches whose children both have zero weight get the value zero.

Returns the maximum depth of the tree. Running this again without changing the leaves leaves the tree unchanged.
*/
pub fn compute_expectations(tree: &mut Tree) -> usize {
	let mut max_depth = 0;
	let mut n_empty_branches = 0;
	// Visit the nodes in post order: a branch is pushed once to schedule its children and a second time to combine them.
	let mut stack = vec![(0, 0, false)];
	while let Some((node_index, depth, children_visited)) = stack.pop() {
		let (left_child_index, right_child_index) = match &tree.nodes()[node_index] {
			Node::Leaf(_) => {
				max_depth = max_depth.max(depth);
				continue;
			}
			Node::Branch(n) => (n.left_child_index, n.right_child_index),
		};
		if !children_visited {
			stack.push((node_index, depth, true));
			stack.push((right_child_index, depth + 1, false));
			stack.push((left_child_index, depth + 1, false));
			continue;
		}
		let left_weight = tree.nodes()[left_child_index].sample_weight();
		let right_weight = tree.nodes()[right_child_index].sample_weight();
		let weight = left_weight + right_weight;
		let mut values = tree.values_mut();
		for output in 0..values.ncols() {
			values[[node_index, output]] = if weight == 0.0 {
				0.0
			} else {
				(left_weight * values[[left_child_index, output]]
					+ right_weight * values[[right_child_index, output]])
					/ weight
			};
		}
		if weight == 0.0 {
			n_empty_branches += 1;
		}
		if let Node::Branch(n) = &mut tree.nodes_mut()[node_index] {
			n.sample_weight = weight;
		}
	}
	if n_empty_branches > 0 {
		log::warn!(
			"{} branches have no sample weight, their expected values were set to zero",
			n_empty_branches
		);
	}
	log::debug!(
		"computed expectations, the expected value of the tree is {}",
		tree.expected_value()
	);
	tree.set_max_depth(max_depth);
	max_depth
}

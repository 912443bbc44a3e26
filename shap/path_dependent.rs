use crate::{ComparisonMode, ContributionBuffer, Error, Instance, Node, Tree};
use ndarray::prelude::*;

/// These are the options passed to `path_dependent_contributions`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PathDependentOptions {
	pub comparison: ComparisonMode,
	/// If this is `Some`, only coalitions that agree with the condition on one feature are considered. This is used to compute interaction values.
	pub condition: Option<Condition>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Condition {
	/// The feature is always in the coalition, so it follows the instance.
	Present(usize),
	/// The feature is never in the coalition, so it follows the training data.
	Absent(usize),
}

impl Condition {
	pub fn feature_index(&self) -> usize {
		match self {
			Condition::Present(feature_index) => *feature_index,
			Condition::Absent(feature_index) => *feature_index,
		}
	}
}

/**
Compute the SHAP values of `instance` for a single tree, using the sample weights of the tree's nodes as the background distribution, and add them to `contributions`. Without a condition the expected value of the tree is added to the bias, so the contributions and the bias sum to the prediction. Returns the prediction.

The tree must have had `compute_expectations` run on it, or have been given the sample weights and values of its branches.
*/
pub fn path_dependent_contributions<'a>(
	tree: &'a Tree,
	instance: Instance,
	options: &PathDependentOptions,
	contributions: &mut ContributionBuffer,
) -> Result<ArrayView1<'a, f64>, Error> {
	contributions.check(tree, instance)?;
	if let Some(condition) = options.condition {
		if condition.feature_index() >= instance.n_features() {
			return Err(Error::InvalidConditionFeature {
				feature_index: condition.feature_index(),
				n_features: instance.n_features(),
			});
		}
	}
	let n_features = instance.n_features();
	let mut phi = contributions.values_mut();
	if options.condition.is_none() {
		phi.row_mut(n_features).scaled_add(1.0, &tree.expected_value());
	}
	// Each level of the recursion gets its own copy of the path, one element longer than its parent's.
	let max_depth = tree.max_depth() + 2;
	let mut unique_path = vec![PathElement::new(); max_depth * (max_depth + 1) / 2];
	let mut walk = Walk {
		tree,
		instance,
		comparison: options.comparison,
		condition: options.condition,
		phi,
	};
	walk.recurse(0, unique_path.as_mut_slice(), 0, 1.0, 1.0, None, 1.0);
	Ok(tree.predict(instance, options.comparison))
}

#[derive(Clone, Copy, Debug)]
struct PathElement {
	feature_index: Option<usize>,
	/// The fraction of the paths through this element that do not include the feature, weighted by the training data.
	zero_fraction: f64,
	/// The fraction of the paths through this element that include the feature. This is 1 on the path the instance takes and 0 elsewhere.
	one_fraction: f64,
	/// The weight of the permutations of the preceding features with a given number of them included.
	pweight: f64,
}

impl PathElement {
	fn new() -> Self {
		Self {
			feature_index: None,
			zero_fraction: 0.0,
			one_fraction: 0.0,
			pweight: 0.0,
		}
	}
}

struct Walk<'a, 'b> {
	tree: &'a Tree,
	instance: Instance<'b>,
	comparison: ComparisonMode,
	condition: Option<Condition>,
	phi: ArrayViewMut2<'b, f64>,
}

impl<'a, 'b> Walk<'a, 'b> {
	#[allow(clippy::too_many_arguments)]
	fn recurse(
		&mut self,
		node_index: usize,
		unique_path: &mut [PathElement],
		unique_depth: usize,
		parent_zero_fraction: f64,
		parent_one_fraction: f64,
		parent_feature_index: Option<usize>,
		condition_fraction: f64,
	) {
		if condition_fraction == 0.0 {
			return;
		}
		let parent_is_condition = match (self.condition, parent_feature_index) {
			(Some(condition), Some(feature_index)) => condition.feature_index() == feature_index,
			_ => false,
		};
		if !parent_is_condition {
			// No coalition reaches this subtree, so every contribution below it is zero.
			if parent_zero_fraction == 0.0 && parent_one_fraction == 0.0 {
				return;
			}
			extend_path(
				unique_path,
				unique_depth,
				parent_zero_fraction,
				parent_one_fraction,
				parent_feature_index,
			);
		}
		let tree = self.tree;
		let node = match &tree.nodes()[node_index] {
			Node::Leaf(_) => {
				let value = tree.value(node_index);
				for path_index in 1..=unique_depth {
					let weight = unwound_path_sum(unique_path, unique_depth, path_index);
					let path_item = &unique_path[path_index];
					let scale = weight
						* (path_item.one_fraction - path_item.zero_fraction)
						* condition_fraction;
					if let Some(feature_index) = path_item.feature_index {
						self.phi.row_mut(feature_index).scaled_add(scale, &value);
					}
				}
				return;
			}
			Node::Branch(n) => n,
		};
		let hot_child_index = node.route(self.instance, self.comparison);
		let cold_child_index = node.sibling_index(hot_child_index);
		let (hot_zero_fraction, cold_zero_fraction) = if node.sample_weight > 0.0 {
			let nodes = tree.nodes();
			(
				nodes[hot_child_index].sample_weight() / node.sample_weight,
				nodes[cold_child_index].sample_weight() / node.sample_weight,
			)
		} else {
			(0.0, 0.0)
		};
		let mut incoming_zero_fraction = 1.0;
		let mut incoming_one_fraction = 1.0;
		let mut unique_depth = unique_depth;
		let feature_index = node.split.feature_index;
		// If this feature was already split on above, undo that split so it can be redone here.
		if let Some(path_index) =
			(1..=unique_depth).find(|i| unique_path[*i].feature_index == Some(feature_index))
		{
			incoming_zero_fraction = unique_path[path_index].zero_fraction;
			incoming_one_fraction = unique_path[path_index].one_fraction;
			unwind_path(unique_path, unique_depth, path_index);
			unique_depth -= 1;
		}
		// The condition feature is never added to the path. Instead it divides the condition fraction between the children.
		let mut hot_condition_fraction = condition_fraction;
		let mut cold_condition_fraction = condition_fraction;
		let mut child_depth = unique_depth + 1;
		match self.condition {
			Some(Condition::Present(condition_feature_index))
				if condition_feature_index == feature_index =>
			{
				cold_condition_fraction = 0.0;
				child_depth = unique_depth;
			}
			Some(Condition::Absent(condition_feature_index))
				if condition_feature_index == feature_index =>
			{
				hot_condition_fraction *= hot_zero_fraction;
				cold_condition_fraction *= cold_zero_fraction;
				child_depth = unique_depth;
			}
			_ => {}
		}
		let (parent_path, child_path) = unique_path.split_at_mut(unique_depth + 1);
		child_path[0..parent_path.len()].copy_from_slice(parent_path);
		self.recurse(
			hot_child_index,
			child_path,
			child_depth,
			hot_zero_fraction * incoming_zero_fraction,
			incoming_one_fraction,
			Some(feature_index),
			hot_condition_fraction,
		);
		child_path[0..parent_path.len()].copy_from_slice(parent_path);
		self.recurse(
			cold_child_index,
			child_path,
			child_depth,
			cold_zero_fraction * incoming_zero_fraction,
			0.0,
			Some(feature_index),
			cold_condition_fraction,
		);
	}
}

fn extend_path(
	unique_path: &mut [PathElement],
	unique_depth: usize,
	zero_fraction: f64,
	one_fraction: f64,
	feature_index: Option<usize>,
) {
	unique_path[unique_depth] = PathElement {
		feature_index,
		zero_fraction,
		one_fraction,
		pweight: if unique_depth == 0 { 1.0 } else { 0.0 },
	};
	let depth = (unique_depth + 1) as f64;
	for i in (0..unique_depth).rev() {
		unique_path[i + 1].pweight += one_fraction * unique_path[i].pweight * (i + 1) as f64 / depth;
		unique_path[i].pweight =
			zero_fraction * unique_path[i].pweight * (unique_depth - i) as f64 / depth;
	}
}

fn unwind_path(unique_path: &mut [PathElement], unique_depth: usize, path_index: usize) {
	let one_fraction = unique_path[path_index].one_fraction;
	let zero_fraction = unique_path[path_index].zero_fraction;
	let depth = (unique_depth + 1) as f64;
	let mut next_one_portion = unique_path[unique_depth].pweight;
	for i in (0..unique_depth).rev() {
		if one_fraction != 0.0 {
			let pweight = unique_path[i].pweight;
			unique_path[i].pweight = next_one_portion * depth / ((i + 1) as f64 * one_fraction);
			next_one_portion =
				pweight - unique_path[i].pweight * zero_fraction * (unique_depth - i) as f64 / depth;
		} else {
			unique_path[i].pweight =
				unique_path[i].pweight * depth / (zero_fraction * (unique_depth - i) as f64);
		}
	}
	for i in path_index..unique_depth {
		unique_path[i].feature_index = unique_path[i + 1].feature_index;
		unique_path[i].zero_fraction = unique_path[i + 1].zero_fraction;
		unique_path[i].one_fraction = unique_path[i + 1].one_fraction;
	}
}

/// Return the total permutation weight of the path if the element at `path_index` were unwound, without modifying the path.
fn unwound_path_sum(unique_path: &[PathElement], unique_depth: usize, path_index: usize) -> f64 {
	let one_fraction = unique_path[path_index].one_fraction;
	let zero_fraction = unique_path[path_index].zero_fraction;
	let mut next_one_portion = unique_path[unique_depth].pweight;
	let mut total = 0.0;
	if one_fraction != 0.0 {
		for i in (0..unique_depth).rev() {
			let tmp = next_one_portion / ((i + 1) as f64 * one_fraction);
			total += tmp;
			next_one_portion = unique_path[i].pweight - tmp * zero_fraction * (unique_depth - i) as f64;
		}
	} else {
		for i in (0..unique_depth).rev() {
			total += unique_path[i].pweight / (zero_fraction * (unique_depth - i) as f64);
		}
	}
	total * (unique_depth + 1) as f64
}

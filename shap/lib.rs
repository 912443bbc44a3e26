/*!
This crate computes exact SHAP values for a single decision tree. It has two explainers:

1. [`path_dependent_contributions`](fn.path_dependent_contributions.html) uses the training examples that flowed through each node as the background distribution.
2. [`independent_contributions`](fn.independent_contributions.html) measures the difference between an example and a single background example, assuming the features are independent.

Both run in time polynomial in the depth of the tree. A tree is explained one call at a time, and every call adds into a [`ContributionBuffer`](struct.ContributionBuffer.html), so explaining an ensemble is a matter of calling an explainer once per tree with the same buffer.

Before explaining a tree, call [`compute_expectations`](fn.compute_expectations.html) to fill in the values and sample weights of its branch nodes.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod contributions;
mod expectations;
mod independent;
mod instance;
mod interactions;
mod path_dependent;
#[cfg(test)]
mod testing;
mod tree;
mod weights;

pub use self::contributions::ContributionBuffer;
pub use self::expectations::compute_expectations;
pub use self::independent::independent_contributions;
pub use self::instance::Instance;
pub use self::interactions::{path_dependent_interactions, InteractionBuffer};
pub use self::path_dependent::{path_dependent_contributions, Condition, PathDependentOptions};
pub use self::tree::*;
pub use self::weights::{weight, WeightTable};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
	#[error("the tree has no nodes")]
	EmptyTree,
	#[error("expected {expected} entries in {name} but found {actual}")]
	ArrayLengthMismatch {
		name: &'static str,
		expected: usize,
		actual: usize,
	},
	#[error("node {node_index} has {actual} output values but the tree has {expected} outputs")]
	OutputCountMismatch {
		node_index: usize,
		expected: usize,
		actual: usize,
	},
	#[error("the tree has no output values")]
	NoOutputs,
	#[error("node {node_index} has a left child or a right child but not both")]
	OneSidedBranch { node_index: usize },
	#[error("node {node_index} references child {child_index}, which is not a valid node")]
	InvalidChild {
		node_index: usize,
		child_index: i64,
	},
	#[error("node {node_index} has default child {default_index}, which is neither of its children")]
	InvalidDefaultChild {
		node_index: usize,
		default_index: i64,
	},
	#[error("node {node_index} splits on invalid feature {feature_index}")]
	InvalidSplitFeature {
		node_index: usize,
		feature_index: i64,
	},
	#[error("node {node_index} is reachable from more than one parent")]
	MultipleParents { node_index: usize },
	#[error("node {node_index} is not reachable from the root")]
	UnreachableNode { node_index: usize },
	#[error("node {node_index} has invalid sample weight {sample_weight}")]
	InvalidSampleWeight {
		node_index: usize,
		sample_weight: f64,
	},
	#[error("an instance has {n_values} values but {n_missing} missing flags")]
	InstanceLengthMismatch { n_values: usize, n_missing: usize },
	#[error("the instances have {expected} and {actual} features")]
	InstanceFeatureCountMismatch { expected: usize, actual: usize },
	#[error("the tree splits on feature {feature_index} but the instance only has {n_features} features")]
	MissingFeatures {
		feature_index: usize,
		n_features: usize,
	},
	#[error("the output buffer has shape {actual:?} but shape {expected:?} is required")]
	BufferShapeMismatch {
		expected: Vec<usize>,
		actual: Vec<usize>,
	},
	#[error("cannot condition on feature {feature_index} of an instance with {n_features} features")]
	InvalidConditionFeature {
		feature_index: usize,
		n_features: usize,
	},
}

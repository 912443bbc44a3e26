use crate::{
	contributions::check_instance, path_dependent_contributions, ComparisonMode, Condition,
	ContributionBuffer, Error, Instance, PathDependentOptions, Tree,
};
use ndarray::prelude::*;

/**
An `InteractionBuffer` holds SHAP interaction values for one instance. It has shape (n_features + 1, n_features + 1, n_outputs). Entry `[j, k]` is half of the interaction between features `j` and `k`, entry `[j, j]` is the part of feature `j`'s contribution not explained by its interactions, and entry `[n_features, n_features]` is the bias.

Like a `ContributionBuffer`, it is only ever added into.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct InteractionBuffer {
	values: Array3<f64>,
}

impl InteractionBuffer {
	pub fn new(n_features: usize, n_outputs: usize) -> Self {
		Self {
			values: Array3::zeros((n_features + 1, n_features + 1, n_outputs)),
		}
	}

	pub fn reset(&mut self) {
		self.values.fill(0.0);
	}

	pub fn n_features(&self) -> usize {
		self.values.shape()[0] - 1
	}

	pub fn n_outputs(&self) -> usize {
		self.values.shape()[2]
	}

	pub fn values(&self) -> ArrayView3<f64> {
		self.values.view()
	}

	/// Summing each row gives the contributions, with the bias in the last row.
	pub fn contributions(&self) -> Array2<f64> {
		self.values.sum_axis(Axis(1))
	}

	pub fn into_array(self) -> Array3<f64> {
		self.values
	}

	fn check(&self, tree: &Tree, instance: Instance) -> Result<(), Error> {
		check_instance(tree, instance)?;
		let n = instance.n_features() + 1;
		let expected = vec![n, n, tree.n_outputs()];
		let actual = self.values.shape().to_vec();
		if expected != actual {
			return Err(Error::BufferShapeMismatch { expected, actual });
		}
		Ok(())
	}
}

/**
Compute the path dependent SHAP interaction values of `instance` for a single tree and add them to `interactions`. Returns the prediction.

For each feature `j` the tree splits on, the contributions of the other features are computed twice, once with `j` always in the coalition and once with `j` never in it. Half of the difference for feature `k` is the interaction `[j, k]`. The rest of `j`'s contribution goes on the diagonal.
*/
pub fn path_dependent_interactions<'a>(
	tree: &'a Tree,
	instance: Instance,
	comparison: ComparisonMode,
	interactions: &mut InteractionBuffer,
) -> Result<ArrayView1<'a, f64>, Error> {
	interactions.check(tree, instance)?;
	let n_features = instance.n_features();
	let n_outputs = tree.n_outputs();
	let mut contributions = ContributionBuffer::new(n_features, n_outputs);
	let options = PathDependentOptions {
		comparison,
		condition: None,
	};
	let prediction = path_dependent_contributions(tree, instance, &options, &mut contributions)?;
	let mut present = ContributionBuffer::new(n_features, n_outputs);
	let mut absent = ContributionBuffer::new(n_features, n_outputs);
	for feature_index in tree.split_features() {
		present.reset();
		absent.reset();
		let options = PathDependentOptions {
			comparison,
			condition: Some(Condition::Present(feature_index)),
		};
		path_dependent_contributions(tree, instance, &options, &mut present)?;
		let options = PathDependentOptions {
			comparison,
			condition: Some(Condition::Absent(feature_index)),
		};
		path_dependent_contributions(tree, instance, &options, &mut absent)?;
		let mut diagonal = contributions.feature(feature_index).to_owned();
		for other_feature_index in (0..n_features).filter(|k| *k != feature_index) {
			for output in 0..n_outputs {
				let interaction = (present.values()[[other_feature_index, output]]
					- absent.values()[[other_feature_index, output]])
					/ 2.0;
				interactions.values[[feature_index, other_feature_index, output]] += interaction;
				diagonal[output] -= interaction;
			}
		}
		interactions
			.values
			.slice_mut(s![feature_index, feature_index, ..])
			.scaled_add(1.0, &diagonal);
	}
	interactions
		.values
		.slice_mut(s![n_features, n_features, ..])
		.scaled_add(1.0, &contributions.bias());
	Ok(prediction)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{compute_expectations, testing::*};

	#[test]
	fn test_rows_sum_to_contributions() {
		let mut tree = Tree::from_arrays(&repeated_feature_arrays()).unwrap();
		compute_expectations(&mut tree);
		for row in instance_rows().iter() {
			let (values, missing) = instance(row);
			let x = Instance::new(&values, &missing).unwrap();
			let mut interactions = InteractionBuffer::new(3, 2);
			path_dependent_interactions(
				&tree,
				x,
				ComparisonMode::LessThanOrEqual,
				&mut interactions,
			)
			.unwrap();
			let mut contributions = ContributionBuffer::new(3, 2);
			path_dependent_contributions(
				&tree,
				x,
				&PathDependentOptions::default(),
				&mut contributions,
			)
			.unwrap();
			assert_close(interactions.contributions().view(), contributions.values());
		}
	}

	#[test]
	fn test_xor() {
		let mut tree = Tree::from_arrays(&xor_arrays()).unwrap();
		compute_expectations(&mut tree);
		let x = Instance::new(&[0.2, 0.2], &[false, false]).unwrap();
		let mut interactions = InteractionBuffer::new(2, 1);
		let prediction = path_dependent_interactions(
			&tree,
			x,
			ComparisonMode::LessThanOrEqual,
			&mut interactions,
		)
		.unwrap();
		assert_eq!(prediction, arr1(&[0.0]));
		let values = interactions.values();
		let values = values.slice(s![.., .., 0]);
		assert_close(
			values,
			arr2(&[[0.0, -0.25, 0.0], [-0.25, 0.0, 0.0], [0.0, 0.0, 0.5]]).view(),
		);
		// The off diagonal entry is half of the Shapley interaction index.
		let v = |coalition: &[bool]| {
			conditional_expectation(&tree, x, ComparisonMode::LessThanOrEqual, coalition)[0]
		};
		let index = v(&[true, true]) - v(&[true, false]) - v(&[false, true]) + v(&[false, false]);
		assert!((values[[0, 1]] - index / 2.0).abs() < 1e-12);
		assert!((values[[1, 0]] - index / 2.0).abs() < 1e-12);
	}

	#[test]
	fn test_buffer_shape_is_checked() {
		let mut tree = Tree::from_arrays(&stump_arrays()).unwrap();
		compute_expectations(&mut tree);
		let x = Instance::new(&[0.2], &[false]).unwrap();
		let mut interactions = InteractionBuffer::new(1, 2);
		let error = path_dependent_interactions(
			&tree,
			x,
			ComparisonMode::LessThanOrEqual,
			&mut interactions,
		)
		.unwrap_err();
		insta::assert_display_snapshot!(error, @"the output buffer has shape [2, 2, 2] but shape [2, 2, 1] is required");
	}
}

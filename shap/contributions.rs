use crate::{Error, Instance, Tree};
use ndarray::prelude::*;

/**
A `ContributionBuffer` holds SHAP values for one instance. It has shape (n_features + 1, n_outputs): row `i` is the contribution of feature `i` and the last row is the bias.

The explainers add into the buffer and never clear it, so explaining every tree of an ensemble with the same buffer yields the contributions of the ensemble. Call `reset` before starting over.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct ContributionBuffer {
	values: Array2<f64>,
}

impl ContributionBuffer {
	pub fn new(n_features: usize, n_outputs: usize) -> Self {
		Self {
			values: Array2::zeros((n_features + 1, n_outputs)),
		}
	}

	/// Set every contribution and the bias back to zero.
	pub fn reset(&mut self) {
		self.values.fill(0.0);
	}

	pub fn n_features(&self) -> usize {
		self.values.nrows() - 1
	}

	pub fn n_outputs(&self) -> usize {
		self.values.ncols()
	}

	pub fn values(&self) -> ArrayView2<f64> {
		self.values.view()
	}

	pub fn values_mut(&mut self) -> ArrayViewMut2<f64> {
		self.values.view_mut()
	}

	/// The feature rows, without the bias.
	pub fn features(&self) -> ArrayView2<f64> {
		self.values.slice(s![..-1, ..])
	}

	pub fn feature(&self, feature_index: usize) -> ArrayView1<f64> {
		self.values.row(feature_index)
	}

	pub fn bias(&self) -> ArrayView1<f64> {
		self.values.row(self.n_features())
	}

	/// The sum of the feature contributions and the bias for each output.
	pub fn total(&self) -> Array1<f64> {
		self.values.sum_axis(Axis(0))
	}

	pub fn into_array(self) -> Array2<f64> {
		self.values
	}

	/// Check that this buffer can hold the contributions of `tree` for `instance`.
	pub(crate) fn check(&self, tree: &Tree, instance: Instance) -> Result<(), Error> {
		check_instance(tree, instance)?;
		let expected = vec![instance.n_features() + 1, tree.n_outputs()];
		let actual = self.values.shape().to_vec();
		if expected != actual {
			return Err(Error::BufferShapeMismatch { expected, actual });
		}
		Ok(())
	}
}

/// Check that `instance` has a value for every feature `tree` splits on.
pub(crate) fn check_instance(tree: &Tree, instance: Instance) -> Result<(), Error> {
	let n_features_required = tree.n_features_required();
	if instance.n_features() < n_features_required {
		return Err(Error::MissingFeatures {
			feature_index: n_features_required - 1,
			n_features: instance.n_features(),
		});
	}
	Ok(())
}

#[test]
fn test_reset() {
	let mut buffer = ContributionBuffer::new(2, 1);
	buffer.values_mut()[[0, 0]] = 1.0;
	buffer.values_mut()[[2, 0]] = 3.0;
	assert_eq!(buffer.total(), arr1(&[4.0]));
	assert_eq!(buffer.bias(), arr1(&[3.0]));
	assert_eq!(buffer.features(), arr2(&[[1.0], [0.0]]));
	buffer.reset();
	assert_eq!(buffer, ContributionBuffer::new(2, 1));
}

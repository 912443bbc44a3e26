use crate::Error;

/// An `Instance` is a feature vector together with a mask of the features whose values are unobserved. The values of missing features are never read.
#[derive(Clone, Copy, Debug)]
pub struct Instance<'a> {
	values: &'a [f64],
	missing: &'a [bool],
}

impl<'a> Instance<'a> {
	pub fn new(values: &'a [f64], missing: &'a [bool]) -> Result<Self, Error> {
		if values.len() != missing.len() {
			return Err(Error::InstanceLengthMismatch {
				n_values: values.len(),
				n_missing: missing.len(),
			});
		}
		Ok(Self { values, missing })
	}

	pub fn n_features(&self) -> usize {
		self.values.len()
	}

	pub fn value(&self, feature_index: usize) -> f64 {
		self.values[feature_index]
	}

	pub fn is_missing(&self, feature_index: usize) -> bool {
		self.missing[feature_index]
	}

	pub fn values(&self) -> &'a [f64] {
		self.values
	}

	pub fn missing(&self) -> &'a [bool] {
		self.missing
	}
}

#[test]
fn test_mismatched_lengths() {
	let error = Instance::new(&[1.0, 2.0], &[false]).unwrap_err();
	assert_eq!(
		error,
		Error::InstanceLengthMismatch {
			n_values: 2,
			n_missing: 1
		}
	);
}

/**
Return the Shapley weight `m! (n - m - 1)! / n!` of a coalition of `m` players out of `n`, which is `1 / (n * C(n - 1, m))`. The independent explainer uses it to split the value of a leaf among the `n` features that were resolved on the way to it, `m` of which took the foreground value. It is zero outside of `0 <= m < n`.
*/
pub fn weight(n: usize, m: usize) -> f64 {
	if n == 0 || m >= n {
		return 0.0;
	}
	1.0 / (n as f64 * binomial_coefficient(n - 1, m))
}

fn binomial_coefficient(n: usize, k: usize) -> f64 {
	let k = k.min(n - k);
	let mut result = 1.0;
	for i in 0..k {
		result *= (n - i) as f64;
		result /= (i + 1) as f64;
	}
	result
}

/// A `WeightTable` holds `weight(n, m)` for every `n` and `m` up to the depth of a tree. It is built once per explanation and only read during the walk.
#[derive(Clone, Debug)]
pub struct WeightTable {
	size: usize,
	weights: Vec<f64>,
}

impl WeightTable {
	pub fn new(max_depth: usize) -> Self {
		let size = max_depth + 1;
		let mut weights = vec![0.0; size * size];
		for m in 0..size {
			for n in 0..size {
				weights[n + size * m] = weight(n, m);
			}
		}
		Self { size, weights }
	}

	pub fn get(&self, n: usize, m: usize) -> f64 {
		self.weights[n + self.size * m]
	}
}

#[test]
fn test_weight_table() {
	let table = WeightTable::new(3);
	let rows: Vec<Vec<f64>> = (0..4)
		.map(|n| (0..4).map(|m| table.get(n, m)).collect())
		.collect();
	insta::assert_debug_snapshot!(rows, @r###"
 [
     [
         0.0,
         0.0,
         0.0,
         0.0,
     ],
     [
         1.0,
         0.0,
         0.0,
         0.0,
     ],
     [
         0.5,
         0.5,
         0.0,
         0.0,
     ],
     [
         0.3333333333333333,
         0.16666666666666666,
         0.3333333333333333,
         0.0,
     ],
 ]
 "###);
}

#[test]
fn test_weights_sum_to_one() {
	// Summing the weight of every coalition of the other n - 1 players gives 1.
	for n in 1..30 {
		let total: f64 = (0..n)
			.map(|m| binomial_coefficient(n - 1, m) * weight(n, m))
			.sum();
		assert!((total - 1.0).abs() < 1e-12, "n = {}", n);
	}
}

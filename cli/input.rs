use anyhow::{format_err, Context, Result};
use itertools::Itertools;
use std::path::Path;
use treeshap::{Tree, TreeArrays};

/// Each row of an instances file is an array of numbers with `null` for missing values.
pub type Row = Vec<Option<f64>>;

/// Read a tree in its flat array encoding from a json file.
pub fn load_tree(path: &Path) -> Result<Tree> {
	let file = std::fs::File::open(path)
		.with_context(|| format!("failed to open tree file {}", path.display()))?;
	let arrays: TreeArrays = serde_json::from_reader(std::io::BufReader::new(file))
		.with_context(|| format!("failed to parse tree file {}", path.display()))?;
	let tree = Tree::from_arrays(&arrays)
		.with_context(|| format!("the tree in {} is invalid", path.display()))?;
	Ok(tree)
}

/// Read a json array of rows, which must all have the same length.
pub fn load_instances(path: &Path) -> Result<Vec<Row>> {
	let file = std::fs::File::open(path)
		.with_context(|| format!("failed to open instances file {}", path.display()))?;
	let rows: Vec<Row> = serde_json::from_reader(std::io::BufReader::new(file))
		.with_context(|| format!("failed to parse instances file {}", path.display()))?;
	if !rows.iter().map(|row| row.len()).all_equal() {
		return Err(format_err!(
			"the rows in {} do not all have the same number of features",
			path.display()
		));
	}
	Ok(rows)
}

/// Read a single row from a json file.
pub fn load_background(path: &Path) -> Result<Row> {
	let file = std::fs::File::open(path)
		.with_context(|| format!("failed to open background file {}", path.display()))?;
	let row = serde_json::from_reader(std::io::BufReader::new(file))
		.with_context(|| format!("failed to parse background file {}", path.display()))?;
	Ok(row)
}

/// Split a row into the values and missing flags an `Instance` borrows. Missing values are stored as NaN, which is never read.
pub fn split_row(row: &[Option<f64>]) -> (Vec<f64>, Vec<bool>) {
	let values = row.iter().map(|value| value.unwrap_or(f64::NAN)).collect();
	let missing = row.iter().map(|value| value.is_none()).collect();
	(values, missing)
}

/// Write `output` as pretty printed json to the file at `path`, or to stdout if there is none.
pub fn write_output<T: serde::Serialize>(output: &T, path: Option<&Path>) -> Result<()> {
	match path {
		Some(path) => {
			let file = std::fs::File::create(path)
				.with_context(|| format!("failed to create output file {}", path.display()))?;
			serde_json::to_writer_pretty(std::io::BufWriter::new(file), output)
				.with_context(|| format!("failed to write output file {}", path.display()))?;
		}
		None => {
			let stdout = std::io::stdout();
			serde_json::to_writer_pretty(stdout.lock(), output)?;
			println!();
		}
	}
	Ok(())
}

#[test]
fn test_split_row() {
	let (values, missing) = split_row(&[Some(1.0), None, Some(-2.5)]);
	assert_eq!(values[0], 1.0);
	assert!(values[1].is_nan());
	assert_eq!(values[2], -2.5);
	assert_eq!(missing, vec![false, true, false]);
}

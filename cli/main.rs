//! This module contains the main entrypoint to the treeshap cli.

use self::{
	config::load_config,
	input::{load_background, load_instances, load_tree, split_row, write_output},
};
use anyhow::{format_err, Context, Result};
use clap::Parser;
use colored::Colorize;
use itertools::Itertools;
use ndarray::prelude::*;
use rayon::prelude::*;
use std::path::PathBuf;
use treeshap::{
	compute_expectations, independent_contributions, path_dependent_contributions,
	path_dependent_interactions, ContributionBuffer, Instance, InteractionBuffer, Tree,
};

mod config;
mod input;

#[derive(Parser)]
#[clap(
	name = "treeshap",
	about = "Explain the predictions of a decision tree with exact SHAP values."
)]
enum Options {
	/// compute the expected value of every branch in a tree
	#[clap(name = "expectations")]
	Expectations(ExpectationsOptions),
	/// compute the SHAP values of each instance
	#[clap(name = "explain")]
	Explain(ExplainOptions),
	/// compute the SHAP interaction values of each instance
	#[clap(name = "interactions")]
	Interactions(InteractionsOptions),
}

#[derive(Parser, Debug)]
struct ExpectationsOptions {
	/// the path to the tree's .json file
	#[clap(short, long)]
	tree: PathBuf,
	/// the path to write the tree with its expected values to
	#[clap(short, long)]
	output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ExplainOptions {
	/// the path to the tree's .json file
	#[clap(short, long)]
	tree: PathBuf,
	/// the path to a .json file with an array of instances to explain
	#[clap(short, long)]
	instances: PathBuf,
	/// the path to a .json file with a single background instance, to compute interventional SHAP values against it
	#[clap(short, long)]
	background: Option<PathBuf>,
	/// the path to a config file
	#[clap(short, long)]
	config: Option<PathBuf>,
	/// the path to write the .json output to
	#[clap(short, long)]
	output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct InteractionsOptions {
	/// the path to the tree's .json file
	#[clap(short, long)]
	tree: PathBuf,
	/// the path to a .json file with an array of instances to explain
	#[clap(short, long)]
	instances: PathBuf,
	/// the path to a config file
	#[clap(short, long)]
	config: Option<PathBuf>,
	/// the path to write the .json output to
	#[clap(short, long)]
	output: Option<PathBuf>,
}

#[derive(serde::Serialize)]
struct ContributionsOutput {
	predictions: Vec<Vec<f64>>,
	/// For each instance, one row per feature followed by the bias, each with one entry per output.
	contributions: Vec<Vec<Vec<f64>>>,
}

#[derive(serde::Serialize)]
struct InteractionsOutput {
	predictions: Vec<Vec<f64>>,
	interactions: Vec<Vec<Vec<Vec<f64>>>>,
}

fn main() {
	let env_filter = format!(
		"{}=info,treeshap=info",
		clap::crate_name!().replace("-", "_")
	);
	let env = env_logger::Env::default().default_filter_or(env_filter);
	env_logger::Builder::from_env(env)
		.format_level(false)
		.format_module_path(false)
		.format_timestamp(None)
		.init();
	let options = Options::parse();
	let result = match options {
		Options::Expectations(options) => cli_expectations(options),
		Options::Explain(options) => cli_explain(options),
		Options::Interactions(options) => cli_interactions(options),
	};
	if let Err(error) = result {
		eprintln!("{}: {:#}", "error".red().bold(), error);
		std::process::exit(1);
	}
}

fn cli_expectations(options: ExpectationsOptions) -> Result<()> {
	let mut tree = load_tree(&options.tree)?;
	let max_depth = compute_expectations(&mut tree);
	eprintln!("max depth: {}", max_depth);
	eprintln!(
		"expected value: [{}]",
		tree.expected_value().iter().join(", ")
	);
	if let Some(output) = options.output.as_deref() {
		write_output(&tree.to_arrays(), Some(output))?;
		eprintln!("The tree was written to {}.", output.display());
	}
	Ok(())
}

fn cli_explain(options: ExplainOptions) -> Result<()> {
	let config = load_config(options.config.as_deref())?;
	let mut tree = load_tree(&options.tree)?;
	compute_expectations(&mut tree);
	let rows = load_instances(&options.instances)?;
	let background = options
		.background
		.as_deref()
		.map(load_background)
		.transpose()?;
	log::info!("explaining {} instances", rows.len());
	let results: Vec<(Vec<f64>, Array2<f64>)> = rows
		.par_iter()
		.enumerate()
		.map(|(row_index, row)| {
			explain_row(&tree, row, background.as_deref(), &config)
				.with_context(|| format!("failed to explain instance {}", row_index))
		})
		.collect::<Result<_>>()?;
	let (predictions, contributions): (Vec<_>, Vec<_>) = results
		.into_iter()
		.map(|(prediction, contributions)| (prediction, to_nested(contributions.view())))
		.unzip();
	write_output(
		&ContributionsOutput {
			predictions,
			contributions,
		},
		options.output.as_deref(),
	)
}

fn explain_row(
	tree: &Tree,
	row: &[Option<f64>],
	background: Option<&[Option<f64>]>,
	config: &config::Config,
) -> Result<(Vec<f64>, Array2<f64>)> {
	let (values, missing) = split_row(row);
	let instance = Instance::new(&values, &missing)?;
	let mut contributions = ContributionBuffer::new(row.len(), tree.n_outputs());
	let prediction = match background {
		Some(background) => {
			if config.condition.is_some() {
				return Err(format_err!(
					"a condition can only be used without a background instance"
				));
			}
			let (background_values, background_missing) = split_row(background);
			let background = Instance::new(&background_values, &background_missing)?;
			independent_contributions(
				tree,
				instance,
				background,
				config.comparison,
				&mut contributions,
			)?
		}
		None => path_dependent_contributions(
			tree,
			instance,
			&config.path_dependent_options(),
			&mut contributions,
		)?,
	};
	Ok((prediction.to_vec(), contributions.into_array()))
}

fn cli_interactions(options: InteractionsOptions) -> Result<()> {
	let config = load_config(options.config.as_deref())?;
	if config.condition.is_some() {
		return Err(format_err!(
			"interaction values condition on every feature, so the config cannot set a condition"
		));
	}
	let mut tree = load_tree(&options.tree)?;
	compute_expectations(&mut tree);
	let rows = load_instances(&options.instances)?;
	log::info!("computing interactions for {} instances", rows.len());
	let results: Vec<(Vec<f64>, Vec<Vec<Vec<f64>>>)> = rows
		.par_iter()
		.enumerate()
		.map(|(row_index, row)| -> Result<_> {
			let (values, missing) = split_row(row);
			let instance = Instance::new(&values, &missing)?;
			let mut interactions = InteractionBuffer::new(row.len(), tree.n_outputs());
			let prediction =
				path_dependent_interactions(&tree, instance, config.comparison, &mut interactions)
					.with_context(|| format!("failed to explain instance {}", row_index))?;
			let interactions = interactions
				.values()
				.outer_iter()
				.map(to_nested)
				.collect();
			Ok((prediction.to_vec(), interactions))
		})
		.collect::<Result<_>>()?;
	let (predictions, interactions): (Vec<_>, Vec<_>) = results.into_iter().unzip();
	write_output(
		&InteractionsOutput {
			predictions,
			interactions,
		},
		options.output.as_deref(),
	)
}

fn to_nested(array: ArrayView2<f64>) -> Vec<Vec<f64>> {
	array.outer_iter().map(|row| row.to_vec()).collect()
}

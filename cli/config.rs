use anyhow::{Context, Result};
use std::path::Path;
use treeshap::{ComparisonMode, Condition, PathDependentOptions};

/// The config file lets you pick how the tree's splits compare values and, for path dependent explanations, condition on one feature.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	#[serde(default)]
	pub comparison: ComparisonMode,
	pub condition: Option<ConditionConfig>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionConfig {
	pub feature: usize,
	/// If true, the feature is always in the coalition. Otherwise it never is.
	pub present: bool,
}

impl Config {
	pub fn path_dependent_options(&self) -> PathDependentOptions {
		let condition = self.condition.as_ref().map(|condition| {
			if condition.present {
				Condition::Present(condition.feature)
			} else {
				Condition::Absent(condition.feature)
			}
		});
		PathDependentOptions {
			comparison: self.comparison,
			condition,
		}
	}
}

pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
	if let Some(config_path) = config_path {
		let config = std::fs::read_to_string(config_path)
			.with_context(|| format!("failed to read config file {}", config_path.display()))?;
		let config = serde_yaml::from_str(&config)
			.with_context(|| format!("failed to parse config file {}", config_path.display()))?;
		Ok(config)
	} else {
		Ok(Config::default())
	}
}

#[test]
fn test_parse_config() {
	let config: Config = serde_yaml::from_str(
		"comparison: less_than\ncondition:\n  feature: 2\n  present: false\n",
	)
	.unwrap();
	let options = config.path_dependent_options();
	assert_eq!(options.comparison, ComparisonMode::LessThan);
	assert_eq!(options.condition, Some(Condition::Absent(2)));

	let config: Config = serde_yaml::from_str("condition:\n  feature: 0\n  present: true\n").unwrap();
	let options = config.path_dependent_options();
	assert_eq!(options.comparison, ComparisonMode::LessThanOrEqual);
	assert_eq!(options.condition, Some(Condition::Present(0)));

	assert!(serde_yaml::from_str::<Config>("comparison: greater_than\n").is_err());
}

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_FITC_REFERENCE: f64 = 0.002208235;
pub const DEFAULT_PACIFIC_BLUE_REFERENCE: f64 = 0.011865047;

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Everything a batch run needs.  Loaded from JSON (all fields optional),
/// then overridden from the command line, then validated once.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub references: References,
    /// Write `<name>_meta.json` next to every exported CSV.
    pub export_metadata: bool,
    pub ridge: RidgeSettings,
    pub scatter: ScatterSettings,
}

/// Background fluorescence ratios used to normalise each channel.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct References {
    pub fitc: f64,
    pub pacific_blue: f64,
}

/// Stacked 1D density figure.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RidgeSettings {
    /// Bandwidth factor is `bandwidth_constant / std(values)`.
    pub bandwidth_constant: f64,
    pub grid_min: f64,
    pub grid_max: f64,
    pub grid_points: usize,
    /// Display multiplier applied to the evaluated density.
    pub amplitude: f64,
    pub y_max: f64,
    pub width_px: u32,
    pub row_height_px: u32,
    /// Extra height below the last row for the x axis.
    pub axis_strip_px: u32,
}

/// Density-coloured log-log scatter figures.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScatterSettings {
    /// Largest point count estimated with the exact KDE.
    pub exact_kde_max_points: usize,
    pub histogram_bins: usize,
    pub axis_min: f64,
    pub axis_max: f64,
    pub size_px: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            references: References::default(),
            export_metadata: true,
            ridge: RidgeSettings::default(),
            scatter: ScatterSettings::default(),
        }
    }
}

impl Default for References {
    fn default() -> Self {
        Self {
            fitc: DEFAULT_FITC_REFERENCE,
            pacific_blue: DEFAULT_PACIFIC_BLUE_REFERENCE,
        }
    }
}

// 5.5 cm wide, 1.5 cm per row, 8 cm square scatter, all at 300 dpi.
impl Default for RidgeSettings {
    fn default() -> Self {
        Self {
            bandwidth_constant: 10.0,
            grid_min: 0.0,
            grid_max: 800.0,
            grid_points: 500,
            amplitude: 10_000.0,
            y_max: 400.0,
            width_px: 650,
            row_height_px: 177,
            axis_strip_px: 40,
        }
    }
}

impl Default for ScatterSettings {
    fn default() -> Self {
        Self {
            exact_kde_max_points: 20_000,
            histogram_bins: 151,
            axis_min: 1.0,
            axis_max: 1_000_000.0,
            size_px: 945,
        }
    }
}

impl Config {
    /// Read a JSON config file.  Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Check every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.references.validate()?;

        let r = &self.ridge;
        if r.grid_points < 2 {
            return Err(ConfigError::InvalidGrid(format!(
                "need at least 2 grid points, got {}",
                r.grid_points
            )));
        }
        if !(r.grid_min < r.grid_max) {
            return Err(ConfigError::InvalidGrid(format!(
                "grid range [{}, {}] is empty",
                r.grid_min, r.grid_max
            )));
        }
        if !(r.y_max > 0.0) || !(r.bandwidth_constant > 0.0) {
            return Err(ConfigError::InvalidGrid(
                "y_max and bandwidth_constant must be positive".to_string(),
            ));
        }

        let s = &self.scatter;
        if s.histogram_bins < 2 {
            return Err(ConfigError::InvalidBins(s.histogram_bins));
        }
        if !(s.axis_min > 0.0 && s.axis_min < s.axis_max) {
            return Err(ConfigError::InvalidAxisRange {
                min: s.axis_min,
                max: s.axis_max,
            });
        }
        Ok(())
    }
}

impl References {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_reference("FITC", self.fitc)?;
        check_reference("Pacific Blue", self.pacific_blue)
    }
}

fn check_reference(channel: &'static str, value: f64) -> Result<(), ConfigError> {
    if value == 0.0 {
        return Err(ConfigError::ZeroReference { channel });
    }
    if !value.is_finite() {
        return Err(ConfigError::NonFiniteReference { channel, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.scatter.exact_kde_max_points, 20_000);
        assert_eq!(config.scatter.histogram_bins, 151);
        assert_eq!(config.ridge.grid_points, 500);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "input_dir": "data/Z1A9", "references": { "fitc": 0.5 }, "export_metadata": false }"#,
        )
        .unwrap();
        assert_eq!(config.input_dir, PathBuf::from("data/Z1A9"));
        assert_eq!(config.references.fitc, 0.5);
        assert_eq!(config.references.pacific_blue, DEFAULT_PACIFIC_BLUE_REFERENCE);
        assert!(!config.export_metadata);
        assert_eq!(config.ridge, RidgeSettings::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: Result<Config, _> = serde_json::from_str(r#"{ "inputdir": "x" }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn zero_reference_is_named() {
        let mut config = Config::default();
        config.references.pacific_blue = 0.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ZeroReference {
                channel: "Pacific Blue"
            }
        ));
    }

    #[test]
    fn bad_density_parameters_are_rejected() {
        let mut config = Config::default();
        config.scatter.histogram_bins = 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBins(1))));

        let mut config = Config::default();
        config.scatter.axis_min = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAxisRange { .. })
        ));

        let mut config = Config::default();
        config.ridge.grid_points = 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGrid(_))));
    }
}

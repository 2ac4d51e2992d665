//! Declarative pipeline recipes.
//!
//! A [`PipelineConfig`] is an ordered list of stages that
//! [`PipelineConfig::build`] appends behind a source port as a linear
//! chain. Recipes are plain serde data, so they can be stored next to a
//! scanned book as JSON:
//!
//! ```json
//! {
//!   "stages": [
//!     { "stage": "gray" },
//!     { "stage": "blur", "kernel_size": 5 },
//!     { "stage": "otsu" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::blur::{DEFAULT_KERNEL_SIZE, GaussianBlurFilter};
use crate::color::{GrayFilter, HlsFilter};
use crate::filter::Filter;
use crate::invert::InverseFilter;
use crate::morphology::{
    AsfFilter, CloseFilter, ElementShape, GradientFilter, OpenFilter, StructuringElement,
};
use crate::pipeline::{CycleMode, Pipeline};
use crate::resize::{Interpolation, ResizeFilter};
use crate::threshold::{
    DEFAULT_LEVEL, DEFAULT_MAX_VALUE, OtsuThresholdFilter, ThresholdFilter, ThresholdMode,
};
use crate::types::{PipelineError, PortId};

/// Default largest radius of an alternate sequential filter.
pub const DEFAULT_ASF_RADIUS: u8 = 2;

/// Default resize factor.
pub const DEFAULT_SCALE: f64 = 1.0;

const fn default_kernel_size() -> u32 {
    DEFAULT_KERNEL_SIZE
}

const fn default_level() -> f64 {
    DEFAULT_LEVEL
}

const fn default_max_value() -> f64 {
    DEFAULT_MAX_VALUE
}

const fn default_asf_radius() -> u8 {
    DEFAULT_ASF_RADIUS
}

const fn default_scale() -> f64 {
    DEFAULT_SCALE
}

const fn default_true() -> bool {
    true
}

/// One stage of a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageConfig {
    /// Convert to gray (gray input passes through).
    Gray,
    /// Convert RGB to normalised HLS.
    Hls,
    /// Gaussian blur.
    Blur {
        /// Odd kernel size.
        #[serde(default = "default_kernel_size")]
        kernel_size: u32,
        /// Sigma; non-positive derives it from `kernel_size`.
        #[serde(default)]
        sigma: f32,
    },
    /// Fixed-level threshold.
    Threshold {
        /// Samples at or below this become 0.
        #[serde(default = "default_level")]
        level: f64,
        /// Value written above the level in binary mode.
        #[serde(default = "default_max_value")]
        max_value: f64,
        /// Binary or to-zero.
        #[serde(default)]
        mode: ThresholdMode,
    },
    /// Otsu binarisation.
    Otsu,
    /// Gray level inversion.
    Inverse,
    /// Morphological opening.
    Open {
        /// Structuring element.
        #[serde(default)]
        element: StructuringElement,
    },
    /// Morphological closing.
    Close {
        /// Structuring element.
        #[serde(default)]
        element: StructuringElement,
    },
    /// Morphological gradient.
    Gradient {
        /// Structuring element.
        #[serde(default)]
        element: StructuringElement,
    },
    /// Alternate sequential filter.
    Asf {
        /// Largest element radius.
        #[serde(default = "default_asf_radius")]
        max_radius: u8,
        /// Element shape.
        #[serde(default)]
        shape: ElementShape,
        /// Open before closing at each radius.
        #[serde(default = "default_true")]
        open_first: bool,
    },
    /// Rescale.
    Resize {
        /// Scale factor.
        #[serde(default = "default_scale")]
        scale: f64,
        /// Resampling filter.
        #[serde(default)]
        interpolation: Interpolation,
    },
}

impl StageConfig {
    /// Check parameters that would otherwise only fail during an update.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// invalid parameter.
    pub fn validate(&self) -> Result<(), PipelineError> {
        match *self {
            Self::Blur { kernel_size, sigma } => {
                if kernel_size == 0 || kernel_size % 2 == 0 {
                    return Err(PipelineError::InvalidConfig(format!(
                        "blur kernel_size must be odd, got {kernel_size}"
                    )));
                }
                if !sigma.is_finite() {
                    return Err(PipelineError::InvalidConfig(format!(
                        "blur sigma must be finite, got {sigma}"
                    )));
                }
            }
            Self::Threshold { level, max_value, .. } => {
                if !level.is_finite() || !max_value.is_finite() {
                    return Err(PipelineError::InvalidConfig(format!(
                        "threshold level ({level}) and max_value ({max_value}) must be finite"
                    )));
                }
            }
            Self::Asf { max_radius, .. } => {
                if max_radius == 0 {
                    return Err(PipelineError::InvalidConfig(
                        "asf max_radius must be >= 1".to_owned(),
                    ));
                }
            }
            Self::Resize { scale, .. } => {
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "resize scale must be positive and finite, got {scale}"
                    )));
                }
            }
            Self::Open { element } | Self::Close { element } | Self::Gradient { element } => {
                element.validate().map_err(PipelineError::InvalidConfig)?;
            }
            Self::Gray | Self::Hls | Self::Otsu | Self::Inverse => {}
        }
        Ok(())
    }

    /// Instantiate the stage's filter.
    #[must_use]
    pub fn to_filter(&self) -> Box<dyn Filter> {
        match *self {
            Self::Gray => Box::new(GrayFilter),
            Self::Hls => Box::new(HlsFilter),
            Self::Blur { kernel_size, sigma } => {
                Box::new(GaussianBlurFilter::new(kernel_size, sigma))
            }
            Self::Threshold {
                level,
                max_value,
                mode,
            } => Box::new(ThresholdFilter::new(level, max_value).with_mode(mode)),
            Self::Otsu => Box::new(OtsuThresholdFilter::new()),
            Self::Inverse => Box::new(InverseFilter),
            Self::Open { element } => Box::new(OpenFilter::new(element)),
            Self::Close { element } => Box::new(CloseFilter::new(element)),
            Self::Gradient { element } => Box::new(GradientFilter::new(element)),
            Self::Asf {
                max_radius,
                shape,
                open_first,
            } => Box::new(AsfFilter::new(max_radius, shape, open_first)),
            Self::Resize {
                scale,
                interpolation,
            } => Box::new(ResizeFilter::new(scale).with_interpolation(interpolation)),
        }
    }
}

/// A linear recipe of stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stages in processing order.
    pub stages: Vec<StageConfig>,

    /// Loop policy of the pipeline the recipe is run in.
    #[serde(default)]
    pub cycle_mode: CycleMode,
}

impl Default for PipelineConfig {
    /// Gray conversion followed by a fixed threshold at
    /// [`DEFAULT_LEVEL`].
    fn default() -> Self {
        Self {
            stages: vec![
                StageConfig::Gray,
                StageConfig::Threshold {
                    level: DEFAULT_LEVEL,
                    max_value: DEFAULT_MAX_VALUE,
                    mode: ThresholdMode::Binary,
                },
            ],
            cycle_mode: CycleMode::default(),
        }
    }
}

impl PipelineConfig {
    /// Check every stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first invalid
    /// stage.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (index, stage) in self.stages.iter().enumerate() {
            stage.validate().map_err(|err| match err {
                PipelineError::InvalidConfig(reason) => {
                    PipelineError::InvalidConfig(format!("stage {index}: {reason}"))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Append the recipe behind `source` and return the last output port
    /// (`source` itself for an empty recipe).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if validation fails
    /// (nothing is added then), or any wiring error from
    /// [`Pipeline::chain`].
    pub fn build(&self, pipeline: &mut Pipeline, source: PortId) -> Result<PortId, PipelineError> {
        self.validate()?;
        pipeline.chain(source, self.stages.iter().map(StageConfig::to_filter))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_is_gray_then_threshold() {
        let config = PipelineConfig::default();
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.stages[0], StageConfig::Gray);
        assert!(matches!(
            config.stages[1],
            StageConfig::Threshold {
                level,
                max_value,
                mode: ThresholdMode::Binary,
            } if (level - 128.0).abs() < f64::EPSILON && (max_value - 255.0).abs() < f64::EPSILON
        ));
        assert_eq!(config.cycle_mode, CycleMode::Lenient);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_round_trip() {
        let config = PipelineConfig {
            stages: vec![
                StageConfig::Hls,
                StageConfig::Blur {
                    kernel_size: 5,
                    sigma: 1.5,
                },
                StageConfig::Open {
                    element: StructuringElement::disk(2),
                },
                StageConfig::Close {
                    element: StructuringElement::rect(4, 0),
                },
                StageConfig::Threshold {
                    level: 40.0,
                    max_value: 255.0,
                    mode: ThresholdMode::ToZero,
                },
                StageConfig::Asf {
                    max_radius: 3,
                    shape: ElementShape::Diamond,
                    open_first: false,
                },
                StageConfig::Resize {
                    scale: 0.5,
                    interpolation: Interpolation::Lanczos3,
                },
            ],
            cycle_mode: CycleMode::Strict,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let json = r#"{"stages":[
            {"stage":"blur"},
            {"stage":"threshold"},
            {"stage":"close"},
            {"stage":"asf"}
        ]}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.stages,
            vec![
                StageConfig::Blur {
                    kernel_size: DEFAULT_KERNEL_SIZE,
                    sigma: 0.0
                },
                StageConfig::Threshold {
                    level: DEFAULT_LEVEL,
                    max_value: DEFAULT_MAX_VALUE,
                    mode: ThresholdMode::Binary,
                },
                StageConfig::Close {
                    element: StructuringElement::square(1)
                },
                StageConfig::Asf {
                    max_radius: DEFAULT_ASF_RADIUS,
                    shape: ElementShape::Square,
                    open_first: true
                },
            ]
        );
        assert_eq!(config.cycle_mode, CycleMode::Lenient);
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let json = r#"{"stages":[{"stage":"sharpen"}]}"#;
        assert!(serde_json::from_str::<PipelineConfig>(json).is_err());
    }

    #[test]
    fn validation_names_the_stage() {
        let config = PipelineConfig {
            stages: vec![
                StageConfig::Gray,
                StageConfig::Blur {
                    kernel_size: 4,
                    sigma: 0.0,
                },
            ],
            cycle_mode: CycleMode::Lenient,
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid pipeline configuration: stage 1: blur kernel_size must be odd, got 4"
        );
    }

    #[test]
    fn validation_rejects_bad_parameters() {
        for stage in [
            StageConfig::Resize {
                scale: 0.0,
                interpolation: Interpolation::Nearest,
            },
            StageConfig::Asf {
                max_radius: 0,
                shape: ElementShape::Disk,
                open_first: true,
            },
            StageConfig::Threshold {
                level: f64::NAN,
                max_value: 1.0,
                mode: ThresholdMode::ToZero,
            },
            StageConfig::Gradient {
                element: StructuringElement {
                    vertical_radius: Some(2),
                    ..StructuringElement::diamond(1)
                },
            },
        ] {
            assert!(matches!(stage.validate(), Err(PipelineError::InvalidConfig(_))));
        }
    }

    #[test]
    fn build_appends_one_node_per_stage() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(crate::source::Loader::new());
        let head = pipeline.output(source).unwrap();
        let tail = PipelineConfig::default().build(&mut pipeline, head).unwrap();
        assert_ne!(tail, head);
        assert_eq!(pipeline.node_ids().count(), 3);
        let names: Vec<&str> = pipeline
            .topological_order()
            .unwrap()
            .into_iter()
            .map(|id| pipeline.node_name(id).unwrap())
            .collect();
        assert_eq!(names, vec!["loader", "gray", "threshold"]);
    }

    #[test]
    fn invalid_recipe_adds_nothing() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(crate::source::Loader::new());
        let head = pipeline.output(source).unwrap();
        let config = PipelineConfig {
            stages: vec![StageConfig::Resize {
                scale: -1.0,
                interpolation: Interpolation::default(),
            }],
            cycle_mode: CycleMode::Lenient,
        };
        assert!(config.build(&mut pipeline, head).is_err());
        assert_eq!(pipeline.node_ids().count(), 1);
    }
}

//! Print settings for a slicing job.

use serde::{Deserialize, Serialize};

use crate::errors::SlicerError;
use crate::float_types::{NOZZLE_WIDTH, Real};

/// Every parameter a slicing job reads. Distances are millimetres, speeds
/// are the feed values written verbatim into `F` words.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceSettings {
    /// Printable bed size in X.
    pub bed_width: Real,
    /// Printable bed size in Y.
    pub bed_length: Real,
    /// Printable height in Z.
    pub bed_height: Real,

    /// Height of one layer.
    pub layer_height: Real,
    /// Total wall thickness; the shell count is this rounded up to whole
    /// extrusion widths.
    pub shell_thickness: Real,
    /// Thickness of the solid skins; the solid layer count is this rounded
    /// up to whole layers.
    pub top_bottom_thickness: Real,

    /// Number of priming rings around the first layer. Zero disables the
    /// skirt.
    pub skirt_line_count: u32,
    /// Clearance between the model and the innermost skirt ring.
    pub skirt_distance: Real,

    /// Sparse infill density in percent; 100 packs lines solid.
    pub infill_density: Real,

    pub print_speed: u32,
    pub infill_speed: u32,
    pub top_bottom_speed: u32,
    pub first_line_speed: u32,
    pub travel_speed: u32,
    pub retraction_speed: u32,
    /// Filament pull-back length in millimetres; zero disables retraction.
    pub retraction_distance: Real,

    /// Hot-end target; `None` skips the heat-and-wait preamble.
    pub print_temperature: Option<u32>,

    /// How many layers of sparse infill may be merged into one extra-thick
    /// pass. Reserved for the infill-combination extension; the pipeline
    /// currently slices every layer individually.
    pub infill_combination_count: u32,
}

impl Default for SliceSettings {
    fn default() -> Self {
        Self {
            bed_width: 100.0,
            bed_length: 100.0,
            bed_height: 100.0,
            layer_height: 0.2,
            shell_thickness: 1.5,
            top_bottom_thickness: 1.2,
            skirt_line_count: 3,
            skirt_distance: 5.0,
            infill_density: 20.0,
            print_speed: 60,
            infill_speed: 100,
            top_bottom_speed: 15,
            first_line_speed: 15,
            travel_speed: 80,
            retraction_speed: 45,
            retraction_distance: 3.5,
            print_temperature: Some(200),
            infill_combination_count: 1,
        }
    }
}

impl SliceSettings {
    /// Number of concentric shells to print, from the configured wall
    /// thickness.
    pub fn shell_count(&self) -> usize {
        (self.shell_thickness / NOZZLE_WIDTH).ceil().max(0.0) as usize
    }

    /// Number of layers that make up a solid top or bottom skin.
    pub fn solid_layer_count(&self) -> usize {
        (self.top_bottom_thickness / self.layer_height).ceil().max(0.0) as usize
    }

    /// Range-check everything before committing to a job.
    pub fn validate(&self) -> Result<(), SlicerError> {
        fn positive(name: &'static str, v: Real) -> Result<(), SlicerError> {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(SlicerError::InvalidSetting {
                    name,
                    reason: format!("must be positive, got {v}"),
                })
            }
        }

        positive("bed_width", self.bed_width)?;
        positive("bed_length", self.bed_length)?;
        positive("bed_height", self.bed_height)?;
        positive("layer_height", self.layer_height)?;

        if !(self.infill_density > 0.0 && self.infill_density <= 100.0) {
            return Err(SlicerError::InvalidSetting {
                name: "infill_density",
                reason: format!("must be in (0, 100], got {}", self.infill_density),
            });
        }
        if self.shell_thickness < 0.0 || !self.shell_thickness.is_finite() {
            return Err(SlicerError::InvalidSetting {
                name: "shell_thickness",
                reason: format!("must be non-negative, got {}", self.shell_thickness),
            });
        }
        if self.top_bottom_thickness < 0.0 || !self.top_bottom_thickness.is_finite() {
            return Err(SlicerError::InvalidSetting {
                name: "top_bottom_thickness",
                reason: format!("must be non-negative, got {}", self.top_bottom_thickness),
            });
        }
        if self.retraction_distance < 0.0 || !self.retraction_distance.is_finite() {
            return Err(SlicerError::InvalidSetting {
                name: "retraction_distance",
                reason: format!("must be non-negative, got {}", self.retraction_distance),
            });
        }
        if self.skirt_distance < 0.0 || !self.skirt_distance.is_finite() {
            return Err(SlicerError::InvalidSetting {
                name: "skirt_distance",
                reason: format!("must be non-negative, got {}", self.skirt_distance),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SliceSettings::default().validate().is_ok());
    }

    #[test]
    fn shell_count_rounds_up() {
        let mut settings = SliceSettings::default();
        settings.shell_thickness = 1.5;
        assert_eq!(settings.shell_count(), 3);
        settings.shell_thickness = 0.5;
        assert_eq!(settings.shell_count(), 1);
        settings.shell_thickness = 0.0;
        assert_eq!(settings.shell_count(), 0);
    }

    #[test]
    fn solid_layer_count_rounds_up() {
        let mut settings = SliceSettings::default();
        settings.top_bottom_thickness = 1.2;
        settings.layer_height = 0.25;
        assert_eq!(settings.solid_layer_count(), 5);
    }

    #[test]
    fn zero_layer_height_rejected() {
        let settings = SliceSettings {
            layer_height: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn density_out_of_range_rejected() {
        let settings = SliceSettings {
            infill_density: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
        let settings = SliceSettings {
            infill_density: 150.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}

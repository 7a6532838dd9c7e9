//! Raw form state and the validation that turns it into a `RenderConfiguration`.
//!
//! Submission and preview both go through `FormState::build`, so the two paths reject
//! exactly the same inputs.

use crate::error::ValidationError;
use crate::model::{OutputFormat, RenderConfiguration, Resolution};

pub const MIN_CUSTOM_DIMENSION: u32 = 100;

/// Everything the user typed or picked, unvalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub repo_path: String,
    /// Empty means "current branch" (server default).
    pub branch: String,
    pub format: OutputFormat,
    pub resolution: Resolution,
    pub width: String,
    pub height: String,
    pub fps: String,
    pub bg_color: String,
    pub text_color: String,
    pub font_size: String,
    pub no_email: bool,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            repo_path: String::new(),
            branch: String::new(),
            format: OutputFormat::Mp4,
            resolution: Resolution::P1080,
            width: String::new(),
            height: String::new(),
            fps: "2".into(),
            bg_color: "#141618".into(),
            text_color: "#FFFFFF".into(),
            font_size: "15".into(),
            no_email: false,
        }
    }
}

impl FormState {
    pub fn trimmed_repo_path(&self) -> &str {
        self.repo_path.trim()
    }

    /// Validate the form. Pure: no I/O, no mutation.
    pub fn build(&self) -> Result<RenderConfiguration, ValidationError> {
        let repo_path = self.trimmed_repo_path();
        if repo_path.is_empty() {
            return Err(ValidationError::MissingRepoPath);
        }

        let (width, height) = if self.resolution.is_custom() {
            (
                Some(parse_dimension("Width", &self.width)?),
                Some(parse_dimension("Height", &self.height)?),
            )
        } else {
            (None, None)
        };

        let branch = self.branch.trim();

        Ok(RenderConfiguration {
            repo_path: repo_path.to_string(),
            branch: (!branch.is_empty()).then(|| branch.to_string()),
            format: self.format,
            resolution: self.resolution,
            width,
            height,
            fps: parse_positive("FPS", &self.fps)?,
            bg_color: self.bg_color.trim().to_string(),
            text_color: self.text_color.trim().to_string(),
            font_size: parse_positive("Font size", &self.font_size)?,
            no_email: self.no_email,
        })
    }
}

fn parse_dimension(field: &'static str, input: &str) -> Result<u32, ValidationError> {
    match input.trim().parse::<u32>() {
        Ok(v) if v >= MIN_CUSTOM_DIMENSION => Ok(v),
        _ => Err(ValidationError::InvalidDimension {
            field,
            input: input.to_string(),
            min: MIN_CUSTOM_DIMENSION,
        }),
    }
}

fn parse_positive(field: &'static str, input: &str) -> Result<u32, ValidationError> {
    match input.trim().parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ValidationError::InvalidNumber {
            field,
            input: input.to_string(),
        }),
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ImageBatchError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub status: String,
    pub mode: String,
    pub prompt: String,
    pub output_size: String,
    pub temperature: f64,
    pub aspect_ratio: String,

    // vendor side
    pub batch_job_name: Option<String>,
    pub batch_temp_file: Option<String>,

    pub total_items: i64,
    pub completed_items: i64,
    pub failed_items: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn job_status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }

    pub fn job_mode(&self) -> anyhow::Result<JobMode> {
        JobMode::parse(&self.mode)
            .ok_or_else(|| anyhow::anyhow!("job {} has unknown mode {}", self.id, self.mode))
    }

    /// Output settings as stored on the row.
    pub fn output_config(&self) -> anyhow::Result<OutputConfig> {
        let size = OutputSize::parse(&self.output_size).ok_or_else(|| {
            anyhow::anyhow!("job {} has unknown output size {}", self.id, self.output_size)
        })?;
        let aspect_ratio = AspectRatio::parse(&self.aspect_ratio).ok_or_else(|| {
            anyhow::anyhow!("job {} has unknown aspect ratio {}", self.id, self.aspect_ratio)
        })?;
        Ok(OutputConfig {
            size,
            aspect_ratio,
            temperature: self.temperature,
        })
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.job_status(),
            Some(JobStatus::Pending | JobStatus::Processing)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub input_prompt: Option<String>,
    pub input_image_path: Option<String>,
    pub output_image_path: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobItem {
    pub fn item_status(&self) -> Option<ItemStatus> {
        ItemStatus::parse(&self.status)
    }
}

/// A job plus its items, validated and ready to insert.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub mode: JobMode,
    pub prompt: String,
    pub output: OutputConfig,
    /// Prompts for text-to-image, source image paths for image-to-image.
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobMode {
    #[serde(rename = "text-to-image")]
    TextToImage,
    #[serde(rename = "image-to-image")]
    ImageToImage,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::TextToImage => "text-to-image",
            JobMode::ImageToImage => "image-to-image",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text-to-image" => Some(Self::TextToImage),
            "image-to-image" => Some(Self::ImageToImage),
            _ => None,
        }
    }

    /// Short tag used in scratch file and batch display names.
    pub fn short_tag(&self) -> &'static str {
        match self {
            JobMode::TextToImage => "t2i",
            JobMode::ImageToImage => "i2i",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSize {
    #[default]
    OneK,
    TwoK,
    FourK,
}

impl OutputSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSize::OneK => "1K",
            OutputSize::TwoK => "2K",
            OutputSize::FourK => "4K",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1K" => Some(Self::OneK),
            "2K" => Some(Self::TwoK),
            "4K" => Some(Self::FourK),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Landscape16x9,
    Portrait9x16,
    Landscape4x3,
    Portrait3x4,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait3x4 => "3:4",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1:1" => Some(Self::Square),
            "16:9" => Some(Self::Landscape16x9),
            "9:16" => Some(Self::Portrait9x16),
            "4:3" => Some(Self::Landscape4x3),
            "3:4" => Some(Self::Portrait3x4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputConfig {
    pub size: OutputSize,
    pub aspect_ratio: AspectRatio,
    pub temperature: f64,
}

pub const MAX_TEMPERATURE: f64 = 2.0;

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            size: OutputSize::OneK,
            aspect_ratio: AspectRatio::Square,
            temperature: 1.0,
        }
    }
}

impl OutputConfig {
    /// Build from optional request fields, falling back to defaults.
    pub fn from_parts(
        size: Option<&str>,
        aspect_ratio: Option<&str>,
        temperature: Option<f64>,
    ) -> Result<Self, ImageBatchError> {
        let size = match size {
            Some(s) => OutputSize::parse(s)
                .ok_or_else(|| ImageBatchError::Validation(format!("Invalid output size: {s}")))?,
            None => OutputSize::default(),
        };
        let aspect_ratio = match aspect_ratio {
            Some(s) => AspectRatio::parse(s)
                .ok_or_else(|| ImageBatchError::Validation(format!("Invalid aspect ratio: {s}")))?,
            None => AspectRatio::default(),
        };
        let temperature = temperature.unwrap_or(1.0);
        if !temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(ImageBatchError::Validation(format!(
                "Temperature must be between 0 and {MAX_TEMPERATURE}"
            )));
        }
        Ok(Self {
            size,
            aspect_ratio,
            temperature,
        })
    }
}

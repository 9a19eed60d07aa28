// crates/imagebatch/src/jobs/request.rs
//
// One generation request per job item, serialized as a JSON line
// `{"key": <item id>, "request": {...}}`.

use base64::prelude::*;
use serde::Serialize;
use std::path::Path;

use crate::jobs::model::OutputConfig;
use crate::store::blobs::mime_for_extension;

/// What a single item asks the model to produce.
#[derive(Debug, Clone)]
pub enum GenerationInput {
    Text { prompt: String },
    Image { prompt: String, path: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchLine {
    pub key: String,
    pub request: GenerateRequest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Inline {
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f64,
    pub response_modalities: Vec<String>,
    pub image_config: ImageConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub image_size: String,
    pub aspect_ratio: String,
}

impl GenerationInput {
    /// Build the vendor request. Image inputs are read from disk and inlined.
    pub async fn to_request(&self, output: &OutputConfig) -> anyhow::Result<GenerateRequest> {
        let parts = match self {
            GenerationInput::Text { prompt } => vec![Part::Text {
                text: prompt.clone(),
            }],
            GenerationInput::Image { prompt, path } => {
                let bytes = tokio::fs::read(path).await?;
                vec![
                    Part::Text {
                        text: prompt.clone(),
                    },
                    Part::Inline {
                        inline_data: InlineData {
                            data: BASE64_STANDARD.encode(bytes),
                            mime_type: source_mime(path).to_string(),
                        },
                    },
                ]
            }
        };

        Ok(GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: output.temperature,
                response_modalities: vec!["IMAGE".to_string()],
                image_config: ImageConfig {
                    image_size: output.size.as_str().to_string(),
                    aspect_ratio: output.aspect_ratio.as_str().to_string(),
                },
            },
        })
    }
}

// unknown extensions go out as jpeg
fn source_mime(path: &str) -> &'static str {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(mime_for_extension)
        .unwrap_or("image/jpeg")
}

/// Serialize lines as JSONL and write them to `path`.
pub async fn write_jsonl(path: &Path, lines: &[BatchLine]) -> anyhow::Result<()> {
    let mut out = String::new();
    for line in lines {
        out.push_str(&serde_json::to_string(line)?);
        out.push('\n');
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, out).await?;
    Ok(())
}

//! Configuration structures for the extraction pipeline.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GstxError;

/// Main configuration for the gstx pipeline.
///
/// Built once at startup and passed by reference into every stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GstxConfig {
    /// Text acquisition configuration.
    pub pdf: PdfConfig,

    /// OCR backend configuration.
    pub ocr: OcrConfig,

    /// Model backend configuration.
    pub model: ModelConfig,

    /// Field extraction and scoring configuration.
    pub extraction: ExtractionConfig,

    /// Export configuration.
    pub output: OutputConfig,
}

/// Text acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// A page's text layer is accepted when its trimmed length exceeds this.
    pub min_text_chars: usize,

    /// OCR output for a page is accepted when its trimmed length exceeds this.
    pub min_ocr_chars: usize,

    /// DPI for rasterizing pages.
    pub render_dpi: u32,

    /// How pages are turned into images for OCR.
    pub rasterizer: RasterizerKind,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 50,
            min_ocr_chars: 10,
            render_dpi: 300,
            rasterizer: RasterizerKind::Pdftoppm,
        }
    }
}

/// Page rasterization backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterizerKind {
    /// Render pages with poppler's `pdftoppm`.
    Pdftoppm,
    /// Use the images embedded in each page.
    Embedded,
}

/// OCR backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Which OCR engine to use.
    pub backend: OcrBackendKind,

    /// Tesseract language code.
    pub language: String,

    /// Directory with ONNX OCR models (det.onnx, latin_rec.onnx, latin_dict.txt).
    pub model_dir: PathBuf,

    /// Keep `[UNK]` tokens from the ONNX recognizer.
    pub keep_unk: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackendKind::Tesseract,
            language: "eng".to_string(),
            model_dir: PathBuf::from("models"),
            keep_unk: false,
        }
    }
}

/// OCR engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackendKind {
    /// `tesseract` command-line tool.
    Tesseract,
    /// Pure Rust ONNX engine (requires the `native` feature).
    Onnx,
}

/// How the API key is sent to the model endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `api-key: <key>` header (Azure OpenAI style).
    ApiKey,
    /// `Authorization: Bearer <key>`.
    Bearer,
}

/// Model backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Chat completions endpoint URL.
    pub endpoint: Option<String>,

    /// API key for the endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub auth: AuthScheme,

    /// Model name, for endpoints that take one in the request body.
    pub model: Option<String>,

    pub max_tokens: u32,

    pub temperature: f64,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Retries after a rate-limit response.
    pub max_retries: u32,

    /// Wait before retrying a rate-limited request, in seconds.
    pub backoff_secs: u64,

    /// Attach image documents to the request as well as their OCR text.
    pub send_images: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            auth: AuthScheme::ApiKey,
            model: None,
            max_tokens: 1000,
            temperature: 0.3,
            timeout_secs: 120,
            max_retries: 1,
            backoff_secs: 10,
            send_images: false,
        }
    }
}

/// Field extraction strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Regular expressions over known label conventions.
    #[default]
    Pattern,
    /// Delegate to a generative model returning JSON.
    Model,
}

impl ExtractionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStrategy::Pattern => "pattern",
            ExtractionStrategy::Model => "model",
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionStrategy {
    type Err = GstxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pattern" | "regex" => Ok(ExtractionStrategy::Pattern),
            "model" | "llm" => Ok(ExtractionStrategy::Model),
            other => Err(GstxError::Config(format!("unknown strategy: {}", other))),
        }
    }
}

/// Trust scoring policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    /// Trusted iff no field has low confidence.
    Tier,
    /// Trusted iff the averaged field score exceeds the threshold.
    Average,
}

impl FromStr for ScorerKind {
    type Err = GstxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tier" | "tiers" => Ok(ScorerKind::Tier),
            "average" | "avg" => Ok(ScorerKind::Average),
            other => Err(GstxError::Config(format!("unknown scorer: {}", other))),
        }
    }
}

/// Field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub strategy: ExtractionStrategy,

    /// Trust scorer; unset means the one paired with the strategy.
    pub scorer: Option<ScorerKind>,

    /// Average score a document must exceed to be trusted.
    pub trust_threshold: f64,

    /// Documents processed concurrently.
    pub jobs: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            strategy: ExtractionStrategy::Pattern,
            scorer: None,
            trust_threshold: 0.8,
            jobs: 4,
        }
    }
}

impl ExtractionConfig {
    /// The scorer in effect: the configured one, else the averaged score for
    /// pattern extraction and confidence tiers for model extraction.
    pub fn scorer_kind(&self) -> ScorerKind {
        self.scorer.unwrap_or(match self.strategy {
            ExtractionStrategy::Pattern => ScorerKind::Average,
            ExtractionStrategy::Model => ScorerKind::Tier,
        })
    }
}

/// Export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for export files.
    pub dir: PathBuf,

    /// File stem shared by the spreadsheet and CSV exports.
    pub file_stem: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            file_stem: "extracted_invoice_data".to_string(),
        }
    }
}

impl GstxConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Apply endpoint and key overrides from the environment.
    ///
    /// `GSTX_MODEL_*` variables win over the legacy `GPT4V_*` names.
    pub fn with_env_overrides(mut self) -> Self {
        let var = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| std::env::var(n).ok())
                .filter(|v| !v.trim().is_empty())
        };

        if let Some(endpoint) = var(&["GSTX_MODEL_ENDPOINT", "GPT4V_ENDPOINT"]) {
            self.model.endpoint = Some(endpoint);
        }
        if let Some(key) = var(&["GSTX_MODEL_API_KEY", "GPT4V_KEY"]) {
            self.model.api_key = Some(key);
        }
        if let Some(model) = var(&["GSTX_MODEL_NAME"]) {
            self.model.model = Some(model);
        }
        self
    }

    /// Check the configuration before any document is processed.
    pub fn validate(&self) -> Result<(), GstxError> {
        if self.extraction.jobs == 0 {
            return Err(GstxError::Config("extraction.jobs must be at least 1".to_string()));
        }

        if self.extraction.strategy == ExtractionStrategy::Model {
            let missing = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
            if missing(&self.model.endpoint) || missing(&self.model.api_key) {
                return Err(GstxError::Config(
                    "API key or endpoint not found (set GSTX_MODEL_ENDPOINT and GSTX_MODEL_API_KEY)"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

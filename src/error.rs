// src/error.rs

use thiserror::Error;

/// Any failure that aborts an upload. Every variant is fatal for the
/// current upload; nothing is retried.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Format(#[from] FormatError),

    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Validation(#[from] ValidationError),
}

/// Problems turning an uploaded file into something the model can read.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),

    #[error("failed to parse spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("spreadsheet has no sheets")]
    NoSheets,
}

/// Transport and model-side failures of the extraction call.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("{0} env var required for the extraction service")]
    MissingCredential(String),

    #[error("request to extraction service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("extraction service error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("empty response from extraction service")]
    EmptyResponse,
}

/// The model answered, but not with a usable JSON object.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("no JSON object found in model response")]
    NoObject,

    #[error("malformed JSON in model response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Products array is empty or missing")]
    ProductsMissing,

    #[error("{0} is not an object")]
    GroupNotObject(&'static str),

    #[error("product #{0} is not an object")]
    ProductNotObject(usize),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to edit config: {0}")]
    Edit(#[from] toml_edit::TomlError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

//! Channel schema loading
//!
//! Schema documents are node-indexed maps of channel metadata, either JSON
//! (`{"31": {"10": {"name": "...", "decimals": 1, "unit": "°C"}}}`) or YAML.
//! The format is chosen by file extension; anything not `.yaml`/`.yml` is JSON.

use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, error, info};

use super::{AnalogueChannel, ChannelSchema, DigitalChannel, NodeMap};
use crate::{CoeError, Result};

/// Document format of a schema file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    Json,
    Yaml,
}

impl SchemaFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase) {
            Some(ext) if ext == "yaml" || ext == "yml" => SchemaFormat::Yaml,
            _ => SchemaFormat::Json,
        }
    }
}

impl ChannelSchema {
    /// Load both schema documents from disk.
    ///
    /// A missing file is logged and leaves that half of the schema empty so
    /// an unconfigured gateway still ingests frames. A document that exists
    /// but does not parse is an error.
    pub fn load(analogue: &Path, digital: &Path) -> Result<Self> {
        let analogue_map = load_side::<AnalogueChannel>(analogue)?;
        let digital_map = load_side::<DigitalChannel>(digital)?;

        let schema = ChannelSchema::new(analogue_map, digital_map);
        info!(
            analogue = %analogue.display(),
            digital = %digital.display(),
            "Loaded channel schema ({} analogue, {} digital channels)",
            schema.channel_count(crate::ChannelKind::Analogue),
            schema.channel_count(crate::ChannelKind::Digital)
        );
        Ok(schema)
    }

    /// Parse an analogue schema document.
    pub fn parse_analogue(text: &str, format: SchemaFormat) -> Result<NodeMap<AnalogueChannel>> {
        parse_document(text, format, "analogue schema")
    }

    /// Parse a digital schema document.
    pub fn parse_digital(text: &str, format: SchemaFormat) -> Result<NodeMap<DigitalChannel>> {
        parse_document(text, format, "digital schema")
    }
}

fn load_side<C: DeserializeOwned>(path: &Path) -> Result<NodeMap<C>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!("Config file not found ({})", path.display());
            return Ok(NodeMap::new());
        }
        Err(e) => return Err(CoeError::file_error(path, e)),
    };

    debug!(path = %path.display(), bytes = text.len(), "Parsing schema document");
    parse_document(&text, SchemaFormat::from_path(path), &path.display().to_string())
}

fn parse_document<C: DeserializeOwned>(
    text: &str,
    format: SchemaFormat,
    context: &str,
) -> Result<NodeMap<C>> {
    if text.trim().is_empty() {
        return Ok(NodeMap::new());
    }

    match format {
        SchemaFormat::Json => serde_json::from_str(text)
            .map_err(|e| CoeError::parse_error(context, format!("JSON parsing failed: {}", e))),
        SchemaFormat::Yaml => serde_yaml_ng::from_str(text)
            .map_err(|e| CoeError::parse_error(context, format!("YAML parsing failed: {}", e))),
    }
}

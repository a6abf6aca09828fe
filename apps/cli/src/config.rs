use std::{collections::HashMap, fs};

use imaging::ImageEncoding;

#[derive(Debug, Clone)]
pub struct Settings {
    pub accepted_encodings: Vec<ImageEncoding>,
    pub mock_delay_ms: u64,
    pub classify_timeout_ms: Option<u64>,
    pub analyze_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            accepted_encodings: vec![ImageEncoding::Jpeg, ImageEncoding::Png, ImageEncoding::Tiff],
            mock_delay_ms: 2000,
            classify_timeout_ms: None,
            analyze_url: None,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("detection.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            apply_file_config(&mut settings, &file_cfg);
        }
    }

    if let Ok(v) = std::env::var("ANALYZE_URL") {
        settings.analyze_url = Some(v);
    }
    if let Ok(v) = std::env::var("APP__ANALYZE_URL") {
        settings.analyze_url = Some(v);
    }

    if let Ok(v) = std::env::var("APP__ACCEPTED_ENCODINGS") {
        settings.accepted_encodings = parse_encodings(&v);
    }

    if let Ok(v) = std::env::var("APP__CLASSIFY_TIMEOUT_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.classify_timeout_ms = Some(parsed);
        }
    }

    if let Ok(v) = std::env::var("APP__MOCK_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.mock_delay_ms = parsed;
        }
    }

    settings
}

fn apply_file_config(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("accepted_encodings") {
        settings.accepted_encodings = parse_encodings(v);
    }
    if let Some(v) = file_cfg.get("analyze_url") {
        settings.analyze_url = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("classify_timeout_ms") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.classify_timeout_ms = Some(parsed);
        }
    }
    if let Some(v) = file_cfg.get("mock_delay_ms") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.mock_delay_ms = parsed;
        }
    }
}

fn parse_encodings(raw: &str) -> Vec<ImageEncoding> {
    let encodings: Vec<ImageEncoding> = raw
        .split(',')
        .filter_map(|entry| entry.parse().ok())
        .collect();
    if encodings.is_empty() {
        Settings::default().accepted_encodings
    } else {
        encodings
    }
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::detector::MatchDefaults;
use crate::logger;
use crate::matcher::{ColorMode, MatchMethod};
use crate::scheduler::SchedulerConfig;
use crate::types::CaptureRect;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Pause after a full pass over the chain.
    pub tick_interval_ms: u64,
    /// Pause after a rule's actions ran.
    pub cooldown_ms: u64,
    /// Euclidean RGB distance below which a pixel rule matches.
    pub pixel_tolerance: f64,
    /// Delay after each typed character.
    pub type_delay_ms: u64,
    pub threshold: f32,
    pub method: MatchMethod,
    pub color_mode: ColorMode,
    /// Region image rules search; whole screen when absent.
    pub search_region: Option<CaptureRect>,
    pub rules_dir: PathBuf,
    pub chain_file: PathBuf,
    /// Where annotated match images go for rules with debug enabled.
    pub debug_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            cooldown_ms: 500,
            pixel_tolerance: 20.0,
            type_delay_ms: 50,
            threshold: 0.8,
            method: MatchMethod::CCoeffNormed,
            color_mode: ColorMode::Grayscale,
            search_region: None,
            rules_dir: PathBuf::from("rules"),
            chain_file: PathBuf::from("chain.json"),
            debug_dir: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        let Ok(text) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Self>(&text) {
            Ok(mut settings) => {
                if !(0.0..=1.0).contains(&settings.threshold) {
                    let fallback = Self::default().threshold;
                    logger::warn(&format!(
                        "{}: threshold {} outside 0..1, using {}",
                        path.display(),
                        settings.threshold,
                        fallback
                    ));
                    settings.threshold = fallback;
                }
                settings
            }
            Err(e) => {
                logger::warn(&format!("{}: {}, using defaults", path.display(), e));
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    logger::warn(&format!("failed to write {}: {}", path.display(), e));
                }
            }
            Err(e) => logger::warn(&format!("failed to encode settings: {}", e)),
        }
    }

    pub fn match_defaults(&self) -> MatchDefaults {
        MatchDefaults {
            threshold: self.threshold,
            method: self.method,
            color_mode: self.color_mode,
            debug: false,
            pixel_tolerance: self.pixel_tolerance,
            debug_dir: self.debug_dir.clone(),
        }
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval_ms: self.tick_interval_ms,
            cooldown_ms: self.cooldown_ms,
            type_delay_ms: self.type_delay_ms,
            search_region: self.search_region,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"cooldown_ms": 250, "method": 3}"#).unwrap();

        let s = Settings::load(&path);
        assert_eq!(s.cooldown_ms, 250);
        assert_eq!(s.method, MatchMethod::CCorrNormed);
        assert_eq!(s.tick_interval_ms, 100);
        assert_eq!(s.pixel_tolerance, 20.0);
    }

    #[test]
    fn test_missing_or_broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Settings::load(&dir.path().join("nope.json")).cooldown_ms, 500);

        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path).threshold, 0.8);
    }

    #[test]
    fn test_out_of_range_threshold_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        for bad in ["1.5", "-0.2"] {
            std::fs::write(&path, format!(r#"{{"threshold": {}, "cooldown_ms": 250}}"#, bad)).unwrap();
            let s = Settings::load(&path);
            assert_eq!(s.threshold, 0.8);
            assert_eq!(s.cooldown_ms, 250);
        }

        std::fs::write(&path, r#"{"threshold": 1.0}"#).unwrap();
        assert_eq!(Settings::load(&path).threshold, 1.0);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut s = Settings::default();
        s.search_region = Some(CaptureRect::new(10, 20, 300, 200));
        s.color_mode = ColorMode::Color;
        s.save(&path);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"left\": 10"));
        let back = Settings::load(&path);
        assert_eq!(back.search_region, s.search_region);
        assert_eq!(back.color_mode, ColorMode::Color);
    }
}

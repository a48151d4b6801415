//! Tests for configuration loading
//!
//! This file covers:
//! - Loading the bundled JSON config files
//! - Loading from temporary files
//! - Missing files and invalid JSON
//! - Building schedules and embedders from loaded configs

use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_vit_toolkit::config::{
    load_patch_embed_config, load_schedule_config, PatchEmbedConfig, SizeSpec,
};
use rust_vit_toolkit::error::ConfigError;
use rust_vit_toolkit::layers::PatchEmbedder;
use rust_vit_toolkit::optimizers::SGD;
use rust_vit_toolkit::schedule::{build_schedule, BaseSchedule, LogSink, WarmupMode};
use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;

fn temp_json(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// ============================================================================
// Bundled configs
// ============================================================================

mod bundled_config_tests {
    use super::*;

    #[test]
    fn test_load_multi_step_warmup() {
        let config = load_schedule_config("config/multi_step_warmup.json")
            .expect("Failed to load multi step config");

        assert_eq!(config.get("name"), Some(&json!("multi_step")));
        assert_eq!(config.get("warmup_iters"), Some(&json!(500)));

        let schedule = build_schedule(&SGD::new(0.01), Some(&config), &mut LogSink).unwrap();
        assert_eq!(
            schedule.base(),
            &BaseSchedule::MultiStep {
                milestones: vec![8000],
                gamma: 0.1
            }
        );
        assert_eq!(schedule.warmup().unwrap().mode(), WarmupMode::Linear);
    }

    #[test]
    fn test_load_cosine_annealing() {
        let config = load_schedule_config("config/cosine_annealing.json").unwrap();
        let schedule = build_schedule(&SGD::new(0.01), Some(&config), &mut LogSink).unwrap();

        assert!(matches!(schedule.base(), BaseSchedule::CosineAnnealing { t_max: 40, .. }));
        assert!((schedule.lr_at(40) - 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_load_poly_lr_with_constant_warmup() {
        let config = load_schedule_config("config/poly_lr.json").unwrap();
        let schedule = build_schedule(&SGD::new(0.01), Some(&config), &mut LogSink).unwrap();

        let warmup = schedule.warmup().unwrap();
        assert_eq!(warmup.iters(), 5);
        assert_eq!(warmup.mode(), WarmupMode::Constant);
        assert_eq!(schedule.factor(40), 0.0);
    }

    #[test]
    fn test_load_vit_base_embed_config() {
        let config = load_patch_embed_config("config/vit_base_patch16.json").unwrap();
        let defaults = PatchEmbedConfig::default();
        assert_eq!(config.image_size, defaults.image_size);
        assert_eq!(config.patch_size, SizeSpec::Rect(16, 16));
        assert_eq!(config.patch_size.to_pair(), defaults.patch_size.to_pair());
        assert_eq!(config.embed_dim, defaults.embed_dim);
    }
}

// ============================================================================
// Temporary files
// ============================================================================

mod temp_file_tests {
    use super::*;

    #[test]
    fn test_load_embed_config_from_temp_file() {
        let file = temp_json(r#"{"image_size": [32, 64], "patch_size": 8, "embed_dim": 12}"#);
        let config = load_patch_embed_config(file.path()).unwrap();

        assert_eq!(config.channel_count, 3);
        let mut rng = StdRng::seed_from_u64(3);
        let embed = PatchEmbedder::new(&config, &mut rng).unwrap();
        assert_eq!(embed.grid_size(), (4, 8));
        assert_eq!(embed.embed_dim(), 12);
    }

    #[test]
    fn test_load_schedule_config_from_temp_file() {
        let file = temp_json(r#"{"name": "exp_lr", "gamma": 0.5}"#);
        let config = load_schedule_config(file.path()).unwrap();
        let schedule = build_schedule(&SGD::new(1.0), Some(&config), &mut LogSink).unwrap();
        assert!((schedule.lr_at(3) - 0.125).abs() < 1e-7);
    }

    #[test]
    fn test_null_section_falls_back_to_constant() {
        let file = temp_json(r#"{"lr_schedule": null}"#);
        let config = load_schedule_config(file.path()).unwrap();
        let schedule = build_schedule(&SGD::new(1.0), Some(&config), &mut LogSink).unwrap();
        assert_eq!(schedule.base(), &BaseSchedule::Constant);
    }
}

// ============================================================================
// Failures
// ============================================================================

mod failure_tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let err = load_schedule_config("config/does_not_exist.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("does_not_exist.json"));
    }

    #[test]
    fn test_invalid_json() {
        let file = temp_json("{ \"name\": \"exp_lr\", ");
        assert!(matches!(
            load_schedule_config(file.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_named_config_with_null_section_is_rejected() {
        let file = temp_json(r#"{"name": "exp_lr", "gamma": 0.5, "lr_schedule": null}"#);
        let err = load_schedule_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousSection));
        assert!(err.to_string().contains("lr_schedule"));
    }

    #[test]
    fn test_unknown_embed_field() {
        let file = temp_json(r#"{"img_size": 224}"#);
        assert!(matches!(
            load_patch_embed_config(file.path()),
            Err(ConfigError::Json(_))
        ));
    }
}

use focus_enforcer::config::{Config, ConfigLoader};
use focus_enforcer::error::EngineError;
use focus_enforcer::system::MockFileSystem;
use std::path::PathBuf;

mod test_utils;
use test_utils::MockRig;

/// Integration tests for ConfigLoader with the file system abstraction,
/// and for feeding reloaded configuration into a controller

#[cfg(test)]
mod config_loader_tests {
    use super::*;

    fn config_path() -> PathBuf {
        PathBuf::from("/test/focus-enforcer/config.toml")
    }

    #[test]
    fn test_config_loading_with_mock_filesystem() {
        let file_system = MockFileSystem::new();
        let config_content = r#"
[settings]
game_path = "/usr/games/chess"
game_title = "Chess"
study_app_path = "studyapp --notes"
study_app_title = "StudyApp"

[durations]
game_min = 15
"#;
        file_system.add_file(config_path(), config_content.to_string());

        let loader = ConfigLoader::new(file_system.clone(), config_path());
        let config = loader.load_config().unwrap();

        assert_eq!(config.settings.game_path, "/usr/games/chess");
        assert_eq!(config.settings.study_app_title, "StudyApp");
        assert_eq!(config.durations.game_min, "15");
        assert_eq!(config.durations.long_study_min, "30");

        let read_calls = file_system.get_read_calls();
        assert_eq!(read_calls, vec![config_path()]);
    }

    #[test]
    fn test_read_failure_is_an_error() {
        let file_system = MockFileSystem::new();
        file_system.add_file(config_path(), "[settings]\n".to_string());
        file_system.set_read_failure(true);

        let loader = ConfigLoader::new(file_system, config_path());
        let err = loader.load_config().unwrap_err();

        assert!(err.to_string().contains("Failed to read configuration file"));
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let file_system = MockFileSystem::new();
        file_system.add_file(config_path(), "[durations\ngame_min = ".to_string());

        let loader = ConfigLoader::new(file_system, config_path());
        let err = loader.load_config().unwrap_err();

        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_wrong_value_type_is_an_error() {
        let file_system = MockFileSystem::new();
        file_system.add_file(
            config_path(),
            "[general]\ntick_interval_ms = \"fast\"\n".to_string(),
        );

        let loader = ConfigLoader::new(file_system, config_path());
        assert!(loader.load_config().is_err());
    }

    #[test]
    fn test_default_config_written_when_missing() {
        let file_system = MockFileSystem::new();
        let loader = ConfigLoader::new(file_system.clone(), config_path());

        assert!(!loader.config_exists());
        let config = loader.load_config().unwrap();

        assert_eq!(config, Config::default());
        assert!(loader.config_exists());
        assert!(file_system.get_read_calls().is_empty());
        assert_eq!(
            file_system.get_directory_creation_calls(),
            vec![PathBuf::from("/test/focus-enforcer")]
        );
    }

    #[test]
    fn test_missing_config_survives_directory_failure() {
        let file_system = MockFileSystem::new();
        file_system.set_create_dir_failure(true);

        let loader = ConfigLoader::new(file_system.clone(), config_path());
        let config = loader.load_config().unwrap();

        assert_eq!(config, Config::default());
        assert!(file_system.get_write_calls().is_empty());
    }

    #[test]
    fn test_reload_picks_up_modified_file() {
        let file_system = MockFileSystem::new();
        file_system.add_file(
            config_path(),
            "[settings]\ngame_path = \"/usr/games/chess\"\n".to_string(),
        );
        let loader = ConfigLoader::new(file_system.clone(), config_path());

        let first = loader.load_config().unwrap();
        assert_eq!(first.settings.game_path, "/usr/games/chess");

        file_system.add_file(
            config_path(),
            "[settings]\ngame_path = \"/usr/games/go\"\n".to_string(),
        );
        let second = loader.reload_config().unwrap();

        assert_eq!(second.settings.game_path, "/usr/games/go");
        assert_eq!(file_system.get_read_calls().len(), 2);
    }

    #[test]
    fn test_config_path_is_reported() {
        let loader = ConfigLoader::new(MockFileSystem::new(), config_path());
        assert_eq!(loader.get_config_path(), config_path().as_path());
    }

    #[test]
    fn test_reloaded_config_enables_start() {
        let file_system = MockFileSystem::new();
        let loader = ConfigLoader::new(file_system.clone(), config_path());
        let rig = MockRig::new(loader.load_config().unwrap());

        assert_eq!(
            rig.controller.start(),
            Err(EngineError::ConfigMissing("game_path"))
        );

        file_system.add_file(
            config_path(),
            r#"
[general]
launch_settle_ms = 0
terminate_grace_ms = 30

[settings]
game_path = "/usr/games/chess"
game_title = "Chess"
study_app_path = "studyapp"
study_app_title = "StudyApp"
"#
            .to_string(),
        );
        rig.controller.update_config(loader.reload_config().unwrap());

        assert!(rig.controller.start().is_ok());
        assert!(rig.controller.is_running());
        assert!(rig.controller.stop());
    }
}

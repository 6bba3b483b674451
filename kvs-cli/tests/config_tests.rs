use tempfile::TempDir;

use kvscli::config::{BatchSettings, ClientSettings, ServerSettings};

#[test]
fn settings_survive_a_serde_round_trip() {
    let dir = TempDir::new().unwrap();
    let settings = ServerSettings {
        jobs_dir: dir.path().to_path_buf(),
        max_threads: 4,
        max_backups: 2,
        fifo_name: "registry".to_string(),
    };

    let json = serde_json::to_string(&settings).unwrap();
    let back: ServerSettings = serde_json::from_str(&json).unwrap();
    assert_eq!(back.jobs_dir, settings.jobs_dir);
    assert_eq!(back.max_threads, 4);
    assert_eq!(back.max_backups, 2);
    assert_eq!(back.fifo_name, "registry");
    assert!(back.validate().is_ok());
}

#[test]
fn batch_settings_validate_like_the_cli_surface() {
    let dir = TempDir::new().unwrap();
    let settings = BatchSettings {
        jobs_dir: dir.path().to_path_buf(),
        max_backups: 1,
        max_threads: 8,
    };
    assert!(settings.validate().is_ok());

    let bad = BatchSettings { max_threads: 0, ..settings };
    assert!(bad.validate().is_err());
}

#[test]
fn client_pipe_paths_stay_within_the_frame_field() {
    let settings = ClientSettings { client_id: "77".to_string(), fifo_name: "reg".to_string() };
    assert!(settings.validate().is_ok());
    // 40-byte CONNECT fields bound every pipe path.
    assert!(settings.request_path().as_os_str().len() <= 40);
    assert!(settings.notification_path().as_os_str().len() <= 40);

    let oversized = ClientSettings {
        client_id: "i".repeat(35),
        fifo_name: "reg".to_string(),
    };
    assert!(oversized.validate().is_err());
}

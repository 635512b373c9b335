use std::path::PathBuf;
use std::time::Duration;

use frame_engine::config::{Configuration, Variant};
use frame_engine::tasks::status::{StatusBlob, read_status};

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
prepared-dir: "/srv/frame/static/prepared"
interrupt-flag-path: "/srv/frame/cache/new_postcard.flag"
idle-backoff: 30s
static-poll-interval: 250ms
target-fps: 30
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.prepared_dir, PathBuf::from("/srv/frame/static/prepared"));
    assert_eq!(cfg.idle_backoff, Duration::from_secs(30));
    assert_eq!(cfg.static_poll_interval, Duration::from_millis(250));
    assert_eq!(cfg.target_fps, 30);
    assert_eq!(cfg.attention_window, Duration::from_secs(30));
    assert_eq!(cfg.decoder.binary, "mpv");
}

#[test]
fn parse_source_policies_and_decoder() {
    let yaml = r#"
decoder:
  binary: /usr/local/bin/mpv
  mixer-control: PCM
cue-command: [paplay, "--volume={volume}", "{file}"]
source-policies:
  telegram:
    default-variant: postcard
    time-boosted: true
  samba:
    default-variant: polaroid
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.decoder.binary, "/usr/local/bin/mpv");
    assert_eq!(cfg.decoder.mixer_control, "PCM");
    assert_eq!(
        cfg.decoder.board_model_path,
        PathBuf::from("/proc/device-tree/model")
    );
    assert_eq!(cfg.policy_for("samba").default_variant, Some(Variant::Polaroid));
    assert!(!cfg.policy_for("samba").time_boosted);
    assert!(cfg.policy_for("telegram").time_boosted);
    assert!(cfg.policy_for("immich").default_variant.is_none());
}

#[test]
fn unknown_keys_are_rejected() {
    let yaml = "prepared-dirr: /typo\n";
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn zero_fps_is_invalid() {
    let cfg: Configuration = serde_yaml::from_str("target-fps: 0\n").unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Configuration::load_or_default(&dir.path().join("absent.yaml")).unwrap();
    assert_eq!(cfg.idle_backoff, Duration::from_secs(60));
    assert_eq!(
        cfg.playlist_override_path,
        PathBuf::from("/tmp/pimmich_custom_playlist.json")
    );
}

#[test]
fn unparsable_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "target-fps: [").unwrap();
    assert!(Configuration::load_or_default(&path).is_err());
}

#[test]
fn status_reader_treats_missing_as_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("status.json");
    assert_eq!(read_status(&path), None);
    std::fs::write(&path, r#"{"paused": true, "current": "prepared/immich/a.jpg"}"#).unwrap();
    assert_eq!(
        read_status(&path),
        Some(StatusBlob {
            paused: true,
            current: Some("prepared/immich/a.jpg".into()),
            playlist: None,
        })
    );
}

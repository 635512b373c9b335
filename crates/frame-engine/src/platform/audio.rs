use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::platform::process::{self, CommandRunner, Invocation};

/// The engine's claim on the sound device.
///
/// The engine only ever plays short notification cues. Before an external
/// decoder runs with audio, [`AudioOutput::release`] stops any cue still
/// holding the device; [`AudioOutput::reclaim`] marks it usable again once
/// the decoder exits.
pub struct AudioOutput {
    cue_command: Vec<String>,
    mixer_control: String,
    runner: CommandRunner,
    cue: Option<Child>,
    owned: bool,
}

impl AudioOutput {
    pub fn new(cue_command: Vec<String>, mixer_control: String) -> Self {
        Self::with_runner(cue_command, mixer_control, process::default_runner())
    }

    pub fn with_runner(
        cue_command: Vec<String>,
        mixer_control: String,
        runner: CommandRunner,
    ) -> Self {
        Self {
            cue_command,
            mixer_control,
            runner,
            cue: None,
            owned: true,
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Start playing `sound` without waiting for it to finish.
    pub fn play_cue(&mut self, sound: &Path, volume: u32) -> Result<()> {
        if !self.owned {
            debug!(path = %sound.display(), "audio released; cue skipped");
            return Ok(());
        }
        self.stop_cue();
        if !self.cue_sets_volume() {
            self.set_mixer_volume(volume);
        }
        let invocation = self.cue_invocation(sound, volume)?;
        let child = std::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start cue player {}", invocation.program))?;
        debug!(command = %invocation, "notification cue started");
        self.cue = Some(child);
        Ok(())
    }

    /// Render the cue argv for `sound` at `volume` percent.
    pub fn cue_invocation(&self, sound: &Path, volume: u32) -> Result<Invocation> {
        let file = sound.to_string_lossy();
        let volume = volume.min(100).to_string();
        Invocation::from_template(
            &self.cue_command,
            &[("file", file.as_ref()), ("volume", volume.as_str())],
        )
    }

    fn cue_sets_volume(&self) -> bool {
        self.cue_command.iter().any(|arg| arg.contains("{volume}"))
    }

    /// Set the system mixer level used by the external decoder.
    pub fn set_mixer_volume(&self, volume: u32) {
        let invocation = Invocation::new("amixer").args([
            "sset".to_string(),
            self.mixer_control.clone(),
            format!("{}%", volume.min(100)),
            "unmute".to_string(),
        ]);
        let execution = process::execute(&self.runner, &invocation);
        if execution.success {
            info!(volume, control = self.mixer_control, "mixer volume set");
        } else {
            warn!(
                command = execution.command,
                exit_code = ?execution.exit_code,
                stderr = execution.stderr,
                "failed to set mixer volume"
            );
        }
    }

    pub fn release(&mut self) {
        self.stop_cue();
        if self.owned {
            debug!("audio device released");
        }
        self.owned = false;
    }

    pub fn reclaim(&mut self) {
        if !self.owned {
            debug!("audio device reclaimed");
        }
        self.owned = true;
    }

    fn stop_cue(&mut self) {
        if let Some(mut child) = self.cue.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                Ok(None) => {
                    if let Err(err) = child.kill() {
                        warn!("failed to stop notification cue: {err}");
                    }
                    let _ = child.wait();
                }
                Err(err) => warn!("failed to poll notification cue: {err}"),
            }
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop_cue();
    }
}

/// Locate the notification sound for `language`, falling back to the
/// language-neutral file.
pub fn notification_sound(sounds_dir: &Path, language: &str) -> Option<PathBuf> {
    let localized = sounds_dir.join(format!("notification_{language}.wav"));
    if localized.is_file() {
        return Some(localized);
    }
    let fallback = sounds_dir.join("notification.wav");
    fallback.is_file().then_some(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::process::testing::StubRunner;

    #[test]
    fn prefers_localized_sound() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(notification_sound(dir.path(), "fr"), None);
        std::fs::write(dir.path().join("notification.wav"), b"RIFF").unwrap();
        assert_eq!(
            notification_sound(dir.path(), "fr"),
            Some(dir.path().join("notification.wav"))
        );
        std::fs::write(dir.path().join("notification_fr.wav"), b"RIFF").unwrap();
        assert_eq!(
            notification_sound(dir.path(), "fr"),
            Some(dir.path().join("notification_fr.wav"))
        );
    }

    #[test]
    fn mixer_volume_is_clamped() {
        let stub = StubRunner::default();
        stub.respond("amixer sset Master 100% unmute", 0);
        let audio = AudioOutput::with_runner(
            vec!["aplay".into(), "{file}".into()],
            "Master".into(),
            stub.clone().into_runner(),
        );
        audio.set_mixer_volume(250);
        assert_eq!(stub.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn default_cue_carries_volume() {
        let cfg = crate::config::Configuration::default();
        let audio = AudioOutput::with_runner(
            cfg.cue_command,
            "Master".into(),
            StubRunner::default().into_runner(),
        );
        let inv = audio
            .cue_invocation(Path::new("/s/notification.wav"), 30)
            .unwrap();
        assert!(inv.args.iter().any(|arg| arg == "--volume=30"), "{inv}");
        assert_eq!(inv.args.last().map(String::as_str), Some("/s/notification.wav"));
        assert_eq!(
            audio.cue_invocation(Path::new("/s/n.wav"), 400).unwrap().args[2],
            "--volume=100"
        );
    }

    #[cfg(unix)]
    #[test]
    fn cue_without_volume_placeholder_sets_mixer() {
        let stub = StubRunner::default();
        stub.respond("amixer sset Master 35% unmute", 0);
        let mut audio = AudioOutput::with_runner(
            vec!["true".into(), "{file}".into()],
            "Master".into(),
            stub.clone().into_runner(),
        );
        audio.play_cue(Path::new("/s/n.wav"), 35).unwrap();
        assert_eq!(stub.calls.lock().unwrap().len(), 1);

        let stub = StubRunner::default();
        let mut audio = AudioOutput::with_runner(
            vec!["true".into(), "--volume={volume}".into(), "{file}".into()],
            "Master".into(),
            stub.clone().into_runner(),
        );
        audio.play_cue(Path::new("/s/n.wav"), 35).unwrap();
        assert!(stub.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn cue_is_skipped_while_released() {
        let mut audio = AudioOutput::with_runner(
            vec!["definitely-not-a-player".into(), "{file}".into()],
            "Master".into(),
            StubRunner::default().into_runner(),
        );
        audio.release();
        assert!(!audio.is_owned());
        audio.play_cue(Path::new("/nope.wav"), 80).unwrap();
        audio.reclaim();
        assert!(audio.is_owned());
        assert!(audio.play_cue(Path::new("/nope.wav"), 80).is_err());
    }
}

use std::path::Path;
use std::process::ExitStatus;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::DecoderConfig;
use crate::platform::audio::AudioOutput;
use crate::platform::process::{self, ChildRunner, Invocation};

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("failed to launch video decoder `{command}`: {message}")]
    Spawn { command: String, message: String },
    #[error("video decoder `{command}` exited unsuccessfully (code {code:?})")]
    Exit { command: String, code: Option<i32> },
}

impl HandoffError {
    /// Whether the decoder process actually started.
    pub fn launched(&self) -> bool {
        matches!(self, HandoffError::Exit { .. })
    }
}

#[derive(Debug)]
pub enum HandoffOutcome {
    Launched { status: ExitStatus },
    Failed(HandoffError),
}

/// Board family, for picking hardware decode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardModel {
    RaspberryPi45,
    RaspberryPi3,
    Other,
}

impl BoardModel {
    pub fn from_model_string(model: &str) -> Self {
        if model.contains("Raspberry Pi 4") || model.contains("Raspberry Pi 5") {
            BoardModel::RaspberryPi45
        } else if model.contains("Raspberry Pi 3") {
            BoardModel::RaspberryPi3
        } else {
            BoardModel::Other
        }
    }

    pub fn detect(model_path: &Path) -> Self {
        match std::fs::read_to_string(model_path) {
            Ok(model) => Self::from_model_string(&model),
            Err(_) => BoardModel::Other,
        }
    }
}

/// Per-playback settings taken from the operator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoOptions {
    pub hwdec: bool,
    /// Playback volume in percent; `None` plays without audio.
    pub audio_volume: Option<u32>,
}

pub fn decoder_invocation(
    binary: &str,
    video: &Path,
    options: VideoOptions,
    board: BoardModel,
) -> Invocation {
    let mut inv = Invocation::new(binary).args([
        "--no-config",
        "--no-terminal",
        "--fs",
        "--no-osc",
        "--no-osd-bar",
        "--loop=no",
        "--ontop",
    ]);
    inv = if options.hwdec {
        match board {
            BoardModel::RaspberryPi45 => inv.args(["--hwdec=v4l2m2m,mmal", "--vo=gpu"]),
            BoardModel::RaspberryPi3 => inv.args(["--hwdec=mmal", "--vo=gpu"]),
            BoardModel::Other => inv.args(["--hwdec=auto", "--vo=gpu"]),
        }
    } else {
        inv.args(["--hwdec=no", "--vo=x11"])
    };
    inv = inv.arg(video.to_string_lossy());
    match options.audio_volume {
        Some(volume) => inv.args([format!("--volume={}", volume.min(100)), "--no-mute".into()]),
        None => inv.arg("--no-audio"),
    }
}

/// Delegates video playback to an external fullscreen decoder.
///
/// The call blocks until the decoder exits and cannot be preempted; control
/// signals raised meanwhile stay latched in their flags.
pub struct ExternalMediaHandoff {
    decoder: DecoderConfig,
    runner: ChildRunner,
}

impl ExternalMediaHandoff {
    pub fn new(decoder: DecoderConfig) -> Self {
        Self::with_runner(decoder, process::default_child_runner())
    }

    pub fn with_runner(decoder: DecoderConfig, runner: ChildRunner) -> Self {
        Self { decoder, runner }
    }

    /// Play `video`, releasing the audio device around the decoder run.
    /// `on_started` fires once the decoder process exists.
    pub fn play(
        &self,
        video: &Path,
        options: VideoOptions,
        audio: &mut AudioOutput,
        on_started: &mut dyn FnMut(),
    ) -> HandoffOutcome {
        let board = if options.hwdec {
            BoardModel::detect(&self.decoder.board_model_path)
        } else {
            BoardModel::Other
        };
        let invocation = decoder_invocation(&self.decoder.binary, video, options, board);

        audio.release();
        if let Some(volume) = options.audio_volume {
            audio.set_mixer_volume(volume);
        }

        info!(command = %invocation, ?board, "launching video decoder");
        let mut started = false;
        let result = (self.runner)(&invocation, &mut || {
            started = true;
            on_started();
        });
        audio.reclaim();

        let command = invocation.to_string();
        let outcome = match result {
            Ok(status) if status.success() => HandoffOutcome::Launched { status },
            Ok(status) => HandoffOutcome::Failed(HandoffError::Exit {
                command,
                code: status.code(),
            }),
            Err(_) if started => HandoffOutcome::Failed(HandoffError::Exit {
                command,
                code: None,
            }),
            Err(err) => HandoffOutcome::Failed(HandoffError::Spawn {
                command,
                message: format!("{err:#}"),
            }),
        };
        if let HandoffOutcome::Failed(err) = &outcome {
            warn!(path = %video.display(), "{err}");
        }
        outcome
    }
}

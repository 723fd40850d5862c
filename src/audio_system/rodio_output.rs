/// Output channels on rodio sinks
///
/// Each channel owns one [`Sink`] on a shared output stream. The stream itself
/// must stay alive on the thread that opened it, so [`open_default`] hands it
/// back separately from the backend.
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use rodio::source::ChannelVolume;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use super::category::AudioCategory;
use super::clip::AudioClip;
use super::output::{ChannelBackend, ChannelSettings, OutputChannel};
use crate::error::{AudioError, Result};

type BoxedSource = Box<dyn Source<Item = i16> + Send>;

/// Keeps the device stream open. Drop it to close audio output.
pub struct RodioOutput {
    _stream: OutputStream,
}

/// Open the default output device
pub fn open_default() -> Result<(RodioOutput, RodioBackend)> {
    let (stream, handle) =
        OutputStream::try_default().map_err(|e| AudioError::StreamInitFailed(Box::new(e)))?;
    tracing::info!("Opened default audio output device");
    Ok((RodioOutput { _stream: stream }, RodioBackend { handle }))
}

/// Verify a clip decodes and report its length when the format knows it
pub fn probe_clip(clip: &AudioClip) -> Result<Option<Duration>> {
    let decoder = Decoder::new(Cursor::new(Arc::clone(clip.bytes())))
        .map_err(|e| AudioError::DecodeFailed(Box::new(e)))?;
    Ok(decoder.total_duration().or(clip.duration()))
}

/// Creates one sink per channel on a shared stream
pub struct RodioBackend {
    handle: OutputStreamHandle,
}

impl ChannelBackend for RodioBackend {
    fn create_channel(&mut self, category: AudioCategory) -> Result<Box<dyn OutputChannel>> {
        let sink = Sink::try_new(&self.handle).map_err(|e| AudioError::ChannelCreateFailed {
            category,
            source: Box::new(e),
        })?;
        sink.pause();

        tracing::debug!("Created rodio sink for {}", category);
        Ok(Box::new(RodioChannel {
            category,
            handle: self.handle.clone(),
            sink,
            clip: None,
            settings: ChannelSettings::default(),
            volume: 1.0,
            pitch: 1.0,
        }))
    }

    fn name(&self) -> &str {
        "rodio"
    }
}

struct RodioChannel {
    category: AudioCategory,
    handle: OutputStreamHandle,
    sink: Sink,
    clip: Option<AudioClip>,
    settings: ChannelSettings,
    volume: f32,
    pitch: f32,
}

impl RodioChannel {
    fn effective_volume(&self) -> f32 {
        if self.settings.muted {
            0.0
        } else {
            self.volume.max(0.0)
        }
    }

    /// Replace the sink so nothing stays queued from the previous clip
    fn renew_sink(&mut self) {
        self.sink.stop();
        match Sink::try_new(&self.handle) {
            Ok(sink) => {
                sink.pause();
                sink.set_volume(self.effective_volume());
                sink.set_speed(self.pitch);
                self.sink = sink;
            }
            Err(e) => tracing::warn!("Failed to renew {} sink: {}", self.category, e),
        }
    }

    fn build_source(&self, clip: &AudioClip) -> Result<BoxedSource> {
        let cursor = Cursor::new(Arc::clone(clip.bytes()));

        // Each transformation returns a different type, so we use dynamic dispatch
        let mut source: BoxedSource = if self.settings.looping {
            Box::new(
                Decoder::new_looped(cursor).map_err(|e| AudioError::DecodeFailed(Box::new(e)))?,
            )
        } else {
            Box::new(Decoder::new(cursor).map_err(|e| AudioError::DecodeFailed(Box::new(e)))?)
        };

        let pan = self.settings.pan.clamp(-1.0, 1.0);
        if pan != 0.0 {
            let left = 1.0 - pan.max(0.0);
            let right = 1.0 + pan.min(0.0);
            source = Box::new(ChannelVolume::new(source, vec![left, right]));
        }

        Ok(source)
    }
}

impl OutputChannel for RodioChannel {
    fn set_clip(&mut self, clip: Option<AudioClip>) {
        self.clip = clip;
    }

    fn clip(&self) -> Option<&AudioClip> {
        self.clip.as_ref()
    }

    fn play(&mut self) {
        self.renew_sink();

        let Some(clip) = self.clip.as_ref() else {
            tracing::debug!("{} channel told to play without a clip", self.category);
            return;
        };

        match self.build_source(clip) {
            Ok(source) => {
                self.sink.append(source);
                self.sink.play();
                tracing::debug!("Playing {} on {} channel", clip.name(), self.category);
            }
            Err(e) => tracing::warn!("Cannot play {}: {}", clip.name(), e),
        }
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn unpause(&mut self) {
        if !self.sink.empty() {
            self.sink.play();
        }
    }

    fn stop(&mut self) {
        self.renew_sink();
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.sink.set_volume(self.effective_volume());
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch;
        self.sink.set_speed(pitch.max(0.01));
    }

    fn pitch(&self) -> f32 {
        self.pitch
    }

    fn apply_settings(&mut self, settings: &ChannelSettings) {
        // Loop and pan are baked into the source at the next play
        self.settings = settings.clone();
        self.sink.set_volume(self.effective_volume());
    }

    fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    fn position(&self) -> Duration {
        self.sink.get_pos()
    }
}

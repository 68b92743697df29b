// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info, span, Level};

use crate::audio::mixer::{seconds_to_samples, ActiveVoice, AudioMixer};
use crate::audio::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use crate::audio::{next_voice_id, DecodedBuffer, DeviceError, VoiceId};
use crate::config;

/// Describes an output device found while listing.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    /// The name of the device.
    pub name: String,
    /// The name of the host the device belongs to.
    pub host: String,
    /// The maximum number of output channels the device supports.
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// An opened cpal output device. The mixer runs inside the cpal callback and its frame
/// counter is the audio clock.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The number of channels the stream renders.
    channels: u16,
    /// The sample rate the stream renders at.
    sample_rate: u32,
    /// Frames rendered so far.
    clock: Arc<AtomicU64>,
    /// Delivers new voices to the audio callback.
    voice_tx: crossbeam_channel::Sender<ActiveVoice>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, Rate={}) ({})",
            self.name,
            self.channels,
            self.sample_rate,
            self.host_id.name()
        )
    }
}

/// Builds an output stream of sample type `T`. Voices are drained from `voice_rx` at the
/// top of every callback, so a voice starts no later than the block its start time
/// falls into.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: AudioMixer,
    voice_rx: crossbeam_channel::Receiver<ActiveVoice>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let num_channels = config.channels.max(1) as usize;
    let priority = callback_thread_priority();
    let rt_audio = rt_audio_enabled();
    let mut priority_set = false;
    let mut scratch: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if !priority_set {
                configure_audio_thread_priority(priority, rt_audio);
                priority_set = true;
            }

            while let Ok(voice) = voice_rx.try_recv() {
                mixer.add_voice(voice);
            }

            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let scratch = &mut scratch[..data.len()];
            mixer.process_into_output(scratch, data.len() / num_channels);

            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!(err = %err, "Output stream error"),
        None,
    )
}

/// Starts the stream on a dedicated thread (cpal streams aren't Send) and waits until
/// it's playing or has failed.
fn start_output_thread(
    device: cpal::Device,
    sample_format: cpal::SampleFormat,
    config: cpal::StreamConfig,
    mixer: AudioMixer,
    voice_rx: crossbeam_channel::Receiver<ActiveVoice>,
) -> Result<(), DeviceError> {
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), DeviceError>>(1);

    thread::Builder::new()
        .name("sampledeck-output".to_string())
        .spawn(move || {
            let span = span!(Level::INFO, "output stream");
            let _enter = span.enter();

            let stream = match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer, voice_rx),
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer, voice_rx),
                cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, mixer, voice_rx),
                cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer, voice_rx),
                other => {
                    let _ = ready_tx.send(Err(DeviceError::Backend(format!(
                        "unsupported sample format {}",
                        other
                    ))));
                    return;
                }
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(DeviceError::Backend(e.to_string())));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(DeviceError::Backend(e.to_string())));
                return;
            }

            info!(
                channels = config.channels,
                sample_rate = config.sample_rate.0,
                "Output stream started"
            );
            let _ = ready_tx.send(Ok(()));

            // The stream lives as long as the process.
            loop {
                thread::park();
            }
        })
        .map_err(|e| DeviceError::Backend(e.to_string()))?;

    ready_rx.recv_timeout(Duration::from_secs(10)).map_err(|_| {
        DeviceError::Backend("timed out waiting for the output stream to start".to_string())
    })?
}

impl Device {
    /// Lists the output devices of every available host.
    pub fn list() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<DeviceInfo> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(DeviceInfo {
                        name: device.name()?,
                        host: host_id.name().to_string(),
                        max_channels,
                    });
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Finds a device by name. "default" picks the default host's default output.
    fn find(name: &str) -> Result<(cpal::HostId, cpal::Device), Box<dyn Error>> {
        if name == config::audio::DEFAULT_DEVICE {
            let host = cpal::default_host();
            return match host.default_output_device() {
                Some(device) => Ok((host.id(), device)),
                None => Err(Box::new(DeviceError::NotFound(name.to_string()))),
            };
        }

        let _shh_stderr = shh::stderr()?;
        for host_id in cpal::available_hosts() {
            let Ok(devices) = cpal::host_from_id(host_id)?.output_devices() else {
                continue;
            };
            for device in devices {
                if device.name().is_ok_and(|device_name| device_name.trim() == name) {
                    return Ok((host_id, device));
                }
            }
        }
        Err(Box::new(DeviceError::NotFound(name.to_string())))
    }

    /// Opens the configured device and starts its output stream.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let (host_id, device) = Device::find(config.device())?;
        let name = device.name()?;
        let default_config = device.default_output_config()?;

        let channels = config
            .channels()
            .filter(|channels| *channels > 0)
            .unwrap_or(default_config.channels());
        let sample_rate = config
            .sample_rate()
            .filter(|rate| *rate > 0)
            .unwrap_or(default_config.sample_rate().0);
        let buffer_size = match config.buffer_size() {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        };
        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size,
        };
        debug!(
            device = name,
            channels,
            sample_rate,
            sample_format = %default_config.sample_format(),
            "Opening output device"
        );

        let mixer = AudioMixer::new(channels, sample_rate);
        let clock = mixer.clock();
        let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
        start_output_thread(
            device,
            default_config.sample_format(),
            stream_config,
            mixer,
            voice_rx,
        )?;

        Ok(Device {
            name,
            host_id,
            channels,
            sample_rate,
            clock,
            voice_tx,
        })
    }
}

impl super::Device for Device {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn start(&self, buffer: Arc<DecodedBuffer>, when: f64) -> Result<VoiceId, DeviceError> {
        let id = next_voice_id();
        let voice = ActiveVoice::new(id, buffer, seconds_to_samples(when, self.sample_rate));
        self.voice_tx
            .send(voice)
            .map_err(|_| DeviceError::Stopped)?;
        Ok(id)
    }
}

//! Decoded sound payloads and the hand-off to the audio collaborator.
//!
//! Playback itself happens elsewhere: a [`Sound`] only pushes an
//! [`AudioCommand`] into a channel whose receiver belongs to whoever mixes
//! audio. Sending never blocks.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::warn;

use crate::error::{Error, Result};

/// PCM samples decoded from a RIFF/WAVE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcm {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Interleaved little-endian sample bytes as stored in the `data` chunk.
    pub data: Vec<u8>,
}

impl Pcm {
    pub fn frame_count(&self) -> u64 {
        let frame_size = self.channels as u64 * (self.bits_per_sample as u64 / 8);
        if frame_size == 0 {
            0
        } else {
            self.data.len() as u64 / frame_size
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }
}

const WAVE_FORMAT_PCM: u16 = 1;

/// Decodes an uncompressed PCM WAV file. `id` only names the resource in
/// errors.
pub fn decode_wav(id: &str, bytes: &[u8]) -> Result<Pcm> {
    let fail = |reason: &str| Error::decode(id, reason);

    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(fail("not a RIFF/WAVE payload"));
    }

    let mut format: Option<(u16, u16, u32, u16)> = None;
    let mut data: Option<&[u8]> = None;

    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_len =
            u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]])
                as usize;
        let body_start = pos + 8;
        let body_end = body_start
            .checked_add(chunk_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| fail("chunk extends past the end of the payload"))?;
        let body = &bytes[body_start..body_end];

        match chunk_id {
            b"fmt " => {
                if body.len() < 16 {
                    return Err(fail("fmt chunk is too short"));
                }
                let tag = u16::from_le_bytes([body[0], body[1]]);
                let channels = u16::from_le_bytes([body[2], body[3]]);
                let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
                let bits = u16::from_le_bytes([body[14], body[15]]);
                format = Some((tag, channels, sample_rate, bits));
            }
            b"data" => data = Some(body),
            _ => {}
        }

        // chunks are padded to an even length
        pos = body_end + (chunk_len & 1);
    }

    let (tag, channels, sample_rate, bits_per_sample) =
        format.ok_or_else(|| fail("missing fmt chunk"))?;
    let data = data.ok_or_else(|| fail("missing data chunk"))?;

    if tag != WAVE_FORMAT_PCM {
        return Err(fail(&format!("unsupported format tag {}", tag)));
    }
    if channels == 0 || sample_rate == 0 {
        return Err(fail("zero channels or sample rate"));
    }
    if !matches!(bits_per_sample, 8 | 16 | 24 | 32) {
        return Err(fail(&format!("unsupported sample size {}", bits_per_sample)));
    }

    Ok(Pcm {
        channels,
        sample_rate,
        bits_per_sample,
        data: data.to_vec(),
    })
}

#[derive(Debug, Clone)]
pub enum AudioCommand {
    PlayOnce { id: String, pcm: Arc<Pcm> },
}

/// Sender side of the audio command channel.
#[derive(Debug, Clone)]
pub struct AudioBridge {
    tx_cmd: Sender<AudioCommand>,
}

impl AudioBridge {
    /// Creates the channel. The receiver goes to the audio collaborator.
    pub fn new() -> (Self, Receiver<AudioCommand>) {
        let (tx_cmd, rx_cmd) = unbounded::<AudioCommand>();
        (Self { tx_cmd }, rx_cmd)
    }

    fn send(&self, command: AudioCommand) {
        if let Err(e) = self.tx_cmd.send(command) {
            warn!("Audio receiver is gone, dropping command: {:?}", e.0);
        }
    }
}

/// A decoded sound owned by the asset loader's cache.
#[derive(Debug, Clone)]
pub struct Sound {
    id: String,
    pcm: Arc<Pcm>,
    audio: AudioBridge,
}

impl Sound {
    pub fn new(id: impl Into<String>, pcm: Pcm, audio: AudioBridge) -> Self {
        Self {
            id: id.into(),
            pcm: Arc::new(pcm),
            audio,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pcm(&self) -> &Pcm {
        &self.pcm
    }

    /// Fire and forget.
    pub fn play_once(&self) {
        self.audio.send(AudioCommand::PlayOnce {
            id: self.id.clone(),
            pcm: Arc::clone(&self.pcm),
        });
    }

    pub fn length(&self) -> Duration {
        self.pcm.duration()
    }
}

/// Builds a PCM WAV file, mostly for tests and tooling.
pub fn encode_wav(pcm: &Pcm) -> Vec<u8> {
    let block_align = pcm.channels * (pcm.bits_per_sample / 8);
    let byte_rate = pcm.sample_rate * block_align as u32;

    let mut out = Vec::with_capacity(44 + pcm.data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + pcm.data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&pcm.channels.to_le_bytes());
    out.extend_from_slice(&pcm.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&pcm.bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(pcm.data.len() as u32).to_le_bytes());
    out.extend_from_slice(&pcm.data);
    if pcm.data.len() % 2 == 1 {
        out.push(0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_second_mono() -> Pcm {
        Pcm {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            data: vec![0; 16000],
        }
    }

    #[test]
    fn decodes_pcm_and_reports_length() {
        let wav = encode_wav(&one_second_mono());
        let pcm = decode_wav("beep", &wav).unwrap();
        assert_eq!(pcm, one_second_mono());
        assert_eq!(pcm.duration(), Duration::from_secs(1));
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let plain = encode_wav(&one_second_mono());
        // an odd-sized LIST chunk between the header and fmt
        let mut list = b"LIST".to_vec();
        list.extend_from_slice(&3u32.to_le_bytes());
        list.extend_from_slice(&[1, 2, 3, 0]);
        let wav = [&plain[..12], &list[..], &plain[12..]].concat();
        assert_eq!(decode_wav("beep", &wav).unwrap(), one_second_mono());
    }

    #[test]
    fn malformed_payloads_are_decode_errors() {
        assert!(matches!(decode_wav("x", b"OggS...."), Err(Error::Decode { .. })));

        let wav = encode_wav(&one_second_mono());
        let truncated = &wav[..wav.len() - 10];
        assert!(matches!(decode_wav("x", truncated), Err(Error::Decode { .. })));

        let mut float_wav = wav.clone();
        float_wav[20] = 3; // IEEE float format tag
        assert!(matches!(decode_wav("x", &float_wav), Err(Error::Decode { .. })));
    }

    #[test]
    fn play_once_hands_off_without_blocking() {
        let (bridge, rx) = AudioBridge::new();
        let sound = Sound::new("win", one_second_mono(), bridge);
        sound.play_once();
        sound.play_once();

        let commands: Vec<_> = rx.try_iter().collect();
        assert_eq!(commands.len(), 2);
        let AudioCommand::PlayOnce { id, pcm } = &commands[0];
        assert_eq!(id, "win");
        assert_eq!(pcm.sample_rate, 8000);
    }

    #[test]
    fn play_once_survives_a_dropped_receiver() {
        let (bridge, rx) = AudioBridge::new();
        drop(rx);
        Sound::new("lose", one_second_mono(), bridge).play_once();
    }
}

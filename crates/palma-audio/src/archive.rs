use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

use crate::error::AudioError;
use crate::recorder::AudioClip;

/// Keeps captured command audio on disk for audit.
///
/// Clips are written as 16-bit mono WAV files named
/// `command_<YYYYmmdd_HHMMSS>_<id>.wav`.
#[derive(Debug, Clone)]
pub struct AudioArchive {
    dir: PathBuf,
}

impl AudioArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `clip` to a new file and return its path.
    pub fn save(&self, clip: &AudioClip, id: Uuid) -> Result<PathBuf, AudioError> {
        if clip.is_empty() {
            return Err(AudioError::Archive("refusing to archive an empty clip".to_string()));
        }
        std::fs::create_dir_all(&self.dir)?;

        let short_id: String = id.simple().to_string().chars().take(8).collect();
        let name = format!(
            "command_{}_{}.wav",
            Utc::now().format("%Y%m%d_%H%M%S"),
            short_id
        );
        let path = self.dir.join(name);

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: clip.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for &sample in &clip.samples {
            let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(s)?;
        }
        writer.finalize()?;

        tracing::debug!(path = %path.display(), samples = clip.samples.len(), "Archived command audio");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_writes_readable_wav() {
        let dir = tempfile::tempdir().unwrap();
        let archive = AudioArchive::new(dir.path().join("audio"));
        let clip = AudioClip::new(vec![0.0, 0.5, -0.5, 1.0, -1.0], 16_000);

        let path = archive.save(&clip, Uuid::new_v4()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("command_"));
        assert!(name.ends_with(".wav"));

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -16383, 32767, -32767]);
    }

    #[test]
    fn test_two_saves_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let archive = AudioArchive::new(dir.path());
        let clip = AudioClip::new(vec![0.1; 160], 16_000);

        let a = archive.save(&clip, Uuid::new_v4()).unwrap();
        let b = archive.save(&clip, Uuid::new_v4()).unwrap();
        assert_ne!(a, b);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_empty_clip_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = AudioArchive::new(dir.path());
        let err = archive.save(&AudioClip::new(vec![], 16_000), Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AudioError::Archive(_)));
    }
}

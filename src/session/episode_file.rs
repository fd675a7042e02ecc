//! Binary episode container.
//!
//! Layout: 4-byte magic, u16 version, then length-prefixed postcard
//! records, one per dataset. Arm rows land under `arm/leader` and
//! `arm/follower` as frame-by-joint matrices; each sensor becomes one
//! dataset under `camera/<name>` or `tactile/<name>` with the time axis
//! first. Missed captures are stored as zero frames so the time axis
//! stays aligned.

use super::episode::Episode;
use crate::error::{Error, Result};
use crate::sensors::FrameKind;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: [u8; 4] = *b"AEPI";
const VERSION: u16 = 1;

/// One named dense array in the container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Hierarchical path, e.g. `arm/leader` or `camera/wrist`
    pub path: String,
    /// Shape with the time axis first
    pub shape: Vec<usize>,
    /// Row-major elements
    pub data: Vec<f32>,
}

/// Write an episode to `path`, replacing any existing file
pub fn write_episode<P: AsRef<Path>>(path: P, episode: &Episode) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;

    let joints = episode.joint_names.len();
    if !episode.leader.is_empty() {
        write_dataset(&mut writer, &flatten_rows("arm/leader", &episode.leader, joints)?)?;
    }
    write_dataset(&mut writer, &flatten_rows("arm/follower", &episode.follower, joints)?)?;

    for (name, track) in &episode.sensors {
        let prefix = match track.kind {
            FrameKind::Camera => "camera",
            FrameKind::Tactile => "tactile",
        };
        let frame_len: usize = track.shape.iter().product();
        let mut data = Vec::with_capacity(track.frames.len() * frame_len);
        for frame in &track.frames {
            match frame {
                Some(f) => {
                    if f.shape != track.shape {
                        return Err(Error::Encode(format!(
                            "sensor '{}' frame shape {:?} does not match track {:?}",
                            name, f.shape, track.shape
                        )));
                    }
                    data.extend_from_slice(&f.data);
                }
                None => data.extend(std::iter::repeat(0.0).take(frame_len)),
            }
        }
        let mut shape = vec![track.frames.len()];
        shape.extend_from_slice(&track.shape);
        write_dataset(
            &mut writer,
            &Dataset {
                path: format!("{}/{}", prefix, name),
                shape,
                data,
            },
        )?;
    }

    writer.flush()?;
    log::info!(
        "Wrote episode ({} frames) to {}",
        episode.frame_count(),
        path.as_ref().display()
    );
    Ok(())
}

/// Read back every dataset in the container
pub fn read_episode<P: AsRef<Path>>(path: P) -> Result<Vec<Dataset>> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(Error::Encode("not an episode file".to_string()));
    }
    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let version = u16::from_le_bytes(version);
    if version != VERSION {
        return Err(Error::Encode(format!("unsupported episode version {}", version)));
    }

    let mut datasets = Vec::new();
    loop {
        let mut len_bytes = [0u8; 4];
        match reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut record = vec![0u8; len];
        reader.read_exact(&mut record)?;
        datasets.push(postcard::from_bytes(&record)?);
    }
    Ok(datasets)
}

fn write_dataset<W: Write>(writer: &mut W, dataset: &Dataset) -> Result<()> {
    let encoded = postcard::to_stdvec(dataset)?;
    writer.write_all(&(encoded.len() as u32).to_le_bytes())?;
    writer.write_all(&encoded)?;
    Ok(())
}

fn flatten_rows(path: &str, rows: &[Vec<f32>], joints: usize) -> Result<Dataset> {
    let mut data = Vec::with_capacity(rows.len() * joints);
    for row in rows {
        if row.len() != joints {
            return Err(Error::Encode(format!(
                "ragged arm rows in '{}': {} vs {}",
                path,
                row.len(),
                joints
            )));
        }
        data.extend_from_slice(row);
    }
    Ok(Dataset {
        path: path.to_string(),
        shape: vec![rows.len(), joints],
        data,
    })
}

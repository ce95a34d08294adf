use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::filters::StepSnapshot;

/// Persists per-iteration particle clouds as JSON for offline plotting.
///
/// Consumes only owned snapshots, never filter state, so it can run as far
/// behind the pipeline as it likes.
pub struct CloudWriter {
    dir: PathBuf,
}

impl CloudWriter {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(CloudWriter { dir })
    }

    /// Write one snapshot as `cloud_<iteration>.json`, returning the path.
    pub fn write(&self, snapshot: &StepSnapshot) -> io::Result<PathBuf> {
        let path = self.dir.join(format!("cloud_{:05}.json", snapshot.iteration));
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Particle;

    #[test]
    fn test_writes_cloud_json() {
        let dir = std::env::temp_dir().join("uwb_locator_cloud_test");
        let writer = CloudWriter::new(&dir).unwrap();
        let snapshot = StepSnapshot {
            estimated_x: 1.5,
            estimated_y: 1.5,
            iteration: 7,
            particles: vec![Particle { x: 1.0, y: 2.0, weight: 0.0 }],
        };

        let path = writer.write(&snapshot).unwrap();
        assert!(path.ends_with("cloud_00007.json"));

        let restored: StepSnapshot =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(restored.iteration, 7);
        assert_eq!(restored.particles.len(), 1);

        let _ = fs::remove_dir_all(&dir);
    }
}

use std::path::{Path, PathBuf};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::mosaic::write_list_file;

/// Name of the per-group frame list.
pub const TIF_LIST: &str = "tif_list.txt";

/// Round-robin partition of a frame list into `K` groups.
///
/// Frame `i` lands in group `i % K`, so every frame belongs to exactly one
/// group and group sizes differ by at most one.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitAssignment {
    groups: Vec<Vec<PathBuf>>,
}

impl SplitAssignment {
    pub fn round_robin(frames: &[PathBuf], split_count: usize) -> Result<Self> {
        if split_count == 0 {
            return Err(PipelineError::InvalidConfig("split count must be at least 1".to_string()));
        }
        let mut groups = vec![Vec::new(); split_count];
        for (i, frame) in frames.iter().enumerate() {
            groups[i % split_count].push(frame.clone());
        }
        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[Vec<PathBuf>] {
        &self.groups
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group_of(&self, frame: &Path) -> Option<usize> {
        self.groups.iter().position(|group| group.iter().any(|f| f == frame))
    }

    /// Writes `{root}/{group}/tif_list.txt` for every group, one path per line.
    pub fn write_lists(&self, root: &Path) -> Result<Vec<PathBuf>> {
        self.groups
            .iter()
            .enumerate()
            .map(|(id, group)| {
                let path = root.join(id.to_string()).join(TIF_LIST);
                write_list_file(&path, group)?;
                Ok(path)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("frame_{i:03}_left.tif"))).collect()
    }

    #[test]
    fn groups_are_balanced_and_disjoint() {
        let all = frames(11);
        let split = SplitAssignment::round_robin(&all, 3).unwrap();
        let sizes: Vec<usize> = split.groups().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 3]);
        for (i, frame) in all.iter().enumerate() {
            assert_eq!(split.group_of(frame), Some(i % 3));
        }
        assert_eq!(split.groups().iter().map(Vec::len).sum::<usize>(), all.len());
    }

    #[test]
    fn zero_splits_is_a_config_error() {
        assert!(matches!(
            SplitAssignment::round_robin(&frames(2), 0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn lists_are_written_per_group() {
        let dir = tempfile::tempdir().unwrap();
        let split = SplitAssignment::round_robin(&frames(3), 2).unwrap();
        let lists = split.write_lists(dir.path()).unwrap();
        assert_eq!(lists[1], dir.path().join("1").join("tif_list.txt"));
        let first = std::fs::read_to_string(&lists[0]).unwrap();
        assert_eq!(first, "frame_000_left.tif\nframe_002_left.tif\n");
    }
}

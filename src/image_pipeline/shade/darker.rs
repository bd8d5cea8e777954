//! Darker-pixel conflict rule for overlapping tiles.
//!
//! Brightness is the HSV value channel, `max(r, g, b)`. A candidate whose
//! brightness is below [`NEAR_BLACK_THRESHOLD`] is treated as no-data. With
//! more than two candidates the pairwise rule is folded left in group order.

/// Brightness below which a pixel is considered empty.
pub const NEAR_BLACK_THRESHOLD: u8 = 2;

/// Which candidate supplies a merged pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    UseA,
    UseB,
    /// Index of the winning candidate in a chain of more than two.
    UseDarkestValid(usize),
}

impl MergeDecision {
    pub fn index(&self) -> usize {
        match self {
            MergeDecision::UseA => 0,
            MergeDecision::UseB => 1,
            MergeDecision::UseDarkestValid(i) => *i,
        }
    }
}

/// Value channel of an RGBA pixel; transparent pixels count as black.
pub fn brightness(pixel: &[u8]) -> u8 {
    if pixel[3] == 0 {
        return 0;
    }
    pixel[0].max(pixel[1]).max(pixel[2])
}

/// `A` wins when it is valid and strictly darker, or when `B` is empty.
/// Ties go to `B`.
pub fn decide_pair(a: u8, b: u8) -> MergeDecision {
    if (a < b && a >= NEAR_BLACK_THRESHOLD) || b < NEAR_BLACK_THRESHOLD {
        MergeDecision::UseA
    } else {
        MergeDecision::UseB
    }
}

pub fn decide(values: &[u8]) -> MergeDecision {
    if let [a, b] = values {
        return decide_pair(*a, *b);
    }
    let mut winner = 0;
    for (i, &value) in values.iter().enumerate().skip(1) {
        if decide_pair(values[winner], value) == MergeDecision::UseB {
            winner = i;
        }
    }
    MergeDecision::UseDarkestValid(winner)
}

/// Merges equally sized RGBA buffers pixel by pixel.
pub fn merge_rgba(candidates: &[Vec<u8>]) -> Vec<u8> {
    let Some(first) = candidates.first() else {
        return Vec::new();
    };
    let mut merged = first.clone();
    let mut values = vec![0u8; candidates.len()];
    for (p, out) in merged.chunks_exact_mut(4).enumerate() {
        let offset = p * 4;
        for (v, candidate) in values.iter_mut().zip(candidates) {
            *v = brightness(&candidate[offset..offset + 4]);
        }
        let winner = decide(&values).index();
        out.copy_from_slice(&candidates[winner][offset..offset + 4]);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn darker_valid_pixel_wins() {
        assert_eq!(decide_pair(40, 90), MergeDecision::UseA);
        assert_eq!(decide_pair(90, 40), MergeDecision::UseB);
        assert_eq!(decide_pair(50, 50), MergeDecision::UseB);
    }

    #[test]
    fn near_black_candidates_are_ignored() {
        // empty B keeps A whatever its value
        assert_eq!(decide_pair(250, 1), MergeDecision::UseA);
        assert_eq!(decide_pair(0, 0), MergeDecision::UseA);
        // darker but near-black A loses
        assert_eq!(decide_pair(1, 120), MergeDecision::UseB);
    }

    #[test]
    fn chains_fold_left_in_group_order() {
        assert_eq!(decide(&[80, 30, 60]), MergeDecision::UseDarkestValid(1));
        assert_eq!(decide(&[80, 1, 60]), MergeDecision::UseDarkestValid(2));
        assert_eq!(decide(&[0, 0, 0]), MergeDecision::UseDarkestValid(0));
        assert_eq!(decide(&[7]), MergeDecision::UseDarkestValid(0));
    }

    #[test]
    fn merge_picks_whole_pixels() {
        let a = vec![10, 20, 30, 255, 1, 1, 0, 255, 0, 0, 0, 0];
        let b = vec![200, 5, 5, 255, 90, 80, 70, 255, 60, 60, 60, 255];
        let merged = merge_rgba(&[a, b]);
        assert_eq!(merged, vec![10, 20, 30, 255, 90, 80, 70, 255, 60, 60, 60, 255]);
    }

    #[test]
    fn transparent_pixels_have_no_brightness() {
        assert_eq!(brightness(&[255, 255, 255, 0]), 0);
        assert_eq!(brightness(&[12, 200, 7, 255]), 200);
    }
}

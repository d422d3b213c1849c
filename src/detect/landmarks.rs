/// COCO-17 keypoint names, in model output order.
pub const COCO17_NAMES: [&str; 17] = [
    "nose",
    "eye_l",
    "eye_r",
    "ear_l",
    "ear_r",
    "shoulder_l",
    "shoulder_r",
    "elbow_l",
    "elbow_r",
    "wrist_l",
    "wrist_r",
    "hip_l",
    "hip_r",
    "knee_l",
    "knee_r",
    "ankle_l",
    "ankle_r",
];

pub const COCO17_EDGES: [(usize, usize); 18] = [
    (5, 7),
    (7, 9),
    (6, 8),
    (8, 10),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
    (5, 6),
    (11, 12),
    (5, 11),
    (6, 12),
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 0),
    (6, 0),
];

/// Name for `index`, or `"unknown"` when the table is shorter.
pub fn landmark_name(names: &[&'static str], index: usize) -> &'static str {
    names.get(index).copied().unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_edges_stay_within_table() {
        for (a, b) in COCO17_EDGES {
            assert!(a < COCO17_NAMES.len() && b < COCO17_NAMES.len());
        }
    }

    #[test]
    fn unknown_index_falls_back() {
        assert_eq!(landmark_name(&COCO17_NAMES, 9), "wrist_l");
        assert_eq!(landmark_name(&COCO17_NAMES, 40), "unknown");
    }
}

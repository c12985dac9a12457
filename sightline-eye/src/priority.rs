//! Label priority table and the priority/urgency filter

use sightline_core::{Detection, Distance, PriorityLevel};

/// Detections below this level are dropped.
pub const PRIORITY_THRESHOLD: u8 = 2;

/// Minimum level at which a very close object is urgent.
pub const URGENCY_PRIORITY_MIN: u8 = 4;

/// Level for labels that match nothing in the table.
pub const DEFAULT_PRIORITY: u8 = 2;

/// Ordered (pattern, level) pairs. Order breaks ties in the substring fallback.
pub const PRIORITY_TABLE: &[(&str, u8)] = &[
    ("person", 5),
    ("pedestrian", 5),
    ("child", 5),
    ("cyclist", 5),
    ("motorcyclist", 5),
    ("person_sitting", 5),
    ("car", 4),
    ("van", 4),
    ("truck", 4),
    ("bus", 4),
    ("motorcycle", 4),
    ("bicycle", 4),
    ("emergency vehicle", 4),
    ("ambulance", 4),
    ("fire truck", 4),
    ("tram", 4),
    ("traffic light", 3),
    ("stop sign", 3),
    ("road sign", 3),
    ("barrier", 3),
    ("cone", 3),
    ("pothole", 3),
    ("speed bump", 3),
    ("dog", 3),
    ("cat", 3),
    ("misc", 3),
    ("bench", 2),
    ("trash can", 2),
    ("fire hydrant", 2),
    ("parking meter", 2),
    ("gate", 2),
    ("tree", 1),
    ("pole", 1),
    ("building", 1),
    ("vegetation", 1),
    ("sidewalk", 1),
];

/// Priority of a label.
///
/// Lookup is case- and whitespace-insensitive. An exact table hit wins; otherwise every pattern
/// that contains the label or is contained in it is a candidate, and the longest candidate wins
/// (earliest in [`PRIORITY_TABLE`] on equal length). Anything else, including the empty label,
/// gets [`DEFAULT_PRIORITY`].
pub fn get_priority(label: &str) -> u8 {
    let clean = label.trim().to_lowercase();
    if clean.is_empty() {
        return DEFAULT_PRIORITY;
    }

    if let Some((_, level)) = PRIORITY_TABLE.iter().find(|(key, _)| *key == clean) {
        return *level;
    }

    let mut best: Option<(&str, u8)> = None;
    for (key, level) in PRIORITY_TABLE {
        if clean.contains(key) || key.contains(clean.as_str()) {
            match best {
                Some((current, _)) if current.len() >= key.len() => {}
                _ => best = Some((key, *level)),
            }
        }
    }

    best.map(|(_, level)| level).unwrap_or(DEFAULT_PRIORITY)
}

pub fn priority_level(label: &str) -> PriorityLevel {
    PriorityLevel::from_level(get_priority(label))
}

/// Urgency rule: high-priority object at very close range.
pub fn is_urgent(priority: u8, distance: Distance) -> bool {
    priority >= URGENCY_PRIORITY_MIN && distance == Distance::VeryClose
}

/// Drop low-priority detections, recompute priority and urgency, and order urgent items first.
///
/// Ordering is by `(urgency, priority)` descending; the sort is stable so equal keys keep their
/// input order. Applying the filter to its own output changes nothing.
pub fn apply_priority_filter(detections: Vec<Detection>) -> Vec<Detection> {
    let mut kept: Vec<Detection> = detections
        .into_iter()
        .filter_map(|mut det| {
            let priority = get_priority(&det.label);
            if priority < PRIORITY_THRESHOLD {
                return None;
            }
            let urgency = is_urgent(priority, det.distance);
            if urgency != det.urgency {
                det.alert = crate::spatial::build_alert(
                    &det.label,
                    det.direction,
                    det.vertical_zone,
                    det.distance,
                    urgency,
                );
            }
            det.priority = priority;
            det.priority_level = PriorityLevel::from_level(priority);
            det.urgency = urgency;
            Some(det)
        })
        .collect();

    kept.sort_by(|a, b| (b.urgency, b.priority).cmp(&(a.urgency, a.priority)));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::annotate;
    use sightline_core::BBox;

    fn det(label: &str, distance: Distance) -> Detection {
        let mut d = annotate(label, 0.9, BBox::new(10, 10, 50, 50), 300, 300, distance);
        d.urgency = false;
        d
    }

    #[test]
    fn test_exact_matches() {
        assert_eq!(get_priority("person"), 5);
        assert_eq!(get_priority("  Car "), 4);
        assert_eq!(get_priority("traffic light"), 3);
        assert_eq!(get_priority("bench"), 2);
        assert_eq!(get_priority("tree"), 1);
    }

    #[test]
    fn test_substring_fallback_longest_wins() {
        assert_eq!(get_priority("pedestrians"), 5);
        assert_eq!(get_priority("red car"), 4);
        // "fire truck" beats "truck"
        assert_eq!(get_priority("big fire truck"), 4);
        // "motorcyclist" beats "cyclist" and "motorcycle"
        assert_eq!(get_priority("motorcyclists"), 5);
        assert_eq!(get_priority("palm tree"), 1);
    }

    #[test]
    fn test_unknown_labels_default() {
        assert_eq!(get_priority("refrigerator"), DEFAULT_PRIORITY);
        assert_eq!(get_priority(""), DEFAULT_PRIORITY);
        assert_eq!(get_priority("   "), DEFAULT_PRIORITY);
    }

    #[test]
    fn test_person_very_close_is_urgent_and_first() {
        let out = apply_priority_filter(vec![
            det("car", Distance::Far),
            det("person", Distance::VeryClose),
        ]);
        assert_eq!(out[0].label, "person");
        assert_eq!(out[0].priority_level, PriorityLevel::Critical);
        assert!(out[0].urgency);
        assert!(out[0].alert.ends_with("URGENT!"));
        assert_eq!(out[1].label, "car");
        assert_eq!(out[1].priority_level, PriorityLevel::High);
        assert!(!out[1].urgency);
    }

    #[test]
    fn test_filter_drops_minimal() {
        let out = apply_priority_filter(vec![det("tree", Distance::Near), det("bench", Distance::Near)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "bench");
    }

    #[test]
    fn test_filter_stable_for_equal_keys() {
        let out = apply_priority_filter(vec![
            det("dog", Distance::Far),
            det("cat", Distance::Near),
            det("cone", Distance::Medium),
        ]);
        let labels: Vec<_> = out.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["dog", "cat", "cone"]);
    }

    #[test]
    fn test_filter_idempotent() {
        let once = apply_priority_filter(vec![
            det("bench", Distance::Far),
            det("truck", Distance::VeryClose),
            det("dog", Distance::VeryClose),
            det("person", Distance::Near),
        ]);
        let twice = apply_priority_filter(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_no_urgency_unless_very_close() {
        for distance in [Distance::Near, Distance::Medium, Distance::Far, Distance::Unknown] {
            let out = apply_priority_filter(vec![det("person", distance)]);
            assert!(!out[0].urgency);
            assert!(!out[0].alert.contains("URGENT"));
        }
    }
}

//! Natural-language rendering of pipeline results
//!
//! Everything here is a fixed template so the wording stays stable for speech output and tests.

use crate::spatial::capitalize;
use sightline_core::{Detection, Direction, Distance, Navigation};

/// Number of objects mentioned in a scene description.
pub const MAX_DESCRIBED_OBJECTS: usize = 4;

/// Spoken phrase for a navigation suggestion. Empty for [`Navigation::Unknown`].
pub fn navigation_phrase(navigation: Navigation) -> &'static str {
    match navigation {
        Navigation::MoveForward => "Path ahead is clear. You may proceed forward.",
        Navigation::MoveSlightlyLeft => "Steer slightly left to find a clearer path.",
        Navigation::MoveSlightlyRight => "Steer slightly right to find a clearer path.",
        Navigation::ObstacleAhead => "Obstacle detected ahead. Stop and reassess your route.",
        Navigation::Unknown => "",
    }
}

/// Speech-ready navigation instruction; never empty.
pub fn generate_navigation_instruction(navigation: Navigation) -> &'static str {
    match navigation_phrase(navigation) {
        "" => "Proceed with caution.",
        phrase => phrase,
    }
}

fn approach_phrase(direction: Direction) -> &'static str {
    match direction {
        Direction::Left => "from your left",
        Direction::Center => "directly ahead",
        Direction::Right => "from your right",
    }
}

/// One sentence per object, worded by distance and urgency.
pub fn object_sentence(det: &Detection) -> String {
    let l = capitalize(&det.label);
    let d = approach_phrase(det.direction);
    match (det.distance, det.urgency) {
        (Distance::VeryClose, true) => format!("{} {}, very close! Please slow down immediately.", l, d),
        (Distance::VeryClose, false) => format!("{} {} at close range.", l, d),
        (Distance::Near, true) => format!("{} approaching {}. Proceed with caution.", l, d),
        (Distance::Near, false) => format!("{} {} nearby.", l, d),
        (Distance::Medium, true) => format!("{} detected {} at moderate distance. Stay alert.", l, d),
        (Distance::Medium, false) => format!("{} {} at a moderate distance.", l, d),
        (Distance::Far, true) => format!("{} spotted {} in the distance.", l, d),
        (Distance::Far, false) => format!("{} detected {}, far away.", l, d),
        (Distance::Unknown, _) => format!("{} detected {}.", l, d),
    }
}

/// The `n` most relevant detections by `(urgency, priority)`, stable on ties.
pub fn top_detections(detections: &[Detection], n: usize) -> Vec<&Detection> {
    let mut sorted: Vec<&Detection> = detections.iter().collect();
    sorted.sort_by(|a, b| (b.urgency, b.priority).cmp(&(a.urgency, a.priority)));
    sorted.truncate(n);
    sorted
}

fn caption_sentence(caption: &str) -> Option<String> {
    let trimmed = caption.trim();
    if trimmed.is_empty() {
        return None;
    }
    let scene = capitalize(trimmed);
    Some(if scene.ends_with('.') { scene } else { scene + "." })
}

/// Caption, then the top objects, then the navigation phrase.
pub fn generate_scene_description(
    detections: &[Detection],
    navigation: Navigation,
    caption: &str,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.extend(caption_sentence(caption));
    parts.extend(
        top_detections(detections, MAX_DESCRIBED_OBJECTS)
            .into_iter()
            .map(object_sentence),
    );

    let nav = navigation_phrase(navigation);
    if !nav.is_empty() {
        parts.push(nav.to_string());
    }

    if detections.is_empty() && nav.is_empty() {
        parts.push("No significant objects detected. The scene appears clear.".to_string());
    }

    parts.join(" ")
}

/// Caption and top objects for assistive output, without navigation.
pub fn generate_assistive_caption(detections: &[Detection], caption: &str) -> String {
    let caption = caption_sentence(caption);
    if detections.is_empty() && caption.is_none() {
        return "The current view appears to be clear.".to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    parts.extend(caption);
    parts.extend(
        top_detections(detections, MAX_DESCRIBED_OBJECTS)
            .into_iter()
            .map(object_sentence),
    );
    parts.join(" ")
}

/// Neutral count-only summary for monitoring. No direction, distance or urgency wording.
pub fn generate_surveillance_summary<'a, I>(labels: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: Vec<(String, usize)> = Vec::new();
    for label in labels {
        let label = label.trim().to_lowercase();
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, n)) => *n += 1,
            None => counts.push((label, 1)),
        }
    }

    if counts.is_empty() {
        return "No activity detected.".to_string();
    }

    counts
        .iter()
        .map(|(label, count)| {
            let display = if label == "car" { "vehicle" } else { label.as_str() };
            let name = if *count > 1 {
                if display == "person" {
                    "persons".to_string()
                } else if display.ends_with('s') {
                    display.to_string()
                } else {
                    format!("{}s", display)
                }
            } else {
                display.to_string()
            };
            let suffix = if label == "backpack" { " unattended" } else { "" };
            format!("{} {} detected{}.", count, name, suffix)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

//! Approximate honeyfact matching
//!
//! A template-sized window slides across the (lower-cased) content one
//! character at a time. Each window is scored with
//! `1 - levenshtein(window, template) / max(len)`; the best window wins, and
//! among equally good windows the earliest one wins.
//!
//! Distances are computed with a cut-off: once a qualifying window is known,
//! later windows only need to beat it, so rows whose minimum already exceeds
//! the bound are abandoned. The winner is identical to an exhaustive scan.

/// Best approximate occurrence of a template in some content
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    /// Start offset in characters
    pub start: usize,
    /// End offset in characters (exclusive)
    pub end: usize,
    pub distance: usize,
    pub similarity: f64,
}

/// Plain Levenshtein distance over characters.
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
    bounded_levenshtein(a, b, usize::MAX).unwrap_or(usize::MAX)
}

/// Levenshtein distance, or `None` as soon as it must exceed `max`.
pub fn bounded_levenshtein(a: &[char], b: &[char], max: usize) -> Option<usize> {
    if a.is_empty() {
        return (b.len() <= max).then_some(b.len());
    }
    if b.is_empty() {
        return (a.len() <= max).then_some(a.len());
    }
    if a.len().abs_diff(b.len()) > max {
        return None;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
            row_min = row_min.min(curr[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let distance = prev[b.len()];
    (distance <= max).then_some(distance)
}

/// `1 - distance / max(len)`; two empty strings are identical.
pub fn similarity(a: &[char], b: &[char]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Find the best window of `content` matching `template` with a similarity
/// of at least `threshold`. Both inputs must already be lower-cased.
pub fn best_window(content: &[char], template: &[char], threshold: f64) -> Option<FuzzyMatch> {
    if template.is_empty() || content.is_empty() {
        return None;
    }

    let window = template.len().min(content.len());
    let longest = template.len().max(window);
    // Largest distance that still reaches the threshold.
    let allowed = ((1.0 - threshold) * longest as f64 + 1e-9).floor();
    if allowed < 0.0 {
        return None;
    }
    let mut bound = allowed as usize;
    let mut best: Option<FuzzyMatch> = None;

    for start in 0..=(content.len() - window) {
        let candidate = &content[start..start + window];
        if let Some(distance) = bounded_levenshtein(candidate, template, bound) {
            let improves = best.as_ref().map_or(true, |b| distance < b.distance);
            if improves {
                best = Some(FuzzyMatch {
                    start,
                    end: start + window,
                    distance,
                    similarity: 1.0 - distance as f64 / longest as f64,
                });
                if distance == 0 {
                    break;
                }
                // Later windows must be strictly better to win.
                bound = distance - 1;
            }
        }
    }

    best
}

//! Classification pattern families and update markers.
//!
//! Each memory type owns an ordered family of weighted patterns. A unit is
//! classified by the family with the highest matching weight; ties fall to
//! the family with the better priority (SEMANTIC > PROCEDURAL > PREFERENCE
//! > EPISODIC > WORKING > SENSORY). Patterns are compiled once at first
//! use.

use crate::models::MemoryType;
use once_cell::sync::Lazy;
use regex::Regex;

/// A weighted classification pattern.
pub struct WeightedPattern {
    /// The compiled pattern.
    pub regex: Regex,
    /// Confidence contributed by a match, in [0, 1].
    pub weight: f64,
}

/// An ordered family of patterns voting for one memory type.
pub struct PatternFamily {
    /// The type this family votes for.
    pub memory_type: MemoryType,
    /// Patterns, strongest first.
    pub patterns: Vec<WeightedPattern>,
}

/// Raw patterns are static literals; a failure here is a programmer error
/// caught by the compilation test below.
#[allow(clippy::unwrap_used)]
fn compile(raw: &str) -> Regex {
    Regex::new(raw).unwrap()
}

fn pattern(raw: &str, weight: f64) -> WeightedPattern {
    WeightedPattern {
        regex: compile(raw),
        weight,
    }
}

/// Classification families, ordered by type priority.
pub static CLASSIFICATION_FAMILIES: Lazy<Vec<PatternFamily>> = Lazy::new(|| {
    vec![
        PatternFamily {
            memory_type: MemoryType::Semantic,
            patterns: vec![
                pattern(r"(?i)\b(my|her|his|their) name is\b", 0.95),
                pattern(r"(?i)\bwe (decided|chose|agreed|settled) (on|to|that)?\b", 0.9),
                pattern(r"(?i)\b(i|we) (am|is|are) (a|an|the)\b", 0.85),
                pattern(r"(?i)\b(i|we) work (at|for|on)\b", 0.85),
                pattern(r"(?i)\bthe (team|project|service|company) (is|uses|runs|owns)\b", 0.8),
                pattern(r"(?i)\b(stands for|is defined as|means|consists of|refers to)\b", 0.75),
                pattern(r"(?i)\b(decision|decided that)\b", 0.7),
                pattern(r"(?i)\bis (written|built|implemented) in\b", 0.7),
            ],
        },
        PatternFamily {
            memory_type: MemoryType::Procedural,
            patterns: vec![
                pattern(r"(?i)\bhow to\b", 0.9),
                pattern(r"(?i)\bto (run|build|deploy|install|configure|test|debug)\b", 0.85),
                pattern(r"(?i)\b(first|then|next|finally),?\s", 0.75),
                pattern(r"(?i)\byou (must|should|need to|have to)\b", 0.75),
                pattern(r"(?i)\balways (run|check|verify|use)\b", 0.75),
                pattern(r"(?i)\b(steps?|procedure|process) (to|for|is)\b", 0.7),
                pattern(r"(?i)\bmake sure (to|that|you)\b", 0.65),
            ],
        },
        PatternFamily {
            memory_type: MemoryType::Preference,
            patterns: vec![
                pattern(r"(?i)\b(i|we) prefer\b", 0.95),
                pattern(r"(?i)\b(i|we)('d| would) rather\b", 0.9),
                pattern(r"(?i)\b(i|we) (like|love|enjoy|hate|dislike)\b", 0.85),
                pattern(r"(?i)\bfavou?rite\b", 0.85),
                pattern(r"(?i)\bworks? (best|better) for (me|us)\b", 0.7),
                pattern(r"(?i)\b(rather than|instead of)\b", 0.6),
            ],
        },
        PatternFamily {
            memory_type: MemoryType::Episodic,
            patterns: vec![
                pattern(
                    r"(?i)\b(yesterday|today|this morning|last (week|month|night|sprint))\b",
                    0.85,
                ),
                pattern(r"(?i)\bwe (met|talked|discussed|reviewed|paired|decided at)\b", 0.8),
                pattern(r"(?i)\b(fixed|deployed|released|merged|shipped|resolved)\b", 0.7),
                pattern(r"(?i)\b(happened|occurred|went down)\b", 0.65),
                pattern(r"(?i)\b(during|at) the (meeting|standup|retro|incident)\b", 0.65),
            ],
        },
        PatternFamily {
            memory_type: MemoryType::Working,
            patterns: vec![
                pattern(r"(?i)\b(currently|right now|at the moment|for now)\b", 0.8),
                pattern(r"(?i)\b(working on|in progress|halfway through|still debugging)\b", 0.8),
                pattern(r"(?i)\b(todo|to-do|next step|remaining work)\b", 0.75),
                pattern(r"(?i)\bneeds? (a|another) (look|review|pass)\b", 0.65),
            ],
        },
        PatternFamily {
            memory_type: MemoryType::Sensory,
            patterns: vec![
                pattern(
                    r"(?i)\bi (see|saw|hear|heard|notice|noticed|observe|observed)\b",
                    0.75,
                ),
                pattern(r"(?i)\b(looks|sounds|smells|feels|seems) like\b", 0.7),
                pattern(r"(?i)\b(appears to|seems to)\b", 0.6),
                pattern(r"(?i)\bthe (output|logs?|screen) (shows?|reads?)\b", 0.6),
            ],
        },
    ]
});

/// Prefix cues and negation phrasings that mark a unit as an update
/// candidate.
pub static UPDATE_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^\s*actually\b",
        r"(?i)^\s*correction:",
        r"(?i)^\s*i meant\b",
        r"(?i)^\s*sorry,",
        r"(?i)^\s*no,",
        r"(?i)^\s*wait,",
        r"(?i)^\s*let me correct\b",
        r"(?i)\b(no longer|not anymore)\b",
        r"(?i)\b(changed|switched|moved) (to|from)\b",
        r"(?i)\bnot\b.*\b(after all|anymore)\b",
    ]
    .iter()
    .map(|raw| compile(raw))
    .collect()
});

/// Cue words that raise importance regardless of type.
pub static IMPORTANCE_CUES: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\b(always|never|critical|crucial|essential|important|must)\b"));

/// Classifies a unit: the winning memory type and the weight of the best
/// matching pattern. Units matching nothing default to EPISODIC at low
/// confidence.
#[must_use]
pub fn classify(unit: &str) -> (MemoryType, f64) {
    let mut best: Option<(MemoryType, f64)> = None;
    for family in CLASSIFICATION_FAMILIES.iter() {
        let family_best = family
            .patterns
            .iter()
            .filter(|p| p.regex.is_match(unit))
            .map(|p| p.weight)
            .fold(None::<f64>, |acc, w| Some(acc.map_or(w, |a| a.max(w))));
        if let Some(weight) = family_best {
            let better = match best {
                None => true,
                // Strictly-greater keeps ties on the earlier family, which
                // is the higher-priority type by construction.
                Some((_, best_weight)) => weight > best_weight,
            };
            if better {
                best = Some((family.memory_type, weight));
            }
        }
    }
    best.unwrap_or((MemoryType::Episodic, 0.4))
}

/// Returns true if the unit carries an update/correction cue.
#[must_use]
pub fn is_update_marker(unit: &str) -> bool {
    UPDATE_MARKERS.iter().any(|m| m.is_match(unit))
}

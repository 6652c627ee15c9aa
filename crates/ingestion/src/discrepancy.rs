//! Synthetic label discrepancies
//!
//! Builds demo/test corpora with known contradictions between marketing copy
//! and ground truth. A selected text either has an existing claim flipped
//! ("sockerfri" becomes "med socker") or gets a contradictory sentence appended.
//!
//! Randomness is always passed in. Reproducing a run needs the same seed, the
//! same record order and the same number of draws per record:
//! 1. selection draw
//! 2. if selected, branch draw
//! 3. toggle branch: one draw to pick the pair
//! 4. additive branch (or toggle miss under `AppendAdditive`): one draw to pick the claim

pub use catalog_prep_common::config::ToggleMissPolicy;
use rand::seq::SliceRandom;
use rand::Rng;

/// Default share of records that receive a discrepancy
pub const DEFAULT_DISCREPANCY_RATE: f64 = 0.18;

/// Probability of trying the toggle branch once a record is selected
pub const TOGGLE_PROBABILITY: f64 = 0.5;

/// A claim phrase and the replacement that contradicts it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleClaim {
    pub phrase: &'static str,
    pub replacement: &'static str,
}

const fn toggle(phrase: &'static str, replacement: &'static str) -> ToggleClaim {
    ToggleClaim { phrase, replacement }
}

/// Toggle claims in priority order
pub const TOGGLE_CLAIMS: &[ToggleClaim] = &[
    toggle("sockerfri", "med socker"),
    toggle("utan socker", "med socker"),
    toggle("vegansk", "innehåller gelatin"),
    toggle("vegan", "innehåller gelatin"),
    toggle("laktosfri", "innehåller laktos"),
    toggle("koffeinfri", "innehåller koffein"),
    toggle("utan palmolja", "innehåller palmolja"),
    toggle("sockerfri", "sötad med socker"),
];

/// Standalone contradictory sentences
pub const ADDITIVE_CLAIMS: &[&str] = &[
    "Obs: Innehåller nötter.",
    "Obs: Innehåller gelatin.",
    "Obs: Tillsatt socker.",
    "Obs: Innehåller koffein.",
    "Obs: Ej glutenfri.",
];

/// What happened to a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Perturbation {
    Toggled {
        phrase: &'static str,
        replacement: &'static str,
    },
    Appended {
        claim: &'static str,
    },
    Unchanged,
}

impl Perturbation {
    /// Label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Perturbation::Toggled { .. } => "toggled",
            Perturbation::Appended { .. } => "appended",
            Perturbation::Unchanged => "unchanged",
        }
    }

    /// Whether the text now carries a discrepancy
    pub fn is_injected(&self) -> bool {
        !matches!(self, Perturbation::Unchanged)
    }
}

/// Output text plus what was done to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub text: String,
    pub perturbation: Perturbation,
}

impl Injection {
    fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            perturbation: Perturbation::Unchanged,
        }
    }
}

/// Byte range of the first case-insensitive occurrence of `needle`
pub fn find_ignore_case(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }

    'start: for (start, _) in haystack.char_indices() {
        let mut hay = haystack[start..].char_indices();
        let mut end = start;
        for n in needle.chars() {
            match hay.next() {
                Some((offset, h)) if chars_eq_ignore_case(h, n) => {
                    end = start + offset + h.len_utf8();
                }
                _ => continue 'start,
            }
        }
        return Some((start, end));
    }
    None
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Replace the first case-insensitive occurrence of the claim phrase.
///
/// `None` when the phrase does not occur.
pub fn apply_toggle(text: &str, claim: &ToggleClaim) -> Option<String> {
    let (start, end) = find_ignore_case(text, claim.phrase)?;
    Some(format!("{}{}{}", &text[..start], claim.replacement, &text[end..]))
}

/// Append a claim after trimming trailing whitespace, separated by one space
pub fn append_claim(text: &str, claim: &str) -> String {
    format!("{} {}", text.trim_end(), claim)
}

/// Probabilistic discrepancy injector
#[derive(Debug, Clone)]
pub struct DiscrepancyInjector {
    rate: f64,
    miss_policy: ToggleMissPolicy,
}

impl Default for DiscrepancyInjector {
    fn default() -> Self {
        Self::new(DEFAULT_DISCREPANCY_RATE, ToggleMissPolicy::default())
    }
}

impl DiscrepancyInjector {
    pub fn new(rate: f64, miss_policy: ToggleMissPolicy) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            miss_policy,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn miss_policy(&self) -> ToggleMissPolicy {
        self.miss_policy
    }

    /// One Bernoulli draw against the configured rate
    pub fn select<R: Rng>(&self, rng: &mut R) -> bool {
        rng.gen::<f64>() < self.rate
    }

    /// Selection draw followed, when selected, by a perturbation
    pub fn apply<R: Rng>(&self, text: &str, rng: &mut R) -> Injection {
        if self.select(rng) {
            self.perturb(text, rng)
        } else {
            Injection::unchanged(text)
        }
    }

    /// Perturb a text that has already been selected
    pub fn perturb<R: Rng>(&self, text: &str, rng: &mut R) -> Injection {
        if rng.gen::<f64>() < TOGGLE_PROBABILITY {
            if let Some(claim) = TOGGLE_CLAIMS.choose(rng) {
                return self.toggle_or_fallback(text, claim, rng);
            }
        }
        self.append_random(text, rng)
    }

    /// Toggle `claim` if present, otherwise follow the miss policy
    pub fn toggle_or_fallback<R: Rng>(&self, text: &str, claim: &ToggleClaim, rng: &mut R) -> Injection {
        if let Some(toggled) = apply_toggle(text, claim) {
            return Injection {
                text: toggled,
                perturbation: Perturbation::Toggled {
                    phrase: claim.phrase,
                    replacement: claim.replacement,
                },
            };
        }

        match self.miss_policy {
            ToggleMissPolicy::AppendAdditive => self.append_random(text, rng),
            ToggleMissPolicy::Unchanged => Injection::unchanged(text),
        }
    }

    fn append_random<R: Rng>(&self, text: &str, rng: &mut R) -> Injection {
        match ADDITIVE_CLAIMS.choose(rng) {
            Some(&claim) => Injection {
                text: append_claim(text, claim),
                perturbation: Perturbation::Appended { claim },
            },
            None => Injection::unchanged(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TEXTS: &[&str] = &[
        "Vegansk och sockerfri dryck.",
        "Krämig yoghurt, laktosfri.",
        "Koffeinfritt kaffe.",
        "Glutenfria kex utan palmolja.",
        "Klassisk mjölkchoklad.",
    ];

    fn run(seed: u64, rate: f64) -> Vec<(bool, String)> {
        let injector = DiscrepancyInjector::new(rate, ToggleMissPolicy::AppendAdditive);
        let mut rng = StdRng::seed_from_u64(seed);
        TEXTS
            .iter()
            .cycle()
            .take(200)
            .map(|text| {
                let injection = injector.apply(text, &mut rng);
                (injection.perturbation.is_injected(), injection.text)
            })
            .collect()
    }

    #[test]
    fn test_same_seed_same_sequence() {
        assert_eq!(run(42, 0.18), run(42, 0.18));
        assert_ne!(run(42, 0.5), run(43, 0.5));
    }

    #[test]
    fn test_rate_bounds() {
        assert!(run(42, 0.0).iter().all(|(injected, _)| !injected));
        assert!(run(42, 1.0).iter().all(|(injected, _)| *injected));
    }

    #[test]
    fn test_rate_roughly_respected() {
        let injected = run(7, 0.18).iter().filter(|(i, _)| *i).count();
        // 200 draws at 18%: expect ~36
        assert!((15..=60).contains(&injected), "{injected}");
    }

    #[test]
    fn test_toggle_replaces_first_occurrence_only() {
        let claim = ToggleClaim {
            phrase: "vegansk",
            replacement: "innehåller gelatin",
        };
        let out = apply_toggle("Vegansk dryck. Helt vegansk!", &claim).unwrap();
        assert_eq!(out, "innehåller gelatin dryck. Helt vegansk!");
    }

    #[test]
    fn test_toggle_keeps_surrounding_text() {
        let out = apply_toggle("Ny SOCKERFRI läsk", &TOGGLE_CLAIMS[0]).unwrap();
        assert_eq!(out, "Ny med socker läsk");
    }

    #[test]
    fn test_toggle_absent_phrase() {
        assert_eq!(apply_toggle("Klassisk mjölkchoklad.", &TOGGLE_CLAIMS[0]), None);
    }

    #[test]
    fn test_toggle_miss_unchanged_policy() {
        let injector = DiscrepancyInjector::new(1.0, ToggleMissPolicy::Unchanged);
        let mut rng = StdRng::seed_from_u64(42);
        let injection = injector.toggle_or_fallback("Klassisk mjölkchoklad.", &TOGGLE_CLAIMS[2], &mut rng);
        assert_eq!(injection.text, "Klassisk mjölkchoklad.");
        assert_eq!(injection.perturbation, Perturbation::Unchanged);
        assert!(!injection.perturbation.is_injected());
    }

    #[test]
    fn test_toggle_miss_append_policy() {
        let injector = DiscrepancyInjector::new(1.0, ToggleMissPolicy::AppendAdditive);
        let mut rng = StdRng::seed_from_u64(42);
        let injection = injector.toggle_or_fallback("Klassisk mjölkchoklad.", &TOGGLE_CLAIMS[2], &mut rng);
        match injection.perturbation {
            Perturbation::Appended { claim } => {
                assert_eq!(injection.text, format!("Klassisk mjölkchoklad. {}", claim));
            }
            other => panic!("expected append, got {other:?}"),
        }
    }

    #[test]
    fn test_unchanged_policy_never_reports_injection_without_change() {
        let injector = DiscrepancyInjector::new(1.0, ToggleMissPolicy::Unchanged);
        let mut rng = StdRng::seed_from_u64(3);
        let text = "Klassisk mjölkchoklad.";
        let mut saw_unchanged = false;
        for _ in 0..100 {
            let injection = injector.apply(text, &mut rng);
            if injection.perturbation.is_injected() {
                assert_ne!(injection.text, text);
            } else {
                saw_unchanged = true;
                assert_eq!(injection.text, text);
            }
        }
        assert!(saw_unchanged);
    }

    #[test]
    fn test_selected_text_always_changes_by_default() {
        let injector = DiscrepancyInjector::new(1.0, ToggleMissPolicy::AppendAdditive);
        let mut rng = StdRng::seed_from_u64(42);
        let original = "Vegansk och sockerfri dryck.";
        for _ in 0..50 {
            let injection = injector.apply(original, &mut rng);
            assert_ne!(injection.text, original);
            match injection.perturbation {
                Perturbation::Toggled { replacement, .. } => assert!(injection.text.contains(replacement)),
                Perturbation::Appended { claim } => {
                    assert_eq!(injection.text, format!("{} {}", original, claim));
                    assert!(ADDITIVE_CLAIMS.contains(&claim));
                }
                Perturbation::Unchanged => panic!("selected text left unchanged"),
            }
        }
    }

    #[test]
    fn test_append_trims_trailing_whitespace() {
        assert_eq!(append_claim("Gott.  \n", "Obs: Ej glutenfri."), "Gott. Obs: Ej glutenfri.");
    }

    #[test]
    fn test_find_ignore_case_multibyte() {
        let text = "Helt UTAN PALMOLJA, ännu godare";
        let (start, end) = find_ignore_case(text, "utan palmolja").unwrap();
        assert_eq!(&text[start..end], "UTAN PALMOLJA");
        assert_eq!(find_ignore_case("ÄNNU", "ännu"), Some((0, "ÄNNU".len())));
        assert_eq!(find_ignore_case("abc", ""), None);
        assert_eq!(find_ignore_case("ab", "abc"), None);
    }
}

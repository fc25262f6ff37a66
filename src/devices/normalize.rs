//! Device name normalization and transport classification
//!
//! Normalization lowercases, collapses whitespace, strips profile suffixes
//! that Bluetooth stacks append ("(Hands-Free)", "HFP", "Bluetooth"), and
//! finally applies an alias table. The output is a fixed point: normalizing
//! it again returns the same string.

use std::collections::HashMap;

use super::Transport;

/// Suffixes stripped by default
pub const DEFAULT_STRIP_SUFFIXES: &[&str] = &["(hands-free)", "hands-free", "hfp", "bluetooth"];

/// Default alias table (variant → canonical)
pub const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("airpods pro", "airpods"),
    ("airpods pro 2", "airpods"),
    ("airpods max", "airpods"),
    ("airpods (3rd generation)", "airpods"),
    ("airpods (2nd generation)", "airpods"),
];

/// Trailing characters trimmed after a suffix is removed
const TRAILING_SEPARATORS: &[char] = &[' ', '-', ',', ':', '_'];

/// Prepared normalization rules
#[derive(Debug, Clone)]
pub struct NormalizeRules {
    suffixes: Vec<String>,
    aliases: HashMap<String, String>,
}

impl Default for NormalizeRules {
    fn default() -> Self {
        Self::new(
            DEFAULT_STRIP_SUFFIXES.iter().map(|s| s.to_string()),
            DEFAULT_ALIASES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }
}

impl NormalizeRules {
    /// Build rules from raw suffix and alias lists
    ///
    /// Alias keys and targets are themselves normalized, and every target maps
    /// to itself, which keeps [`NormalizeRules::normalize`] idempotent.
    pub fn new(
        suffixes: impl IntoIterator<Item = String>,
        aliases: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut suffixes: Vec<String> = suffixes
            .into_iter()
            .map(|s| collapse(&s.to_lowercase()))
            .filter(|s| !s.is_empty())
            .collect();
        // Longest first so "(hands-free)" wins over "hands-free"
        suffixes.sort_by(|a, b| b.len().cmp(&a.len()));
        suffixes.dedup();

        let mut rules = Self {
            suffixes,
            aliases: HashMap::new(),
        };

        let prepared: Vec<(String, String)> = aliases
            .into_iter()
            .map(|(variant, canonical)| (rules.strip(&variant), rules.strip(&canonical)))
            .filter(|(variant, canonical)| !variant.is_empty() && !canonical.is_empty())
            .collect();

        for (_, canonical) in &prepared {
            rules.aliases.insert(canonical.clone(), canonical.clone());
        }
        for (variant, canonical) in prepared {
            rules.aliases.entry(variant).or_insert(canonical);
        }

        rules
    }

    /// Normalize a raw device name
    pub fn normalize(&self, raw: &str) -> String {
        let stripped = self.strip(raw);
        match self.aliases.get(&stripped) {
            Some(canonical) => canonical.clone(),
            None => stripped,
        }
    }

    /// Lowercase, collapse whitespace and strip suffixes until none applies
    fn strip(&self, raw: &str) -> String {
        let mut current = collapse(&raw.to_lowercase());

        'outer: loop {
            for suffix in &self.suffixes {
                let Some(prefix) = current.strip_suffix(suffix.as_str()) else {
                    continue;
                };
                // Only whole tokens: "earbuds hfp" strips, "mohfp" does not
                let at_boundary = suffix.starts_with('(')
                    || prefix.is_empty()
                    || prefix.ends_with(TRAILING_SEPARATORS);
                if !at_boundary {
                    continue;
                }
                let next = prefix.trim_end_matches(TRAILING_SEPARATORS).to_string();
                if next.is_empty() {
                    // Never strip a name down to nothing
                    break 'outer;
                }
                current = next;
                continue 'outer;
            }
            break;
        }

        current
    }
}

/// Collapse runs of whitespace into single spaces and trim
fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classify the transport of a device from its raw name and hints
///
/// An explicit adapter hint wins; otherwise substring heuristics on the raw
/// name and manufacturer are used.
pub fn classify_transport(raw_name: &str, manufacturer: Option<&str>, hint: Option<&str>) -> Transport {
    if let Some(hint) = hint {
        match hint.to_lowercase().as_str() {
            "bluetooth" | "bt" => return Transport::Bluetooth,
            "usb" => return Transport::Usb,
            "built_in" | "builtin" | "built-in" | "internal" => return Transport::BuiltIn,
            _ => {}
        }
    }

    let haystack = match manufacturer {
        Some(m) => format!("{} {}", raw_name, m).to_lowercase(),
        None => raw_name.to_lowercase(),
    };

    if ["bluetooth", "airpods", "beats"]
        .iter()
        .any(|needle| haystack.contains(needle))
    {
        Transport::Bluetooth
    } else if haystack.contains("usb") {
        Transport::Usb
    } else if ["built-in", "built in", "internal"]
        .iter()
        .any(|needle| haystack.contains(needle))
    {
        Transport::BuiltIn
    } else {
        Transport::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_profile_suffixes() {
        let rules = NormalizeRules::default();
        assert_eq!(rules.normalize("Jabra Evolve (Hands-Free)"), "jabra evolve");
        assert_eq!(rules.normalize("Jabra Evolve HFP"), "jabra evolve");
        assert_eq!(rules.normalize("WH-1000XM4 Bluetooth"), "wh-1000xm4");
        assert_eq!(rules.normalize("Headset - Bluetooth HFP"), "headset");
    }

    #[test]
    fn test_suffix_requires_token_boundary() {
        let rules = NormalizeRules::default();
        assert_eq!(rules.normalize("Studiohfp"), "studiohfp");
    }

    #[test]
    fn test_never_strips_to_empty() {
        let rules = NormalizeRules::default();
        assert_eq!(rules.normalize("Bluetooth"), "bluetooth");
        assert_eq!(rules.normalize("  HFP  "), "hfp");
    }

    #[test]
    fn test_airpods_variants_collapse() {
        let rules = NormalizeRules::default();
        assert_eq!(rules.normalize("AirPods Pro"), "airpods");
        assert_eq!(rules.normalize("AirPods Pro (Hands-Free)"), "airpods");
        assert_eq!(rules.normalize("AirPods Max"), "airpods");
        assert_eq!(rules.normalize("AirPods"), "airpods");
    }

    #[test]
    fn test_whitespace_collapse() {
        let rules = NormalizeRules::default();
        assert_eq!(rules.normalize("  MacBook   Pro  Microphone "), "macbook pro microphone");
    }

    #[test]
    fn test_classify_transport() {
        assert_eq!(classify_transport("AirPods Pro", None, None), Transport::Bluetooth);
        assert_eq!(classify_transport("Beats Flex", None, None), Transport::Bluetooth);
        assert_eq!(classify_transport("Headset Bluetooth", None, None), Transport::Bluetooth);
        assert_eq!(classify_transport("Blue Yeti USB", None, None), Transport::Usb);
        assert_eq!(classify_transport("Built-in Microphone", None, None), Transport::BuiltIn);
        assert_eq!(classify_transport("Internal Mic", None, None), Transport::BuiltIn);
        assert_eq!(classify_transport("Scarlett 2i2", None, None), Transport::Unknown);
    }

    #[test]
    fn test_classify_prefers_hint_and_reads_manufacturer() {
        assert_eq!(classify_transport("Scarlett 2i2", None, Some("usb")), Transport::Usb);
        assert_eq!(
            classify_transport("Studio Buds", Some("Beats by Dre"), None),
            Transport::Bluetooth
        );
        // Unrecognized hint falls back to heuristics
        assert_eq!(classify_transport("USB Mic", None, Some("thunderbolt")), Transport::Usb);
    }

    #[test]
    fn test_custom_alias_targets_are_normalized() {
        let rules = NormalizeRules::new(
            vec!["hfp".to_string()],
            vec![("Pixel Buds A-Series".to_string(), "Pixel Buds HFP".to_string())],
        );
        assert_eq!(rules.normalize("Pixel Buds A-Series"), "pixel buds");
        assert_eq!(rules.normalize("pixel buds"), "pixel buds");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(
            base in "[A-Za-z0-9 ()\\-]{0,24}",
            suffix in prop::sample::select(vec!["", " (Hands-Free)", " HFP", " Bluetooth", " - Bluetooth HFP", " Pro"]),
        ) {
            let rules = NormalizeRules::default();
            let raw = format!("{}{}", base, suffix);
            let once = rules.normalize(&raw);
            let twice = rules.normalize(&once);
            prop_assert_eq!(once, twice);
        }
    }
}

/// Static product-family table used for archetype detection
///
/// Each entry is external knowledge about one product family: the substrings
/// that identify it in a query, the qualifiers that sharpen catalog queries,
/// the title terms that signal a genuine match, and a plausible price band.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Archetype {
    /// Stable tag, also the key of the per-archetype scoring weight table
    pub tag: &'static str,
    pub triggers: &'static [&'static str],
    pub qualifier: &'static str,
    pub strong_qualifier: &'static str,
    pub generic_query: &'static str,
    pub must_have: &'static [&'static str],
    pub nice_to_have: &'static [&'static str],
    pub price_band: (f64, f64),
}

pub const GENERIC: &str = "generic";

pub static ARCHETYPES: &[Archetype] = &[
    Archetype {
        tag: "wireless_earbuds",
        triggers: &[
            "airpods",
            "earbuds",
            "earbud",
            "earphones",
            "earphone",
            "tws",
            "wireless headphones",
            "bluetooth headphones",
            "in-ear",
        ],
        qualifier: "wireless earbuds",
        strong_qualifier: "tws bluetooth earbuds",
        generic_query: "tws wireless earbuds",
        must_have: &["earbuds", "tws"],
        nice_to_have: &["wireless", "bluetooth", "anc", "noise cancelling", "5.3"],
        price_band: (8.0, 60.0),
    },
    Archetype {
        tag: "smartwatch",
        triggers: &["smartwatch", "smart watch", "apple watch", "fitness tracker", "smart band"],
        qualifier: "smart watch",
        strong_qualifier: "smart watch bluetooth call",
        generic_query: "smart watch fitness tracker",
        must_have: &["smart watch", "smartwatch"],
        nice_to_have: &["heart rate", "bluetooth", "waterproof", "amoled"],
        price_band: (10.0, 80.0),
    },
    Archetype {
        tag: "power_bank",
        triggers: &["power bank", "powerbank", "portable charger", "battery pack"],
        qualifier: "power bank",
        strong_qualifier: "power bank fast charging",
        generic_query: "power bank 20000mah",
        must_have: &["power bank", "powerbank"],
        nice_to_have: &["mah", "fast charging", "pd", "usb-c"],
        price_band: (8.0, 50.0),
    },
];

/// First archetype with a trigger contained in the normalized query.
pub fn detect(normalized_query: &str) -> Option<&'static Archetype> {
    ARCHETYPES
        .iter()
        .find(|a| a.triggers.iter().any(|t| normalized_query.contains(t)))
}

/// Human-readable form of a tag, matched against titles for the archetype bonus.
pub fn label(tag: &str) -> String {
    tag.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_earbuds() {
        assert_eq!(detect("airpods pro").map(|a| a.tag), Some("wireless_earbuds"));
        assert_eq!(detect("bluetooth headphones").map(|a| a.tag), Some("wireless_earbuds"));
    }

    #[test]
    fn test_detect_none() {
        assert!(detect("cast iron skillet").is_none());
    }

    #[test]
    fn test_label() {
        assert_eq!(label("wireless_earbuds"), "wireless earbuds");
        assert_eq!(label(GENERIC), "generic");
    }
}

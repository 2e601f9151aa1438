//! Geographic bucketing and balanced sample selection.
//!
//! Bucketing is a deterministic keyword match on the free-text location
//! description the network-testing API reports. It only needs to be coarse:
//! the buckets exist so a bounded sample does not collapse onto whichever
//! region hosts the most probes.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

/// Coarse geographic bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Bucket {
    #[serde(rename = "North America")]
    NorthAmerica,
    #[serde(rename = "South America")]
    SouthAmerica,
    #[serde(rename = "Europe")]
    Europe,
    #[serde(rename = "Asia")]
    Asia,
    #[serde(rename = "Africa")]
    Africa,
    #[serde(rename = "Oceania")]
    Oceania,
    #[serde(rename = "Other")]
    Other,
}

const NORTH_AMERICA: &[&str] = &[
    "north america",
    "united states",
    "usa",
    "u.s.",
    "canada",
    "mexico",
];
const SOUTH_AMERICA: &[&str] = &[
    "south america",
    "brazil",
    "argentina",
    "chile",
    "colombia",
    "peru",
];
const EUROPE: &[&str] = &[
    "europe",
    "germany",
    "france",
    "united kingdom",
    "uk",
    "netherlands",
    "spain",
    "italy",
    "poland",
    "sweden",
    "finland",
    "switzerland",
];
const ASIA: &[&str] = &[
    "asia",
    "japan",
    "china",
    "india",
    "singapore",
    "korea",
    "hong kong",
    "taiwan",
    "indonesia",
    "israel",
    "united arab emirates",
];
const AFRICA: &[&str] = &[
    "africa",
    "nigeria",
    "kenya",
    "egypt",
];
const OCEANIA: &[&str] = &["oceania", "australia", "new zealand"];

impl Bucket {
    pub const ALL: [Bucket; 7] = [
        Bucket::NorthAmerica,
        Bucket::SouthAmerica,
        Bucket::Europe,
        Bucket::Asia,
        Bucket::Africa,
        Bucket::Oceania,
        Bucket::Other,
    ];

    /// Classify a free-text location description. Case-insensitive substring
    /// match; unmatched descriptions land in [`Bucket::Other`].
    pub fn classify(description: &str) -> Bucket {
        let lower = description.to_lowercase();
        let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        // "South Africa" and "South America" both contain continent words
        // from other tables, so the more specific tables go first.
        if matches(AFRICA) {
            Bucket::Africa
        } else if matches(SOUTH_AMERICA) {
            Bucket::SouthAmerica
        } else if matches(NORTH_AMERICA) {
            Bucket::NorthAmerica
        } else if matches(EUROPE) {
            Bucket::Europe
        } else if matches(ASIA) {
            Bucket::Asia
        } else if matches(OCEANIA) {
            Bucket::Oceania
        } else {
            Bucket::Other
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Bucket::NorthAmerica => "North America",
            Bucket::SouthAmerica => "South America",
            Bucket::Europe => "Europe",
            Bucket::Asia => "Asia",
            Bucket::Africa => "Africa",
            Bucket::Oceania => "Oceania",
            Bucket::Other => "Other",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Select a bounded, bucket-balanced random sample.
///
/// Items are grouped by bucket, each group is shuffled, then groups are
/// drained round-robin until the limit is reached or every group is empty.
pub fn select_balanced<T, R>(
    items: Vec<T>,
    limit: usize,
    bucket_of: impl Fn(&T) -> Bucket,
    rng: &mut R,
) -> Vec<T>
where
    R: Rng + ?Sized,
{
    let mut groups: BTreeMap<Bucket, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(bucket_of(&item)).or_default().push(item);
    }
    for group in groups.values_mut() {
        group.shuffle(rng);
    }

    let mut selected = Vec::new();
    while selected.len() < limit {
        let mut drained = true;
        for group in groups.values_mut() {
            if selected.len() >= limit {
                break;
            }
            if let Some(item) = group.pop() {
                selected.push(item);
                drained = false;
            }
        }
        if drained {
            break;
        }
    }
    selected
}

//! Station catalogue
//!
//! The station → district list is embedded as loosely formatted text (columns
//! separated by runs of spaces, some lines with mis-encoded Turkish letters).
//! It is parsed once into de-duplicated `(station, district)` pairs.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::RailcastError;

const STATION_DISTRICT_RAW: &str = include_str!("stations.txt");

static COLUMN_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}|\t+").unwrap());
static TRAILING_DISTRICT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)\s+([A-Za-zÇĞİÖŞÜçğıöşü]+)$").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

static BUILTIN: LazyLock<StationCatalog> =
    LazyLock::new(|| StationCatalog::parse(STATION_DISTRICT_RAW));

/// Repair letters that were decoded with the wrong Turkish code page.
#[must_use]
pub fn fix_weird_tr_chars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            'ý' => out.push('ı'),
            'Ý' => out.push('İ'),
            'þ' => out.push('ş'),
            'Þ' => out.push('Ş'),
            'ð' => out.push('ğ'),
            'Ð' => out.push('Ğ'),
            'Â' => {}
            'á' => out.push('a'),
            'Á' => out.push('A'),
            other => out.push(other),
        }
    }
    out
}

fn normalize_space(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

fn fold_char(ch: char) -> Option<char> {
    let folded = match ch {
        'ç' => 'c',
        'ğ' => 'g',
        'ı' => 'i',
        'ö' | 'ò' | 'ó' | 'ô' | 'õ' => 'o',
        'ş' => 's',
        'ü' | 'ù' | 'ú' | 'û' => 'u',
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        // combining diacritics, e.g. the dot left behind by lowercasing 'İ'
        '\u{0300}'..='\u{036F}' => return None,
        other => other,
    };
    Some(folded)
}

/// ASCII slug of a Turkish name: `"Kağıthane"` → `"kagithane"`,
/// `"Bakırköy İdo"` → `"bakirkoy_ido"`.
#[must_use]
pub fn slugify_tr(s: &str) -> String {
    let lowered = fix_weird_tr_chars(s).trim().to_lowercase();
    let folded: String = lowered.chars().filter_map(fold_char).collect();
    NON_SLUG
        .replace_all(&folded, "_")
        .trim_matches('_')
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Station {
    pub name: String,
    pub district: String,
    pub district_norm: String,
}

impl Station {
    #[must_use]
    pub fn new(name: &str, district: &str) -> Self {
        Self {
            name: name.to_string(),
            district: district.to_string(),
            district_norm: slugify_tr(district),
        }
    }

    /// Dropdown label; the district disambiguates repeated station names.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} — {}", self.name, self.district)
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = fix_weird_tr_chars(line.trim());
    if line.is_empty() {
        return None;
    }

    let parts: Vec<&str> = COLUMN_SPLIT.split(&line).collect();
    let (station, district) = if parts.len() >= 2 {
        (parts[0].to_string(), parts[1].to_string())
    } else {
        let caps = TRAILING_DISTRICT.captures(&line)?;
        (caps[1].to_string(), caps[2].to_string())
    };

    let station = normalize_space(&station);
    let district = normalize_space(&district);
    (!station.is_empty() && !district.is_empty()).then_some((station, district))
}

#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    stations: Vec<Station>,
}

impl StationCatalog {
    /// The embedded Istanbul rail station list.
    #[must_use]
    pub fn builtin() -> &'static StationCatalog {
        &BUILTIN
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut seen = HashSet::new();
        let stations = raw
            .lines()
            .filter_map(parse_line)
            .filter(|pair| seen.insert(pair.clone()))
            .map(|(s, d)| Station::new(&s, &d))
            .collect();
        Self { stations }
    }

    #[must_use]
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Stations whose label contains `filter`, compared on slugs so that
    /// `"kadikoy"` matches `"Kadıköy"`.
    #[must_use]
    pub fn search(&self, filter: &str) -> Vec<&Station> {
        let needle = slugify_tr(filter);
        self.stations
            .iter()
            .filter(|s| needle.is_empty() || slugify_tr(&s.label()).contains(&needle))
            .collect()
    }

    /// Resolve a station by its full label, or by station name when that
    /// name maps to a single district. Names match exactly first, then by
    /// slug, so case and Turkish letters do not matter.
    pub fn find(&self, query: &str) -> crate::Result<&Station> {
        let query = normalize_space(&fix_weird_tr_chars(query));
        if let Some(station) = self.stations.iter().find(|s| s.label() == query) {
            return Ok(station);
        }

        let mut matches: Vec<&Station> = self.stations.iter().filter(|s| s.name == query).collect();
        if matches.is_empty() {
            let wanted = slugify_tr(&query);
            matches = self
                .stations
                .iter()
                .filter(|s| slugify_tr(&s.name) == wanted)
                .collect();
        }

        match matches.as_slice() {
            [] => Err(RailcastError::validation(format!("Unknown station '{query}'"))),
            [single] => Ok(*single),
            many => Err(RailcastError::validation(format!(
                "Station '{query}' is ambiguous; use one of: {}",
                many.iter().map(|s| s.label()).collect::<Vec<_>>().join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Kağıthane", "kagithane")]
    #[case("Eyüpsultan", "eyupsultan")]
    #[case("Üsküdar", "uskudar")]
    #[case("Şişli", "sisli")]
    #[case("İSTANBUL", "istanbul")]
    #[case("  Bakırköy İdo ", "bakirkoy_ido")]
    #[case("Kadýköy (Batý)", "kadikoy_bati")]
    #[case("", "")]
    fn test_slugify_tr(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slugify_tr(input), expected);
    }

    #[test]
    fn test_fix_weird_chars() {
        assert_eq!(fix_weird_tr_chars("Acýbadem (Batý)"), "Acıbadem (Batı)");
        assert_eq!(fix_weird_tr_chars("Âtest"), "test");
    }

    #[test]
    fn test_parse_double_space_and_single_space_lines() {
        let raw = "AKSARAY         Fatih\nBereç Gaziosmanpaşa\n\n  Kazlýçeşme   Zeytinburnu\n";
        let catalog = StationCatalog::parse(raw);
        let pairs: Vec<(&str, &str)> = catalog
            .stations()
            .iter()
            .map(|s| (s.name.as_str(), s.district.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("AKSARAY", "Fatih"),
                ("Bereç", "Gaziosmanpaşa"),
                ("Kazlıçeşme", "Zeytinburnu"),
            ]
        );
    }

    #[test]
    fn test_duplicates_after_repair_are_removed() {
        let raw = "Acýbadem (Batý)       Kadıköy\nAcıbadem (Batı)       Kadıköy\n";
        assert_eq!(StationCatalog::parse(raw).len(), 1);
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = StationCatalog::builtin();
        assert!(catalog.len() > 300);
        let station = catalog.find("Kabataş").unwrap();
        assert_eq!(station.district, "Beyoğlu");
        assert_eq!(station.district_norm, "beyoglu");
    }

    #[test]
    fn test_ambiguous_station_requires_label() {
        let catalog = StationCatalog::builtin();
        let err = catalog.find("Göztepe").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));

        let station = catalog.find("Göztepe — Üsküdar").unwrap();
        assert_eq!(station.district_norm, "uskudar");
    }

    #[test]
    fn test_unknown_station() {
        assert!(StationCatalog::builtin().find("Atlantis").is_err());
    }

    #[test]
    fn test_search_ignores_turkish_letters() {
        let hits = StationCatalog::builtin().search("kadikoy");
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|s| slugify_tr(&s.label()).contains("kadikoy")));
    }

    #[rstest]
    #[case("alibeyköy batı", "ALİBEYKÖY BATI")]
    #[case("Alibeykoy Bati", "ALİBEYKÖY BATI")]
    #[case("yenikapı güney", "Yenikapı Güney")]
    fn test_find_by_name_ignores_case_and_turkish_letters(#[case] query: &str, #[case] name: &str) {
        let station = StationCatalog::builtin().find(query).unwrap();
        assert_eq!(station.name, name);
    }

    #[test]
    fn test_exact_name_wins_over_slug_twins() {
        let catalog = StationCatalog::builtin();
        assert_eq!(catalog.find("Kabataş").unwrap().name, "Kabataş");
        assert_eq!(catalog.find("KABATAS").unwrap().name, "KABATAS");
        let err = catalog.find("kabatas").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }
}

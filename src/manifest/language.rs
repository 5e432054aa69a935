/// ISO 639-2 (bibliographic and terminology) codes the player only
/// understands in their ISO 639-1 form.
const ISO_639_2_TO_1: &[(&str, &str)] = &[
    ("alb", "sq"),
    ("ara", "ar"),
    ("bos", "bs"),
    ("bul", "bg"),
    ("cat", "ca"),
    ("ces", "cs"),
    ("chi", "zh"),
    ("cze", "cs"),
    ("dan", "da"),
    ("deu", "de"),
    ("dut", "nl"),
    ("ell", "el"),
    ("eng", "en"),
    ("est", "et"),
    ("fin", "fi"),
    ("fra", "fr"),
    ("fre", "fr"),
    ("ger", "de"),
    ("gre", "el"),
    ("heb", "he"),
    ("hin", "hi"),
    ("hrv", "hr"),
    ("hun", "hu"),
    ("ice", "is"),
    ("isl", "is"),
    ("ita", "it"),
    ("jpn", "ja"),
    ("kor", "ko"),
    ("lav", "lv"),
    ("lit", "lt"),
    ("mac", "mk"),
    ("mkd", "mk"),
    ("nld", "nl"),
    ("nob", "nb"),
    ("nor", "no"),
    ("pol", "pl"),
    ("por", "pt"),
    ("ron", "ro"),
    ("rum", "ro"),
    ("rus", "ru"),
    ("slk", "sk"),
    ("slo", "sk"),
    ("slv", "sl"),
    ("spa", "es"),
    ("sqi", "sq"),
    ("srp", "sr"),
    ("swe", "sv"),
    ("tur", "tr"),
    ("ukr", "uk"),
    ("zho", "zh"),
];

/// Normalises a language tag: lower-cased primary subtag, 639-2 codes mapped
/// to 639-1, remaining subtags kept as given and joined with `-`.
pub fn normalize(tag: &str) -> String {
    let mut subtags = tag.split(['-', '_']);
    let primary = subtags.next().unwrap_or_default().to_ascii_lowercase();

    let primary = ISO_639_2_TO_1
        .binary_search_by(|(long, _)| long.cmp(&primary.as_str()))
        .map(|idx| ISO_639_2_TO_1[idx].1.to_string())
        .unwrap_or(primary);

    std::iter::once(primary)
        .chain(subtags.map(str::to_string))
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted_for_binary_search() {
        assert!(ISO_639_2_TO_1.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_three_letter_codes_are_shortened() {
        assert_eq!(normalize("spa"), "es");
        assert_eq!(normalize("ger"), "de");
        assert_eq!(normalize("deu"), "de");
    }

    #[test]
    fn test_primary_subtag_is_lowercased() {
        assert_eq!(normalize("EN"), "en");
        assert_eq!(normalize("POR-BR"), "pt-BR");
    }

    #[test]
    fn test_region_and_separator() {
        assert_eq!(normalize("es_ES"), "es-ES");
        assert_eq!(normalize("pt-BR"), "pt-BR");
    }

    #[test]
    fn test_unknown_codes_pass_through() {
        assert_eq!(normalize("und"), "und");
        assert_eq!(normalize("qaa"), "qaa");
    }
}


/// Punctuation stripped before matching, covering the inverted Spanish marks.
const STRIPPED_PUNCTUATION: [char; 8] = ['¡', '!', '¿', '?', '.', ',', ';', ':'];

/// Classify a query as a conversational greeting.
///
/// The text is normalized (punctuation stripped, trimmed, lowercased) and then
/// matched against the configured phrases: either the whole normalized text
/// equals a phrase, or it starts with a phrase followed by a space. A phrase
/// appearing mid-sentence does not count, so "Hola como estas" is a greeting
/// while "quiero decir hola al equipo" is a real query.
#[inline]
pub fn is_greeting(text: &str, phrases: &[String]) -> bool {
    let cleaned: String = text
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect();
    let cleaned = cleaned.trim().to_lowercase();

    if cleaned.is_empty() {
        return false;
    }

    phrases.iter().any(|phrase| {
        let phrase = phrase.to_lowercase();
        cleaned == phrase || cleaned.starts_with(&format!("{phrase} "))
    })
}

//! Text normalization shared by every resolution stage.
//!
//! Matching happens on a folded form: lowercase, French diacritics removed,
//! apostrophes, hyphens and punctuation turned into single spaces. Parameter
//! extraction works on the raw text so that user wording is preserved.

/// Words ignored by the similarity scorer.
const STOP_WORDS: &[&str] = &[
    "a", "au", "aux", "avec", "c", "ca", "ce", "ces", "cet", "cette", "d", "dans", "de", "des",
    "du", "elle", "en", "est", "et", "il", "j", "je", "l", "la", "le", "les", "m", "ma", "me",
    "mes", "moi", "mon", "ne", "nous", "on", "ou", "par", "pas", "peux", "pour", "qu", "quel",
    "quelle", "quelles", "quels", "que", "qui", "quoi", "s", "sa", "se", "ses", "son", "sur", "t",
    "ta", "te", "tes", "toi", "ton", "tu", "un", "une", "vous", "y", "an", "are", "can", "do",
    "i", "is", "it", "me", "my", "of", "please", "the", "to", "what", "you", "your", "stp",
    "svp",
];

/// Number of leading characters kept by [`stem`].
const STEM_LEN: usize = 5;

fn push_folded(out: &mut String, ch: char) {
    match ch {
        'à' | 'â' | 'ä' | 'á' | 'ã' => out.push('a'),
        'ç' => out.push('c'),
        'é' | 'è' | 'ê' | 'ë' => out.push('e'),
        'î' | 'ï' | 'í' | 'ì' => out.push('i'),
        'ô' | 'ö' | 'ó' | 'ò' | 'õ' => out.push('o'),
        'ù' | 'û' | 'ü' | 'ú' => out.push('u'),
        'ÿ' => out.push('y'),
        'ñ' => out.push('n'),
        'œ' => out.push_str("oe"),
        'æ' => out.push_str("ae"),
        c if c.is_alphanumeric() => out.push(c),
        _ => out.push(' '),
    }
}

/// Fold `text` into the matching form. Never fails; may return "".
pub fn normalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for ch in text.chars().flat_map(char::to_lowercase) {
        push_folded(&mut folded, ch);
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Crude prefix stem: good enough to pair "donne"/"donner", "analyse"/"analyser".
pub fn stem(token: &str) -> String {
    token.chars().take(STEM_LEN).collect()
}

/// Stems of the content words of an already normalized text, deduplicated.
pub fn content_stems(normalized: &str) -> Vec<String> {
    let mut stems: Vec<String> = Vec::new();
    for token in normalized.split(' ').filter(|t| !t.is_empty()) {
        if is_stop_word(token) {
            continue;
        }
        let s = stem(token);
        if !stems.contains(&s) {
            stems.push(s);
        }
    }
    stems
}

/// Levenshtein distance over characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let subst = prev[j] + usize::from(ca != cb);
            cur[j + 1] = subst.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

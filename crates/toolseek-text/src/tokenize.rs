use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer, TokenStream};

/// Language-aware tokenizer shared by the sparse and keyword retrievers.
///
/// Words are split on non-alphanumeric characters and lower-cased. Runs of
/// CJK ideographs, kana and hangul carry no word boundaries, so each run is
/// emitted as overlapping character bigrams (a lone character as a unigram).
#[derive(Clone)]
pub struct Tokenizer {
    analyzer: TextAnalyzer,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser).build();
        Self { analyzer }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        if text.is_empty() {
            return out;
        }
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        while stream.advance() {
            split_scripts(&stream.token().text, &mut out);
        }
        out
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x11FF      // hangul jamo
        | 0x3040..=0x30FF    // hiragana, katakana
        | 0x3130..=0x318F    // hangul compatibility jamo
        | 0x3400..=0x4DBF    // CJK extension A
        | 0x4E00..=0x9FFF    // CJK unified ideographs
        | 0xAC00..=0xD7AF    // hangul syllables
        | 0xF900..=0xFAFF    // CJK compatibility ideographs
        | 0x20000..=0x2FA1F) // CJK extensions B..F, supplement
}

fn split_scripts(token: &str, out: &mut Vec<String>) {
    let mut word = String::new();
    let mut run: Vec<char> = Vec::new();
    for c in token.chars() {
        if is_cjk(c) {
            if !word.is_empty() {
                out.push(std::mem::take(&mut word));
            }
            run.push(c);
        } else {
            if !run.is_empty() {
                push_ngrams(&run, out);
                run.clear();
            }
            word.push(c);
        }
    }
    if !word.is_empty() {
        out.push(word);
    }
    if !run.is_empty() {
        push_ngrams(&run, out);
    }
}

fn push_ngrams(run: &[char], out: &mut Vec<String>) {
    if run.len() == 1 {
        out.push(run[0].to_string());
    } else {
        out.extend(run.windows(2).map(|w| w.iter().collect::<String>()));
    }
}

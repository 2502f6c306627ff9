use crate::subtitle::Fragment;
use super::MergedSentence;

const TERMINAL_MARKS: [char; 6] = ['.', '?', '!', '。', '？', '！'];

/// Whether trimmed `text` ends a sentence
pub fn is_sentence_end(text: &str) -> bool {
    text.trim()
        .chars()
        .last()
        .is_some_and(|c| TERMINAL_MARKS.contains(&c))
}

/// Merge fragments into sentences in one pass.
///
/// A sentence closes on the fragment whose text ends with a terminal mark; an
/// unterminated tail becomes the last sentence. Every fragment index lands in
/// exactly one sentence, in order.
pub fn merge(fragments: &[Fragment]) -> Vec<MergedSentence> {
    let mut sentences = Vec::new();
    let mut text = String::new();
    let mut indices: Vec<usize> = Vec::new();
    let mut start = 0.0;

    for (index, fragment) in fragments.iter().enumerate() {
        if indices.is_empty() {
            start = fragment.start;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&fragment.text);
        indices.push(index);

        if is_sentence_end(&fragment.text) {
            sentences.push(MergedSentence {
                text: text.trim().to_string(),
                fragment_indices: std::mem::take(&mut indices),
                start,
                end: fragment.end,
            });
            text.clear();
        }
    }

    if let Some(&last) = indices.last() {
        sentences.push(MergedSentence {
            text: text.trim().to_string(),
            end: fragments[last].end,
            fragment_indices: indices,
            start,
        });
    }

    sentences
}

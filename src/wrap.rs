use crate::types::Pt;

/// Greedy word wrap. Explicit newlines always break; words accumulate onto
/// a line while they fit, and a word wider than the whole line gets cut at
/// character granularity. Measurement goes through the caller so the result
/// tracks whatever font the surface currently has active.
pub fn wrap_text<F>(text: &str, max_width: Pt, mut measure: F) -> Vec<String>
where
    F: FnMut(&str) -> Pt,
{
    let mut lines = Vec::new();
    for segment in text.split('\n') {
        if segment.trim().is_empty() {
            lines.push(String::new());
            continue;
        }
        wrap_segment(segment, max_width, &mut measure, &mut lines);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn wrap_segment<F>(segment: &str, max_width: Pt, measure: &mut F, lines: &mut Vec<String>)
where
    F: FnMut(&str) -> Pt,
{
    let space_width = measure(" ");
    let mut current = String::new();
    let mut current_width = Pt::ZERO;

    for word in segment.split_whitespace() {
        let word_width = measure(word);
        if word_width > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = Pt::ZERO;
            }
            hard_cut(word, max_width, measure, lines);
            continue;
        }
        let needed = if current.is_empty() {
            word_width
        } else {
            current_width + space_width + word_width
        };
        if needed > max_width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = word_width;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_width = needed;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
}

/// Character-level cut for tokens wider than the line. Every emitted piece
/// fits within max_width; a single glyph wider than the line still gets its
/// own line rather than looping forever.
fn hard_cut<F>(word: &str, max_width: Pt, measure: &mut F, lines: &mut Vec<String>)
where
    F: FnMut(&str) -> Pt,
{
    let mut piece = String::new();
    for ch in word.chars() {
        let mut candidate = piece.clone();
        candidate.push(ch);
        if measure(&candidate) > max_width && !piece.is_empty() {
            lines.push(std::mem::take(&mut piece));
            piece.push(ch);
        } else {
            piece = candidate;
        }
    }
    if !piece.is_empty() {
        lines.push(piece);
    }
}

/// Widest unbreakable token in the text, used for column minimums. Empty
/// or whitespace-only text measures zero.
pub(crate) fn widest_token<F>(text: &str, mut measure: F) -> Pt
where
    F: FnMut(&str) -> Pt,
{
    text.split_whitespace()
        .map(|token| measure(token))
        .fold(Pt::ZERO, Pt::max)
}

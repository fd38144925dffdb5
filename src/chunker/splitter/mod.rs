
/// Break candidates in order of preference. Earlier entries win even when a
/// later entry sits closer to the target cut.
const BOUNDARY_TOKENS: &[&str] = &[
    "\n\n", "\n", ". ", "؟ ", "? ", "! ", "。", "؛ ", "; ", "، ", ", ", " ",
];

/// Settings for splitting over-long chunks into overlapping pieces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSettings {
    /// Texts longer than this are split
    pub max_chars: usize,
    /// Preferred length of each piece
    pub target_chars: usize,
    /// Characters repeated at the start of the following piece
    pub overlap_chars: usize,
    /// How far back from the target cut to look for a boundary
    pub boundary_window_chars: usize,
}

/// Split `text` into overlapping pieces of roughly `target_chars` characters.
///
/// Texts at or under `max_chars` are returned unchanged as a single piece.
/// Cuts prefer paragraph, then line, then sentence, then clause, then word
/// boundaries found by scanning backward from the target cut; only when no
/// boundary exists in the window is a piece cut at the exact target.
#[inline]
pub fn split_with_overlap(text: &str, settings: &SplitSettings) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= settings.max_chars || settings.target_chars == 0 {
        return vec![text.to_string()];
    }

    // a piece never runs past max_chars, so every target cut stays inside the text
    let target = settings.target_chars.min(settings.max_chars);
    let mut pieces = Vec::new();
    let mut start = 0;

    loop {
        let remaining = chars.len() - start;
        if remaining <= settings.max_chars {
            push_piece(&mut pieces, &chars[start..]);
            break;
        }

        let target_end = start + target;
        let min_cut = start + settings.overlap_chars + 1;
        let cut = find_boundary(&chars, min_cut, target_end, settings.boundary_window_chars)
            .unwrap_or(target_end);

        push_piece(&mut pieces, &chars[start..cut]);

        let next = overlap_start(&chars, cut, settings.overlap_chars);
        start = next.max(start + 1);
    }

    pieces
}

fn push_piece(pieces: &mut Vec<String>, chars: &[char]) {
    let piece: String = chars.iter().collect();
    let piece = piece.trim();
    if !piece.is_empty() {
        pieces.push(piece.to_string());
    }
}

/// Scan backward from `target_end` for the most preferred boundary token,
/// returning the index just past it.
fn find_boundary(chars: &[char], min_cut: usize, target_end: usize, window: usize) -> Option<usize> {
    let window_start = target_end.saturating_sub(window).max(min_cut);
    if window_start >= target_end {
        return None;
    }

    for token in BOUNDARY_TOKENS {
        let token: Vec<char> = token.chars().collect();
        let mut pos = target_end.saturating_sub(token.len());
        while pos >= window_start {
            if chars[pos..pos + token.len()] == token[..] {
                return Some(pos + token.len());
            }
            if pos == 0 {
                break;
            }
            pos -= 1;
        }
    }

    None
}

/// Start of the next piece: `overlap` characters before `cut`, moved forward
/// to the next word start so the overlap never begins mid-word.
fn overlap_start(chars: &[char], cut: usize, overlap: usize) -> usize {
    let mut next = cut.saturating_sub(overlap);
    if next == 0 || chars[next - 1].is_whitespace() {
        return next;
    }

    while next < cut && !chars[next].is_whitespace() {
        next += 1;
    }
    while next < cut && chars[next].is_whitespace() {
        next += 1;
    }

    // A single word longer than the overlap: fall back to the raw offset.
    if next >= cut {
        cut.saturating_sub(overlap)
    } else {
        next
    }
}

/// Default number of characters per buffer mutation while streaming.
pub const DEFAULT_SEGMENT_SIZE: usize = 24;

/// Splits text into pieces of at most `target_size` chars, preferring to cut
/// just after whitespace found in the back half of each window.
pub fn segment(text: &str, target_size: usize) -> Segments<'_> {
    Segments {
        text,
        cursor: 0,
        target_size: target_size.max(1),
    }
}

/// Iterator over [`segment`] pieces; concatenating them yields the input.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    text: &'a str,
    cursor: usize,
    target_size: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.text[self.cursor..];
        if rest.is_empty() {
            return None;
        }

        let window: Vec<(usize, char)> = rest.char_indices().take(self.target_size + 1).collect();
        if window.len() <= self.target_size {
            self.cursor = self.text.len();
            return Some(rest);
        }

        let hard_cut = window[self.target_size].0;
        let midpoint = self.target_size / 2;
        let cut = (midpoint..self.target_size)
            .rev()
            .find(|&idx| window[idx].1.is_whitespace())
            .map(|idx| window[idx + 1].0)
            .unwrap_or(hard_cut);

        let piece = &rest[..cut];
        self.cursor += cut;
        Some(piece)
    }
}

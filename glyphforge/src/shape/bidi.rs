//! Bidirectional reordering: logical text to visual order.

use unicode_bidi::{BidiInfo, Level};

use crate::foundation::core::Direction;

/// Reorder `logical` into visual order for the given base direction.
///
/// Pure function; LTR and vertical directions pass through unchanged, RTL runs
/// the UAX #9 algorithm with an RTL paragraph level.
pub fn to_visual(logical: &str, base: Direction) -> String {
    if base != Direction::RightToLeft || logical.is_empty() {
        return logical.to_owned();
    }

    let info = BidiInfo::new(logical, Some(Level::rtl()));
    let Some(para) = info.paragraphs.first() else {
        return logical.to_owned();
    };
    info.reorder_line(para, para.range.clone()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ltr_passes_through() {
        assert_eq!(to_visual("Hello", Direction::LeftToRight), "Hello");
        assert_eq!(to_visual("東京都", Direction::TopToBottom), "東京都");
    }

    #[test]
    fn hebrew_is_reversed_for_rtl() {
        let logical = "שלום";
        let visual = to_visual(logical, Direction::RightToLeft);
        let reversed: String = logical.chars().rev().collect();
        assert_eq!(visual, reversed);
    }

    #[test]
    fn empty_text_is_untouched() {
        assert_eq!(to_visual("", Direction::RightToLeft), "");
    }

    #[test]
    fn mixed_run_keeps_latin_ltr_inside_rtl() {
        let visual = to_visual("אב12", Direction::RightToLeft);
        // The Hebrew letters flip around the embedded LTR digit run.
        assert_eq!(visual, "12בא");
    }
}

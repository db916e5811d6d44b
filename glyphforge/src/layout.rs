//! Line breaking and multi-line geometry.
//!
//! Breaking works on character counts only; measurement happens in the shaper
//! which feeds per-line pixel sizes back into the offset computation here.

use crate::foundation::core::{Direction, TextAlignment};
use crate::foundation::error::{ForgeError, ForgeResult};

/// Break `text` into `num_lines` lines.
///
/// Word mode respects whitespace boundaries and targets an even character
/// count per line; character mode splits as evenly as possible with the
/// remainder going to earlier lines.
pub fn break_into_lines(
    text: &str,
    num_lines: u32,
    mode: crate::config::BreakMode,
) -> Vec<String> {
    if num_lines <= 1 {
        return vec![text.to_owned()];
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    let n = num_lines as usize;
    if chars.len() <= n {
        let mut lines: Vec<String> = chars.iter().map(|c| c.to_string()).collect();
        lines.resize(n, String::new());
        return lines;
    }

    match mode {
        crate::config::BreakMode::Word => break_by_words(text, n),
        crate::config::BreakMode::Character => break_by_characters(&chars, n),
    }
}

fn break_by_words(text: &str, num_lines: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return vec![text.to_owned()];
    }

    let total_chars = text.chars().count();
    let target = total_chars / num_lines;

    let mut lines: Vec<String> = Vec::with_capacity(num_lines);
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for word in words {
        let word_len = word.chars().count();
        let space = usize::from(!current.is_empty());
        let would_exceed = current_len + space + word_len > target;
        let not_last_line = lines.len() + 1 < num_lines;

        if would_exceed && !current.is_empty() && not_last_line {
            lines.push(current.join(" "));
            current = vec![word];
            current_len = word_len;
        } else {
            current.push(word);
            current_len += space + word_len;
        }
    }
    if !current.is_empty() {
        lines.push(current.join(" "));
    }
    lines.resize(num_lines, String::new());
    lines.truncate(num_lines);
    lines
}

fn break_by_characters(chars: &[char], num_lines: usize) -> Vec<String> {
    let per_line = chars.len() / num_lines;
    let remainder = chars.len() % num_lines;

    let mut lines = Vec::with_capacity(num_lines);
    let mut start = 0;
    for i in 0..num_lines {
        let len = per_line + usize::from(i < remainder);
        lines.push(chars[start..start + len].iter().collect());
        start += len;
    }
    lines
}

/// Total surface size for measured lines.
///
/// For horizontal directions the height accumulates (`line_advance` per line)
/// and the width is the widest line; vertical directions swap the roles.
pub fn multiline_dimensions(
    line_sizes: &[(u32, u32)],
    line_advance: u32,
    direction: Direction,
) -> (u32, u32) {
    if line_sizes.is_empty() {
        return (0, 0);
    }
    let n = line_sizes.len() as u32;
    if direction.is_horizontal() {
        let max_w = line_sizes.iter().map(|&(w, _)| w).max().unwrap_or(0);
        (max_w, line_advance * n)
    } else {
        let max_h = line_sizes.iter().map(|&(_, h)| h).max().unwrap_or(0);
        (line_advance * n, max_h)
    }
}

/// Per-line placement offsets within the multi-line surface.
pub fn line_positions(
    line_sizes: &[(u32, u32)],
    line_advance: u32,
    alignment: TextAlignment,
    direction: Direction,
) -> ForgeResult<Vec<(i32, i32)>> {
    if !alignment.valid_for(direction) {
        return Err(ForgeError::config(format!(
            "alignment {alignment:?} is not valid for direction {direction:?}"
        )));
    }

    let mut positions = Vec::with_capacity(line_sizes.len());
    if direction.is_horizontal() {
        let max_w = line_sizes.iter().map(|&(w, _)| w).max().unwrap_or(0) as i32;
        for (i, &(w, _)) in line_sizes.iter().enumerate() {
            let x = match alignment {
                TextAlignment::Left => 0,
                TextAlignment::Center => (max_w - w as i32) / 2,
                TextAlignment::Right => max_w - w as i32,
                _ => unreachable!("validated above"),
            };
            positions.push((x, i as i32 * line_advance as i32));
        }
    } else {
        let max_h = line_sizes.iter().map(|&(_, h)| h).max().unwrap_or(0) as i32;
        for (i, &(_, h)) in line_sizes.iter().enumerate() {
            let y = match alignment {
                TextAlignment::Top => 0,
                TextAlignment::Center => (max_h - h as i32) / 2,
                TextAlignment::Bottom => max_h - h as i32,
                _ => unreachable!("validated above"),
            };
            positions.push((i as i32 * line_advance as i32, y));
        }
    }
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakMode;

    #[test]
    fn single_line_is_passthrough() {
        assert_eq!(
            break_into_lines("Hello world", 1, BreakMode::Word),
            vec!["Hello world"]
        );
    }

    #[test]
    fn empty_text_yields_one_empty_line() {
        assert_eq!(break_into_lines("", 3, BreakMode::Word), vec![""]);
    }

    #[test]
    fn word_break_respects_boundaries() {
        let lines = break_into_lines("Hello world testing", 2, BreakMode::Word);
        assert_eq!(lines, vec!["Hello world", "testing"]);
        for line in &lines {
            assert!(!line.starts_with(' ') && !line.ends_with(' '));
        }
    }

    #[test]
    fn character_break_distributes_remainder_to_earlier_lines() {
        let lines = break_into_lines("abcdefg", 3, BreakMode::Character);
        assert_eq!(lines, vec!["abc", "de", "fg"]);
    }

    #[test]
    fn short_text_pads_with_empty_lines() {
        let lines = break_into_lines("ab", 3, BreakMode::Character);
        assert_eq!(lines, vec!["a", "b", ""]);
    }

    #[test]
    fn horizontal_dimensions_accumulate_height() {
        let sizes = [(40, 12), (25, 12)];
        assert_eq!(
            multiline_dimensions(&sizes, 16, Direction::LeftToRight),
            (40, 32)
        );
    }

    #[test]
    fn vertical_dimensions_accumulate_width() {
        let sizes = [(14, 60), (14, 90)];
        assert_eq!(
            multiline_dimensions(&sizes, 20, Direction::TopToBottom),
            (40, 90)
        );
    }

    #[test]
    fn center_alignment_centers_each_line() {
        let sizes = [(40, 12), (20, 12)];
        let pos = line_positions(&sizes, 16, TextAlignment::Center, Direction::LeftToRight)
            .unwrap();
        assert_eq!(pos, vec![(0, 0), (10, 16)]);
    }

    #[test]
    fn right_alignment_flushes_right() {
        let sizes = [(40, 12), (20, 12)];
        let pos =
            line_positions(&sizes, 16, TextAlignment::Right, Direction::LeftToRight).unwrap();
        assert_eq!(pos, vec![(0, 0), (20, 16)]);
    }

    #[test]
    fn bottom_alignment_for_vertical_lines() {
        let sizes = [(14, 60), (14, 30)];
        let pos =
            line_positions(&sizes, 20, TextAlignment::Bottom, Direction::TopToBottom).unwrap();
        assert_eq!(pos, vec![(0, 0), (20, 30)]);
    }

    #[test]
    fn invalid_alignment_is_a_config_error() {
        let sizes = [(10, 10)];
        assert!(line_positions(&sizes, 12, TextAlignment::Left, Direction::TopToBottom).is_err());
    }
}

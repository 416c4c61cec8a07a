//! Lenient token helpers shared by the line-oriented text formats.
//! Numeric fields that are missing or unparsable read as zero.

use std::str::SplitWhitespace;

/// Lower-case `name` and replace anything outside `[a-z0-9_]` with `_`.
pub fn to_lower_identifier(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Parse a float token, yielding `0.0` when absent or malformed.
#[inline]
pub fn lossy_f32(token: Option<&str>) -> f32 {
    token.and_then(|t| t.parse::<f32>().ok()).unwrap_or(0.0)
}

/// Read the next `N` float tokens leniently.
pub fn read_floats<const N: usize>(parts: &mut SplitWhitespace<'_>) -> [f32; N] {
    let mut out = [0.0; N];
    for slot in out.iter_mut() {
        *slot = lossy_f32(parts.next());
    }
    out
}

/// Everything after the leading keyword, trimmed.
pub fn rest_after_keyword<'a>(line: &'a str, keyword: &str) -> &'a str {
    line.trim_start()
        .strip_prefix(keyword)
        .unwrap_or_default()
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_lowercase_and_safe() {
        assert_eq!(to_lower_identifier("Red Brick.01"), "red_brick_01");
        assert_eq!(to_lower_identifier("already_ok"), "already_ok");
    }

    #[test]
    fn malformed_numbers_read_as_zero() {
        let mut parts = "1.5 nope".split_whitespace();
        assert_eq!(read_floats::<3>(&mut parts), [1.5, 0.0, 0.0]);
        assert_eq!(lossy_f32(None), 0.0);
    }

    #[test]
    fn rest_keeps_inner_spaces() {
        assert_eq!(
            rest_after_keyword("  map_Kd  my textures/a b.png  ", "map_Kd"),
            "my textures/a b.png"
        );
        assert_eq!(rest_after_keyword("mtllib", "mtllib"), "");
    }
}

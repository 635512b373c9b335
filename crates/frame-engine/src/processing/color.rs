use image::Rgba;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Parse `#RRGGBB` or `#RRGGBBAA`; anything else is white.
pub fn parse_hex_color(raw: &str) -> Rgba<u8> {
    parse_hex_color_or(raw, WHITE)
}

/// Like [`parse_hex_color`], with an explicit fallback and default alpha for
/// six-digit input.
pub fn parse_hex_color_or(raw: &str, fallback: Rgba<u8>) -> Rgba<u8> {
    let hex = raw.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return fallback;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        6 => match (channel(0), channel(2), channel(4)) {
            (Some(r), Some(g), Some(b)) => Rgba([r, g, b, 255]),
            _ => fallback,
        },
        8 => match (channel(0), channel(2), channel(4), channel(6)) {
            (Some(r), Some(g), Some(b), Some(a)) => Rgba([r, g, b, a]),
            _ => fallback,
        },
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rgb_and_rgba() {
        assert_eq!(parse_hex_color("#FF8000").0, [255, 128, 0, 255]);
        assert_eq!(parse_hex_color("00000080").0, [0, 0, 0, 128]);
    }

    #[test]
    fn invalid_is_white() {
        assert_eq!(parse_hex_color("#12345").0, [255, 255, 255, 255]);
        assert_eq!(parse_hex_color("#GGGGGG").0, [255, 255, 255, 255]);
        assert_eq!(parse_hex_color("#ééé").0, [255, 255, 255, 255]);
    }
}

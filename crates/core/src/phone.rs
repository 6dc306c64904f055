/// Normalizes a phone number to its digits, e.g.
/// `"+54 9 381-123-4567"` -> `"5493811234567"`. Orders store and filter by
/// the normalized form so prefix searches behave consistently.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::normalize_phone;

    #[test]
    fn strips_everything_but_digits() {
        assert_eq!(normalize_phone("+54 9 381-123-4567"), "5493811234567");
        assert_eq!(normalize_phone("(0381) 412 3456"), "03814123456");
        assert_eq!(normalize_phone(""), "");
    }
}

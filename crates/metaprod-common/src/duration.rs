//! Compact formatting for step runtimes stored as whole seconds.

/// Render seconds as `1h 02m 03s`, `4m 05s` or `6s`.
pub fn format_seconds(total: i64) -> String {
    if total <= 0 {
        return "0s".to_string();
    }
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0), "0s");
        assert_eq!(format_seconds(-5), "0s");
        assert_eq!(format_seconds(6), "6s");
        assert_eq!(format_seconds(245), "4m 05s");
        assert_eq!(format_seconds(3723), "1h 02m 03s");
        assert_eq!(format_seconds(172_800), "48h 00m 00s");
    }
}

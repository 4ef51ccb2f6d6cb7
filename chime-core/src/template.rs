//! Message template rendering.

/// Substitute `{time}`, `{HH}` and `{mm}` with the zero-padded fire time.
/// Unknown braced tokens pass through untouched.
pub fn render(template: &str, hour: u32, minute: u32) -> String {
    template
        .replace("{time}", &format!("{hour:02}:{minute:02}"))
        .replace("{HH}", &format!("{hour:02}"))
        .replace("{mm}", &format!("{minute:02}"))
}

#[cfg(test)]
mod tests {
    use super::render;

    #[test]
    fn substitutes_every_placeholder() {
        assert_eq!(render("⏰ It's {time}.", 9, 5), "⏰ It's 09:05.");
        assert_eq!(render("{HH} hours {mm} minutes", 23, 0), "23 hours 00 minutes");
        assert_eq!(render("{time} {time}", 7, 30), "07:30 07:30");
    }

    #[test]
    fn leaves_other_text_alone() {
        assert_eq!(render("no placeholders", 12, 0), "no placeholders");
        assert_eq!(render("{unknown} {time}", 12, 0), "{unknown} 12:00");
        assert_eq!(render("", 1, 2), "");
    }
}

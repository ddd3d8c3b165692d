use crate::store::Command;

/// Map an inbound message body to at most one command.
///
/// Two tiers, first match wins: a byte-exact key lookup, then an
/// insertion-order scan of case-insensitive commands for a case-folded equal
/// that is not byte-equal (so an exact-case message always resolves to its
/// exact key). Full-body equality only — never prefix or substring.
pub fn match_command<'a>(
    entries: &'a [(String, Command)],
    body: &str,
) -> Option<(&'a str, &'a Command)> {
    if let Some((key, command)) = entries.iter().find(|(key, _)| key.as_str() == body) {
        return Some((key, command));
    }

    let folded = body.to_lowercase();
    entries.iter().find_map(|(key, command)| {
        (command.case_insensitive && key.as_str() != body && key.to_lowercase() == folded)
            .then_some((key.as_str(), command))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CommandAction;

    fn text(response: &str, case_insensitive: bool) -> Command {
        Command {
            case_insensitive,
            action: CommandAction::Text {
                response: response.into(),
            },
        }
    }

    fn entries(specs: &[(&str, &str, bool)]) -> Vec<(String, Command)> {
        specs
            .iter()
            .map(|(key, response, ci)| (key.to_string(), text(response, *ci)))
            .collect()
    }

    #[test]
    fn exact_match_wins_over_case_insensitive() {
        let commands = entries(&[("Hi", "formal", false), ("hi", "casual", true)]);

        let (key, _) = match_command(&commands, "hi").unwrap();
        assert_eq!(key, "hi");
        let (key, _) = match_command(&commands, "Hi").unwrap();
        assert_eq!(key, "Hi");
    }

    #[test]
    fn case_insensitive_matches_any_casing() {
        let commands = entries(&[("menu", "1. A 2. B", true)]);
        for body in ["menu", "MENU", "Menu", "mEnU"] {
            let (key, _) = match_command(&commands, body).unwrap();
            assert_eq!(key, "menu");
        }
    }

    #[test]
    fn case_sensitive_requires_exact_bytes() {
        let commands = entries(&[("menu", "1. A", false)]);
        assert!(match_command(&commands, "MENU").is_none());
        assert!(match_command(&commands, "menu").is_some());
    }

    #[test]
    fn never_matches_prefix_or_substring() {
        let commands = entries(&[("menu", "1. A", true)]);
        assert!(match_command(&commands, "menu please").is_none());
        assert!(match_command(&commands, "the menu").is_none());
        assert!(match_command(&commands, "men").is_none());
    }

    #[test]
    fn insertion_order_breaks_case_insensitive_ties() {
        let commands = entries(&[("Menu", "first", true), ("MENU", "second", true)]);
        let (key, _) = match_command(&commands, "menu").unwrap();
        assert_eq!(key, "Menu");
    }

    #[test]
    fn no_commands_no_match() {
        assert!(match_command(&[], "anything").is_none());
    }
}

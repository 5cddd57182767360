/// Slash-command extraction from free-text comment bodies.
///
/// A command is a line of the form `/<command> <optional argument>`. The
/// command name is compared case-insensitively; the argument is the rest of
/// the line with surrounding whitespace removed. Every line of a comment is
/// tested independently, so one comment can carry several commands.

/// Canonical (uppercased) name of the approve command.
pub const APPROVE_COMMAND: &str = "APPROVE";
/// Canonical (uppercased) name of the lgtm command.
pub const LGTM_COMMAND: &str = "LGTM";
/// Argument token that retracts a previous approval.
pub const CANCEL_ARGUMENT: &str = "cancel";
/// Argument token that waives the associated-issue requirement.
pub const NO_ISSUE_ARGUMENT: &str = "no-issue";

/// One parsed slash-command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name, uppercased so it compares directly against the
    /// command constants.
    pub name: String,
    /// Remainder of the line, trimmed of surrounding whitespace. Case is
    /// preserved; use [`Command::has_argument`] for token tests.
    pub arguments: String,
}

impl Command {
    /// Whether the trimmed argument contains `token` (case-insensitive).
    ///
    /// Substring matching is deliberate: it permits combined arguments such
    /// as `/approve no-issue cancel`.
    pub fn has_argument(&self, token: &str) -> bool {
        self.arguments.to_lowercase().contains(token)
    }
}

/// Extract all slash-commands from a comment body, in line order.
///
/// The leading `/` must be the first character of the line (no leading
/// whitespace), matching how commands have historically been recognized.
pub fn parse_commands(body: &str) -> Vec<Command> {
    let mut commands = Vec::new();
    for line in body.lines() {
        let Some(rest) = line.strip_prefix('/') else {
            continue;
        };
        let (name, arguments) = match rest.split_once(|c: char| c.is_whitespace()) {
            Some((name, rest)) => (name, rest.trim()),
            None => (rest, ""),
        };
        if name.is_empty() {
            continue;
        }
        commands.push(Command {
            name: name.to_uppercase(),
            arguments: arguments.to_string(),
        });
    }
    commands
}

/// Quick relevance test used by the webhook layer to skip comment events
/// that cannot possibly change the approver set.
pub fn contains_approval_command(body: &str, lgtm_acts_as_approve: bool) -> bool {
    parse_commands(body).iter().any(|command| {
        command.name == APPROVE_COMMAND
            || (lgtm_acts_as_approve && command.name == LGTM_COMMAND)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: &str, arguments: &str) -> Command {
        Command {
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_parse_single_command() {
        assert_eq!(parse_commands("/approve"), vec![cmd("APPROVE", "")]);
    }

    #[test]
    fn test_parse_command_with_argument() {
        assert_eq!(
            parse_commands("/approve cancel"),
            vec![cmd("APPROVE", "cancel")]
        );
        assert_eq!(
            parse_commands("/approve   no-issue  "),
            vec![cmd("APPROVE", "no-issue")]
        );
    }

    #[test]
    fn test_parse_is_case_insensitive_on_name() {
        assert_eq!(parse_commands("/Approve"), vec![cmd("APPROVE", "")]);
        assert_eq!(parse_commands("/LGTM"), vec![cmd("LGTM", "")]);
        assert_eq!(
            parse_commands("/lGtM Cancel"),
            vec![cmd("LGTM", "Cancel")]
        );
    }

    #[test]
    fn test_parse_multiline_body() {
        let body = "Looks good overall.\n/lgtm\nBut please also:\n/approve no-issue";
        assert_eq!(
            parse_commands(body),
            vec![cmd("LGTM", ""), cmd("APPROVE", "no-issue")]
        );
    }

    #[test]
    fn test_command_must_start_the_line() {
        assert!(parse_commands("  /approve").is_empty());
        assert!(parse_commands("please /approve this").is_empty());
    }

    #[test]
    fn test_bare_slash_is_not_a_command() {
        assert!(parse_commands("/").is_empty());
        assert!(parse_commands("/ approve").is_empty());
    }

    #[test]
    fn test_tab_separates_name_from_argument() {
        assert_eq!(
            parse_commands("/approve\tcancel"),
            vec![cmd("APPROVE", "cancel")]
        );
    }

    #[test]
    fn test_has_argument_is_substring_match() {
        let command = cmd("APPROVE", "no-issue cancel");
        assert!(command.has_argument(CANCEL_ARGUMENT));
        assert!(command.has_argument(NO_ISSUE_ARGUMENT));

        let command = cmd("APPROVE", "CANCEL");
        assert!(command.has_argument(CANCEL_ARGUMENT));

        let command = cmd("APPROVE", "");
        assert!(!command.has_argument(CANCEL_ARGUMENT));
    }

    #[test]
    fn test_contains_approval_command() {
        assert!(contains_approval_command("/approve", false));
        assert!(contains_approval_command("hi\n/approve cancel", false));
        assert!(!contains_approval_command("/lgtm", false));
        assert!(contains_approval_command("/lgtm", true));
        assert!(!contains_approval_command("nothing here", true));
        assert!(!contains_approval_command("/assign alice", true));
    }
}

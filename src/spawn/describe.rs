/// Human readable command descriptions for failure messages
use std::collections::BTreeMap;
use std::fmt::Write;

/// Arguments past the executable are cut after this many characters in the short form
const SHORT_FORM_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDescriptionForm {
    /// Single line, truncated argument list
    Short,
    /// Copy-pasteable shell snippet with working directory and environment
    Complete,
}

/// Render a command for humans
///
/// The executable is always included in full, regardless of form.
pub fn describe_command(
    form: CommandDescriptionForm,
    arguments: &[String],
    environment: &BTreeMap<String, String>,
    cwd: &str,
) -> String {
    let mut message = String::new();

    match form {
        CommandDescriptionForm::Short => {
            let mut args = arguments.iter();
            if let Some(executable) = args.next() {
                message.push_str(executable);
            }
            let mut budget = SHORT_FORM_LIMIT.saturating_sub(message.len());
            for arg in args {
                if arg.len() + 1 > budget {
                    message.push_str(" ...");
                    break;
                }
                message.push(' ');
                message.push_str(arg);
                budget -= arg.len() + 1;
            }
        }
        CommandDescriptionForm::Complete => {
            let _ = writeln!(message, "(cd {} && \\", shell_escape(cwd));
            message.push_str("  exec env - \\\n");
            for (key, value) in environment {
                let _ = writeln!(message, "    {}={} \\", key, shell_escape(value));
            }
            let rendered: Vec<String> = arguments.iter().map(|a| shell_escape(a)).collect();
            let _ = write!(message, "  {})", rendered.join(" "));
        }
    }

    message
}

/// Describe a failed command; `verbose` selects the complete form
pub fn describe_command_failure(
    verbose: bool,
    arguments: &[String],
    environment: &BTreeMap<String, String>,
    cwd: &str,
) -> String {
    if verbose {
        format!(
            "error executing command \n  {}",
            describe_command(
                CommandDescriptionForm::Complete,
                arguments,
                environment,
                cwd
            )
        )
    } else {
        format!(
            "error executing command {}",
            describe_command(CommandDescriptionForm::Short, arguments, environment, cwd)
        )
    }
}

fn shell_escape(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

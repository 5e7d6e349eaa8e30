//! Extraction of user-facing messages from code generator output.
//!
//! The generator reports problems with the user's Python code by panicking,
//! so the useful message is buried in cargo's build log. [`extract`] pulls the
//! panic message out of that log. When no panic message is found, the whole
//! output is returned behind a short preface, since the cause is then usually
//! at the end of the log.

/// Panic header of toolchains that quote the message on the header line.
const QUOTED_START: &str = "thread 'main' panicked at '";

/// Closes a quoted panic message, followed by the source location.
const QUOTED_END: &str = "', src/";

/// Panic header of toolchains that put the location on the header line and
/// the message on the following lines.
const LOCATED_START: &str = "thread 'main' panicked at ";

/// Preface of the raw-output fallback.
pub const FALLBACK_PREFACE: &str =
    "The underlying cause is likely at the bottom of the following output:\n\n";

/// Extract the panic message from raw generator output.
///
/// Never fails: output without a recognisable panic message is returned in
/// full after [`FALLBACK_PREFACE`].
pub fn extract(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let lines: Vec<&str> = text.lines().collect();

    let message = if lines.iter().any(|line| line.starts_with(QUOTED_START)) {
        quoted_message(&lines)
    } else {
        located_message(&lines)
    };

    message.unwrap_or_else(|| format!("{FALLBACK_PREFACE}{text}"))
}

/// `thread 'main' panicked at '<message...>', src/<location>`
fn quoted_message(lines: &[&str]) -> Option<String> {
    let start = lines.iter().position(|line| line.starts_with(QUOTED_START))?;
    let end = start + lines[start..].iter().position(|line| line.contains(QUOTED_END))?;

    let mut message: Vec<&str> = lines[start..=end].to_vec();
    message[0] = &message[0][QUOTED_START.len()..];
    let last = message.len() - 1;
    if let Some(pos) = message[last].find(QUOTED_END) {
        message[last] = &message[last][..pos];
    }

    Some(message.join("\n"))
}

/// `thread 'main' panicked at src/<location>:` followed by the message lines
/// and the backtrace hint.
fn located_message(lines: &[&str]) -> Option<String> {
    let start = lines.iter().position(|line| {
        line.strip_prefix(LOCATED_START)
            .is_some_and(|location| location.ends_with(':') && !location.starts_with('\''))
    })?;

    let message: Vec<&str> = lines[start + 1..]
        .iter()
        .take_while(|line| !line.starts_with("note: ") && !line.starts_with("stack backtrace:"))
        .copied()
        .collect();
    let message = message.join("\n");
    let message = message.trim_end();

    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}

//! Remediation hints for known permission and setup failures.

use regex::Regex;
use std::sync::OnceLock;

const HINT_TABLE: &[(&str, &str)] = &[
    (
        r"(?i)not allowed to send keystrokes|not allowed assistive access|accessibility",
        "Grant Accessibility access to your terminal in System Settings > Privacy & Security > Accessibility.",
    ),
    (
        r"(?i)could not create image from display|screen recording",
        "Grant Screen Recording access to your terminal in System Settings > Privacy & Security > Screen Recording.",
    ),
    (
        r"(?i)not authorized to send apple events|\(-1743\)",
        "Allow your terminal to control the target app in System Settings > Privacy & Security > Automation.",
    ),
    (
        r"(?i)no module named .?quartz",
        "Install the Quartz bindings: pip3 install pyobjc-framework-Quartz.",
    ),
    (
        r"^xdotool: failed to start",
        "Install xdotool (for example: sudo apt install xdotool).",
    ),
    (
        r"^scrot: failed to start",
        "Install scrot (for example: sudo apt install scrot).",
    ),
];

fn hints() -> &'static [(Regex, &'static str)] {
    static HINTS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    HINTS.get_or_init(|| {
        HINT_TABLE
            .iter()
            .filter_map(|(pattern, hint)| Regex::new(pattern).ok().map(|re| (re, *hint)))
            .collect()
    })
}

/// The remediation hint for `message`, if it matches a known failure.
pub fn hint_for(message: &str) -> Option<&'static str> {
    hints()
        .iter()
        .find(|(re, _)| re.is_match(message))
        .map(|(_, hint)| *hint)
}

/// Append a hint line to `message` when one applies.
pub fn annotate(message: &str) -> String {
    match hint_for(message) {
        Some(hint) => format!("{}\nHint: {}", message, hint),
        None => message.to_string(),
    }
}

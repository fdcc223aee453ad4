use ns_parser::quote_value;

use crate::binder::BoundCommand;

/// Renders a bound command back to `@alias key:value ...` text.
///
/// Only parameters bound from script text are emitted, using their raw text,
/// so parsing the output yields the same explicit bindings.
pub fn format_command(command: &BoundCommand) -> String {
    let mut out = format!("@{}", command.alias());
    for parameter in command.parameters.explicit() {
        let Some(raw) = parameter.raw_text.as_deref() else {
            continue;
        };
        out.push(' ');
        out.push_str(&parameter.name);
        out.push(':');
        out.push_str(&quote_value(raw));
    }
    out
}

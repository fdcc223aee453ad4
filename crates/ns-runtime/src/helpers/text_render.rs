use std::collections::BTreeMap;

use ns_core::NsValue;

/// Replaces `{name}` references with the variables' display text in one
/// pass. References to unknown variables are left untouched.
pub(crate) fn render_variables(template: &str, variables: &BTreeMap<String, NsValue>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let close = after_open
            .find(&['{', '}'][..])
            .filter(|index| after_open[*index..].starts_with('}'));
        match close {
            Some(close) => {
                let name = &after_open[..close];
                match variables.get(name) {
                    Some(value) => output.push_str(&value.to_display_text()),
                    None => {
                        output.push('{');
                        output.push_str(name);
                        output.push('}');
                    }
                }
                rest = &after_open[close + 1..];
            }
            None => {
                output.push('{');
                rest = after_open;
            }
        }
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod text_render_tests {
    use super::*;

    #[test]
    fn known_variables_are_substituted_once() {
        let mut variables = BTreeMap::new();
        variables.insert("name".to_string(), NsValue::from("{gold}"));
        variables.insert("gold".to_string(), NsValue::Int(12));
        assert_eq!(
            render_variables("Hi {name}, you have {gold} gold and {silver}.", &variables),
            "Hi {gold}, you have 12 gold and {silver}."
        );
    }

    #[test]
    fn stray_braces_are_kept() {
        let mut variables = BTreeMap::new();
        variables.insert("x".to_string(), NsValue::Float(1.5));
        assert_eq!(render_variables("a { b {x} }", &variables), "a { b 1.5 }");
        assert_eq!(render_variables("{{x}}", &variables), "{1.5}");
        assert_eq!(render_variables("open {", &variables), "open {");
    }
}

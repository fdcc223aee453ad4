use ns_core::NarrativeError;
use ns_parser::{tokenize_command, CommandTokens, ParamValue, Parameter, ParameterValue};

use crate::descriptor::{CommandDescriptor, DescriptorTable};
use crate::literal_cache::LiteralCache;

/// Result of binding one fragment set onto a declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub name: String,
    pub value: Option<ParamValue>,
    pub raw_text: Option<String>,
    pub error: Option<String>,
    pub from_default: bool,
    pub quoted: bool,
}

impl BoundParameter {
    fn unset(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            raw_text: None,
            error: None,
            from_default: false,
            quoted: false,
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Whether the value came from script text rather than a default.
    pub fn is_explicit(&self) -> bool {
        self.raw_text.is_some() && !self.from_default
    }

    pub fn typed<T: ParameterValue>(&self) -> Parameter<T> {
        Parameter::from_parts(
            self.value.clone().and_then(T::from_param_value),
            self.raw_text.clone(),
            self.error.clone(),
            self.from_default,
            self.quoted,
        )
    }
}

/// Parameters of one command, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundParameters {
    entries: Vec<BoundParameter>,
}

impl BoundParameters {
    pub fn get(&self, name: &str) -> Option<&BoundParameter> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn typed<T: ParameterValue>(&self, name: &str) -> Parameter<T> {
        self.get(name)
            .map(BoundParameter::typed)
            .unwrap_or_else(Parameter::unset)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundParameter> {
        self.entries.iter()
    }

    pub fn explicit(&self) -> impl Iterator<Item = &BoundParameter> {
        self.entries.iter().filter(|entry| entry.is_explicit())
    }
}

/// A command line resolved against its descriptor with every parameter bound.
#[derive(Debug, Clone)]
pub struct BoundCommand {
    pub descriptor: CommandDescriptor,
    pub inline_index: usize,
    pub parameters: BoundParameters,
    pub errors: Vec<String>,
    pub missing_required: Vec<String>,
    /// Fragments that matched no declared parameter.
    pub ignored_fragments: usize,
}

impl BoundCommand {
    pub fn alias(&self) -> &str {
        &self.descriptor.alias
    }

    /// Newline-joined binding errors, `None` when binding was clean.
    pub fn error_text(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("\n"))
        }
    }

    pub fn is_fatal(&self) -> bool {
        !self.missing_required.is_empty()
    }
}

/// Tokenizes and binds command text against a descriptor table, reusing
/// parsed literals through an owned cache.
#[derive(Debug, Clone)]
pub struct CommandBinder {
    table: DescriptorTable,
    cache: LiteralCache,
}

impl CommandBinder {
    pub fn new(table: DescriptorTable, cache_capacity: usize) -> Self {
        Self {
            table,
            cache: LiteralCache::new(cache_capacity),
        }
    }

    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    pub fn cache(&self) -> &LiteralCache {
        &self.cache
    }

    pub fn is_command_alias(&self, alias: &str) -> bool {
        self.table.contains(alias)
    }

    /// Errors only for text that cannot name a command at all; binding
    /// problems are carried on the returned [`BoundCommand`].
    pub fn bind(&mut self, text: &str, inline_index: usize) -> Result<BoundCommand, NarrativeError> {
        let tokens = tokenize_command(text)?;
        let Some(descriptor) = self.table.resolve(&tokens.alias) else {
            return Err(NarrativeError::new(
                "BIND_UNKNOWN_ALIAS",
                format!("Unknown command \"{}\".", tokens.alias),
            ));
        };
        let descriptor = descriptor.clone();
        Ok(bind_tokens(&descriptor, &tokens, inline_index, &mut self.cache))
    }
}

pub fn bind_tokens(
    descriptor: &CommandDescriptor,
    tokens: &CommandTokens,
    inline_index: usize,
    cache: &mut LiteralCache,
) -> BoundCommand {
    let mut assigned: Vec<Option<(String, bool)>> = vec![None; descriptor.params.len()];
    let positional_slots: Vec<usize> = descriptor
        .params
        .iter()
        .enumerate()
        .filter(|(_, spec)| spec.positional)
        .map(|(index, _)| index)
        .collect();
    let mut next_positional = 0;
    let mut ignored_fragments = 0;

    for fragment in &tokens.fragments {
        let slot = match &fragment.key {
            Some(key) => descriptor.param_index(key),
            None => {
                let slot = positional_slots.get(next_positional).copied();
                next_positional += 1;
                slot
            }
        };
        match slot {
            Some(index) => assigned[index] = Some((fragment.value.clone(), fragment.quoted)),
            None => {
                ignored_fragments += 1;
                tracing::debug!(
                    command = %descriptor.alias,
                    key = ?fragment.key,
                    "ignoring fragment with no matching parameter"
                );
            }
        }
    }

    let mut entries = Vec::with_capacity(descriptor.params.len());
    let mut errors = Vec::new();
    let mut missing_required = Vec::new();

    for (spec, assignment) in descriptor.params.iter().zip(assigned) {
        let mut entry = BoundParameter::unset(&spec.name);

        if let Some((raw, quoted)) = assignment {
            let parsed = cache.parse(spec.kind, &raw).and_then(|value| {
                for validator in &spec.validators {
                    validator.check(&value)?;
                }
                Ok(value)
            });
            match parsed {
                Ok(value) => entry.value = Some(value),
                Err(reason) => {
                    errors.push(format!(
                        "Failed to set value for parameter '{}': {}",
                        spec.name, reason
                    ));
                    entry.error = Some(reason);
                }
            }
            entry.raw_text = Some(raw);
            entry.quoted = quoted;
        }

        if entry.value.is_none() {
            if spec.required {
                errors.push(format!("Missing required parameter '{}'.", spec.name));
                missing_required.push(spec.name.clone());
            } else if let Some(default) = &spec.default {
                entry.value = Some(default.clone());
                entry.from_default = true;
            }
        }

        entries.push(entry);
    }

    BoundCommand {
        descriptor: descriptor.clone(),
        inline_index,
        parameters: BoundParameters { entries },
        errors,
        missing_required,
        ignored_fragments,
    }
}

#[cfg(test)]
mod binder_tests {
    use super::*;
    use crate::descriptor::{ParamSpec, Validator};
    use ns_parser::ParamKind;

    fn table() -> DescriptorTable {
        let mut table = DescriptorTable::new();
        table
            .register(
                CommandDescriptor::new("set", "variables")
                    .param(
                        ParamSpec::new("variable", ParamKind::String)
                            .alias("var")
                            .required()
                            .validate(Validator::NonEmpty),
                    )
                    .param(ParamSpec::new("value", ParamKind::String).alias("val")),
            )
            .expect("register set");
        table
            .register(
                CommandDescriptor::new("wait", "timing").param(
                    ParamSpec::new("time", ParamKind::Decimal)
                        .required()
                        .positional()
                        .validate(Validator::Range {
                            min: 0.0,
                            max: 3600.0,
                        }),
                ),
            )
            .expect("register wait");
        table
            .register(
                CommandDescriptor::new("move", "actors")
                    .param(ParamSpec::new("actor", ParamKind::String).positional())
                    .param(ParamSpec::new("speed", ParamKind::Integer).default_value(ParamValue::Integer(5)))
                    .param(ParamSpec::new("visible", ParamKind::Boolean)),
            )
            .expect("register move");
        table
    }

    fn binder() -> CommandBinder {
        CommandBinder::new(table(), 16)
    }

    #[test]
    fn set_binds_variable_and_value_through_aliases() {
        let bound = binder().bind("set var:health val:100", 0).expect("bind");
        assert_eq!(bound.alias(), "set");
        assert!(bound.error_text().is_none());
        let variable = bound.parameters.typed::<String>("variable");
        assert_eq!(variable.value().map(String::as_str), Some("health"));
        let value = bound.parameters.typed::<String>("value");
        assert_eq!(value.raw_text(), Some("100"));
    }

    #[test]
    fn missing_required_parameter_is_fatal_and_unset() {
        let bound = binder().bind("@set val:3", 0).expect("bind");
        assert!(bound.is_fatal());
        assert!(bound
            .error_text()
            .expect("error text")
            .contains("Missing required parameter 'variable'"));
        assert!(!bound.parameters.typed::<String>("variable").has_value());
    }

    #[test]
    fn binding_errors_are_aggregated_not_fail_fast() {
        let bound = binder()
            .bind("move hero speed:fast visible:perhaps", 0)
            .expect("bind");
        let text = bound.error_text().expect("errors");
        assert!(text.contains("Failed to set value for parameter 'speed': \"fast\" is not a valid integer"));
        assert!(text.contains("Failed to set value for parameter 'visible'"));
        assert_eq!(bound.errors.len(), 2);
        assert!(!bound.is_fatal());
        assert_eq!(
            bound.parameters.typed::<String>("actor").value().map(String::as_str),
            Some("hero")
        );
    }

    #[test]
    fn defaults_fill_unset_optional_parameters() {
        let bound = binder().bind("move hero", 0).expect("bind");
        let speed = bound.parameters.typed::<i64>("speed");
        assert_eq!(speed.value(), Some(&5));
        assert!(speed.is_from_default());
        assert!(!bound.parameters.typed::<bool>("visible").has_value());
        assert_eq!(bound.parameters.explicit().count(), 1);
    }

    #[test]
    fn last_fragment_wins_and_unknown_keys_are_ignored() {
        let bound = binder()
            .bind("set var:a var:b colour:red val:1", 0)
            .expect("bind");
        assert!(bound.error_text().is_none());
        assert_eq!(bound.ignored_fragments, 1);
        assert_eq!(
            bound.parameters.typed::<String>("variable").value().map(String::as_str),
            Some("b")
        );
    }

    #[test]
    fn positional_fragments_bind_in_order_and_validate() {
        let bound = binder().bind("Wait 1.5", 0).expect("bind");
        assert_eq!(bound.parameters.typed::<f64>("time").value(), Some(&1.5));

        let bound = binder().bind("wait 5000", 0).expect("bind");
        assert!(bound.is_fatal());
        assert!(bound
            .error_text()
            .expect("errors")
            .contains("outside the allowed range"));
    }

    #[test]
    fn unknown_alias_and_bad_quotes_are_errors() {
        let error = binder().bind("dance style:fast", 0).expect_err("unknown");
        assert_eq!(error.code, "BIND_UNKNOWN_ALIAS");
        let error = binder().bind("set var:\"oops", 0).expect_err("quote");
        assert_eq!(error.code, "TOKEN_UNTERMINATED_QUOTE");
    }

    #[test]
    fn binder_reuses_cached_literals() {
        let mut binder = binder();
        binder.bind("wait 2", 0).expect("bind");
        binder.bind("wait 2", 1).expect("bind");
        assert_eq!(binder.cache().hits(), 1);
    }
}

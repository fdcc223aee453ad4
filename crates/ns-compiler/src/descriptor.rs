use std::collections::BTreeMap;
use std::fmt;

use ns_core::{FallbackAction, NarrativeError, RetryStrategy};
use ns_parser::{ParamKind, ParamValue};

/// A check applied to a successfully parsed parameter value.
#[derive(Clone)]
pub enum Validator {
    NonEmpty,
    Range { min: f64, max: f64 },
    OneOf(Vec<String>),
    Custom(fn(&ParamValue) -> Result<(), String>),
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonEmpty => f.write_str("NonEmpty"),
            Self::Range { min, max } => write!(f, "Range({}..={})", min, max),
            Self::OneOf(values) => write!(f, "OneOf({:?})", values),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl Validator {
    pub fn check(&self, value: &ParamValue) -> Result<(), String> {
        match self {
            Self::NonEmpty => {
                let empty = match value {
                    ParamValue::String(text) => text.trim().is_empty(),
                    ParamValue::StringList(items) => items.is_empty(),
                    ParamValue::NamedString(named) => named.name.is_empty(),
                    _ => false,
                };
                if empty {
                    Err("value must not be empty".to_string())
                } else {
                    Ok(())
                }
            }
            Self::Range { min, max } => {
                let Some(number) = value.as_f64() else {
                    return Err(format!("{} value is not numeric", value.kind().name()));
                };
                if number < *min || number > *max {
                    return Err(format!(
                        "{} is outside the allowed range {}..={}",
                        number, min, max
                    ));
                }
                Ok(())
            }
            Self::OneOf(allowed) => {
                let text = value.to_value_text();
                if allowed
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(&text))
                {
                    Ok(())
                } else {
                    Err(format!(
                        "\"{}\" is not one of [{}]",
                        text,
                        allowed.join(", ")
                    ))
                }
            }
            Self::Custom(check) => check(value),
        }
    }
}

/// Declaration of one bindable parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub aliases: Vec<String>,
    pub kind: ParamKind,
    pub required: bool,
    pub positional: bool,
    pub default: Option<ParamValue>,
    pub validators: Vec<Validator>,
}

impl ParamSpec {
    pub fn new(name: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            aliases: Vec::new(),
            kind,
            required: false,
            positional: false,
            default: None,
            validators: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_ascii_lowercase());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn positional(mut self) -> Self {
        self.positional = true;
        self
    }

    pub fn default_value(mut self, value: ParamValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn matches_key(&self, key: &str) -> bool {
        self.name == key || self.aliases.iter().any(|alias| alias == key)
    }
}

/// Static metadata of one command type: aliases, resilience policy and
/// declared parameters.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub alias: String,
    pub aliases: Vec<String>,
    pub category: String,
    /// Zero means "use the interpreter default".
    pub timeout_secs: f64,
    pub max_retries: u32,
    pub retry_strategy: RetryStrategy,
    pub fallback: FallbackAction,
    pub critical: bool,
    pub expected_duration_secs: f64,
    pub preload: bool,
    pub params: Vec<ParamSpec>,
}

impl CommandDescriptor {
    pub fn new(alias: &str, category: &str) -> Self {
        Self {
            alias: alias.to_ascii_lowercase(),
            aliases: Vec::new(),
            category: category.to_string(),
            timeout_secs: 0.0,
            max_retries: 0,
            retry_strategy: RetryStrategy::None,
            fallback: FallbackAction::Abort,
            critical: false,
            expected_duration_secs: 0.0,
            preload: false,
            params: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_ascii_lowercase());
        self
    }

    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    pub fn retry(mut self, max_retries: u32, strategy: RetryStrategy) -> Self {
        self.max_retries = max_retries;
        self.retry_strategy = strategy;
        self
    }

    pub fn fallback(mut self, fallback: FallbackAction) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn expected_duration(mut self, seconds: f64) -> Self {
        self.expected_duration_secs = seconds;
        self
    }

    pub fn preload(mut self) -> Self {
        self.preload = true;
        self
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn param_index(&self, key: &str) -> Option<usize> {
        self.params.iter().position(|spec| spec.matches_key(key))
    }

    pub fn all_aliases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.alias.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Alias-to-descriptor lookup, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    descriptors: Vec<CommandDescriptor>,
    by_alias: BTreeMap<String, usize>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: CommandDescriptor) -> Result<(), NarrativeError> {
        for alias in descriptor.all_aliases() {
            if self.by_alias.contains_key(alias) {
                return Err(NarrativeError::new(
                    "COMPILE_DUPLICATE_ALIAS",
                    format!("Command alias \"{}\" is already registered.", alias),
                ));
            }
        }

        let index = self.descriptors.len();
        for alias in descriptor.all_aliases() {
            self.by_alias.insert(alias.to_string(), index);
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn resolve(&self, alias: &str) -> Option<&CommandDescriptor> {
        let index = self.by_alias.get(&alias.to_ascii_lowercase())?;
        self.descriptors.get(*index)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.by_alias.contains_key(&alias.to_ascii_lowercase())
    }

    pub fn descriptors(&self) -> &[CommandDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod descriptor_tests {
    use super::*;

    fn even_only(value: &ParamValue) -> Result<(), String> {
        match value {
            ParamValue::Integer(number) if number % 2 == 0 => Ok(()),
            _ => Err("value must be even".to_string()),
        }
    }

    #[test]
    fn table_resolves_aliases_case_insensitively() {
        let mut table = DescriptorTable::new();
        table
            .register(CommandDescriptor::new("goto", "flow").alias("jump"))
            .expect("register goto");
        assert_eq!(table.resolve("GOTO").map(|d| d.alias.as_str()), Some("goto"));
        assert_eq!(table.resolve("Jump").map(|d| d.alias.as_str()), Some("goto"));
        assert!(table.resolve("walk").is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_alias_is_rejected() {
        let mut table = DescriptorTable::new();
        table
            .register(CommandDescriptor::new("print", "dialogue").alias("say"))
            .expect("register print");
        let error = table
            .register(CommandDescriptor::new("say", "dialogue"))
            .expect_err("duplicate alias");
        assert_eq!(error.code, "COMPILE_DUPLICATE_ALIAS");
        assert!(table.resolve("say").is_some());
    }

    #[test]
    fn validators_report_reasons() {
        assert!(Validator::NonEmpty
            .check(&ParamValue::String("  ".to_string()))
            .is_err());
        assert!(Validator::Range { min: 0.0, max: 10.0 }
            .check(&ParamValue::Decimal(10.0))
            .is_ok());
        let error = Validator::Range { min: 0.0, max: 10.0 }
            .check(&ParamValue::Integer(11))
            .expect_err("out of range");
        assert!(error.contains("outside the allowed range"));
        assert!(Validator::OneOf(vec!["fast".to_string(), "slow".to_string()])
            .check(&ParamValue::String("FAST".to_string()))
            .is_ok());
        assert!(Validator::Custom(even_only)
            .check(&ParamValue::Integer(3))
            .is_err());
    }

    #[test]
    fn param_keys_match_name_and_aliases() {
        let descriptor = CommandDescriptor::new("set", "variables")
            .param(ParamSpec::new("variable", ParamKind::String).alias("var"))
            .param(ParamSpec::new("value", ParamKind::String).alias("val"));
        assert_eq!(descriptor.param_index("var"), Some(0));
        assert_eq!(descriptor.param_index("value"), Some(1));
        assert_eq!(descriptor.param_index("unknown"), None);
    }
}

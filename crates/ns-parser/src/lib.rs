pub mod line;
pub mod parameter;
pub mod tokenize;

pub use line::{classify_line, is_plausible_speaker, scan_variable_names, LineClassifier};
pub use parameter::{ParamKind, ParamValue, Parameter, ParameterValue};
pub use tokenize::{command_alias, quote_value, tokenize_command, CommandTokens, Fragment};

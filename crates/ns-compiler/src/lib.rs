mod binder;
mod descriptor;
mod format;
mod literal_cache;
mod script_compile;

pub use binder::{bind_tokens, BoundCommand, BoundParameter, BoundParameters, CommandBinder};
pub use descriptor::{CommandDescriptor, DescriptorTable, ParamSpec, Validator};
pub use format::format_command;
pub use literal_cache::LiteralCache;
pub use script_compile::{
    compile_script, compile_with_binder, CompileOptions, CompiledLine, CompiledLineKind,
    CompiledScript, Diagnostic,
};

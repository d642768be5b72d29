//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod health;
pub mod id;
pub mod status;
pub mod submit;

/// Print a value as pretty JSON on stdout
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> crate::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

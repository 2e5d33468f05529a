pub mod report;
pub mod table;

pub use report::*;
pub use table::render_table;

pub fn to_pretty_json<T: serde::Serialize>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}

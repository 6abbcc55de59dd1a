//! Templates baked into the binary for `handoff init`.

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "templates/"]
struct Templates;

pub const HANDOFF_TEMPLATE: &str = "agentreadme.md";
pub const CONFIG_TEMPLATE: &str = "config.toml";

/// Prefix of the per-directory READMEs seeded into the knowledge root.
pub const DOCS_PREFIX: &str = "docs/";

pub fn get_template(name: &str) -> Option<String> {
    let file = Templates::get(name)?;
    String::from_utf8(file.data.into_owned()).ok()
}

/// Embedded templates under `docs/`, sorted, with the prefix stripped.
pub fn list_doc_templates() -> Vec<String> {
    let mut names: Vec<String> = Templates::iter()
        .filter_map(|name| name.strip_prefix(DOCS_PREFIX).map(str::to_string))
        .collect();
    names.sort();
    names
}

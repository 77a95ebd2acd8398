pub mod allocate;
pub mod assemble;
pub mod catalog;
pub mod config;
pub mod error;
pub mod generate;
pub mod literal;
pub mod merge;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod provider;
pub mod traversal;
pub mod tree;

pub use error::{Error, Result};
pub use model::{ForeignKeyRelation, TableRow, TraversalResult};
pub use provider::{MetadataProvider, ProviderError};

use wasm_bindgen::prelude::*;

use catalog::Catalog;
use pipeline::MergeRequest;

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Build a MERGE script from a SQL dump.
///
/// `values` holds one seed per line (commas also separate). Sequences named
/// by `BEFORE INSERT` triggers in the dump are picked up automatically.
#[wasm_bindgen(js_name = "mergeScript")]
pub fn merge_script(
    dump: &str,
    table: &str,
    column: Option<String>,
    values: &str,
    include_update: bool,
) -> std::result::Result<String, String> {
    let catalog = Catalog::from_sql(dump).map_err(|e| e.to_string())?;
    let seeds = split_seeds(values);

    let request = MergeRequest {
        root_table: table,
        lookup_column: column.as_deref(),
        seeds: &seeds,
        include_update,
        detected: catalog.detected_generators(),
        ..MergeRequest::default()
    };
    let output = pipeline::run(&catalog, None, &request).map_err(|e| e.to_string())?;

    Ok(output.script)
}

pub fn split_seeds(values: &str) -> Vec<String> {
    values
        .split(['\n', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

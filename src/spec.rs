//! Spec Loader: reads `<bundle>/config.json` into the typed OCI runtime spec.
//! Decoding itself is delegated entirely to `oci_spec`; this module only
//! pins down the file location convention and turns load failures into the
//! `SpecInvalid` error kind.
use std::path::Path;

use anyhow::{Context, Result};
use oci_spec::runtime::Spec;

use crate::error::RuntimeError;

pub fn load(bundle: &Path) -> Result<Spec> {
    let config_path = bundle.join("config.json");
    let spec = Spec::load(&config_path).map_err(|e| {
        anyhow::Error::new(RuntimeError::SpecInvalid {
            path: config_path.clone(),
            cause: e.to_string(),
        })
    })?;
    Ok(spec).with_context(|| format!("loaded runtime spec from {:?}", config_path))
}

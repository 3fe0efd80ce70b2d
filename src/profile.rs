//! Profile overlays merged into a flow before execution.

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::namespace::{upgrade, Entry, Namespace};
use crate::yaml;

/// Load profile overlays in order and merge them into one namespace.
///
/// Each name resolves to `<profile_path>/<name>.yaml` (subdirectories are
/// allowed, e.g. `environment/test`). Every document must be a mapping.
/// Duplicate keys resolve in favor of the last file defining them.
pub fn load(config: &Config, names: &[String]) -> Result<Namespace> {
    let mut merged = Namespace::new();
    if names.is_empty() {
        return Ok(merged);
    }
    info!(
        profiles = ?names,
        path = %config.profile_path().display(),
        "loading profiles"
    );
    for name in names {
        let path = config.profile_path().join(format!("{name}.yaml"));
        let document = yaml::load_mapping(&path)?;
        if let Entry::Map(overlay) = upgrade(document) {
            merged.merge(overlay);
        }
    }
    Ok(merged)
}

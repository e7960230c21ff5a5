//! Configuration and document fixtures.

use std::path::Path;

use crate::config::RawConfig;

/// A mod-list document with two entries.
pub const SAMPLE_MODLIST_HTML: &str = r#"<!DOCTYPE html>
<html>
  <body>
    <h1>Installed mods</h1>
    <ul>
      <li><a href="https://mods.example.com/jei">Just Enough Items</a></li>
      <li><a href="https://mods.example.com/biomes">Biomes O' Plenty</a></li>
    </ul>
  </body>
</html>
"#;

/// A complete [`RawConfig`] rooted at `root`, without a mod list.
///
/// Nothing is created on disk except what the caller writes.
#[must_use]
pub fn raw_config(root: &Path) -> RawConfig {
    RawConfig {
        world_location: Some(root.join("world").display().to_string()),
        server_script: Some(root.join("server").join("start.sh").display().to_string()),
        unmined_location: Some(root.join("unmined").join("unmined-cli").display().to_string()),
        unmined_output: Some(root.join("render").display().to_string()),
        storage_account_uri: Some("https://devaccount.blob.core.windows.net".to_string()),
        ..RawConfig::default()
    }
}

/// [`raw_config`] plus a mod-list document written under `root`.
pub fn raw_config_with_modlist(root: &Path, html: &str) -> std::io::Result<RawConfig> {
    let path = root.join("modlist.html");
    std::fs::write(&path, html)?;
    Ok(RawConfig {
        modlist_location: Some(path.display().to_string()),
        ..raw_config(root)
    })
}

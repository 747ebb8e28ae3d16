//! Fingerprint command - print the cache key of the current manifest

use crate::cli::args::FingerprintArgs;
use crate::cli::Project;
use crate::error::DepcacheResult;
use crate::ui::{self, UiContext};

/// Execute the fingerprint command
pub async fn execute(
    project: &Project,
    ctx: &UiContext,
    args: FingerprintArgs,
) -> DepcacheResult<()> {
    let manifest = project.manifest()?;
    let entry = project.entry(&manifest);

    if args.json {
        let value = serde_json::json!({
            "fingerprint": entry.fingerprint().as_str(),
            "variant": manifest.variant(),
            "entry": entry.key(),
            "blobs": entry.blob_names(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    // First line stays machine readable for scripts
    println!("{}", entry.fingerprint());
    ui::key_value(ctx, "variant", &manifest.variant().to_string());
    for name in entry.blob_names() {
        ui::key_value(ctx, "blob", &name);
    }
    Ok(())
}

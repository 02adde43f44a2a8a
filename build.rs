//! Build script for cadtext
//!
//! Platform-specific configuration:
//! - Windows: Embeds the application manifest for long path support (>260 chars)
//!
//! # Windows Long Path Support
//!
//! By default, Windows limits file paths to 260 characters (MAX_PATH).
//! Drawing archives routinely nest project/discipline/revision folders deep
//! enough to exceed this, and the converted output tree mirrors the input
//! tree one level deeper.
//!
//! The manifest file (`cadtext.manifest`) includes `longPathAware=true`
//! which, combined with the Windows 10 v1607+ registry setting, enables
//! paths up to 32,767 characters.
//!
//! On non-Windows platforms, the script does nothing.

fn main() {
    #[cfg(windows)]
    {
        // Use embed-resource to compile the .rc file which references the manifest
        // The .rc file uses RT_MANIFEST resource type to embed the XML manifest
        embed_resource::compile("cadtext.rc", embed_resource::NONE);

        println!("cargo:rerun-if-changed=cadtext.rc");
        println!("cargo:rerun-if-changed=cadtext.manifest");
    }
}

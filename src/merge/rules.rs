//! Name-keyed merge tables.
//!
//! Which SDK, which runtime and which final name apply to a package archive
//! is decided purely from its file name, by walking these tables in order.

use crate::context::{Arch, HostOs};
use crate::error::IntegrityError;

/// Folder every merged tree lands under inside a package archive.
pub const ARCHIVE_ROOT: &str = "dart";

/// Marker in a package archive name selecting the 64-bit SDK.
pub const SDK_64_MARKER: &str = "_64.zip";

/// Package archive names as produced by the packaging stage, mapped to
/// their published names.
pub const RENAME_TABLE: [(&str, &str); 6] = [
    ("dart-editor-linux.gtk.x86.zip", "darteditor-linux-32.zip"),
    ("dart-editor-linux.gtk.x86_64.zip", "darteditor-linux-64.zip"),
    ("dart-editor-macosx.cocoa.x86.zip", "darteditor-macos-32.zip"),
    ("dart-editor-macosx.cocoa.x86_64.zip", "darteditor-macos-64.zip"),
    ("dart-editor-win32.win32.x86.zip", "darteditor-win32-32.zip"),
    ("dart-editor-win32.win32.x86_64.zip", "darteditor-win32-64.zip"),
];

/// Whether a file in the output directory is a package archive as the
/// packaging stage writes it.
///
/// Published names are not: they only exist as leftovers of earlier runs.
pub fn is_package_archive(name: &str) -> bool {
    name.starts_with("dart-editor") && name.ends_with(".zip")
}

/// Whether an output file is left over from an earlier run.
pub fn is_stale_artifact(name: &str) -> bool {
    ["dartsdk-", "darteditor-", "dart-editor-"]
        .iter()
        .any(|token| name.contains(token))
}

/// Published name for a package archive.
///
/// Only the table's input names are accepted; anything else, published
/// names included, is rejected.
pub fn normalized_name(name: &str) -> Result<&'static str, IntegrityError> {
    RENAME_TABLE
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
        .ok_or_else(|| IntegrityError::UnknownPackageArchive {
            name: name.to_string(),
        })
}

/// SDK width to inject into a package archive.
pub fn sdk_arch_for(name: &str) -> Arch {
    if name.contains(SDK_64_MARKER) {
        Arch::X64
    } else {
        Arch::Ia32
    }
}

/// Maps a package archive name token to a runtime archive name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeRule {
    /// Substring of the package archive name
    pub token: &'static str,
    /// Prefix of the runtime archive name
    pub prefix: &'static str,
}

/// Runtime rules, checked in order; the first match wins.
pub const RUNTIME_RULES: [RuntimeRule; 4] = [
    RuntimeRule {
        token: "-linux.gtk.x86.zip",
        prefix: "dartium-lucid32-full-",
    },
    RuntimeRule {
        token: "-linux.gtk.x86_64.zip",
        prefix: "dartium-lucid64-full-",
    },
    RuntimeRule {
        token: "macosx",
        prefix: "dartium-mac-full-",
    },
    RuntimeRule {
        token: "win32",
        prefix: "dartium-win-full-",
    },
];

/// Runtime rule for a package archive, if any.
pub fn runtime_rule_for(name: &str) -> Option<&'static RuntimeRule> {
    RUNTIME_RULES.iter().find(|rule| name.contains(rule.token))
}

/// Where the runtime lives in its archive and where it goes in ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimePlacement {
    /// Glob for the product directory inside the unpacked runtime
    pub product_glob: &'static str,
    /// Application bundle inside the product directory, if any
    pub bundle: Option<&'static str>,
    /// Target prefix inside the package archive
    pub target: &'static str,
    /// Files removed from the product before injection
    pub strip: &'static [&'static str],
}

impl RuntimePlacement {
    /// Placement for the host platform.
    pub fn for_os(os: HostOs) -> Self {
        match os {
            HostOs::Linux => Self {
                product_glob: "dartium-*",
                bundle: None,
                target: "dart/chromium",
                strip: &[],
            },
            HostOs::Win32 => Self {
                product_glob: "dartium-*",
                bundle: None,
                target: "dart/chromium",
                strip: &[
                    "DumpRenderTree.exe",
                    "mini_installer.exe",
                    "sync_unit_tests.exe",
                ],
            },
            HostOs::MacOs => Self {
                product_glob: "dartium-*",
                bundle: Some("Chromium.app"),
                target: "dart/Chromium.app",
                strip: &[],
            },
        }
    }
}

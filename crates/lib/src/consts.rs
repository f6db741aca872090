//! Names shared across the build pipeline.

/// Resolved snapshot written by the resolution step.
pub const SNAPSHOT_FILENAME: &str = "snapshot.json";

/// Local version-control mirrors live under this work directory subfolder.
pub const MIRROR_DIRNAME: &str = "src";

/// The swapped output tree.
pub const BUILD_DIRNAME: &str = "build";

/// Cache file stored inside each published generation.
pub const BUILD_STATE_FILENAME: &str = "buildstate.json";

/// Flat directory of binary and source packages inside a generation.
pub const RPMS_DIRNAME: &str = "rpms";

/// Compatibility link the repository index expects next to `rpms/`.
pub const PACKAGES_LINK: &str = "packages";

pub const SRPM_SUFFIX: &str = ".src.rpm";
pub const RPM_SUFFIX: &str = ".rpm";

/// Marks a source package synthesized by us, as opposed to the one the batch
/// compiler regenerates with the final dist tag.
pub const TEMP_SRPM_SUFFIX: &str = ".temp.src.rpm";

/// Written by the batch compiler into each per-package result directory.
pub const STATUS_MARKER: &str = "status.json";

pub const LOCK_FILENAME: &str = ".distbuild.lock";

/// Set to any value to keep per-component temporary checkouts.
pub const PRESERVE_TEMP_ENV: &str = "DISTBUILD_PRESERVE_TEMP";

pub const SPEC_DISCLAIMER: &str = "# NOTE: AUTO-GENERATED by distbuild; DO NOT EDIT";

/// Release suffix resolved by the packaging tool at compile time.
pub const DIST_TAG: &str = "%{?dist}";
